pub mod config;
pub mod demo;
pub mod migrate;
pub mod seed;

use serde::Serialize;

use assetflow_core::config::{AppConfig, LoadOptions};

/// Structured command outcome: a JSON envelope on stdout plus the process
/// exit code. Machine-readable so wrapper scripts can branch on
/// `status`/`error_class` instead of scraping text.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    command: &'a str,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_class: Option<&'a str>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            output: render(Envelope {
                command,
                status: "ok",
                error_class: None,
                message: message.into(),
            }),
        }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self {
            exit_code,
            output: render(Envelope {
                command,
                status: "error",
                error_class: Some(error_class),
                message: message.into(),
            }),
        }
    }
}

/// Shared preamble for commands that touch the database: load config, then
/// stand up a current-thread runtime. Failures come back as ready-to-print
/// results with the conventional exit codes (2 config, 3 runtime).
pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })
}

pub(crate) fn build_runtime(command: &str) -> Result<tokio::runtime::Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        )
    })
}

fn render(envelope: Envelope<'_>) -> String {
    serde_json::to_string(&envelope).unwrap_or_else(|error| {
        // Only reachable if the message itself refuses to serialize.
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":{}}}",
            serde_json::Value::String(error.to_string())
        )
    })
}
