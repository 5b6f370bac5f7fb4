use crate::commands::{build_runtime, load_config, CommandResult};
use assetflow_core::domain::asset::Asset;
use assetflow_core::store::AssetStore;
use assetflow_db::{connect_with_settings, migrations, SqlAssetStore};

/// Deterministic inventory fixtures for local development and walkthroughs.
fn demo_catalog() -> Vec<Asset> {
    vec![
        Asset::available("AST-LT-001", "ThinkPad T14 Gen 4", "laptop"),
        Asset::available("AST-LT-002", "MacBook Pro 14", "laptop"),
        Asset::available("AST-MN-001", "Dell U2723QE", "monitor"),
        Asset::available("AST-PR-001", "Logitech MX Keys", "peripheral"),
    ]
}

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("seed") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let store = SqlAssetStore::new(pool.clone());
        let catalog = demo_catalog();
        for asset in &catalog {
            store
                .save(asset.clone())
                .await
                .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        }

        // Read back every fixture so a silent write failure surfaces here.
        let mut missing = Vec::new();
        for asset in &catalog {
            let found = store
                .get(&asset.id)
                .await
                .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;
            if found.is_none() {
                missing.push(asset.id.0.clone());
            }
        }
        pool.close().await;

        if missing.is_empty() {
            Ok(catalog)
        } else {
            Err((
                "seed_verification",
                format!("seed verification failed for assets: {}", missing.join(", ")),
                6u8,
            ))
        }
    });

    match result {
        Ok(catalog) => {
            let lines: Vec<String> = catalog
                .iter()
                .map(|asset| format!("  - {}: {} ({})", asset.id, asset.name, asset.asset_type))
                .collect();
            let message =
                format!("demo asset catalog loaded ({} assets):\n{}", lines.len(), lines.join("\n"));
            CommandResult::success("seed", message)
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}
