use thiserror::Error;

use crate::domain::request::{RequestId, RequestStatus};
use crate::store::StoreError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("request `{id}` was not found")]
    NotFound { id: RequestId },
    #[error("`{attempted}` is not allowed while request `{id}` is {current}")]
    InvalidState { id: RequestId, attempted: &'static str, current: RequestStatus },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("request `{id}` was modified concurrently; stored status is now {found}")]
    Conflict { id: RequestId, found: RequestStatus },
}

impl WorkflowError {
    /// User-safe message for the console to render alongside the error detail.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "The request no longer exists.",
            Self::InvalidState { .. } => {
                "The request has moved on since this screen loaded. Refresh to see its current state."
            }
            Self::Validation(_) => "The request could not be processed. Check inputs and try again.",
            Self::Persistence(_) => {
                "The change could not be saved. Nothing was applied; please retry shortly."
            }
            Self::Conflict { .. } => {
                "Someone else updated this request first. Refresh before retrying."
            }
        }
    }

    pub(crate) fn from_store(id: &RequestId, error: StoreError) -> Self {
        match error {
            StoreError::NotFound => Self::NotFound { id: id.clone() },
            StoreError::Conflict { found } => Self::Conflict { id: id.clone(), found },
            StoreError::Backend(message) => Self::Persistence(message),
        }
    }
}
