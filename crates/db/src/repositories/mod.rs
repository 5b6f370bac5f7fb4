pub mod asset;
pub mod request;

pub use asset::SqlAssetStore;
pub use request::SqlRequestStore;

use assetflow_core::store::StoreError;

pub(crate) fn backend_error(error: sqlx::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

pub(crate) fn decode_error(message: impl Into<String>) -> StoreError {
    StoreError::Backend(format!("decode error: {}", message.into()))
}
