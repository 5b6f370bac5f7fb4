pub mod asset;
pub mod request;
