pub mod allocation;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod ownership;
pub mod store;
pub mod workflow;

pub use allocation::AllocationBridge;
pub use audit::{append_entry, AuditAction, AuditEntry};
pub use domain::asset::{Asset, AssetId, AssetState};
pub use domain::request::{
    Actor, AssetRequest, AssetType, DeviceRegistration, InventoryDecision, OwnerRole,
    ProcurementStage, RequestId, RequestStatus, Requester,
};
pub use errors::WorkflowError;
pub use ownership::owner_for;
pub use store::{
    AssetStore, InMemoryAssetStore, InMemoryRequestStore, RequestStore, StoreError,
};
pub use workflow::{NewRequest, WorkflowEngine};
