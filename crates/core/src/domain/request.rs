use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::AuditEntry;
use crate::domain::asset::AssetId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Laptop,
    Monitor,
    Peripheral,
    Software,
    Byod,
}

/// Organizational roles that can own or act on a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerRole {
    EndUser,
    Manager,
    ItManagement,
    AssetInventoryManager,
    Procurement,
    Finance,
}

/// Sub-state of a request routed through Procurement and Finance.
///
/// `PoUploaded` is an alias of `PoCreated` for the Finance precondition;
/// this engine only ever produces `PoCreated`, but records written by other
/// systems may carry either label.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcurementStage {
    AwaitingDecision,
    PoCreated,
    PoUploaded,
    FinanceApproved,
    Delivered,
    Rejected,
    FinanceRejected,
}

impl ProcurementStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::FinanceRejected)
    }
}

/// Lifecycle state of an asset request.
///
/// The procurement sub-stage is nested inside `ProcurementRequired` so a
/// request outside procurement cannot carry a live sub-stage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "stage", rename_all = "snake_case")]
pub enum RequestStatus {
    Requested,
    ManagerApproved,
    ItApproved,
    ProcurementRequired(ProcurementStage),
    Fulfilled,
    Rejected,
    Closed,
    Cancelled,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Fulfilled | Self::Rejected | Self::Closed | Self::Cancelled)
    }

    /// Live procurement sub-stage, if the request is currently in procurement.
    pub fn procurement_stage(&self) -> Option<ProcurementStage> {
        match self {
            Self::ProcurementRequired(stage) => Some(*stage),
            _ => None,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => f.write_str("requested"),
            Self::ManagerApproved => f.write_str("manager_approved"),
            Self::ItApproved => f.write_str("it_approved"),
            Self::ProcurementRequired(stage) => {
                write!(f, "procurement_required({stage:?})")
            }
            Self::Fulfilled => f.write_str("fulfilled"),
            Self::Rejected => f.write_str("rejected"),
            Self::Closed => f.write_str("closed"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryDecision {
    Available,
    NotAvailable,
}

/// A person acting on a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into() }
    }
}

/// Identity snapshot of the requester, captured at creation time and never
/// mutated afterward.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub id: String,
    pub name: String,
    pub role: OwnerRole,
}

/// Device metadata carried by BYOD requests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRegistration {
    pub make: Option<String>,
    pub model: String,
    pub serial_number: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRequest {
    pub id: RequestId,
    pub asset_type: AssetType,
    pub justification: String,
    pub requested_by: Requester,
    pub device: Option<DeviceRegistration>,
    pub status: RequestStatus,
    /// Derived from `status` via the ownership resolver; persisted for
    /// dashboard lookup.
    pub current_owner_role: OwnerRole,
    pub inventory_decision: Option<InventoryDecision>,
    /// Last procurement stage reached. Frozen once the request leaves
    /// procurement so history survives the terminal transition.
    pub procurement_stage: Option<ProcurementStage>,
    pub po_number: Option<String>,
    pub allocated_asset_id: Option<AssetId>,
    pub rejection_reason: Option<String>,
    pub audit_trail: Vec<AuditEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
