use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::request::{Actor, OwnerRole};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    ManagerApproved,
    ManagerRejected,
    ItApproved,
    ItRejected,
    InventoryAvailable,
    InventoryNotAvailable,
    ProcurementApproved,
    ProcurementRejected,
    FinanceApproved,
    FinanceRejected,
    DeliveryConfirmed,
    AssetAllocated,
    Cancelled,
    Closed,
}

/// One immutable line in a request's history. Entries are only ever appended,
/// never edited, removed, or reordered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub by_role: OwnerRole,
    pub by_user: Actor,
    pub timestamp: DateTime<Utc>,
    pub comment: Option<String>,
}

impl AuditEntry {
    pub fn new(action: AuditAction, by_role: OwnerRole, by_user: Actor) -> Self {
        Self { action, by_role, by_user, timestamp: Utc::now(), comment: None }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Appends an entry to the trail, clamping its timestamp so the trail stays
/// monotonically non-decreasing even if the system clock steps backwards.
pub fn append_entry(
    trail: &mut Vec<AuditEntry>,
    action: AuditAction,
    by_role: OwnerRole,
    by_user: Actor,
    comment: Option<String>,
) {
    let mut entry = AuditEntry::new(action, by_role, by_user);
    if let Some(comment) = comment {
        entry = entry.with_comment(comment);
    }
    if let Some(last) = trail.last() {
        if last.timestamp > entry.timestamp {
            entry.timestamp = last.timestamp;
        }
    }
    trail.push(entry);
}
