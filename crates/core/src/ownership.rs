use crate::domain::request::{OwnerRole, ProcurementStage, RequestStatus};

/// Maps a request's status to the role responsible for acting on it.
///
/// Single source of truth for ownership: no transition may set
/// `current_owner_role` except through this function. Total over every
/// status/stage combination, including terminal ones (which are owned by the
/// end user for informational purposes only).
pub fn owner_for(status: &RequestStatus) -> OwnerRole {
    match status {
        RequestStatus::Requested => OwnerRole::Manager,
        RequestStatus::ManagerApproved => OwnerRole::ItManagement,
        RequestStatus::ItApproved => OwnerRole::AssetInventoryManager,
        RequestStatus::ProcurementRequired(stage) => match stage {
            ProcurementStage::AwaitingDecision | ProcurementStage::FinanceApproved => {
                OwnerRole::Procurement
            }
            ProcurementStage::PoCreated | ProcurementStage::PoUploaded => OwnerRole::Finance,
            ProcurementStage::Delivered => OwnerRole::AssetInventoryManager,
            ProcurementStage::Rejected | ProcurementStage::FinanceRejected => OwnerRole::EndUser,
        },
        RequestStatus::Fulfilled
        | RequestStatus::Rejected
        | RequestStatus::Closed
        | RequestStatus::Cancelled => OwnerRole::EndUser,
    }
}
