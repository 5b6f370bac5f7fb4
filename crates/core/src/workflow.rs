//! Asset-request lifecycle workflow engine.
//!
//! One operation per role transition. Every operation loads the request,
//! checks its precondition, computes the next state through a single helper,
//! appends exactly one audit entry, and commits with a compare-and-swap
//! against the status the caller observed.

use chrono::Utc;
use uuid::Uuid;

use crate::allocation::AllocationBridge;
use crate::audit::{append_entry, AuditAction};
use crate::domain::asset::AssetId;
use crate::domain::request::{
    Actor, AssetRequest, AssetType, DeviceRegistration, InventoryDecision, OwnerRole,
    ProcurementStage, RequestId, RequestStatus, Requester,
};
use crate::errors::WorkflowError;
use crate::ownership::owner_for;
use crate::store::{AssetStore, RequestStore};

/// Payload for `create_request`.
#[derive(Clone, Debug)]
pub struct NewRequest {
    pub asset_type: AssetType,
    pub justification: String,
    pub device: Option<DeviceRegistration>,
}

pub struct WorkflowEngine<R, A> {
    requests: R,
    allocation: AllocationBridge<A>,
}

impl<R, A> WorkflowEngine<R, A>
where
    R: RequestStore,
    A: AssetStore,
{
    pub fn new(requests: R, assets: A) -> Self {
        Self { requests, allocation: AllocationBridge::new(assets) }
    }

    pub fn requests(&self) -> &R {
        &self.requests
    }

    pub fn allocation(&self) -> &AllocationBridge<A> {
        &self.allocation
    }

    /// Creates a request owned by the requester's manager and seeds the audit
    /// trail with the creation event. BYOD requests carry their device
    /// registration metadata but follow the same initial transition.
    pub async fn create_request(
        &self,
        actor: Actor,
        input: NewRequest,
    ) -> Result<AssetRequest, WorkflowError> {
        let now = Utc::now();
        let status = RequestStatus::Requested;
        let mut request = AssetRequest {
            id: RequestId(Uuid::new_v4().to_string()),
            asset_type: input.asset_type,
            justification: input.justification,
            requested_by: Requester {
                id: actor.id.clone(),
                name: actor.name.clone(),
                role: OwnerRole::EndUser,
            },
            device: input.device,
            current_owner_role: owner_for(&status),
            status,
            inventory_decision: None,
            procurement_stage: None,
            po_number: None,
            allocated_asset_id: None,
            rejection_reason: None,
            audit_trail: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        append_entry(
            &mut request.audit_trail,
            AuditAction::Created,
            OwnerRole::EndUser,
            actor,
            None,
        );

        let created = self
            .requests
            .create(request)
            .await
            .map_err(|error| WorkflowError::Persistence(error.to_string()))?;
        tracing::info!(
            event_name = "workflow.request_created",
            request_id = %created.id,
            asset_type = ?created.asset_type,
            owner_role = ?created.current_owner_role,
            "asset request created"
        );
        Ok(created)
    }

    pub async fn get_request(&self, id: &RequestId) -> Result<AssetRequest, WorkflowError> {
        self.load(id).await
    }

    /// Dashboard query: all requests currently waiting on `role`.
    pub async fn queue_for_role(&self, role: OwnerRole) -> Result<Vec<AssetRequest>, WorkflowError> {
        self.requests
            .list_by_owner_role(role)
            .await
            .map_err(|error| WorkflowError::Persistence(error.to_string()))
    }

    pub async fn manager_approve(
        &self,
        id: &RequestId,
        actor: Actor,
        comment: Option<String>,
    ) -> Result<AssetRequest, WorkflowError> {
        const OP: &str = "manager_approve";
        let mut request = self.load(id).await?;
        let expected = request.status.clone();
        if expected != RequestStatus::Requested {
            return Err(invalid_state(id, OP, expected));
        }

        move_to(&mut request, RequestStatus::ManagerApproved);
        append_entry(
            &mut request.audit_trail,
            AuditAction::ManagerApproved,
            OwnerRole::Manager,
            actor,
            comment,
        );
        self.commit(OP, expected, request).await
    }

    pub async fn manager_reject(
        &self,
        id: &RequestId,
        actor: Actor,
        reason: String,
    ) -> Result<AssetRequest, WorkflowError> {
        const OP: &str = "manager_reject";
        let reason = required_reason(reason)?;
        let mut request = self.load(id).await?;
        let expected = request.status.clone();
        if expected != RequestStatus::Requested {
            return Err(invalid_state(id, OP, expected));
        }

        request.rejection_reason = Some(reason.clone());
        move_to(&mut request, RequestStatus::Rejected);
        append_entry(
            &mut request.audit_trail,
            AuditAction::ManagerRejected,
            OwnerRole::Manager,
            actor,
            Some(reason),
        );
        self.commit(OP, expected, request).await
    }

    /// BYOD requests are fulfilled directly (the device is registered, no
    /// company asset is allocated); everything else moves on to inventory.
    pub async fn it_approve(
        &self,
        id: &RequestId,
        actor: Actor,
        comment: Option<String>,
    ) -> Result<AssetRequest, WorkflowError> {
        const OP: &str = "it_approve";
        let mut request = self.load(id).await?;
        let expected = request.status.clone();
        if expected != RequestStatus::ManagerApproved {
            return Err(invalid_state(id, OP, expected));
        }

        let next = if request.asset_type == AssetType::Byod {
            RequestStatus::Fulfilled
        } else {
            RequestStatus::ItApproved
        };
        move_to(&mut request, next);
        append_entry(
            &mut request.audit_trail,
            AuditAction::ItApproved,
            OwnerRole::ItManagement,
            actor,
            comment,
        );
        self.commit(OP, expected, request).await
    }

    pub async fn it_reject(
        &self,
        id: &RequestId,
        actor: Actor,
        reason: String,
    ) -> Result<AssetRequest, WorkflowError> {
        const OP: &str = "it_reject";
        let reason = required_reason(reason)?;
        let mut request = self.load(id).await?;
        let expected = request.status.clone();
        if !matches!(
            expected,
            RequestStatus::Requested | RequestStatus::ManagerApproved | RequestStatus::ItApproved
        ) {
            return Err(invalid_state(id, OP, expected));
        }

        request.rejection_reason = Some(reason.clone());
        move_to(&mut request, RequestStatus::Rejected);
        append_entry(
            &mut request.audit_trail,
            AuditAction::ItRejected,
            OwnerRole::ItManagement,
            actor,
            Some(reason),
        );
        self.commit(OP, expected, request).await
    }

    /// Inventory has the asset on hand: bind it and fulfill the request.
    pub async fn inventory_check_available(
        &self,
        id: &RequestId,
        actor: Actor,
        asset_id: AssetId,
    ) -> Result<AssetRequest, WorkflowError> {
        const OP: &str = "inventory_check_available";
        let mut request = self.load(id).await?;
        let expected = request.status.clone();
        if expected != RequestStatus::ItApproved {
            return Err(invalid_state(id, OP, expected));
        }
        self.ensure_asset_exists(&asset_id).await?;

        request.inventory_decision = Some(InventoryDecision::Available);
        request.allocated_asset_id = Some(asset_id.clone());
        move_to(&mut request, RequestStatus::Fulfilled);
        append_entry(
            &mut request.audit_trail,
            AuditAction::InventoryAvailable,
            OwnerRole::AssetInventoryManager,
            actor,
            Some(format!("allocated asset {asset_id}")),
        );
        let committed = self.commit(OP, expected, request).await?;
        self.bind_asset(&committed, &asset_id).await?;
        Ok(committed)
    }

    /// Inventory is out of stock: route the request to procurement.
    pub async fn inventory_check_not_available(
        &self,
        id: &RequestId,
        actor: Actor,
        comment: Option<String>,
    ) -> Result<AssetRequest, WorkflowError> {
        const OP: &str = "inventory_check_not_available";
        let mut request = self.load(id).await?;
        let expected = request.status.clone();
        if expected != RequestStatus::ItApproved {
            return Err(invalid_state(id, OP, expected));
        }

        request.inventory_decision = Some(InventoryDecision::NotAvailable);
        move_to(
            &mut request,
            RequestStatus::ProcurementRequired(ProcurementStage::AwaitingDecision),
        );
        append_entry(
            &mut request.audit_trail,
            AuditAction::InventoryNotAvailable,
            OwnerRole::AssetInventoryManager,
            actor,
            comment,
        );
        self.commit(OP, expected, request).await
    }

    /// Raises a purchase order, generating a PO number when none is supplied.
    pub async fn procurement_approve(
        &self,
        id: &RequestId,
        actor: Actor,
        po_number: Option<String>,
    ) -> Result<AssetRequest, WorkflowError> {
        const OP: &str = "procurement_approve";
        let mut request = self.load(id).await?;
        let expected = request.status.clone();
        if expected != RequestStatus::ProcurementRequired(ProcurementStage::AwaitingDecision) {
            return Err(invalid_state(id, OP, expected));
        }

        let po_number = match po_number.map(|po| po.trim().to_owned()).filter(|po| !po.is_empty()) {
            Some(po) => po,
            None => generate_po_number(),
        };
        request.po_number = Some(po_number.clone());
        move_to(&mut request, RequestStatus::ProcurementRequired(ProcurementStage::PoCreated));
        append_entry(
            &mut request.audit_trail,
            AuditAction::ProcurementApproved,
            OwnerRole::Procurement,
            actor,
            Some(format!("raised {po_number}")),
        );
        self.commit(OP, expected, request).await
    }

    pub async fn procurement_reject(
        &self,
        id: &RequestId,
        actor: Actor,
        reason: String,
    ) -> Result<AssetRequest, WorkflowError> {
        const OP: &str = "procurement_reject";
        let reason = required_reason(reason)?;
        let mut request = self.load(id).await?;
        let expected = request.status.clone();
        if !matches!(expected, RequestStatus::ProcurementRequired(_)) {
            return Err(invalid_state(id, OP, expected));
        }

        request.rejection_reason = Some(reason.clone());
        move_to(&mut request, RequestStatus::Rejected);
        request.procurement_stage = Some(ProcurementStage::Rejected);
        append_entry(
            &mut request.audit_trail,
            AuditAction::ProcurementRejected,
            OwnerRole::Procurement,
            actor,
            Some(reason),
        );
        self.commit(OP, expected, request).await
    }

    /// Finance signs off on the purchase order. `PoCreated` and `PoUploaded`
    /// are equivalent triggers.
    pub async fn finance_approve(
        &self,
        id: &RequestId,
        actor: Actor,
        comment: Option<String>,
    ) -> Result<AssetRequest, WorkflowError> {
        const OP: &str = "finance_approve";
        let mut request = self.load(id).await?;
        let expected = request.status.clone();
        if !matches!(
            expected,
            RequestStatus::ProcurementRequired(
                ProcurementStage::PoCreated | ProcurementStage::PoUploaded
            )
        ) {
            return Err(invalid_state(id, OP, expected));
        }

        move_to(&mut request, RequestStatus::ProcurementRequired(ProcurementStage::FinanceApproved));
        append_entry(
            &mut request.audit_trail,
            AuditAction::FinanceApproved,
            OwnerRole::Finance,
            actor,
            comment,
        );
        self.commit(OP, expected, request).await
    }

    pub async fn finance_reject(
        &self,
        id: &RequestId,
        actor: Actor,
        reason: String,
    ) -> Result<AssetRequest, WorkflowError> {
        const OP: &str = "finance_reject";
        let reason = required_reason(reason)?;
        let mut request = self.load(id).await?;
        let expected = request.status.clone();
        if !matches!(
            expected,
            RequestStatus::ProcurementRequired(
                ProcurementStage::PoCreated | ProcurementStage::PoUploaded
            )
        ) {
            return Err(invalid_state(id, OP, expected));
        }

        request.rejection_reason = Some(reason.clone());
        move_to(&mut request, RequestStatus::Rejected);
        request.procurement_stage = Some(ProcurementStage::FinanceRejected);
        append_entry(
            &mut request.audit_trail,
            AuditAction::FinanceRejected,
            OwnerRole::Finance,
            actor,
            Some(reason),
        );
        self.commit(OP, expected, request).await
    }

    pub async fn procurement_confirm_delivery(
        &self,
        id: &RequestId,
        actor: Actor,
        comment: Option<String>,
    ) -> Result<AssetRequest, WorkflowError> {
        const OP: &str = "procurement_confirm_delivery";
        let mut request = self.load(id).await?;
        let expected = request.status.clone();
        if expected != RequestStatus::ProcurementRequired(ProcurementStage::FinanceApproved) {
            return Err(invalid_state(id, OP, expected));
        }

        move_to(&mut request, RequestStatus::ProcurementRequired(ProcurementStage::Delivered));
        append_entry(
            &mut request.audit_trail,
            AuditAction::DeliveryConfirmed,
            OwnerRole::Procurement,
            actor,
            comment,
        );
        self.commit(OP, expected, request).await
    }

    /// Registers the delivered unit and fulfills the request.
    pub async fn inventory_allocate_delivered(
        &self,
        id: &RequestId,
        actor: Actor,
        asset_id: AssetId,
    ) -> Result<AssetRequest, WorkflowError> {
        const OP: &str = "inventory_allocate_delivered";
        let mut request = self.load(id).await?;
        let expected = request.status.clone();
        if expected != RequestStatus::ProcurementRequired(ProcurementStage::Delivered) {
            return Err(invalid_state(id, OP, expected));
        }
        self.ensure_asset_exists(&asset_id).await?;

        request.allocated_asset_id = Some(asset_id.clone());
        move_to(&mut request, RequestStatus::Fulfilled);
        append_entry(
            &mut request.audit_trail,
            AuditAction::AssetAllocated,
            OwnerRole::AssetInventoryManager,
            actor,
            Some(format!("allocated delivered asset {asset_id}")),
        );
        let committed = self.commit(OP, expected, request).await?;
        self.bind_asset(&committed, &asset_id).await?;
        Ok(committed)
    }

    /// The requester withdraws a request that has not reached a terminal
    /// state yet.
    pub async fn user_cancel(
        &self,
        id: &RequestId,
        actor: Actor,
        comment: Option<String>,
    ) -> Result<AssetRequest, WorkflowError> {
        const OP: &str = "user_cancel";
        let mut request = self.load(id).await?;
        let expected = request.status.clone();
        if expected.is_terminal() {
            return Err(invalid_state(id, OP, expected));
        }

        move_to(&mut request, RequestStatus::Cancelled);
        append_entry(
            &mut request.audit_trail,
            AuditAction::Cancelled,
            OwnerRole::EndUser,
            actor,
            comment,
        );
        self.commit(OP, expected, request).await
    }

    /// The requester acknowledges receipt of a fulfilled request.
    pub async fn user_close(
        &self,
        id: &RequestId,
        actor: Actor,
        comment: Option<String>,
    ) -> Result<AssetRequest, WorkflowError> {
        const OP: &str = "user_close";
        let mut request = self.load(id).await?;
        let expected = request.status.clone();
        if expected != RequestStatus::Fulfilled {
            return Err(invalid_state(id, OP, expected));
        }

        move_to(&mut request, RequestStatus::Closed);
        append_entry(
            &mut request.audit_trail,
            AuditAction::Closed,
            OwnerRole::EndUser,
            actor,
            comment,
        );
        self.commit(OP, expected, request).await
    }

    async fn load(&self, id: &RequestId) -> Result<AssetRequest, WorkflowError> {
        self.requests
            .get(id)
            .await
            .map_err(|error| WorkflowError::Persistence(error.to_string()))?
            .ok_or_else(|| WorkflowError::NotFound { id: id.clone() })
    }

    async fn ensure_asset_exists(&self, asset_id: &AssetId) -> Result<(), WorkflowError> {
        let exists = self
            .allocation
            .exists(asset_id)
            .await
            .map_err(|error| WorkflowError::Persistence(error.to_string()))?;
        if exists {
            Ok(())
        } else {
            Err(WorkflowError::Validation(format!("unknown asset `{asset_id}`")))
        }
    }

    /// Binds the asset after the fulfilling commit succeeded. Allocation is
    /// idempotent, so a failure here can be retried without touching the
    /// request again.
    async fn bind_asset(
        &self,
        request: &AssetRequest,
        asset_id: &AssetId,
    ) -> Result<(), WorkflowError> {
        self.allocation
            .allocate(asset_id, &request.requested_by.name)
            .await
            .map(|_| ())
            .map_err(|error| WorkflowError::Persistence(error.to_string()))
    }

    async fn commit(
        &self,
        operation: &'static str,
        expected: RequestStatus,
        request: AssetRequest,
    ) -> Result<AssetRequest, WorkflowError> {
        let id = request.id.clone();
        match self.requests.update(&id, &expected, request).await {
            Ok(updated) => {
                tracing::info!(
                    event_name = "workflow.transition_applied",
                    operation,
                    request_id = %id,
                    from = %expected,
                    to = %updated.status,
                    owner_role = ?updated.current_owner_role,
                    "transition committed"
                );
                Ok(updated)
            }
            Err(error) => {
                tracing::warn!(
                    event_name = "workflow.transition_failed",
                    operation,
                    request_id = %id,
                    from = %expected,
                    error = %error,
                    "transition not committed"
                );
                Err(WorkflowError::from_store(&id, error))
            }
        }
    }
}

/// The one place a status change happens: freezes the procurement stage for
/// history and keeps `current_owner_role` in lockstep with the resolver.
fn move_to(request: &mut AssetRequest, next: RequestStatus) {
    if let RequestStatus::ProcurementRequired(stage) = &next {
        request.procurement_stage = Some(*stage);
    }
    request.current_owner_role = owner_for(&next);
    request.status = next;
    request.updated_at = Utc::now();
}

fn invalid_state(id: &RequestId, attempted: &'static str, current: RequestStatus) -> WorkflowError {
    tracing::warn!(
        event_name = "workflow.transition_rejected",
        operation = attempted,
        request_id = %id,
        current = %current,
        "precondition not met"
    );
    WorkflowError::InvalidState { id: id.clone(), attempted, current }
}

fn required_reason(reason: String) -> Result<String, WorkflowError> {
    let reason = reason.trim().to_owned();
    if reason.is_empty() {
        return Err(WorkflowError::Validation("a rejection reason is required".to_owned()));
    }
    Ok(reason)
}

fn generate_po_number() -> String {
    let mut token = Uuid::new_v4().simple().to_string();
    token.truncate(8);
    format!("PO-{}", token.to_uppercase())
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::{NewRequest, WorkflowEngine};
    use crate::audit::AuditAction;
    use crate::domain::asset::{Asset, AssetId, AssetState};
    use crate::domain::request::{
        Actor, AssetRequest, AssetType, DeviceRegistration, InventoryDecision, OwnerRole,
        ProcurementStage, RequestId, RequestStatus,
    };
    use crate::errors::WorkflowError;
    use crate::ownership::owner_for;
    use crate::store::{
        AssetStore, InMemoryAssetStore, InMemoryRequestStore, RequestStore, StoreError,
    };

    fn requester() -> Actor {
        Actor::new("u-enduser", "Maya Flores")
    }

    fn manager() -> Actor {
        Actor::new("u-manager", "Ravi Nair")
    }

    fn it_lead() -> Actor {
        Actor::new("u-it", "Sam Chen")
    }

    fn inventory() -> Actor {
        Actor::new("u-inventory", "Priya Shah")
    }

    fn procurement() -> Actor {
        Actor::new("u-procurement", "Tom Adeyemi")
    }

    fn finance() -> Actor {
        Actor::new("u-finance", "Lena Koch")
    }

    fn laptop_request() -> NewRequest {
        NewRequest {
            asset_type: AssetType::Laptop,
            justification: "replacement for failed unit".to_owned(),
            device: None,
        }
    }

    fn byod_request() -> NewRequest {
        NewRequest {
            asset_type: AssetType::Byod,
            justification: "personal phone for on-call".to_owned(),
            device: Some(DeviceRegistration {
                make: Some("Google".to_owned()),
                model: "Pixel 9".to_owned(),
                serial_number: "GP9-001122".to_owned(),
            }),
        }
    }

    fn engine() -> WorkflowEngine<InMemoryRequestStore, InMemoryAssetStore> {
        WorkflowEngine::new(InMemoryRequestStore::default(), InMemoryAssetStore::default())
    }

    async fn engine_with_asset(
        asset_id: &str,
    ) -> WorkflowEngine<InMemoryRequestStore, InMemoryAssetStore> {
        let assets = InMemoryAssetStore::default();
        assets.save(Asset::available(asset_id, "ThinkPad T14", "laptop")).await.expect("seed asset");
        WorkflowEngine::new(InMemoryRequestStore::default(), assets)
    }

    fn assert_owner_matches_resolver(request: &AssetRequest) {
        assert_eq!(request.current_owner_role, owner_for(&request.status));
    }

    #[tokio::test]
    async fn create_request_seeds_audit_trail_and_manager_ownership() {
        let engine = engine();
        let created = engine.create_request(requester(), laptop_request()).await.expect("create");

        assert_eq!(created.status, RequestStatus::Requested);
        assert_eq!(created.current_owner_role, OwnerRole::Manager);
        assert_eq!(created.audit_trail.len(), 1);
        assert_eq!(created.audit_trail[0].action, AuditAction::Created);
        assert_eq!(created.requested_by.role, OwnerRole::EndUser);
        assert_owner_matches_resolver(&created);
    }

    #[tokio::test]
    async fn created_then_approved_has_exactly_two_audit_entries() {
        let engine = engine();
        let created = engine.create_request(requester(), laptop_request()).await.expect("create");
        let approved =
            engine.manager_approve(&created.id, manager(), None).await.expect("approve");

        assert_eq!(approved.status, RequestStatus::ManagerApproved);
        assert_eq!(approved.current_owner_role, OwnerRole::ItManagement);
        let actions: Vec<_> = approved.audit_trail.iter().map(|entry| entry.action).collect();
        assert_eq!(actions, vec![AuditAction::Created, AuditAction::ManagerApproved]);
    }

    #[tokio::test]
    async fn byod_request_is_fulfilled_directly_by_it_approval() {
        let engine = engine();
        let created = engine.create_request(requester(), byod_request()).await.expect("create");
        engine.manager_approve(&created.id, manager(), None).await.expect("manager approve");
        let fulfilled = engine.it_approve(&created.id, it_lead(), None).await.expect("it approve");

        assert_eq!(fulfilled.status, RequestStatus::Fulfilled);
        assert_eq!(fulfilled.current_owner_role, OwnerRole::EndUser);
        assert_eq!(fulfilled.procurement_stage, None);
        assert_eq!(fulfilled.inventory_decision, None);
        assert_owner_matches_resolver(&fulfilled);
    }

    #[tokio::test]
    async fn out_of_stock_laptop_routes_to_procurement() {
        let engine = engine();
        let created = engine.create_request(requester(), laptop_request()).await.expect("create");
        engine.manager_approve(&created.id, manager(), None).await.expect("manager approve");
        engine.it_approve(&created.id, it_lead(), None).await.expect("it approve");
        let routed = engine
            .inventory_check_not_available(&created.id, inventory(), None)
            .await
            .expect("inventory check");

        assert_eq!(
            routed.status,
            RequestStatus::ProcurementRequired(ProcurementStage::AwaitingDecision)
        );
        assert_eq!(routed.procurement_stage, Some(ProcurementStage::AwaitingDecision));
        assert_eq!(routed.current_owner_role, OwnerRole::Procurement);
        assert_eq!(routed.inventory_decision, Some(InventoryDecision::NotAvailable));
        assert_owner_matches_resolver(&routed);
    }

    #[tokio::test]
    async fn full_procurement_path_fulfills_and_allocates_the_delivered_asset() {
        let engine = engine_with_asset("AST-1").await;
        let created = engine.create_request(requester(), laptop_request()).await.expect("create");
        let id = created.id.clone();

        let steps: Vec<AssetRequest> = vec![
            engine.manager_approve(&id, manager(), None).await.expect("manager approve"),
            engine.it_approve(&id, it_lead(), None).await.expect("it approve"),
            engine
                .inventory_check_not_available(&id, inventory(), None)
                .await
                .expect("inventory check"),
            engine
                .procurement_approve(&id, procurement(), Some("PO-1".to_owned()))
                .await
                .expect("procurement approve"),
            engine.finance_approve(&id, finance(), None).await.expect("finance approve"),
            engine
                .procurement_confirm_delivery(&id, procurement(), None)
                .await
                .expect("confirm delivery"),
            engine
                .inventory_allocate_delivered(&id, inventory(), AssetId("AST-1".to_owned()))
                .await
                .expect("allocate delivered"),
        ];
        for step in &steps {
            assert_owner_matches_resolver(step);
        }

        let last = steps.last().expect("steps");
        assert_eq!(last.status, RequestStatus::Fulfilled);
        assert_eq!(last.current_owner_role, OwnerRole::EndUser);
        assert_eq!(last.po_number.as_deref(), Some("PO-1"));
        assert_eq!(last.allocated_asset_id, Some(AssetId("AST-1".to_owned())));
        assert_eq!(last.procurement_stage, Some(ProcurementStage::Delivered));
        assert_eq!(last.audit_trail.len(), 8);

        let asset = engine
            .allocation()
            .assets()
            .get(&AssetId("AST-1".to_owned()))
            .await
            .expect("get asset")
            .expect("asset exists");
        assert_eq!(asset.assigned_to.as_deref(), Some("Maya Flores"));
        assert_eq!(asset.state, AssetState::InUse);
    }

    #[tokio::test]
    async fn audit_trail_grows_by_exactly_one_per_transition() {
        let engine = engine();
        let created = engine.create_request(requester(), laptop_request()).await.expect("create");
        assert_eq!(created.audit_trail.len(), 1);

        let approved =
            engine.manager_approve(&created.id, manager(), None).await.expect("approve");
        assert_eq!(approved.audit_trail.len(), 2);

        let routed = engine.it_approve(&created.id, it_lead(), None).await.expect("it approve");
        assert_eq!(routed.audit_trail.len(), 3);
        assert!(routed.audit_trail.windows(2).all(|pair| pair[0].timestamp <= pair[1].timestamp));
    }

    #[tokio::test]
    async fn inventory_available_binds_the_asset_and_fulfills() {
        let engine = engine_with_asset("AST-7").await;
        let created = engine.create_request(requester(), laptop_request()).await.expect("create");
        engine.manager_approve(&created.id, manager(), None).await.expect("manager approve");
        engine.it_approve(&created.id, it_lead(), None).await.expect("it approve");

        let fulfilled = engine
            .inventory_check_available(&created.id, inventory(), AssetId("AST-7".to_owned()))
            .await
            .expect("inventory available");

        assert_eq!(fulfilled.status, RequestStatus::Fulfilled);
        assert_eq!(fulfilled.inventory_decision, Some(InventoryDecision::Available));
        assert_eq!(fulfilled.allocated_asset_id, Some(AssetId("AST-7".to_owned())));
        let asset = engine
            .allocation()
            .assets()
            .get(&AssetId("AST-7".to_owned()))
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(asset.state, AssetState::InUse);
    }

    #[tokio::test]
    async fn inventory_available_with_unknown_asset_is_a_validation_error() {
        let engine = engine();
        let created = engine.create_request(requester(), laptop_request()).await.expect("create");
        engine.manager_approve(&created.id, manager(), None).await.expect("manager approve");
        engine.it_approve(&created.id, it_lead(), None).await.expect("it approve");

        let error = engine
            .inventory_check_available(&created.id, inventory(), AssetId("AST-404".to_owned()))
            .await
            .expect_err("unknown asset");
        assert!(matches!(error, WorkflowError::Validation(_)));

        let stored = engine.get_request(&created.id).await.expect("get");
        assert_eq!(stored.status, RequestStatus::ItApproved);
    }

    #[tokio::test]
    async fn manager_reject_requires_a_reason() {
        let engine = engine();
        let created = engine.create_request(requester(), laptop_request()).await.expect("create");

        let error = engine
            .manager_reject(&created.id, manager(), "   ".to_owned())
            .await
            .expect_err("blank reason");
        assert!(matches!(error, WorkflowError::Validation(_)));
    }

    #[tokio::test]
    async fn manager_reject_records_the_reason() {
        let engine = engine();
        let created = engine.create_request(requester(), laptop_request()).await.expect("create");
        let rejected = engine
            .manager_reject(&created.id, manager(), "budget".to_owned())
            .await
            .expect("reject");

        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("budget"));
        assert_eq!(rejected.current_owner_role, OwnerRole::EndUser);
        assert_eq!(
            rejected.audit_trail.last().map(|entry| entry.action),
            Some(AuditAction::ManagerRejected)
        );
    }

    /// `RequestStore` double whose writes always fail, for verifying that a
    /// persistence failure leaves the stored record untouched.
    struct WriteFailingStore {
        inner: InMemoryRequestStore,
    }

    #[async_trait]
    impl RequestStore for WriteFailingStore {
        async fn get(&self, id: &RequestId) -> Result<Option<AssetRequest>, StoreError> {
            self.inner.get(id).await
        }

        async fn create(&self, request: AssetRequest) -> Result<AssetRequest, StoreError> {
            self.inner.create(request).await
        }

        async fn update(
            &self,
            _id: &RequestId,
            _expected: &RequestStatus,
            _request: AssetRequest,
        ) -> Result<AssetRequest, StoreError> {
            Err(StoreError::Backend("disk full".to_owned()))
        }

        async fn list_by_owner_role(
            &self,
            role: OwnerRole,
        ) -> Result<Vec<AssetRequest>, StoreError> {
            self.inner.list_by_owner_role(role).await
        }
    }

    #[tokio::test]
    async fn failed_persistence_on_reject_leaves_the_stored_record_unchanged() {
        let store = WriteFailingStore { inner: InMemoryRequestStore::default() };
        let engine = WorkflowEngine::new(store, InMemoryAssetStore::default());
        let created = engine.create_request(requester(), laptop_request()).await.expect("create");

        let error = engine
            .manager_reject(&created.id, manager(), "budget".to_owned())
            .await
            .expect_err("write must fail");
        assert!(matches!(error, WorkflowError::Persistence(_)));

        let stored = engine.get_request(&created.id).await.expect("get");
        assert_eq!(stored.status, RequestStatus::Requested);
        assert_eq!(stored.rejection_reason, None);
        assert_eq!(stored.audit_trail.len(), 1);
    }

    #[tokio::test]
    async fn finance_approve_before_procurement_routing_is_invalid_state() {
        let engine = engine();
        let created = engine.create_request(requester(), laptop_request()).await.expect("create");
        engine.manager_approve(&created.id, manager(), None).await.expect("manager approve");
        engine.it_approve(&created.id, it_lead(), None).await.expect("it approve");

        let error = engine
            .finance_approve(&created.id, finance(), None)
            .await
            .expect_err("never routed to procurement");
        assert_eq!(
            error,
            WorkflowError::InvalidState {
                id: created.id.clone(),
                attempted: "finance_approve",
                current: RequestStatus::ItApproved,
            }
        );
    }

    #[tokio::test]
    async fn second_allocation_of_a_fulfilled_request_is_invalid_state() {
        let engine = engine_with_asset("AST-1").await;
        let created = engine.create_request(requester(), laptop_request()).await.expect("create");
        let id = created.id.clone();
        engine.manager_approve(&id, manager(), None).await.expect("manager approve");
        engine.it_approve(&id, it_lead(), None).await.expect("it approve");
        engine.inventory_check_not_available(&id, inventory(), None).await.expect("route");
        engine.procurement_approve(&id, procurement(), None).await.expect("po");
        engine.finance_approve(&id, finance(), None).await.expect("finance");
        engine.procurement_confirm_delivery(&id, procurement(), None).await.expect("delivery");
        engine
            .inventory_allocate_delivered(&id, inventory(), AssetId("AST-1".to_owned()))
            .await
            .expect("first allocation");

        let asset_before = engine
            .allocation()
            .assets()
            .get(&AssetId("AST-1".to_owned()))
            .await
            .expect("get")
            .expect("exists");

        let error = engine
            .inventory_allocate_delivered(&id, inventory(), AssetId("AST-1".to_owned()))
            .await
            .expect_err("already fulfilled");
        assert!(matches!(error, WorkflowError::InvalidState { .. }));

        let asset_after = engine
            .allocation()
            .assets()
            .get(&AssetId("AST-1".to_owned()))
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(asset_before, asset_after);
    }

    #[tokio::test]
    async fn procurement_approve_generates_a_po_number_when_absent() {
        let engine = engine();
        let created = engine.create_request(requester(), laptop_request()).await.expect("create");
        let id = created.id.clone();
        engine.manager_approve(&id, manager(), None).await.expect("manager approve");
        engine.it_approve(&id, it_lead(), None).await.expect("it approve");
        engine.inventory_check_not_available(&id, inventory(), None).await.expect("route");

        let approved = engine.procurement_approve(&id, procurement(), None).await.expect("po");
        let po = approved.po_number.expect("generated po");
        assert!(po.starts_with("PO-"));
        assert_eq!(approved.current_owner_role, OwnerRole::Finance);
    }

    #[tokio::test]
    async fn it_reject_is_allowed_straight_from_requested() {
        let engine = engine();
        let created = engine.create_request(requester(), laptop_request()).await.expect("create");

        let rejected = engine
            .it_reject(&created.id, it_lead(), "unsupported model".to_owned())
            .await
            .expect("it reject");
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("unsupported model"));
    }

    #[tokio::test]
    async fn procurement_reject_freezes_the_stage_outcome() {
        let engine = engine();
        let created = engine.create_request(requester(), laptop_request()).await.expect("create");
        let id = created.id.clone();
        engine.manager_approve(&id, manager(), None).await.expect("manager approve");
        engine.it_approve(&id, it_lead(), None).await.expect("it approve");
        engine.inventory_check_not_available(&id, inventory(), None).await.expect("route");

        let rejected = engine
            .procurement_reject(&id, procurement(), "vendor discontinued the model".to_owned())
            .await
            .expect("procurement reject");
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(rejected.procurement_stage, Some(ProcurementStage::Rejected));
        assert_eq!(rejected.rejection_reason.as_deref(), Some("vendor discontinued the model"));
        assert_eq!(rejected.current_owner_role, OwnerRole::EndUser);
        assert_eq!(
            rejected.audit_trail.last().map(|entry| entry.action),
            Some(AuditAction::ProcurementRejected)
        );
    }

    #[tokio::test]
    async fn finance_reject_freezes_the_stage_outcome() {
        let engine = engine();
        let created = engine.create_request(requester(), laptop_request()).await.expect("create");
        let id = created.id.clone();
        engine.manager_approve(&id, manager(), None).await.expect("manager approve");
        engine.it_approve(&id, it_lead(), None).await.expect("it approve");
        engine.inventory_check_not_available(&id, inventory(), None).await.expect("route");
        engine.procurement_approve(&id, procurement(), None).await.expect("po");

        let rejected = engine
            .finance_reject(&id, finance(), "over budget this quarter".to_owned())
            .await
            .expect("finance reject");
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(rejected.procurement_stage, Some(ProcurementStage::FinanceRejected));
        assert_eq!(rejected.current_owner_role, OwnerRole::EndUser);
    }

    #[tokio::test]
    async fn cancelled_request_refuses_further_transitions() {
        let engine = engine();
        let created = engine.create_request(requester(), laptop_request()).await.expect("create");
        let cancelled = engine
            .user_cancel(&created.id, requester(), Some("found a spare".to_owned()))
            .await
            .expect("cancel");
        assert_eq!(cancelled.status, RequestStatus::Cancelled);

        let error = engine
            .manager_approve(&created.id, manager(), None)
            .await
            .expect_err("terminal state");
        assert!(matches!(error, WorkflowError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn fulfilled_byod_request_can_be_closed_by_the_requester() {
        let engine = engine();
        let created = engine.create_request(requester(), byod_request()).await.expect("create");
        engine.manager_approve(&created.id, manager(), None).await.expect("manager approve");
        engine.it_approve(&created.id, it_lead(), None).await.expect("it approve");

        let closed = engine.user_close(&created.id, requester(), None).await.expect("close");
        assert_eq!(closed.status, RequestStatus::Closed);
        assert_eq!(closed.audit_trail.last().map(|entry| entry.action), Some(AuditAction::Closed));
    }

    #[tokio::test]
    async fn unknown_request_id_is_not_found() {
        let engine = engine();
        let error = engine
            .manager_approve(&RequestId("REQ-404".to_owned()), manager(), None)
            .await
            .expect_err("missing request");
        assert_eq!(error, WorkflowError::NotFound { id: RequestId("REQ-404".to_owned()) });
    }

    /// `RequestStore` double that simulates a concurrent writer: reads return
    /// one status, the CAS write reports another.
    struct RacingStore {
        inner: InMemoryRequestStore,
    }

    #[async_trait]
    impl RequestStore for RacingStore {
        async fn get(&self, id: &RequestId) -> Result<Option<AssetRequest>, StoreError> {
            self.inner.get(id).await
        }

        async fn create(&self, request: AssetRequest) -> Result<AssetRequest, StoreError> {
            self.inner.create(request).await
        }

        async fn update(
            &self,
            _id: &RequestId,
            _expected: &RequestStatus,
            _request: AssetRequest,
        ) -> Result<AssetRequest, StoreError> {
            Err(StoreError::Conflict { found: RequestStatus::Cancelled })
        }

        async fn list_by_owner_role(
            &self,
            role: OwnerRole,
        ) -> Result<Vec<AssetRequest>, StoreError> {
            self.inner.list_by_owner_role(role).await
        }
    }

    #[tokio::test]
    async fn stale_status_surfaces_as_a_conflict() {
        let engine =
            WorkflowEngine::new(RacingStore { inner: InMemoryRequestStore::default() }, InMemoryAssetStore::default());
        let created = engine.create_request(requester(), laptop_request()).await.expect("create");

        let error = engine
            .manager_approve(&created.id, manager(), None)
            .await
            .expect_err("concurrent writer won");
        assert_eq!(
            error,
            WorkflowError::Conflict { id: created.id, found: RequestStatus::Cancelled }
        );
    }

    #[tokio::test]
    async fn queue_for_role_lists_waiting_requests() {
        let engine = engine();
        let first = engine.create_request(requester(), laptop_request()).await.expect("create");
        engine.create_request(requester(), byod_request()).await.expect("create");
        engine.manager_approve(&first.id, manager(), None).await.expect("approve");

        let manager_queue = engine.queue_for_role(OwnerRole::Manager).await.expect("queue");
        assert_eq!(manager_queue.len(), 1);
        let it_queue = engine.queue_for_role(OwnerRole::ItManagement).await.expect("queue");
        assert_eq!(it_queue.len(), 1);
        assert_eq!(it_queue[0].id, first.id);
    }
}
