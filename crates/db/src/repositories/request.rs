use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use assetflow_core::audit::AuditEntry;
use assetflow_core::domain::asset::AssetId;
use assetflow_core::domain::request::{
    AssetRequest, AssetType, DeviceRegistration, InventoryDecision, OwnerRole, ProcurementStage,
    RequestId, RequestStatus, Requester,
};
use assetflow_core::store::{RequestStore, StoreError};

use super::{backend_error, decode_error};
use crate::DbPool;

pub struct SqlRequestStore {
    pool: DbPool,
}

impl SqlRequestStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn role_as_str(role: &OwnerRole) -> &'static str {
    match role {
        OwnerRole::EndUser => "end_user",
        OwnerRole::Manager => "manager",
        OwnerRole::ItManagement => "it_management",
        OwnerRole::AssetInventoryManager => "asset_inventory_manager",
        OwnerRole::Procurement => "procurement",
        OwnerRole::Finance => "finance",
    }
}

pub(crate) fn parse_role(raw: &str) -> Result<OwnerRole, StoreError> {
    match raw {
        "end_user" => Ok(OwnerRole::EndUser),
        "manager" => Ok(OwnerRole::Manager),
        "it_management" => Ok(OwnerRole::ItManagement),
        "asset_inventory_manager" => Ok(OwnerRole::AssetInventoryManager),
        "procurement" => Ok(OwnerRole::Procurement),
        "finance" => Ok(OwnerRole::Finance),
        other => Err(decode_error(format!("unknown owner role `{other}`"))),
    }
}

fn asset_type_as_str(asset_type: &AssetType) -> &'static str {
    match asset_type {
        AssetType::Laptop => "laptop",
        AssetType::Monitor => "monitor",
        AssetType::Peripheral => "peripheral",
        AssetType::Software => "software",
        AssetType::Byod => "byod",
    }
}

fn parse_asset_type(raw: &str) -> Result<AssetType, StoreError> {
    match raw {
        "laptop" => Ok(AssetType::Laptop),
        "monitor" => Ok(AssetType::Monitor),
        "peripheral" => Ok(AssetType::Peripheral),
        "software" => Ok(AssetType::Software),
        "byod" => Ok(AssetType::Byod),
        other => Err(decode_error(format!("unknown asset type `{other}`"))),
    }
}

fn stage_as_str(stage: &ProcurementStage) -> &'static str {
    match stage {
        ProcurementStage::AwaitingDecision => "awaiting_decision",
        ProcurementStage::PoCreated => "po_created",
        ProcurementStage::PoUploaded => "po_uploaded",
        ProcurementStage::FinanceApproved => "finance_approved",
        ProcurementStage::Delivered => "delivered",
        ProcurementStage::Rejected => "rejected",
        ProcurementStage::FinanceRejected => "finance_rejected",
    }
}

fn parse_stage(raw: &str) -> Result<ProcurementStage, StoreError> {
    match raw {
        "awaiting_decision" => Ok(ProcurementStage::AwaitingDecision),
        "po_created" => Ok(ProcurementStage::PoCreated),
        "po_uploaded" => Ok(ProcurementStage::PoUploaded),
        "finance_approved" => Ok(ProcurementStage::FinanceApproved),
        "delivered" => Ok(ProcurementStage::Delivered),
        "rejected" => Ok(ProcurementStage::Rejected),
        "finance_rejected" => Ok(ProcurementStage::FinanceRejected),
        other => Err(decode_error(format!("unknown procurement stage `{other}`"))),
    }
}

/// Top-level status column value. The live procurement sub-stage rides in the
/// `procurement_stage` column, which doubles as the frozen history trail.
fn status_as_str(status: &RequestStatus) -> &'static str {
    match status {
        RequestStatus::Requested => "requested",
        RequestStatus::ManagerApproved => "manager_approved",
        RequestStatus::ItApproved => "it_approved",
        RequestStatus::ProcurementRequired(_) => "procurement_required",
        RequestStatus::Fulfilled => "fulfilled",
        RequestStatus::Rejected => "rejected",
        RequestStatus::Closed => "closed",
        RequestStatus::Cancelled => "cancelled",
    }
}

fn parse_status(raw: &str, stage: Option<&str>) -> Result<RequestStatus, StoreError> {
    match raw {
        "requested" => Ok(RequestStatus::Requested),
        "manager_approved" => Ok(RequestStatus::ManagerApproved),
        "it_approved" => Ok(RequestStatus::ItApproved),
        "procurement_required" => {
            let stage = stage.ok_or_else(|| {
                decode_error("status is procurement_required but procurement_stage is null")
            })?;
            Ok(RequestStatus::ProcurementRequired(parse_stage(stage)?))
        }
        "fulfilled" => Ok(RequestStatus::Fulfilled),
        "rejected" => Ok(RequestStatus::Rejected),
        "closed" => Ok(RequestStatus::Closed),
        "cancelled" => Ok(RequestStatus::Cancelled),
        other => Err(decode_error(format!("unknown status `{other}`"))),
    }
}

fn inventory_decision_as_str(decision: &InventoryDecision) -> &'static str {
    match decision {
        InventoryDecision::Available => "available",
        InventoryDecision::NotAvailable => "not_available",
    }
}

fn parse_inventory_decision(raw: &str) -> Result<InventoryDecision, StoreError> {
    match raw {
        "available" => Ok(InventoryDecision::Available),
        "not_available" => Ok(InventoryDecision::NotAvailable),
        other => Err(decode_error(format!("unknown inventory decision `{other}`"))),
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| decode_error(format!("bad timestamp `{raw}`: {error}")))
}

fn get_text(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<String, StoreError> {
    row.try_get(column).map_err(|error| decode_error(error.to_string()))
}

fn get_opt_text(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<Option<String>, StoreError> {
    row.try_get(column).map_err(|error| decode_error(error.to_string()))
}

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<AssetRequest, StoreError> {
    let stage_raw = get_opt_text(row, "procurement_stage")?;
    let status = parse_status(&get_text(row, "status")?, stage_raw.as_deref())?;

    let device_json = get_opt_text(row, "device_json")?;
    let device: Option<DeviceRegistration> = match device_json {
        Some(raw) => {
            Some(serde_json::from_str(&raw).map_err(|error| decode_error(error.to_string()))?)
        }
        None => None,
    };

    let audit_trail: Vec<AuditEntry> =
        serde_json::from_str(&get_text(row, "audit_trail_json")?)
            .map_err(|error| decode_error(error.to_string()))?;

    Ok(AssetRequest {
        id: RequestId(get_text(row, "id")?),
        asset_type: parse_asset_type(&get_text(row, "asset_type")?)?,
        justification: get_text(row, "justification")?,
        requested_by: Requester {
            id: get_text(row, "requested_by_id")?,
            name: get_text(row, "requested_by_name")?,
            role: parse_role(&get_text(row, "requested_by_role")?)?,
        },
        device,
        status,
        current_owner_role: parse_role(&get_text(row, "current_owner_role")?)?,
        inventory_decision: get_opt_text(row, "inventory_decision")?
            .as_deref()
            .map(parse_inventory_decision)
            .transpose()?,
        procurement_stage: stage_raw.as_deref().map(parse_stage).transpose()?,
        po_number: get_opt_text(row, "po_number")?,
        allocated_asset_id: get_opt_text(row, "allocated_asset_id")?.map(AssetId),
        rejection_reason: get_opt_text(row, "rejection_reason")?,
        audit_trail,
        created_at: parse_timestamp(&get_text(row, "created_at")?)?,
        updated_at: parse_timestamp(&get_text(row, "updated_at")?)?,
    })
}

const SELECT_COLUMNS: &str = "id, asset_type, justification, requested_by_id, requested_by_name, \
     requested_by_role, device_json, status, current_owner_role, inventory_decision, \
     procurement_stage, po_number, allocated_asset_id, rejection_reason, audit_trail_json, \
     created_at, updated_at";

struct EncodedRequest {
    device_json: Option<String>,
    audit_trail_json: String,
}

fn encode_request(request: &AssetRequest) -> Result<EncodedRequest, StoreError> {
    let device_json = request
        .device
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|error| decode_error(error.to_string()))?;
    let audit_trail_json = serde_json::to_string(&request.audit_trail)
        .map_err(|error| decode_error(error.to_string()))?;
    Ok(EncodedRequest { device_json, audit_trail_json })
}

#[async_trait::async_trait]
impl RequestStore for SqlRequestStore {
    async fn get(&self, id: &RequestId) -> Result<Option<AssetRequest>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM asset_request WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_error)?;

        match row {
            Some(ref r) => Ok(Some(row_to_request(r)?)),
            None => Ok(None),
        }
    }

    async fn create(&self, mut request: AssetRequest) -> Result<AssetRequest, StoreError> {
        if request.id.0.is_empty() {
            request.id = RequestId(Uuid::new_v4().to_string());
        }
        let encoded = encode_request(&request)?;

        sqlx::query(
            "INSERT INTO asset_request (id, asset_type, justification, requested_by_id,
                                        requested_by_name, requested_by_role, device_json, status,
                                        current_owner_role, inventory_decision, procurement_stage,
                                        po_number, allocated_asset_id, rejection_reason,
                                        audit_trail_json, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(asset_type_as_str(&request.asset_type))
        .bind(&request.justification)
        .bind(&request.requested_by.id)
        .bind(&request.requested_by.name)
        .bind(role_as_str(&request.requested_by.role))
        .bind(&encoded.device_json)
        .bind(status_as_str(&request.status))
        .bind(role_as_str(&request.current_owner_role))
        .bind(request.inventory_decision.as_ref().map(inventory_decision_as_str))
        .bind(request.procurement_stage.as_ref().map(stage_as_str))
        .bind(&request.po_number)
        .bind(request.allocated_asset_id.as_ref().map(|asset_id| asset_id.0.clone()))
        .bind(&request.rejection_reason)
        .bind(&encoded.audit_trail_json)
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;

        Ok(request)
    }

    async fn update(
        &self,
        id: &RequestId,
        expected: &RequestStatus,
        request: AssetRequest,
    ) -> Result<AssetRequest, StoreError> {
        let encoded = encode_request(&request)?;

        // CAS guard: the status column, plus the live sub-stage while the
        // request sits in procurement.
        let guard = match expected {
            RequestStatus::ProcurementRequired(_) => " AND procurement_stage = ?",
            _ => "",
        };
        let sql = format!(
            "UPDATE asset_request SET
                 status = ?, current_owner_role = ?, inventory_decision = ?,
                 procurement_stage = ?, po_number = ?, allocated_asset_id = ?,
                 rejection_reason = ?, audit_trail_json = ?, updated_at = ?
             WHERE id = ? AND status = ?{guard}"
        );

        let mut query = sqlx::query(&sql)
            .bind(status_as_str(&request.status))
            .bind(role_as_str(&request.current_owner_role))
            .bind(request.inventory_decision.as_ref().map(inventory_decision_as_str))
            .bind(request.procurement_stage.as_ref().map(stage_as_str))
            .bind(&request.po_number)
            .bind(request.allocated_asset_id.as_ref().map(|asset_id| asset_id.0.clone()))
            .bind(&request.rejection_reason)
            .bind(&encoded.audit_trail_json)
            .bind(request.updated_at.to_rfc3339())
            .bind(&id.0)
            .bind(status_as_str(expected));
        if let RequestStatus::ProcurementRequired(stage) = expected {
            query = query.bind(stage_as_str(stage));
        }

        let result = query.execute(&self.pool).await.map_err(backend_error)?;
        if result.rows_affected() == 0 {
            let found = sqlx::query("SELECT status, procurement_stage FROM asset_request WHERE id = ?")
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend_error)?;
            return match found {
                None => Err(StoreError::NotFound),
                Some(row) => {
                    let stage = get_opt_text(&row, "procurement_stage")?;
                    let found = parse_status(&get_text(&row, "status")?, stage.as_deref())?;
                    Err(StoreError::Conflict { found })
                }
            };
        }

        Ok(request)
    }

    async fn list_by_owner_role(&self, role: OwnerRole) -> Result<Vec<AssetRequest>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM asset_request WHERE current_owner_role = ? ORDER BY created_at"
        ))
        .bind(role_as_str(&role))
        .fetch_all(&self.pool)
        .await
        .map_err(backend_error)?;

        rows.iter().map(row_to_request).collect()
    }
}
