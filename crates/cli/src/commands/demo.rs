use crate::commands::{build_runtime, CommandResult};
use assetflow_core::domain::asset::{Asset, AssetId};
use assetflow_core::domain::request::{Actor, AssetType, RequestStatus};
use assetflow_core::errors::WorkflowError;
use assetflow_core::store::{AssetStore, InMemoryAssetStore, InMemoryRequestStore};
use assetflow_core::workflow::{NewRequest, WorkflowEngine};

/// Walks one laptop request through the long path: out of stock at inventory,
/// procured, financed, delivered, allocated, and closed by the requester.
/// Runs entirely against in-memory stores.
pub fn run() -> CommandResult {
    let runtime = match build_runtime("demo") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    match runtime.block_on(walkthrough()) {
        Ok(lines) => CommandResult::success(
            "demo",
            format!("procurement walkthrough completed:\n{}", lines.join("\n")),
        ),
        Err(error) => {
            CommandResult::failure("demo", "workflow", format!("walkthrough failed: {error}"), 5)
        }
    }
}

async fn walkthrough() -> Result<Vec<String>, WorkflowError> {
    let engine =
        WorkflowEngine::new(InMemoryRequestStore::default(), InMemoryAssetStore::default());

    let delivered_asset = Asset::available("AST-DEMO-001", "ThinkPad T14 Gen 4", "laptop");
    engine
        .allocation()
        .assets()
        .save(delivered_asset)
        .await
        .map_err(|error| WorkflowError::Persistence(error.to_string()))?;

    let requester = Actor::new("u-demo", "Dana Demo");
    let manager = Actor::new("u-mgr", "Morgan Lee");
    let it = Actor::new("u-it", "Iris Tan");
    let inventory = Actor::new("u-inv", "Priya Shah");
    let procurement = Actor::new("u-proc", "Pat Ortiz");
    let finance = Actor::new("u-fin", "Femi Ade");

    let mut lines = Vec::new();
    let request = engine
        .create_request(
            requester.clone(),
            NewRequest {
                asset_type: AssetType::Laptop,
                justification: "replacement for failed unit".to_owned(),
                device: None,
            },
        )
        .await?;
    lines.push(step("created", &request.status));

    let id = request.id.clone();
    let request = engine.manager_approve(&id, manager, None).await?;
    lines.push(step("manager approved", &request.status));

    let request = engine.it_approve(&id, it, None).await?;
    lines.push(step("it approved", &request.status));

    let request = engine
        .inventory_check_not_available(
            &id,
            inventory.clone(),
            Some("none on the shelf".to_owned()),
        )
        .await?;
    lines.push(step("inventory out of stock", &request.status));

    let request = engine.procurement_approve(&id, procurement.clone(), None).await?;
    let po_number = request.po_number.clone().unwrap_or_default();
    lines.push(step("purchase order raised", &request.status));

    let request = engine.finance_approve(&id, finance, None).await?;
    lines.push(step("finance approved", &request.status));

    let request = engine.procurement_confirm_delivery(&id, procurement, None).await?;
    lines.push(step("delivery confirmed", &request.status));

    let request = engine
        .inventory_allocate_delivered(&id, inventory, AssetId("AST-DEMO-001".to_owned()))
        .await?;
    lines.push(step("asset allocated", &request.status));

    let request = engine.user_close(&id, requester, None).await?;
    lines.push(step("closed by requester", &request.status));

    debug_assert_eq!(request.status, RequestStatus::Closed);
    lines.push(format!("  audit entries: {}, po: {po_number}", request.audit_trail.len()));
    Ok(lines)
}

fn step(label: &str, status: &RequestStatus) -> String {
    format!("  - {label}: {status}")
}
