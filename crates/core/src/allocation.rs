use crate::domain::asset::{Asset, AssetId};
use crate::store::{AssetStore, StoreError};

/// Side-effect hook invoked when a request reaches fulfillment: binds the
/// allocated asset to the requester and marks it in use.
pub struct AllocationBridge<A> {
    assets: A,
}

impl<A> AllocationBridge<A>
where
    A: AssetStore,
{
    pub fn new(assets: A) -> Self {
        Self { assets }
    }

    pub fn assets(&self) -> &A {
        &self.assets
    }

    /// Fails with `NotFound` if the asset is unknown. Safe to call twice with
    /// the same (asset, assignee) pair.
    pub async fn allocate(&self, asset_id: &AssetId, assignee: &str) -> Result<Asset, StoreError> {
        let asset = self.assets.assign(asset_id, assignee).await?;
        tracing::info!(
            event_name = "workflow.asset_allocated",
            asset_id = %asset.id,
            assignee,
            "asset bound to fulfilled request"
        );
        Ok(asset)
    }

    pub async fn exists(&self, asset_id: &AssetId) -> Result<bool, StoreError> {
        Ok(self.assets.get(asset_id).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::AllocationBridge;
    use crate::domain::asset::{Asset, AssetId, AssetState};
    use crate::store::{AssetStore, InMemoryAssetStore, StoreError};

    #[tokio::test]
    async fn allocate_marks_asset_in_use() {
        let store = InMemoryAssetStore::default();
        store.save(Asset::available("AST-9", "Dell U2723", "monitor")).await.expect("save");
        let bridge = AllocationBridge::new(store);

        let asset =
            bridge.allocate(&AssetId("AST-9".to_owned()), "Ravi Nair").await.expect("allocate");

        assert_eq!(asset.state, AssetState::InUse);
        assert_eq!(asset.assigned_to.as_deref(), Some("Ravi Nair"));
        assert_eq!(
            bridge.assets().get(&AssetId("AST-9".to_owned())).await.expect("get"),
            Some(asset)
        );
    }

    #[tokio::test]
    async fn allocate_unknown_asset_fails() {
        let bridge = AllocationBridge::new(InMemoryAssetStore::default());
        let error = bridge
            .allocate(&AssetId("AST-404".to_owned()), "Ravi Nair")
            .await
            .expect_err("unknown asset");
        assert_eq!(error, StoreError::NotFound);
    }
}
