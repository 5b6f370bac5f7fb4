//! Persistence ports for the workflow engine.
//!
//! The engine is indifferent to the backing store: a remote service, the
//! SQLite stores in `assetflow-db`, or the in-memory fakes below.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::asset::{Asset, AssetId, AssetState};
use crate::domain::request::{AssetRequest, OwnerRole, RequestId, RequestStatus};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("concurrent modification detected; stored status is {found}")]
    Conflict { found: RequestStatus },
    #[error("backend failure: {0}")]
    Backend(String),
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn get(&self, id: &RequestId) -> Result<Option<AssetRequest>, StoreError>;

    /// Persists a new request. The store assigns a canonical id when the
    /// incoming id is empty (provisional/offline-created records keep theirs).
    async fn create(&self, request: AssetRequest) -> Result<AssetRequest, StoreError>;

    /// Compare-and-swap write: the update only applies while the stored
    /// status still equals `expected`, otherwise `Conflict` is returned with
    /// the status actually found.
    async fn update(
        &self,
        id: &RequestId,
        expected: &RequestStatus,
        request: AssetRequest,
    ) -> Result<AssetRequest, StoreError>;

    /// Dashboard query; read-only, not part of the state machine.
    async fn list_by_owner_role(&self, role: OwnerRole) -> Result<Vec<AssetRequest>, StoreError>;
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn get(&self, id: &AssetId) -> Result<Option<Asset>, StoreError>;

    async fn save(&self, asset: Asset) -> Result<(), StoreError>;

    /// Binds the asset to `assignee` and marks it in use. Idempotent for a
    /// repeated (asset, assignee) pair.
    async fn assign(&self, id: &AssetId, assignee: &str) -> Result<Asset, StoreError>;
}

#[derive(Default)]
pub struct InMemoryRequestStore {
    requests: RwLock<HashMap<String, AssetRequest>>,
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn get(&self, id: &RequestId) -> Result<Option<AssetRequest>, StoreError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn create(&self, mut request: AssetRequest) -> Result<AssetRequest, StoreError> {
        if request.id.0.is_empty() {
            request.id = RequestId(Uuid::new_v4().to_string());
        }
        let mut requests = self.requests.write().await;
        requests.insert(request.id.0.clone(), request.clone());
        Ok(request)
    }

    async fn update(
        &self,
        id: &RequestId,
        expected: &RequestStatus,
        request: AssetRequest,
    ) -> Result<AssetRequest, StoreError> {
        let mut requests = self.requests.write().await;
        let stored = requests.get(&id.0).ok_or(StoreError::NotFound)?;
        if &stored.status != expected {
            return Err(StoreError::Conflict { found: stored.status.clone() });
        }
        requests.insert(id.0.clone(), request.clone());
        Ok(request)
    }

    async fn list_by_owner_role(&self, role: OwnerRole) -> Result<Vec<AssetRequest>, StoreError> {
        let requests = self.requests.read().await;
        let mut matching: Vec<AssetRequest> =
            requests.values().filter(|request| request.current_owner_role == role).cloned().collect();
        matching.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(matching)
    }
}

#[derive(Default)]
pub struct InMemoryAssetStore {
    assets: RwLock<HashMap<String, Asset>>,
}

#[async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn get(&self, id: &AssetId) -> Result<Option<Asset>, StoreError> {
        let assets = self.assets.read().await;
        Ok(assets.get(&id.0).cloned())
    }

    async fn save(&self, asset: Asset) -> Result<(), StoreError> {
        let mut assets = self.assets.write().await;
        assets.insert(asset.id.0.clone(), asset);
        Ok(())
    }

    async fn assign(&self, id: &AssetId, assignee: &str) -> Result<Asset, StoreError> {
        let mut assets = self.assets.write().await;
        let asset = assets.get_mut(&id.0).ok_or(StoreError::NotFound)?;
        asset.assigned_to = Some(assignee.to_owned());
        asset.state = AssetState::InUse;
        Ok(asset.clone())
    }
}
