use sqlx::Row;

use assetflow_core::domain::asset::{Asset, AssetId, AssetState};
use assetflow_core::store::{AssetStore, StoreError};

use super::{backend_error, decode_error};
use crate::DbPool;

pub struct SqlAssetStore {
    pool: DbPool,
}

impl SqlAssetStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn state_as_str(state: &AssetState) -> &'static str {
    match state {
        AssetState::Available => "available",
        AssetState::InUse => "in_use",
        AssetState::Maintenance => "maintenance",
        AssetState::Retired => "retired",
    }
}

fn parse_state(raw: &str) -> Result<AssetState, StoreError> {
    match raw {
        "available" => Ok(AssetState::Available),
        "in_use" => Ok(AssetState::InUse),
        "maintenance" => Ok(AssetState::Maintenance),
        "retired" => Ok(AssetState::Retired),
        other => Err(decode_error(format!("unknown asset state `{other}`"))),
    }
}

fn row_to_asset(row: &sqlx::sqlite::SqliteRow) -> Result<Asset, StoreError> {
    let state: String = row.try_get("state").map_err(|error| decode_error(error.to_string()))?;
    Ok(Asset {
        id: AssetId(row.try_get("id").map_err(|error| decode_error(error.to_string()))?),
        name: row.try_get("name").map_err(|error| decode_error(error.to_string()))?,
        asset_type: row
            .try_get("asset_type")
            .map_err(|error| decode_error(error.to_string()))?,
        state: parse_state(&state)?,
        assigned_to: row
            .try_get("assigned_to")
            .map_err(|error| decode_error(error.to_string()))?,
    })
}

#[async_trait::async_trait]
impl AssetStore for SqlAssetStore {
    async fn get(&self, id: &AssetId) -> Result<Option<Asset>, StoreError> {
        let row = sqlx::query("SELECT id, name, asset_type, state, assigned_to FROM asset WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_error)?;

        match row {
            Some(ref r) => Ok(Some(row_to_asset(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, asset: Asset) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO asset (id, name, asset_type, state, assigned_to)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 asset_type = excluded.asset_type,
                 state = excluded.state,
                 assigned_to = excluded.assigned_to",
        )
        .bind(&asset.id.0)
        .bind(&asset.name)
        .bind(&asset.asset_type)
        .bind(state_as_str(&asset.state))
        .bind(&asset.assigned_to)
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;

        Ok(())
    }

    async fn assign(&self, id: &AssetId, assignee: &str) -> Result<Asset, StoreError> {
        let result = sqlx::query("UPDATE asset SET assigned_to = ?, state = 'in_use' WHERE id = ?")
            .bind(assignee)
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(backend_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        self.get(id).await?.ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use assetflow_core::domain::asset::{Asset, AssetId, AssetState};
    use assetflow_core::store::{AssetStore, StoreError};

    use crate::connect_with_settings;
    use crate::migrations::run_pending;

    use super::SqlAssetStore;

    async fn store() -> SqlAssetStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        SqlAssetStore::new(pool)
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let store = store().await;
        let asset = Asset::available("AST-1", "ThinkPad T14", "laptop");
        store.save(asset.clone()).await.expect("save");

        let found = store.get(&asset.id).await.expect("get");
        assert_eq!(found, Some(asset));
    }

    #[tokio::test]
    async fn save_upserts_an_existing_record() {
        let store = store().await;
        store.save(Asset::available("AST-1", "ThinkPad T14", "laptop")).await.expect("save");

        let mut updated = Asset::available("AST-1", "ThinkPad T14 Gen 4", "laptop");
        updated.state = AssetState::Maintenance;
        store.save(updated.clone()).await.expect("upsert");

        let found = store.get(&updated.id).await.expect("get").expect("exists");
        assert_eq!(found.name, "ThinkPad T14 Gen 4");
        assert_eq!(found.state, AssetState::Maintenance);
    }

    #[tokio::test]
    async fn assign_marks_the_asset_in_use() {
        let store = store().await;
        store.save(Asset::available("AST-1", "ThinkPad T14", "laptop")).await.expect("save");

        let assigned = store
            .assign(&AssetId("AST-1".to_owned()), "Maya Flores")
            .await
            .expect("assign");
        assert_eq!(assigned.state, AssetState::InUse);
        assert_eq!(assigned.assigned_to.as_deref(), Some("Maya Flores"));

        let again = store
            .assign(&AssetId("AST-1".to_owned()), "Maya Flores")
            .await
            .expect("assign again");
        assert_eq!(again, assigned);
    }

    #[tokio::test]
    async fn assign_unknown_asset_is_not_found() {
        let store = store().await;
        let error = store
            .assign(&AssetId("AST-missing".to_owned()), "Maya Flores")
            .await
            .expect_err("missing asset");
        assert_eq!(error, StoreError::NotFound);
    }
}
