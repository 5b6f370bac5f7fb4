use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetId(pub String);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetState {
    Available,
    InUse,
    Maintenance,
    Retired,
}

/// Inventory record owned by the asset collection collaborator. The workflow
/// core only ever reads it and binds it to a fulfilled request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub name: String,
    pub asset_type: String,
    pub state: AssetState,
    pub assigned_to: Option<String>,
}

impl Asset {
    pub fn available(id: impl Into<String>, name: impl Into<String>, asset_type: impl Into<String>) -> Self {
        Self {
            id: AssetId(id.into()),
            name: name.into(),
            asset_type: asset_type.into(),
            state: AssetState::Available,
            assigned_to: None,
        }
    }
}
