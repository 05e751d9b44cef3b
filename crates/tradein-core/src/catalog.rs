//! ============================================================================
//! Target Catalog - Devices the user can swap towards
//! ============================================================================

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::{ApiError, CatalogApi};
use crate::types::{de_money, de_string_id, SwapError, TargetSelection};

/// A product offered as a swap target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetDevice {
    #[serde(deserialize_with = "de_string_id")]
    pub id: String,
    pub name: String,
    #[serde(deserialize_with = "de_money")]
    pub price: f64,
    #[serde(default)]
    pub picture: Option<String>,
}

impl TargetDevice {
    pub fn selection(&self) -> TargetSelection {
        TargetSelection {
            id: self.id.clone(),
            price: self.price,
        }
    }
}

/// Snapshot of the target catalog
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    items: Vec<TargetDevice>,
}

impl Catalog {
    pub fn new(items: Vec<TargetDevice>) -> Self {
        Self { items }
    }

    /// Fetch up to `limit` target devices
    pub async fn fetch(api: &dyn CatalogApi, limit: usize) -> Result<Self, ApiError> {
        let mut items = api.list_target_devices(limit).await?;
        items.truncate(limit);
        info!("Loaded {} target device(s)", items.len());
        Ok(Self { items })
    }

    pub fn items(&self) -> &[TargetDevice] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&TargetDevice> {
        self.items.iter().find(|d| d.id == id)
    }

    /// Selection for the catalog item with `id`
    pub fn select(&self, id: &str) -> Result<TargetSelection, SwapError> {
        self.find(id)
            .map(TargetDevice::selection)
            .ok_or_else(|| SwapError::TargetNotFound(id.to_string()))
    }
}
