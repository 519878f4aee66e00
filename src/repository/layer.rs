//! `DescriptionLayer` data model and the `LayerRepository` contract (§3,
//! §4.6).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    Base,
    Dynamic,
    Ambient,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptionLayer {
    pub id: Uuid,
    pub location_id: Uuid,
    pub layer_type: LayerType,
    pub content: String,
    pub priority: i32,
    pub authored_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum LayerRepositoryError {
    #[error("storage failure: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, LayerRepositoryError>;

/// Only the base-layer write this crate's scope actually performs is used
/// by the batch-generate handler; `getActiveLayerForLocation` is part of
/// the contract for the description composer, out of scope beyond this
/// signature (§1: "description-composer layering details beyond the base
/// layer contract... out of scope").
#[async_trait]
pub trait LayerRepository: Send + Sync {
    async fn add_layer(&self, layer: DescriptionLayer) -> Result<()>;
    async fn get_active_layer_for_location(
        &self,
        location_id: Uuid,
        layer_type: LayerType,
        expansion_depth: u32,
    ) -> Result<Option<DescriptionLayer>>;
}

#[derive(Clone)]
pub struct InMemoryLayerRepository {
    layers: Arc<RwLock<Vec<DescriptionLayer>>>,
}

impl InMemoryLayerRepository {
    pub fn new() -> Self {
        Self {
            layers: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryLayerRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LayerRepository for InMemoryLayerRepository {
    async fn add_layer(&self, layer: DescriptionLayer) -> Result<()> {
        self.layers.write().await.push(layer);
        Ok(())
    }

    async fn get_active_layer_for_location(
        &self,
        location_id: Uuid,
        layer_type: LayerType,
        _expansion_depth: u32,
    ) -> Result<Option<DescriptionLayer>> {
        let layers = self.layers.read().await;
        let active = layers
            .iter()
            .filter(|l| l.location_id == location_id && l.layer_type == layer_type)
            .max_by_key(|l| l.priority)
            .cloned();
        Ok(active)
    }
}
