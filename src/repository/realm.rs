//! `Realm` data model and the `RealmRepository` contract (§3, §4.6).
//!
//! Realms and `within` edges may not cycle (§3). The in-memory
//! implementation enforces this on `add_within_edge` by walking up the
//! existing `within` chain before linking.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RealmType {
    Forest,
    MountainRange,
    Coastline,
    Wetland,
    Urban,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RealmScope {
    Regional,
    Macro,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Realm {
    pub id: Uuid,
    pub name: String,
    pub realm_type: RealmType,
    pub scope: RealmScope,
    pub narrative_tags: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RealmRepositoryError {
    #[error("realm not found: {0}")]
    NotFound(Uuid),
    #[error("linking location {location} within realm {realm} would create a cycle")]
    CycleDetected { location: Uuid, realm: Uuid },
}

pub type Result<T> = std::result::Result<T, RealmRepositoryError>;

#[async_trait]
pub trait RealmRepository: Send + Sync {
    async fn upsert(&self, realm: Realm) -> Result<()>;
    async fn add_within_edge(&self, location_id: Uuid, realm_id: Uuid) -> Result<()>;
    async fn list_realms_for(&self, location_id: Uuid) -> Result<Vec<Realm>>;
}

#[derive(Clone)]
pub struct InMemoryRealmRepository {
    realms: Arc<RwLock<HashMap<Uuid, Realm>>>,
    /// location id -> set of realm ids it is directly `within`.
    within_edges: Arc<RwLock<HashMap<Uuid, HashSet<Uuid>>>>,
}

impl InMemoryRealmRepository {
    pub fn new() -> Self {
        Self {
            realms: Arc::new(RwLock::new(HashMap::new())),
            within_edges: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryRealmRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RealmRepository for InMemoryRealmRepository {
    async fn upsert(&self, realm: Realm) -> Result<()> {
        self.realms.write().await.insert(realm.id, realm);
        Ok(())
    }

    async fn add_within_edge(&self, location_id: Uuid, realm_id: Uuid) -> Result<()> {
        if !self.realms.read().await.contains_key(&realm_id) {
            return Err(RealmRepositoryError::NotFound(realm_id));
        }

        // A location's own id can also name a realm-like scope in nested
        // hierarchies (macro realms containing regional realms); guard
        // against `location_id` already reachable from `realm_id` via
        // existing edges, which would close a cycle.
        let edges = self.within_edges.read().await;
        let mut stack = vec![realm_id];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == location_id {
                return Err(RealmRepositoryError::CycleDetected {
                    location: location_id,
                    realm: realm_id,
                });
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(next) = edges.get(&current) {
                stack.extend(next.iter().copied());
            }
        }
        drop(edges);

        self.within_edges
            .write()
            .await
            .entry(location_id)
            .or_default()
            .insert(realm_id);
        Ok(())
    }

    async fn list_realms_for(&self, location_id: Uuid) -> Result<Vec<Realm>> {
        let edges = self.within_edges.read().await;
        let realms = self.realms.read().await;
        Ok(edges
            .get(&location_id)
            .into_iter()
            .flatten()
            .filter_map(|realm_id| realms.get(realm_id).cloned())
            .collect())
    }
}
