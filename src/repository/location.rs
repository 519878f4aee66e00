//! `Location`/`Exit` data model and the `LocationRepository` contract (§3,
//! §4.6).
//!
//! Grounded on the teacher's storage traits (`src/storage/mod.rs`
//! `EventStore`/`SnapshotStore`) for shape — an `async_trait` contract with
//! an in-memory implementation behind `tokio::sync::RwLock` (mirroring
//! `src/storage/mock`) — generalized to the world-graph operations this
//! crate's scope needs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::direction::Direction;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exit {
    pub direction: Direction,
    pub to: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub travel_duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExitAvailability {
    /// direction -> hint describing what's expected to eventually be there.
    pub pending: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terrain: Option<String>,
    pub tags: HashSet<String>,
    pub exits: Vec<Exit>,
    pub exit_availability: ExitAvailability,
    pub version: u64,
}

impl Location {
    pub fn new_stub(id: Uuid, name: impl Into<String>, description: impl Into<String>, terrain: impl Into<String>) -> Self {
        let mut tags = HashSet::new();
        tags.insert("structure:stub".to_string());
        Self {
            id,
            name: name.into(),
            description: description.into(),
            terrain: Some(terrain.into()),
            tags,
            exits: Vec::new(),
            exit_availability: ExitAvailability::default(),
            version: 1,
        }
    }

    pub fn exit_toward(&self, direction: Direction) -> Option<&Exit> {
        self.exits.iter().find(|e| e.direction == direction)
    }

    pub fn has_exit_toward(&self, direction: Direction) -> bool {
        self.exit_toward(direction).is_some()
    }

    pub fn is_frontier_boundary(&self) -> bool {
        self.tags.contains("frontier:boundary")
    }

    pub fn realm_tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().filter(|t| t.starts_with("realm:")).map(|s| s.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LocationRepositoryError {
    #[error("location not found: {0}")]
    NotFound(Uuid),
    #[error("direction {direction} already occupied at location {location}")]
    DirectionConflict { location: Uuid, direction: Direction },
}

pub type Result<T> = std::result::Result<T, LocationRepositoryError>;

/// Repository contract consumed by the handlers (§4.6). `ensure_exit_bidirectional`
/// must be transactional with respect to the direction-uniqueness invariant
/// (§3): a concurrent caller racing on the same (location, direction) pair
/// must never observe two exits sharing a direction.
#[async_trait]
pub trait LocationRepository: Send + Sync {
    async fn upsert(&self, location: Location) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Location>>;
    async fn list_all(&self) -> Result<Vec<Location>>;

    /// Ensure a bidirectional exit exists between `from` and `to` in
    /// `direction` (and the reciprocal `opposite(direction)` on `to`). A
    /// no-op on the side(s) that already have the exit (§4.5).
    async fn ensure_exit_bidirectional(
        &self,
        from: Uuid,
        direction: Direction,
        to: Uuid,
        reciprocal: bool,
    ) -> Result<()>;

    async fn set_exit_travel_duration(&self, from: Uuid, direction: Direction, travel_duration_ms: u64) -> Result<()>;
}

/// In-memory implementation, the default backend for the `channel`/test
/// profile (mirrors `src/storage/mock`).
#[derive(Clone)]
pub struct InMemoryLocationRepository {
    locations: Arc<RwLock<HashMap<Uuid, Location>>>,
}

impl InMemoryLocationRepository {
    pub fn new() -> Self {
        Self {
            locations: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryLocationRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocationRepository for InMemoryLocationRepository {
    async fn upsert(&self, location: Location) -> Result<()> {
        self.locations.write().await.insert(location.id, location);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Location>> {
        Ok(self.locations.read().await.get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Location>> {
        Ok(self.locations.read().await.values().cloned().collect())
    }

    async fn ensure_exit_bidirectional(
        &self,
        from: Uuid,
        direction: Direction,
        to: Uuid,
        reciprocal: bool,
    ) -> Result<()> {
        // Single writer-lock scope covers both sides: the invariant this
        // method exists to uphold (direction uniqueness under concurrent
        // workers, §5) only holds if both mutations are atomic together.
        let mut locations = self.locations.write().await;

        {
            let from_loc = locations.get_mut(&from).ok_or(LocationRepositoryError::NotFound(from))?;
            if from_loc.exit_toward(direction).is_none() {
                from_loc.exits.push(Exit {
                    direction,
                    to,
                    travel_duration_ms: None,
                });
                from_loc.version += 1;
            }
        }

        if reciprocal {
            let opposite = direction.opposite();
            let to_loc = locations.get_mut(&to).ok_or(LocationRepositoryError::NotFound(to))?;
            if to_loc.exit_toward(opposite).is_none() {
                to_loc.exits.push(Exit {
                    direction: opposite,
                    to: from,
                    travel_duration_ms: None,
                });
                to_loc.version += 1;
            }
        }

        Ok(())
    }

    async fn set_exit_travel_duration(&self, from: Uuid, direction: Direction, travel_duration_ms: u64) -> Result<()> {
        let mut locations = self.locations.write().await;
        let loc = locations.get_mut(&from).ok_or(LocationRepositoryError::NotFound(from))?;
        if let Some(exit) = loc.exits.iter_mut().find(|e| e.direction == direction) {
            exit.travel_duration_ms = Some(travel_duration_ms);
            loc.version += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_location(id: Uuid) -> Location {
        Location {
            id,
            name: "Test".to_string(),
            description: "A test location.".to_string(),
            terrain: None,
            tags: HashSet::new(),
            exits: Vec::new(),
            exit_availability: ExitAvailability::default(),
            version: 1,
        }
    }

    #[tokio::test]
    async fn ensure_exit_bidirectional_creates_both_sides() {
        let repo = InMemoryLocationRepository::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        repo.upsert(new_location(a)).await.unwrap();
        repo.upsert(new_location(b)).await.unwrap();

        repo.ensure_exit_bidirectional(a, Direction::North, b, true).await.unwrap();

        let loc_a = repo.get(a).await.unwrap().unwrap();
        let loc_b = repo.get(b).await.unwrap().unwrap();
        assert!(loc_a.has_exit_toward(Direction::North));
        assert!(loc_b.has_exit_toward(Direction::South));
        assert_eq!(loc_a.exit_toward(Direction::North).unwrap().to, b);
        assert_eq!(loc_b.exit_toward(Direction::South).unwrap().to, a);
    }

    #[tokio::test]
    async fn ensure_exit_bidirectional_is_idempotent() {
        let repo = InMemoryLocationRepository::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        repo.upsert(new_location(a)).await.unwrap();
        repo.upsert(new_location(b)).await.unwrap();

        repo.ensure_exit_bidirectional(a, Direction::North, b, true).await.unwrap();
        repo.ensure_exit_bidirectional(a, Direction::North, b, true).await.unwrap();

        let loc_a = repo.get(a).await.unwrap().unwrap();
        assert_eq!(loc_a.exits.len(), 1);
    }

    #[tokio::test]
    async fn set_exit_travel_duration_updates_existing_exit() {
        let repo = InMemoryLocationRepository::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        repo.upsert(new_location(a)).await.unwrap();
        repo.upsert(new_location(b)).await.unwrap();
        repo.ensure_exit_bidirectional(a, Direction::North, b, true).await.unwrap();

        repo.set_exit_travel_duration(a, Direction::North, 300_000).await.unwrap();

        let loc_a = repo.get(a).await.unwrap().unwrap();
        assert_eq!(loc_a.exit_toward(Direction::North).unwrap().travel_duration_ms, Some(300_000));
    }
}
