//! The batch-generate handler: the core algorithm (§4.4).
//!
//! Phase 1 reuses existing exits on root. Phase 2 budget-searches the
//! existing graph for geometrically- and realm-appropriate reconnection
//! targets. Anything left over becomes a stub, with its bidirectional exit
//! deferred to a `World.Exit.Create` event so the stub allocation and the
//! exit wiring can be retried independently.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::exit_create::ExitCreatePayload;
use super::{Handler, HandlerContext, HandlerError};
use crate::direction::Direction;
use crate::envelope::{emit, Actor, ActorKind, EmitRequest, EventType};
use crate::geometry::budgeted_reachable;
use crate::publisher::Publisher;
use crate::repository::layer::{DescriptionLayer, LayerRepository, LayerType};
use crate::repository::location::LocationRepository;
use crate::telemetry::Telemetry;
use crate::terrain::{Terrain, DEFAULT_TRAVEL_DURATION_MS};

use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchGeneratePayload {
    pub root_location_id: Uuid,
    pub terrain: String,
    pub arrival_direction: Direction,
    pub expansion_depth: u32,
    pub batch_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_hints: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub travel_duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_key: Option<String>,
}

/// The opaque AI description generator (§1 Non-goals: "No AI-generation
/// internals — the AI description generator is an opaque collaborator
/// called via one operation with a budget").
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub terrain: String,
    pub arrival_direction: Direction,
}

#[derive(Debug, Clone, Default)]
pub struct GenerationResult {
    pub name: Option<String>,
    pub flavor_text: Option<String>,
    pub cost: u64,
}

#[async_trait]
pub trait DescriptionGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest, budget: u64) -> GenerationResult;
}

/// Fallback generator used when no AI backend is configured: produces the
/// placeholder name/description the spec names explicitly (§4.4.4), with
/// zero AI spend.
pub struct PlaceholderDescriptionGenerator;

#[async_trait]
impl DescriptionGenerator for PlaceholderDescriptionGenerator {
    async fn generate(&self, _request: GenerationRequest, _budget: u64) -> GenerationResult {
        GenerationResult::default()
    }
}

/// Summary of one BatchGenerate run (§4.4, §8's quantified invariants).
#[derive(Debug, Clone, Default)]
pub struct BatchGenerateOutcome {
    pub locations_generated: u32,
    pub reconnections_created: u32,
    pub exits_created: u32,
    pub ai_cost: u64,
}

pub struct BatchGenerateHandler {
    pub location_repo: Arc<dyn LocationRepository>,
    pub layer_repo: Arc<dyn LayerRepository>,
    pub publisher: Arc<dyn Publisher>,
    pub telemetry: Arc<dyn Telemetry>,
    pub description_generator: Arc<dyn DescriptionGenerator>,
    /// AI budget spent per stub; zero disables the collaborator call.
    pub per_stub_ai_budget: u64,
}

impl BatchGenerateHandler {
    pub fn new(
        location_repo: Arc<dyn LocationRepository>,
        layer_repo: Arc<dyn LayerRepository>,
        publisher: Arc<dyn Publisher>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Self {
            location_repo,
            layer_repo,
            publisher,
            telemetry,
            description_generator: Arc::new(PlaceholderDescriptionGenerator),
            per_stub_ai_budget: 0,
        }
    }

    /// Run the algorithm end to end. Exposed directly (rather than only
    /// through [`Handler::handle`]) so callers — and tests — can read the
    /// outcome counts without round-tripping through telemetry.
    pub async fn run(&self, payload: &BatchGeneratePayload, correlation_id: Uuid) -> Result<BatchGenerateOutcome, HandlerError> {
        let start = Instant::now();

        self.telemetry.emit(
            "World.BatchGeneration.Started",
            vec![("rootLocationId", payload.root_location_id.to_string().into())],
        );

        let root = self
            .location_repo
            .get(payload.root_location_id)
            .await
            .map_err(|e| HandlerError::Retryable(e.to_string()))?
            .ok_or_else(|| HandlerError::Permanent(format!("location not found: {}", payload.root_location_id)))?;

        let terrain = Terrain::lookup(&payload.terrain);
        let travel_duration_ms = payload.travel_duration_ms.unwrap_or(DEFAULT_TRAVEL_DURATION_MS);

        // §4.4.1: candidate directions, arrival direction removed, truncated
        // to batch size, order preserved.
        let candidate_directions: Vec<Direction> = terrain
            .default_directions
            .iter()
            .copied()
            .filter(|d| *d != payload.arrival_direction)
            .take(payload.batch_size as usize)
            .collect();

        let mut resolved: HashMap<Direction, Uuid> = HashMap::new();
        let mut reconnections_created: u32 = 0;

        // Phase 1 — direct reconnection (§4.4.2).
        for direction in &candidate_directions {
            if let Some(exit) = root.exit_toward(*direction) {
                resolved.insert(*direction, exit.to);
                reconnections_created += 1;
            }
        }

        // Phase 2 — budgeted fuzzy stitching (§4.4.3).
        if !root.is_frontier_boundary() {
            let unresolved: Vec<Direction> = candidate_directions
                .iter()
                .copied()
                .filter(|d| !resolved.contains_key(d))
                .collect();

            if !unresolved.is_empty() {
                let all_locations = self
                    .location_repo
                    .list_all()
                    .await
                    .map_err(|e| HandlerError::Retryable(e.to_string()))?;
                let locations_by_id: HashMap<Uuid, crate::repository::Location> =
                    all_locations.into_iter().map(|l| (l.id, l)).collect();

                let root_adjacent: HashSet<Uuid> = root.exits.iter().map(|e| e.to).collect();
                let budget_ms = 2 * travel_duration_ms;

                let mut pool = budgeted_reachable(root.id, &locations_by_id, budget_ms, &root_adjacent);

                if let Some(realm_key) = &payload.realm_key {
                    pool.retain(|c| {
                        locations_by_id
                            .get(&c.location_id)
                            .map(|loc| loc.tags.contains(realm_key))
                            .unwrap_or(false)
                    });
                }

                let mut used: HashSet<Uuid> = HashSet::new();
                for direction in &unresolved {
                    if let Some(candidate) = pool
                        .iter()
                        .find(|c| !used.contains(&c.location_id) && c.best_aligned_direction() == Some(*direction))
                    {
                        let target = candidate.location_id;
                        used.insert(target);
                        self.location_repo
                            .ensure_exit_bidirectional(root.id, *direction, target, true)
                            .await
                            .map_err(|e| HandlerError::Retryable(e.to_string()))?;
                        resolved.insert(*direction, target);
                        reconnections_created += 1;
                    }
                }
            }
        }

        // Stub creation — anything still unresolved (§4.4.4).
        let mut locations_generated: u32 = 0;
        let mut ai_cost: u64 = 0;

        for direction in &candidate_directions {
            if resolved.contains_key(direction) {
                continue;
            }

            let arrival_at_stub = direction.opposite();
            let generation = self
                .description_generator
                .generate(
                    GenerationRequest {
                        terrain: terrain.name.clone(),
                        arrival_direction: arrival_at_stub,
                    },
                    self.per_stub_ai_budget,
                )
                .await;
            ai_cost += generation.cost;

            let stub_id = Uuid::new_v4();
            let name = generation.name.unwrap_or_else(|| format!("Unexplored {}", terrain.name));
            let mut content = format!("You arrive from {arrival_at_stub}.");
            if let Some(flavor) = generation.flavor_text {
                content.push(' ');
                content.push_str(&flavor);
            }

            let mut stub = crate::repository::Location::new_stub(stub_id, name, content.clone(), terrain.name.clone());
            stub.exit_availability.pending = terrain
                .default_directions
                .iter()
                .filter(|d| **d != arrival_at_stub)
                .map(|d| (d.to_string(), "unexplored".to_string()))
                .collect();

            self.location_repo
                .upsert(stub)
                .await
                .map_err(|e| HandlerError::Retryable(e.to_string()))?;

            self.layer_repo
                .add_layer(DescriptionLayer {
                    id: Uuid::new_v4(),
                    location_id: stub_id,
                    layer_type: LayerType::Base,
                    content,
                    priority: 0,
                    authored_at: chrono::Utc::now(),
                    attributes: Default::default(),
                })
                .await
                .map_err(|e| HandlerError::Retryable(e.to_string()))?;

            let exit_payload = ExitCreatePayload {
                from_location_id: root.id,
                to_location_id: stub_id,
                direction: *direction,
                reciprocal: true,
                travel_duration_ms: payload.travel_duration_ms,
            };
            let outcome = emit(EmitRequest {
                event_type: EventType::WorldExitCreate,
                scope_key: format!("loc:{}", root.id),
                payload: json!(exit_payload),
                actor: Actor {
                    kind: ActorKind::System,
                    id: None,
                },
                correlation_id: Some(correlation_id),
                causation_id: None,
                idempotency_key: Some(format!("exit-create:{}:{}", root.id, direction)),
            });
            self.publisher
                .publish(outcome.envelope)
                .await
                .map_err(|e| HandlerError::Retryable(e.to_string()))?;

            locations_generated += 1;
        }

        // §4.4.4: both sides of every bidirectional exit, for stubs and
        // reconnections alike (§9's "directed sides" resolution).
        let exits_created = 2 * (locations_generated + reconnections_created);

        let outcome = BatchGenerateOutcome {
            locations_generated,
            reconnections_created,
            exits_created,
            ai_cost,
        };

        self.telemetry.emit(
            "World.BatchGeneration.Completed",
            vec![
                ("locationsGenerated", outcome.locations_generated.into()),
                ("exitsCreated", outcome.exits_created.into()),
                ("reconnectionsCreated", outcome.reconnections_created.into()),
                ("durationMs", (start.elapsed().as_millis() as u64).into()),
                ("aiCost", outcome.ai_cost.into()),
            ],
        );

        Ok(outcome)
    }
}

#[async_trait]
impl Handler for BatchGenerateHandler {
    async fn handle(&self, envelope: &crate::envelope::EventEnvelope, ctx: &HandlerContext) -> Result<(), HandlerError> {
        let payload: BatchGeneratePayload = serde_json::from_value(envelope.payload.clone())
            .map_err(|e| HandlerError::Permanent(format!("invalid BatchGenerate payload: {e}")))?;
        self.run(&payload, ctx.correlation_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::exit_create::ExitCreateHandler;
    use crate::publisher::memory::InMemoryPublisher;
    use crate::repository::{Exit, InMemoryLayerRepository, InMemoryLocationRepository};
    use crate::telemetry::RecordingTelemetry;

    /// Dispatches every deferred `World.Exit.Create` envelope sitting in
    /// `publisher` to an [`ExitCreateHandler`] over `location_repo`. Stub
    /// creation (§4.4.4) never touches `root`'s exits itself — it only
    /// enqueues these events — so a unit test that wants root fully wired
    /// after a run has to drain them, same as `tests/pipeline.rs` does.
    async fn drain_exit_create_events(publisher: &InMemoryPublisher, location_repo: &Arc<InMemoryLocationRepository>) {
        let handler = ExitCreateHandler::new(location_repo.clone() as Arc<dyn LocationRepository>);
        for envelope in publisher.published().await {
            let ctx = HandlerContext {
                correlation_id: envelope.correlation_id,
            };
            handler.handle(&envelope, &ctx).await.unwrap();
        }
    }

    fn plain_location(id: Uuid) -> crate::repository::Location {
        crate::repository::Location {
            id,
            name: "Root".to_string(),
            description: "An open plain.".to_string(),
            terrain: Some("open-plain".to_string()),
            tags: Default::default(),
            exits: Vec::new(),
            exit_availability: Default::default(),
            version: 1,
        }
    }

    fn payload(root_id: Uuid, arrival: Direction, batch_size: u32) -> BatchGeneratePayload {
        BatchGeneratePayload {
            root_location_id: root_id,
            terrain: "open-plain".to_string(),
            arrival_direction: arrival,
            expansion_depth: 0,
            batch_size,
            realm_hints: None,
            travel_duration_ms: None,
            realm_key: None,
        }
    }

    fn build_handler() -> (
        BatchGenerateHandler,
        Arc<InMemoryLocationRepository>,
        Arc<InMemoryPublisher>,
        Arc<RecordingTelemetry>,
    ) {
        let location_repo = Arc::new(InMemoryLocationRepository::new());
        let layer_repo = Arc::new(InMemoryLayerRepository::new());
        let publisher = Arc::new(InMemoryPublisher::new());
        let telemetry = Arc::new(RecordingTelemetry::new());
        let handler = BatchGenerateHandler::new(location_repo.clone(), layer_repo, publisher.clone(), telemetry.clone());
        (handler, location_repo, publisher, telemetry)
    }

    #[tokio::test]
    async fn happy_path_generates_a_stub_per_candidate_direction() {
        // open-plain's defaultDirections are N/E/S/W; arriving south removes
        // south, leaving three candidates, all unmet -> three stubs.
        let (handler, location_repo, publisher, _telemetry) = build_handler();
        let root_id = Uuid::new_v4();
        let mut root = plain_location(root_id);
        root.tags.insert("frontier:boundary".to_string());
        location_repo.upsert(root).await.unwrap();

        let outcome = handler.run(&payload(root_id, Direction::South, 4), Uuid::new_v4()).await.unwrap();

        assert_eq!(outcome.locations_generated, 3);
        assert_eq!(outcome.reconnections_created, 0);
        assert_eq!(outcome.exits_created, 6);
        assert_eq!(publisher.count().await, 3);

        let root_after = location_repo.get(root_id).await.unwrap().unwrap();
        for direction in [Direction::North, Direction::East, Direction::West] {
            assert!(root_after.has_exit_toward(direction));
        }
    }

    #[tokio::test]
    async fn phase1_reuses_an_existing_exit_instead_of_stubbing() {
        let (handler, location_repo, _publisher, _telemetry) = build_handler();
        let root_id = Uuid::new_v4();
        let neighbor_id = Uuid::new_v4();
        let mut root = plain_location(root_id);
        root.tags.insert("frontier:boundary".to_string());
        root.exits.push(Exit {
            direction: Direction::North,
            to: neighbor_id,
            travel_duration_ms: None,
        });
        location_repo.upsert(root).await.unwrap();
        location_repo.upsert(plain_location(neighbor_id)).await.unwrap();

        let outcome = handler.run(&payload(root_id, Direction::South, 4), Uuid::new_v4()).await.unwrap();

        assert_eq!(outcome.locations_generated, 2); // east, west
        assert_eq!(outcome.reconnections_created, 1); // north, already there
    }

    #[tokio::test]
    async fn phase2_stitches_to_a_budgeted_aligned_candidate() {
        let (handler, location_repo, _publisher, _telemetry) = build_handler();
        let root_id = Uuid::new_v4();
        let via_id = Uuid::new_v4();
        let target_id = Uuid::new_v4();

        // root --south(cheap)--> via --west(full fare)--> target. Root's
        // only direct exit is south, so target sits two hops out, off
        // root's direct-neighbour set, with an accumulated displacement
        // that drifts mostly west (a long west leg off a short south one) —
        // phase 2 should stitch it in for the `west` candidate direction
        // without phase 1 (which only ever sees root's own exits) touching
        // it at all.
        let mut root = plain_location(root_id);
        root.exits.push(Exit {
            direction: Direction::South,
            to: via_id,
            travel_duration_ms: Some(DEFAULT_TRAVEL_DURATION_MS / 10),
        });
        let mut via = plain_location(via_id);
        via.exits.push(Exit {
            direction: Direction::North,
            to: root_id,
            travel_duration_ms: Some(DEFAULT_TRAVEL_DURATION_MS / 10),
        });
        via.exits.push(Exit {
            direction: Direction::West,
            to: target_id,
            travel_duration_ms: Some(DEFAULT_TRAVEL_DURATION_MS),
        });
        let mut target = plain_location(target_id);
        target.exits.push(Exit {
            direction: Direction::East,
            to: via_id,
            travel_duration_ms: Some(DEFAULT_TRAVEL_DURATION_MS),
        });

        location_repo.upsert(root).await.unwrap();
        location_repo.upsert(via).await.unwrap();
        location_repo.upsert(target).await.unwrap();

        // Arriving from the east removes `east` from the candidate set,
        // leaving north/south/west. `south` is a direct exit (phase 1).
        // `west` has no direct exit but is reachable within budget via
        // `via`, and its accumulated displacement best-aligns with `west`,
        // so phase 2 stitches it in. `north` has neither and stubs.
        let mut p = payload(root_id, Direction::East, 4);
        p.travel_duration_ms = Some(DEFAULT_TRAVEL_DURATION_MS);
        let outcome = handler.run(&p, Uuid::new_v4()).await.unwrap();

        assert_eq!(outcome.reconnections_created, 2); // south (phase 1), west (phase 2)
        assert_eq!(outcome.locations_generated, 1); // north stubs

        let root_after = location_repo.get(root_id).await.unwrap().unwrap();
        assert_eq!(root_after.exit_toward(Direction::West).map(|e| e.to), Some(target_id));
    }

    #[tokio::test]
    async fn frontier_boundary_always_stubs_even_with_reachable_candidates() {
        let (handler, location_repo, _publisher, _telemetry) = build_handler();
        let root_id = Uuid::new_v4();
        let mut root = plain_location(root_id);
        root.tags.insert("frontier:boundary".to_string());
        location_repo.upsert(root).await.unwrap();

        let outcome = handler.run(&payload(root_id, Direction::South, 4), Uuid::new_v4()).await.unwrap();
        assert_eq!(outcome.locations_generated, 3);
        assert_eq!(outcome.reconnections_created, 0);
    }

    #[tokio::test]
    async fn realm_key_filter_excludes_candidates_missing_the_tag() {
        let (handler, location_repo, _publisher, _telemetry) = build_handler();
        let root_id = Uuid::new_v4();
        let candidate_id = Uuid::new_v4();
        let root = plain_location(root_id); // not a frontier boundary

        let mut candidate = plain_location(candidate_id);
        candidate.exits.push(Exit {
            direction: Direction::West,
            to: root_id,
            travel_duration_ms: None,
        });
        // No "realm:shadowfen" tag on the candidate.

        let mut root = root;
        root.exits.push(Exit {
            direction: Direction::East,
            to: candidate_id,
            travel_duration_ms: None,
        });

        location_repo.upsert(root).await.unwrap();
        location_repo.upsert(candidate).await.unwrap();

        let mut p = payload(root_id, Direction::West, 4);
        p.realm_key = Some("realm:shadowfen".to_string());
        // `east` is already a direct exit (phase 1), so this only checks
        // that phase 2 doesn't error when the pool is filtered empty;
        // north/south still stub.
        let outcome = handler.run(&p, Uuid::new_v4()).await.unwrap();
        assert_eq!(outcome.reconnections_created, 1);
        assert_eq!(outcome.locations_generated, 2);
    }

    #[tokio::test]
    async fn rerunning_on_a_fully_expanded_root_is_idempotent() {
        let (handler, location_repo, publisher, _telemetry) = build_handler();
        let root_id = Uuid::new_v4();
        let mut root = plain_location(root_id);
        root.tags.insert("frontier:boundary".to_string());
        location_repo.upsert(root).await.unwrap();

        let p = payload(root_id, Direction::South, 4);
        let first = handler.run(&p, Uuid::new_v4()).await.unwrap();
        assert_eq!(first.locations_generated, 3);

        // Stub creation only enqueues `World.Exit.Create` events; it never
        // wires root's own exits directly (§4.4.4). Drain them first so the
        // root is actually fully expanded before the re-run — otherwise
        // Phase 1 would find nothing to reconnect and the second run would
        // just re-stub the same three directions.
        drain_exit_create_events(&publisher, &location_repo).await;

        let second = handler.run(&p, Uuid::new_v4()).await.unwrap();
        assert_eq!(second.locations_generated, 0);
        assert_eq!(second.reconnections_created, 3);
        assert_eq!(second.exits_created, 6);

        let root_after = location_repo.get(root_id).await.unwrap().unwrap();
        assert_eq!(root_after.exits.len(), 3);
    }
}
