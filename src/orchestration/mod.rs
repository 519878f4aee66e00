//! Area Generation Orchestrator (§4.3): resolves an anchor, decides a
//! terrain, clamps the requested batch size, and emits the single
//! `World.Location.BatchGenerate` event the [`crate::handlers::batch_generate`]
//! handler consumes.
//!
//! Grounded on the teacher's orchestration layer (`src/orchestration/mod.rs`,
//! `src/orchestration/aggregate/local/mod.rs`) for shape — a thin
//! request-in/event-out coordinator sitting in front of the handler/bus
//! machinery, not a handler itself.

use uuid::Uuid;

use crate::config::Config;
use crate::direction::Direction;
use crate::envelope::{emit, Actor, ActorKind, EmitRequest, EventType};
use crate::handlers::batch_generate::BatchGeneratePayload;
use crate::publisher::Publisher;
use crate::repository::{LocationRepository, RealmRepository};
use crate::telemetry::Telemetry;
use crate::terrain::infer_terrain_from_realms;

use std::sync::Arc;

/// §4.3's `mode` input: `{auto, urban, wilderness}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GenerationMode {
    #[default]
    Auto,
    Urban,
    Wilderness,
}

/// A request to grow the world graph outward from an anchor location.
#[derive(Debug, Clone)]
pub struct AreaGenerationRequest {
    /// Explicit anchor; falls back to `Config::starter_location_id` when
    /// absent (§4.3).
    pub anchor_location_id: Option<Uuid>,
    pub arrival_direction: Direction,
    pub batch_size: u32,
    /// Drives terrain inference when the anchor itself carries no terrain
    /// (§4.3).
    pub mode: GenerationMode,
    pub realm_hints: Option<Vec<String>>,
    pub realm_key: Option<String>,
    pub idempotency_key: Option<String>,
    pub correlation_id: Option<Uuid>,
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("location not found: {0}")]
    LocationNotFound(Uuid),
    #[error("no anchor given and no starter_location_id configured")]
    NoAnchorAvailable,
    #[error("repository failure: {0}")]
    Repository(String),
    #[error("publish failure: {0}")]
    Publish(String),
}

pub struct AreaGenerationOrchestrator {
    location_repo: Arc<dyn LocationRepository>,
    realm_repo: Arc<dyn RealmRepository>,
    publisher: Arc<dyn Publisher>,
    telemetry: Arc<dyn Telemetry>,
    config: Config,
}

impl AreaGenerationOrchestrator {
    pub fn new(
        location_repo: Arc<dyn LocationRepository>,
        realm_repo: Arc<dyn RealmRepository>,
        publisher: Arc<dyn Publisher>,
        telemetry: Arc<dyn Telemetry>,
        config: Config,
    ) -> Self {
        Self {
            location_repo,
            realm_repo,
            publisher,
            telemetry,
            config,
        }
    }

    pub async fn generate(&self, request: AreaGenerationRequest) -> Result<Uuid, OrchestratorError> {
        self.telemetry.emit("World.AreaGeneration.Started", vec![]);

        match self.generate_inner(request).await {
            Ok((event_id, clamped)) => {
                self.telemetry.emit(
                    "World.AreaGeneration.Completed",
                    vec![("eventId", event_id.to_string().into()), ("batchSizeClamped", clamped.into())],
                );
                Ok(event_id)
            }
            Err(err) => {
                self.telemetry.emit("World.AreaGeneration.Failed", vec![("reason", err.to_string().into())]);
                Err(err)
            }
        }
    }

    async fn generate_inner(&self, request: AreaGenerationRequest) -> Result<(Uuid, bool), OrchestratorError> {
        let anchor_id = match request.anchor_location_id {
            Some(id) => id,
            None => self.config.starter_location_id.ok_or(OrchestratorError::NoAnchorAvailable)?,
        };
        let anchor = self
            .location_repo
            .get(anchor_id)
            .await
            .map_err(|e| OrchestratorError::Repository(e.to_string()))?
            .ok_or(OrchestratorError::LocationNotFound(anchor_id))?;

        // §4.3: "clamp `budgetLocations` to `MAX_BUDGET_LOCATIONS`; report
        // whether clamping occurred" — the limit itself is already clamped
        // to the hard cap regardless of configuration (`clamped_max_budget_locations`),
        // but whether *this request* actually got capped is reported
        // separately on the Completed telemetry event.
        let limit = self.config.clamped_max_budget_locations();
        let clamped = request.batch_size > limit;
        let batch_size = request.batch_size.min(limit);

        // §4.3 terrain decision: the anchor's own terrain wins whenever it's
        // set, regardless of mode; otherwise mode picks the fallback.
        let terrain = match anchor.terrain {
            Some(terrain) => terrain,
            None => match request.mode {
                GenerationMode::Auto => {
                    let realms = self
                        .realm_repo
                        .list_realms_for(anchor_id)
                        .await
                        .map_err(|e| OrchestratorError::Repository(e.to_string()))?;
                    infer_terrain_from_realms(realms.iter().map(|r| r.name.as_str()))
                }
                GenerationMode::Urban => "narrow-corridor".to_string(),
                GenerationMode::Wilderness => "open-plain".to_string(),
            },
        };

        let payload = BatchGeneratePayload {
            root_location_id: anchor_id,
            terrain,
            arrival_direction: request.arrival_direction,
            expansion_depth: 0,
            batch_size,
            realm_hints: request.realm_hints,
            travel_duration_ms: Some(self.config.default_travel_duration_ms),
            realm_key: request.realm_key,
        };

        let outcome = emit(EmitRequest {
            event_type: EventType::WorldLocationBatchGenerate,
            scope_key: format!("loc:{anchor_id}"),
            payload: serde_json::to_value(&payload).expect("BatchGeneratePayload always serializes"),
            actor: Actor {
                kind: ActorKind::System,
                id: None,
            },
            correlation_id: request.correlation_id,
            causation_id: None,
            idempotency_key: request.idempotency_key,
        });

        let event_id = outcome.envelope.event_id;
        self.publisher
            .publish(outcome.envelope)
            .await
            .map_err(|e| OrchestratorError::Publish(e.to_string()))?;

        Ok((event_id, clamped))
    }
}
