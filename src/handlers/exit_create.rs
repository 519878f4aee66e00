//! The exit-create handler (§4.5): the downstream consumer of the
//! `World.Exit.Create` events the batch-generate handler defers stub
//! wiring to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Handler, HandlerContext, HandlerError};
use crate::direction::Direction;
use crate::repository::location::LocationRepository;

use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitCreatePayload {
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    pub direction: Direction,
    pub reciprocal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub travel_duration_ms: Option<u64>,
}

pub struct ExitCreateHandler {
    pub location_repo: Arc<dyn LocationRepository>,
}

impl ExitCreateHandler {
    pub fn new(location_repo: Arc<dyn LocationRepository>) -> Self {
        Self { location_repo }
    }
}

#[async_trait]
impl Handler for ExitCreateHandler {
    async fn handle(&self, envelope: &crate::envelope::EventEnvelope, _ctx: &HandlerContext) -> Result<(), HandlerError> {
        let payload: ExitCreatePayload = serde_json::from_value(envelope.payload.clone())
            .map_err(|e| HandlerError::Permanent(format!("invalid Exit.Create payload: {e}")))?;

        // A no-op on whichever side(s) already carry the exit (§4.5).
        self.location_repo
            .ensure_exit_bidirectional(payload.from_location_id, payload.direction, payload.to_location_id, payload.reciprocal)
            .await
            .map_err(|e| HandlerError::Retryable(e.to_string()))?;

        if let Some(travel_duration_ms) = payload.travel_duration_ms {
            self.location_repo
                .set_exit_travel_duration(payload.from_location_id, payload.direction, travel_duration_ms)
                .await
                .map_err(|e| HandlerError::Retryable(e.to_string()))?;
            if payload.reciprocal {
                self.location_repo
                    .set_exit_travel_duration(payload.to_location_id, payload.direction.opposite(), travel_duration_ms)
                    .await
                    .map_err(|e| HandlerError::Retryable(e.to_string()))?;
            }
        }

        Ok(())
    }
}
