//! The queue processor (§4.2): parse → validate → two-tier dedupe →
//! dispatch → mark-processed, with dead-lettering for every permanent
//! failure mode.

pub mod idempotency_cache;
pub mod registry;

pub use idempotency_cache::IdempotencyCache;
pub use registry::HandlerRegistry;

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::dlq::{DeadLetterErrorCode, DeadLetterRecord, DeadLetterRepository};
use crate::envelope::{parse_raw, EnvelopeParseError};
use crate::handlers::{HandlerContext, HandlerError};
use crate::repository::ProcessedEventRepository;
use crate::telemetry::Telemetry;

/// What happened to one message, once the processor has finished with it.
/// All three are terminal, successful outcomes from the processor's own
/// point of view — dead-lettering a bad message is the processor doing its
/// job, not failing at it.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Processed,
    Duplicate,
    DeadLettered(DeadLetterErrorCode),
}

/// The one outcome that isn't terminal: a handler asked for redelivery.
/// The caller (the queue transport) owns backoff/redelivery policy; the
/// processor never dead-letters on a retryable failure (§4.2 failure
/// policy).
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("retryable: {0}")]
    Retryable(String),
}

pub struct QueueProcessor {
    idempotency_cache: IdempotencyCache,
    processed_event_repo: Arc<dyn ProcessedEventRepository>,
    dlq_repo: Arc<dyn DeadLetterRepository>,
    registry: HandlerRegistry,
    telemetry: Arc<dyn Telemetry>,
}

impl QueueProcessor {
    pub fn new(
        processed_event_repo: Arc<dyn ProcessedEventRepository>,
        dlq_repo: Arc<dyn DeadLetterRepository>,
        registry: HandlerRegistry,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Self::with_cache_capacity(
            processed_event_repo,
            dlq_repo,
            registry,
            telemetry,
            idempotency_cache::DEFAULT_CAPACITY,
        )
    }

    /// Like [`Self::new`], but sizes tier 1's LRU from a configured capacity
    /// (`Config::idempotency_cache_capacity`) rather than the built-in default.
    pub fn with_cache_capacity(
        processed_event_repo: Arc<dyn ProcessedEventRepository>,
        dlq_repo: Arc<dyn DeadLetterRepository>,
        registry: HandlerRegistry,
        telemetry: Arc<dyn Telemetry>,
        idempotency_cache_capacity: usize,
    ) -> Self {
        Self {
            idempotency_cache: IdempotencyCache::new(idempotency_cache_capacity),
            processed_event_repo,
            dlq_repo,
            registry,
            telemetry,
        }
    }

    async fn dead_letter(
        &self,
        error_code: DeadLetterErrorCode,
        failure_reason: impl Into<String>,
        final_error: impl Into<String>,
        original_correlation_id: Option<Uuid>,
        original_payload: Value,
    ) -> ProcessOutcome {
        let mut record = DeadLetterRecord::new(error_code, failure_reason, final_error, original_payload);
        if let Some(correlation_id) = original_correlation_id {
            record = record.with_correlation_id(correlation_id);
        }
        // Dead-letter storage failures are themselves availability
        // incidents, not something this message's processing should block
        // on — log and move on rather than propagate (§4.2: the pipeline
        // favors availability over perfect DLQ bookkeeping).
        if let Err(err) = self.dlq_repo.store(record).await {
            tracing::error!(error = %err, "failed to persist dead-letter record");
        }
        self.telemetry.emit("World.Event.DeadLettered", vec![("errorCode", error_code.as_str().into())]);
        ProcessOutcome::DeadLettered(error_code)
    }

    /// Run one message through the full pipeline (§4.2).
    pub async fn process_message(&self, raw: &str) -> Result<ProcessOutcome, ProcessorError> {
        let envelope = match parse_raw(raw) {
            Ok(envelope) => envelope,
            Err(EnvelopeParseError::JsonParse(err)) => {
                return Ok(self
                    .dead_letter(
                        DeadLetterErrorCode::JsonParse,
                        "message body is not valid JSON",
                        err,
                        None,
                        Value::String(raw.to_string()),
                    )
                    .await)
            }
            Err(EnvelopeParseError::Validation { error, original_correlation_id }) => {
                return Ok(self
                    .dead_letter(
                        DeadLetterErrorCode::SchemaValidation,
                        "envelope failed schema validation",
                        format!("{error}"),
                        original_correlation_id,
                        Value::String(raw.to_string()),
                    )
                    .await)
            }
        };

        self.telemetry.emit(
            "World.Event.Received",
            vec![("eventId", envelope.event_id.to_string().into()), ("type", envelope.event_type_raw.clone().into())],
        );

        // Tier 1: in-memory LRU, avoids the registry round-trip on hot
        // redelivery.
        if self.idempotency_cache.contains(&envelope.idempotency_key) {
            self.telemetry.emit("World.Event.Duplicate", vec![("idempotencyKey", envelope.idempotency_key.clone().into())]);
            return Ok(ProcessOutcome::Duplicate);
        }

        // Tier 2: the durable registry, source of truth across process
        // restarts and cache eviction (§8 scenario 7).
        match self.processed_event_repo.check_processed(&envelope.idempotency_key).await {
            Ok(Some(record)) => {
                self.idempotency_cache.insert(&envelope.idempotency_key, record.event_id);
                self.telemetry.emit("World.Event.Duplicate", vec![("idempotencyKey", envelope.idempotency_key.clone().into())]);
                return Ok(ProcessOutcome::Duplicate);
            }
            Ok(None) => {}
            Err(err) => return Err(ProcessorError::Retryable(err.to_string())),
        }

        let handler = match self.registry.get(&envelope.event_type_raw) {
            Some(handler) => handler,
            None => {
                return Ok(self
                    .dead_letter(
                        DeadLetterErrorCode::HandlerPermanent,
                        "no handler registered for event type",
                        format!("unhandled type '{}'", envelope.event_type_raw),
                        Some(envelope.correlation_id),
                        serde_json::to_value(&envelope).unwrap_or(Value::Null),
                    )
                    .await)
            }
        };

        let ctx = HandlerContext {
            correlation_id: envelope.correlation_id,
        };

        match handler.handle(&envelope, &ctx).await {
            Ok(()) => {
                // Tolerate a registry write failure here: the in-memory
                // cache still prevents a hot-redelivery replay, and a
                // worst-case registry miss only risks a rare double-dispatch
                // rather than blocking this message (availability over
                // consistency, §4.2).
                if let Err(err) = self.processed_event_repo.mark_processed(&envelope.idempotency_key, envelope.event_id).await {
                    tracing::warn!(error = %err, "failed to persist processed-event record");
                }
                self.idempotency_cache.insert(&envelope.idempotency_key, envelope.event_id);
                self.telemetry.emit("World.Event.Processed", vec![("eventId", envelope.event_id.to_string().into())]);
                Ok(ProcessOutcome::Processed)
            }
            Err(HandlerError::Retryable(msg)) => {
                self.telemetry.emit("World.Event.RetryRequested", vec![("eventId", envelope.event_id.to_string().into())]);
                Err(ProcessorError::Retryable(msg))
            }
            Err(HandlerError::Permanent(msg)) => Ok(self
                .dead_letter(
                    DeadLetterErrorCode::HandlerPermanent,
                    "handler reported a permanent failure",
                    msg,
                    Some(envelope.correlation_id),
                    serde_json::to_value(&envelope).unwrap_or(Value::Null),
                )
                .await),
        }
    }
}
