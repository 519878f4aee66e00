//! The event envelope wire contract, validation, and the emit helper (§4.1,
//! §6).
//!
//! The envelope is plain JSON (`serde_json::Value` payload), not protobuf —
//! unlike the teacher's `EventBook`/`Cover` wire types, there is no gRPC
//! transport in this crate's scope (see DESIGN.md).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Known event types (§6). Unrecognized values fail envelope validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "Player.Move")]
    PlayerMove,
    #[serde(rename = "Player.Look")]
    PlayerLook,
    #[serde(rename = "NPC.Tick")]
    NpcTick,
    #[serde(rename = "World.Ambience.Generated")]
    WorldAmbienceGenerated,
    #[serde(rename = "World.Location.BatchGenerate")]
    WorldLocationBatchGenerate,
    #[serde(rename = "World.Exit.Create")]
    WorldExitCreate,
    #[serde(rename = "Location.Environment.Changed")]
    LocationEnvironmentChanged,
    #[serde(rename = "Quest.Proposed")]
    QuestProposed,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::PlayerMove => "Player.Move",
            EventType::PlayerLook => "Player.Look",
            EventType::NpcTick => "NPC.Tick",
            EventType::WorldAmbienceGenerated => "World.Ambience.Generated",
            EventType::WorldLocationBatchGenerate => "World.Location.BatchGenerate",
            EventType::WorldExitCreate => "World.Exit.Create",
            EventType::LocationEnvironmentChanged => "Location.Environment.Changed",
            EventType::QuestProposed => "Quest.Proposed",
        }
    }

    fn from_str(s: &str) -> Option<EventType> {
        Some(match s {
            "Player.Move" => EventType::PlayerMove,
            "Player.Look" => EventType::PlayerLook,
            "NPC.Tick" => EventType::NpcTick,
            "World.Ambience.Generated" => EventType::WorldAmbienceGenerated,
            "World.Location.BatchGenerate" => EventType::WorldLocationBatchGenerate,
            "World.Exit.Create" => EventType::WorldExitCreate,
            "Location.Environment.Changed" => EventType::LocationEnvironmentChanged,
            "Quest.Proposed" => EventType::QuestProposed,
            _ => return None,
        })
    }
}

/// Actor kinds (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    Player,
    Npc,
    System,
    Ai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub kind: ActorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// The wire-level envelope. `ingestedUtc` is populated by the processor on
/// ingest if the producer omitted it (§4.2 step 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_id: Uuid,
    #[serde(rename = "type")]
    pub event_type_raw: String,
    pub occurred_utc: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingested_utc: Option<DateTime<Utc>>,
    pub actor: Actor,
    pub correlation_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<Uuid>,
    pub idempotency_key: String,
    pub version: u32,
    pub payload: Value,
}

impl EventEnvelope {
    /// Parse and enforce the known-enum validations (§4.1, §4.2 step 2).
    /// Distinct from JSON parsing: a syntactically valid JSON object with a
    /// `type` outside the enum is a *schema* failure, not a *parse* failure.
    pub fn event_type(&self) -> Option<EventType> {
        EventType::from_str(&self.event_type_raw)
    }
}

/// A single structured validation failure, keyed by field (§4.1: "structured,
/// per-field").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
#[error("envelope validation failed: {errors:?}")]
pub struct WorldEventValidationError {
    pub errors: Vec<FieldError>,
}

impl WorldEventValidationError {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError {
                field: field.into(),
                message: message.into(),
            }],
        }
    }

    pub const CODE: &'static str = "WORLD_EVENT_VALIDATION";
}

/// Validate an already-parsed envelope against §4.1's field rules. Does not
/// populate `ingestedUtc` — that is the processor's responsibility (§4.2).
pub fn validate_envelope(envelope: &EventEnvelope) -> Result<(), WorldEventValidationError> {
    let mut errors = Vec::new();

    if envelope.event_type().is_none() {
        errors.push(FieldError {
            field: "type".to_string(),
            message: format!("unknown event type '{}'", envelope.event_type_raw),
        });
    }

    if envelope.version != 1 {
        errors.push(FieldError {
            field: "version".to_string(),
            message: format!("expected version=1, got {}", envelope.version),
        });
    }

    if envelope.idempotency_key.trim().is_empty() {
        errors.push(FieldError {
            field: "idempotencyKey".to_string(),
            message: "idempotencyKey must not be empty".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(WorldEventValidationError { errors })
    }
}

/// Outcome of attempting to turn a raw message body into a validated
/// envelope (§4.2 steps 1–2). Carries enough information for the processor
/// to build the right dead-letter record for either failure mode.
#[derive(Debug)]
pub enum EnvelopeParseError {
    /// The message body was not valid JSON at all.
    JsonParse(String),
    /// Valid JSON, but the envelope schema rejected it. `original_correlation_id`
    /// is `Some` whenever a parseable `correlationId` could be recovered
    /// despite the rest of the envelope being invalid (§3: "preserving
    /// `originalCorrelationId`").
    Validation {
        error: WorldEventValidationError,
        original_correlation_id: Option<Uuid>,
    },
}

/// Parse a raw message body into a validated [`EventEnvelope`], populating
/// `ingestedUtc` if the producer omitted it (§4.2 step 2). This is the
/// entry point the queue processor calls for every incoming message.
pub fn parse_raw(raw: &str) -> Result<EventEnvelope, EnvelopeParseError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| EnvelopeParseError::JsonParse(e.to_string()))?;
    parse_value(value)
}

fn parse_value(value: Value) -> Result<EventEnvelope, EnvelopeParseError> {
    let obj = match value.as_object() {
        Some(obj) => obj,
        None => {
            return Err(EnvelopeParseError::Validation {
                error: WorldEventValidationError::single("$", "envelope must be a JSON object"),
                original_correlation_id: None,
            })
        }
    };

    let correlation_id = obj
        .get("correlationId")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok());

    let mut errors = Vec::new();

    let event_id = obj.get("eventId").and_then(|v| v.as_str()).and_then(|s| Uuid::parse_str(s).ok());
    if event_id.is_none() {
        errors.push(FieldError {
            field: "eventId".to_string(),
            message: "missing or invalid UUID".to_string(),
        });
    }

    let event_type_raw = obj.get("type").and_then(|v| v.as_str()).map(str::to_string);
    if event_type_raw.is_none() {
        errors.push(FieldError {
            field: "type".to_string(),
            message: "missing".to_string(),
        });
    }

    if correlation_id.is_none() {
        errors.push(FieldError {
            field: "correlationId".to_string(),
            message: "missing or invalid UUID".to_string(),
        });
    }

    let occurred_utc = obj
        .get("occurredUtc")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));
    if occurred_utc.is_none() {
        errors.push(FieldError {
            field: "occurredUtc".to_string(),
            message: "missing or invalid ISO-8601 timestamp".to_string(),
        });
    }

    let actor = obj.get("actor").and_then(|v| serde_json::from_value::<Actor>(v.clone()).ok());
    if actor.is_none() {
        errors.push(FieldError {
            field: "actor".to_string(),
            message: "missing or invalid".to_string(),
        });
    }

    let idempotency_key = obj
        .get("idempotencyKey")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string);
    if idempotency_key.is_none() {
        errors.push(FieldError {
            field: "idempotencyKey".to_string(),
            message: "missing or empty".to_string(),
        });
    }

    let version = obj.get("version").and_then(|v| v.as_u64()).map(|v| v as u32);
    if version.is_none() {
        errors.push(FieldError {
            field: "version".to_string(),
            message: "missing".to_string(),
        });
    }

    if !errors.is_empty() {
        return Err(EnvelopeParseError::Validation {
            error: WorldEventValidationError { errors },
            original_correlation_id: correlation_id,
        });
    }

    let causation_id = obj
        .get("causationId")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok());
    let ingested_utc = obj
        .get("ingestedUtc")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| Some(Utc::now()));
    let payload = obj.get("payload").cloned().unwrap_or(Value::Null);

    let envelope = EventEnvelope {
        event_id: event_id.unwrap(),
        event_type_raw: event_type_raw.unwrap(),
        occurred_utc: occurred_utc.unwrap(),
        ingested_utc,
        actor: actor.unwrap(),
        correlation_id: correlation_id.unwrap(),
        causation_id,
        idempotency_key: idempotency_key.unwrap(),
        version: version.unwrap(),
        payload,
    };

    validate_envelope(&envelope).map_err(|error| EnvelopeParseError::Validation {
        error,
        original_correlation_id: Some(envelope.correlation_id),
    })?;

    Ok(envelope)
}

/// Inputs to [`emit`].
pub struct EmitRequest {
    pub event_type: EventType,
    pub scope_key: String,
    pub payload: Value,
    pub actor: Actor,
    pub correlation_id: Option<Uuid>,
    pub causation_id: Option<Uuid>,
    pub idempotency_key: Option<String>,
}

/// Routing hints returned alongside the envelope, handed to the publisher.
#[derive(Debug, Clone)]
pub struct MessageProperties {
    pub correlation_id: Uuid,
    pub event_type: EventType,
    pub scope_key: String,
}

pub struct EmitOutcome {
    pub envelope: EventEnvelope,
    pub message_properties: MessageProperties,
    pub warnings: Vec<String>,
}

/// The emit helper (§4.1). Generates `eventId`, stamps `occurredUtc`, fixes
/// `version=1`, and auto-generates `correlationId` with a warning if the
/// caller didn't supply one.
pub fn emit(request: EmitRequest) -> EmitOutcome {
    let mut warnings = Vec::new();

    let correlation_id = request.correlation_id.unwrap_or_else(|| {
        warnings.push("correlationId missing; generated one".to_string());
        Uuid::new_v4()
    });

    let idempotency_key = request
        .idempotency_key
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let envelope = EventEnvelope {
        event_id: Uuid::new_v4(),
        event_type_raw: request.event_type.as_str().to_string(),
        occurred_utc: Utc::now(),
        ingested_utc: None,
        actor: request.actor,
        correlation_id,
        causation_id: request.causation_id,
        idempotency_key,
        version: 1,
        payload: request.payload,
    };

    let message_properties = MessageProperties {
        correlation_id,
        event_type: request.event_type,
        scope_key: request.scope_key,
    };

    EmitOutcome {
        envelope,
        message_properties,
        warnings,
    }
}
