//! Telemetry façade (§4.7, new): a push-only sink used throughout the
//! pipeline. Grounded on the teacher's metrics wrapper
//! (`src/advice/instrumented.rs`) and named-instrument catalogue
//! (`src/utils/metrics.rs`), generalized from OTel counters/histograms to
//! a structured-event sink since this crate's scope is the telemetry
//! events named in §6, not a metrics backend.

use std::sync::{Arc, Mutex};

use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize process-wide tracing (§1.1's ambient logging layer). Grounded
/// on the teacher's `utils/bootstrap.rs::init_tracing` — an `EnvFilter`
/// read from a crate-prefixed environment variable, defaulting to `info`,
/// feeding a `fmt` layer. Called once from a binary entrypoint or test
/// harness setup; safe to call more than once, since the second
/// `try_init` call is simply ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("WORLD_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// A single structured field attached to a telemetry event.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}
impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}
impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}
impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Int(v as i64)
    }
}
impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::Int(v as i64)
    }
}
impl From<usize> for FieldValue {
    fn from(v: usize) -> Self {
        FieldValue::Int(v as i64)
    }
}
impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

/// One emitted telemetry event: a name from §6 plus its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    pub name: &'static str,
    pub fields: Vec<(&'static str, FieldValue)>,
}

impl TelemetryEvent {
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }
}

/// Push-only sink for the named telemetry events in §6. Every pipeline
/// component holds an `Arc<dyn Telemetry>` and calls `emit`.
pub trait Telemetry: Send + Sync {
    fn emit(&self, name: &'static str, fields: Vec<(&'static str, FieldValue)>);
}

/// Production sink: forwards every event to a `tracing::info!` span.
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn emit(&self, name: &'static str, fields: Vec<(&'static str, FieldValue)>) {
        let rendered: Vec<String> = fields
            .iter()
            .map(|(k, v)| match v {
                FieldValue::Str(s) => format!("{k}={s}"),
                FieldValue::Int(i) => format!("{k}={i}"),
                FieldValue::Bool(b) => format!("{k}={b}"),
            })
            .collect();
        info!(event = name, fields = %rendered.join(" "), "telemetry");
    }
}

/// Test double: records every emitted event in order for assertions.
#[derive(Clone, Default)]
pub struct RecordingTelemetry {
    events: Arc<Mutex<Vec<TelemetryEvent>>>,
}

impl RecordingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_named(&self, name: &str) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.name == name)
            .cloned()
            .collect()
    }
}

impl Telemetry for RecordingTelemetry {
    fn emit(&self, name: &'static str, fields: Vec<(&'static str, FieldValue)>) {
        self.events.lock().unwrap().push(TelemetryEvent { name, fields });
    }
}
