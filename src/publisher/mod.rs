//! Publisher abstraction: durable queue in production, in-memory ordered
//! list for tests (§4.1).
//!
//! Mirrors the teacher's `EventBus` trait (`src/bus/mod.rs`) — a single
//! `publish` capability plus an ack/err result — generalized from protobuf
//! `EventBook`s to the JSON `EventEnvelope` this crate's scope actually
//! needs (see DESIGN.md).

pub mod memory;

use async_trait::async_trait;

use crate::envelope::EventEnvelope;

/// Errors that can occur publishing an envelope.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("service bus unavailable: {0}")]
    ServiceBusUnavailable(String),
    #[error("publish rejected: {0}")]
    Rejected(String),
}

impl PublishError {
    /// Stable error code, duck-typed across boundaries per §9
    /// ("Duck-typed retryability becomes a small variant with a boolean
    /// `retryable` and a `code` string").
    pub fn code(&self) -> &'static str {
        match self {
            PublishError::ServiceBusUnavailable(_) => "SERVICEBUS_UNAVAILABLE",
            PublishError::Rejected(_) => "PUBLISH_REJECTED",
        }
    }

    pub fn retryable(&self) -> bool {
        matches!(self, PublishError::ServiceBusUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, PublishError>;

/// Durable delivery abstraction. Implementations: [`memory::InMemoryPublisher`]
/// (tests/standalone), a queue-backed implementation in production.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, envelope: EventEnvelope) -> Result<()>;
}
