//! Handler trait and the individual handlers (§4.2 step 4, §4.4, §4.5).

pub mod batch_generate;
pub mod exit_create;

pub use batch_generate::BatchGenerateHandler;
pub use exit_create::ExitCreateHandler;

use async_trait::async_trait;
use uuid::Uuid;

use crate::envelope::EventEnvelope;

/// Per-invocation context handed to a handler: correlation id for log
/// correlation, nothing else — handlers reach repositories/publisher
/// through their own constructor-injected fields, not through this context
/// (§4.2 step 4: "the envelope plus an invocation context (logger,
/// correlationId)").
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub correlation_id: Uuid,
}

/// Errors a handler can raise, classified per §7's taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Surfaces to the queue transport for redelivery with its own backoff
    /// (§4.2 failure policy); never dead-lettered on first attempt.
    #[error("retryable: {0}")]
    Retryable(String),
    /// Permanent at the handler boundary; the processor dead-letters this
    /// with `errorCode=handler-permanent` (§7).
    #[error("permanent: {0}")]
    Permanent(String),
}

impl HandlerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Retryable(_))
    }
}

/// A registered event handler (§4.2 step 4, §9: "Handler registry. A
/// mapping from `type` string to a handler capability; the processor is
/// generic over handlers").
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, envelope: &EventEnvelope, ctx: &HandlerContext) -> Result<(), HandlerError>;
}
