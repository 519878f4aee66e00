//! In-memory ordered-list publisher, the test/standalone variant called out
//! in §4.1 ("A test in-memory variant records order of enqueue").
//!
//! Grounded on the teacher's `ChannelEventBus` (`src/bus/channel/mod.rs`):
//! same shared-sender-over-Arc shape, generalized from a tokio broadcast
//! channel fan-out to a plain recorded `Vec` since nothing in this crate's
//! scope needs multi-subscriber fan-out at the publisher layer — dispatch
//! fan-out happens in the queue processor's handler registry instead.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{PublishError, Publisher, Result};
use crate::envelope::EventEnvelope;

/// Records every envelope handed to `publish`, in enqueue order.
pub struct InMemoryPublisher {
    published: Arc<RwLock<Vec<EventEnvelope>>>,
    /// When set, the next `publish` call fails with this error instead of
    /// recording — lets tests exercise `ServiceBusUnavailableError` redelivery.
    fail_next: Arc<RwLock<Option<PublishError>>>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self {
            published: Arc::new(RwLock::new(Vec::new())),
            fail_next: Arc::new(RwLock::new(None)),
        }
    }

    /// Arrange for the next `publish` call to fail with `err`.
    pub async fn fail_next_publish(&self, err: PublishError) {
        *self.fail_next.write().await = Some(err);
    }

    /// Snapshot of everything published so far, in order.
    pub async fn published(&self) -> Vec<EventEnvelope> {
        self.published.read().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.published.read().await.len()
    }
}

impl Default for InMemoryPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for InMemoryPublisher {
    async fn publish(&self, envelope: EventEnvelope) -> Result<()> {
        if let Some(err) = self.fail_next.write().await.take() {
            return Err(err);
        }

        debug!(
            event_type = %envelope.event_type_raw,
            event_id = %envelope.event_id,
            "publishing envelope to in-memory bus"
        );
        self.published.write().await.push(envelope);
        Ok(())
    }
}
