//! Dead-letter queue: `DeadLetterRecord` and the append-only
//! `DeadLetterRepository` contract (§3, §4.6, §7).
//!
//! Grounded on the teacher's `src/dlq/mod.rs` (`AngzarrDeadLetter`,
//! `DlqError`) — same shape (routing info, payload, rejection reason,
//! metadata), generalized from the protobuf `AngzarrDeadLetter`/`CommandBook`
//! pair to the plain JSON envelope payload this crate's scope uses.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Permanent-failure classification (§3, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterErrorCode {
    JsonParse,
    SchemaValidation,
    HandlerPermanent,
}

impl DeadLetterErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            DeadLetterErrorCode::JsonParse => "json-parse",
            DeadLetterErrorCode::SchemaValidation => "schema-validation",
            DeadLetterErrorCode::HandlerPermanent => "handler-permanent",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeadLetterRecord {
    pub record_id: Uuid,
    pub error_code: DeadLetterErrorCode,
    pub retry_count: u32,
    pub first_attempt_timestamp: DateTime<Utc>,
    pub original_correlation_id: Option<Uuid>,
    pub failure_reason: String,
    pub final_error: String,
    pub original_payload: Value,
}

impl DeadLetterRecord {
    pub fn new(
        error_code: DeadLetterErrorCode,
        failure_reason: impl Into<String>,
        final_error: impl Into<String>,
        original_payload: Value,
    ) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            error_code,
            retry_count: 0,
            first_attempt_timestamp: Utc::now(),
            original_correlation_id: None,
            failure_reason: failure_reason.into(),
            final_error: final_error.into(),
            original_payload,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.original_correlation_id = Some(correlation_id);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeadLetterRepositoryError {
    #[error("dead letter storage failure: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, DeadLetterRepositoryError>;

/// Append-only dead-letter store (§3: "Append-only").
#[async_trait::async_trait]
pub trait DeadLetterRepository: Send + Sync {
    async fn store(&self, record: DeadLetterRecord) -> Result<()>;
    async fn query_by_time_range(&self, range: Range<DateTime<Utc>>) -> Result<Vec<DeadLetterRecord>>;
    async fn get_by_id(&self, record_id: Uuid) -> Result<Option<DeadLetterRecord>>;
}

#[derive(Clone)]
pub struct InMemoryDeadLetterRepository {
    records: Arc<RwLock<Vec<DeadLetterRecord>>>,
}

impl InMemoryDeadLetterRepository {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryDeadLetterRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DeadLetterRepository for InMemoryDeadLetterRepository {
    async fn store(&self, record: DeadLetterRecord) -> Result<()> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn query_by_time_range(&self, range: Range<DateTime<Utc>>) -> Result<Vec<DeadLetterRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| range.contains(&r.first_attempt_timestamp))
            .cloned()
            .collect())
    }

    async fn get_by_id(&self, record_id: Uuid) -> Result<Option<DeadLetterRecord>> {
        Ok(self.records.read().await.iter().find(|r| r.record_id == record_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn store_and_get_round_trips() {
        let repo = InMemoryDeadLetterRepository::new();
        let record = DeadLetterRecord::new(
            DeadLetterErrorCode::JsonParse,
            "malformed body",
            "unexpected token",
            json!("not json"),
        );
        let id = record.record_id;
        repo.store(record).await.unwrap();

        let fetched = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(fetched.error_code, DeadLetterErrorCode::JsonParse);
        assert_eq!(fetched.retry_count, 0);
    }

    #[tokio::test]
    async fn query_by_time_range_filters() {
        let repo = InMemoryDeadLetterRepository::new();
        let record = DeadLetterRecord::new(DeadLetterErrorCode::SchemaValidation, "missing type", "field 'type' required", json!({}));
        repo.store(record).await.unwrap();

        let now = Utc::now();
        let in_range = repo
            .query_by_time_range((now - chrono::Duration::minutes(1))..(now + chrono::Duration::minutes(1)))
            .await
            .unwrap();
        assert_eq!(in_range.len(), 1);

        let out_of_range = repo
            .query_by_time_range((now + chrono::Duration::hours(1))..(now + chrono::Duration::hours(2)))
            .await
            .unwrap();
        assert!(out_of_range.is_empty());
    }
}
