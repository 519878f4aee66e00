//! `ProcessedEventRecord` data model and the durable `ProcessedEventRepository`
//! contract (§3, §4.6) — tier 2 of the two-tier idempotency check (§4.2).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[cfg(feature = "postgres")]
use sea_query::{Expr, OnConflict, PostgresQueryBuilder, Query};
#[cfg(feature = "postgres")]
use sea_query::Iden;
#[cfg(feature = "postgres")]
use sqlx::{PgPool, Row};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct ProcessedEventRecord {
    pub idempotency_key: String,
    pub event_id: Uuid,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessedEventRepositoryError {
    #[error("registry write failed: {0}")]
    WriteFailed(String),
}

pub type Result<T> = std::result::Result<T, ProcessedEventRepositoryError>;

/// The durable registry (§4.2 tier 2, §5: "exactly one successful dispatch
/// even with concurrent redelivery enforced by... the durable registry's
/// uniqueness"). For a given `idempotencyKey`, at most one record (§3).
#[async_trait]
pub trait ProcessedEventRepository: Send + Sync {
    async fn check_processed(&self, idempotency_key: &str) -> Result<Option<ProcessedEventRecord>>;
    async fn mark_processed(&self, idempotency_key: &str, event_id: Uuid) -> Result<()>;
    async fn get_by_id(&self, idempotency_key: &str) -> Result<Option<ProcessedEventRecord>>;
}

/// In-memory durable registry — "durable" only within process lifetime,
/// used by the default `channel`/test profile. A `postgres`-feature-gated
/// implementation backs production deployments where the registry must
/// survive process restarts.
#[derive(Clone)]
pub struct InMemoryProcessedEventRepository {
    records: Arc<RwLock<HashMap<String, ProcessedEventRecord>>>,
}

impl InMemoryProcessedEventRepository {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryProcessedEventRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessedEventRepository for InMemoryProcessedEventRepository {
    async fn check_processed(&self, idempotency_key: &str) -> Result<Option<ProcessedEventRecord>> {
        Ok(self.records.read().await.get(idempotency_key).cloned())
    }

    async fn mark_processed(&self, idempotency_key: &str, event_id: Uuid) -> Result<()> {
        // At most one record per key (§3): first writer wins, matching the
        // durable registry's uniqueness constraint under concurrent
        // redelivery of the same idempotency key.
        self.records
            .write()
            .await
            .entry(idempotency_key.to_string())
            .or_insert_with(|| ProcessedEventRecord {
                idempotency_key: idempotency_key.to_string(),
                event_id,
                processed_at: Utc::now(),
            });
        Ok(())
    }

    async fn get_by_id(&self, idempotency_key: &str) -> Result<Option<ProcessedEventRecord>> {
        self.check_processed(idempotency_key).await
    }
}

#[cfg(feature = "postgres")]
#[derive(Iden)]
enum ProcessedEvents {
    Table,
    IdempotencyKey,
    EventId,
    ProcessedAt,
}

/// PostgreSQL-backed durable registry (mirrors the teacher's
/// `src/storage/postgres/position_store.rs`: a sea-query-built upsert over
/// a `sqlx::PgPool`).
#[cfg(feature = "postgres")]
pub struct PostgresProcessedEventRepository {
    pool: PgPool,
}

#[cfg(feature = "postgres")]
impl PostgresProcessedEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[cfg(feature = "postgres")]
#[async_trait]
impl ProcessedEventRepository for PostgresProcessedEventRepository {
    async fn check_processed(&self, idempotency_key: &str) -> Result<Option<ProcessedEventRecord>> {
        self.get_by_id(idempotency_key).await
    }

    async fn mark_processed(&self, idempotency_key: &str, event_id: Uuid) -> Result<()> {
        let processed_at = Utc::now();
        let query = Query::insert()
            .into_table(ProcessedEvents::Table)
            .columns([
                ProcessedEvents::IdempotencyKey,
                ProcessedEvents::EventId,
                ProcessedEvents::ProcessedAt,
            ])
            .values_panic([
                idempotency_key.into(),
                event_id.to_string().into(),
                processed_at.to_rfc3339().into(),
            ])
            .on_conflict(OnConflict::column(ProcessedEvents::IdempotencyKey).do_nothing().to_owned())
            .to_string(PostgresQueryBuilder);

        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(|e| ProcessedEventRepositoryError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    async fn get_by_id(&self, idempotency_key: &str) -> Result<Option<ProcessedEventRecord>> {
        let query = Query::select()
            .columns([
                ProcessedEvents::IdempotencyKey,
                ProcessedEvents::EventId,
                ProcessedEvents::ProcessedAt,
            ])
            .from(ProcessedEvents::Table)
            .and_where(Expr::col(ProcessedEvents::IdempotencyKey).eq(idempotency_key))
            .to_string(PostgresQueryBuilder);

        let row = sqlx::query(&query)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ProcessedEventRepositoryError::WriteFailed(e.to_string()))?;

        Ok(match row {
            Some(row) => {
                let event_id: String = row.get("event_id");
                let processed_at: String = row.get("processed_at");
                Some(ProcessedEventRecord {
                    idempotency_key: idempotency_key.to_string(),
                    event_id: Uuid::parse_str(&event_id).map_err(|e| ProcessedEventRepositoryError::WriteFailed(e.to_string()))?,
                    processed_at: DateTime::parse_from_rfc3339(&processed_at)
                        .map_err(|e| ProcessedEventRepositoryError::WriteFailed(e.to_string()))?
                        .with_timezone(&Utc),
                })
            }
            None => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mark_processed_is_first_writer_wins() {
        let repo = InMemoryProcessedEventRepository::new();
        let first_event = Uuid::new_v4();
        let second_event = Uuid::new_v4();

        repo.mark_processed("key-1", first_event).await.unwrap();
        repo.mark_processed("key-1", second_event).await.unwrap();

        let record = repo.check_processed("key-1").await.unwrap().unwrap();
        assert_eq!(record.event_id, first_event);
    }

    #[tokio::test]
    async fn check_processed_is_none_for_unseen_key() {
        let repo = InMemoryProcessedEventRepository::new();
        assert!(repo.check_processed("never-seen").await.unwrap().is_none());
    }
}
