use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use voxflow_core::{
    ConversationEvent, ConversationId, EventStore, EventType, StoreError, TenantId, TraceId,
};

use super::RepositoryError;
use crate::DbPool;

/// Durable home of the append-only event log. Appends are idempotent on
/// the `(trace_id, sequence_number)` unique key, which is what makes the
/// bus's at-least-once flush retries safe.
pub struct SqlEventLogRepository {
    pool: DbPool,
}

impl SqlEventLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, events: &[ConversationEvent]) -> Result<(), RepositoryError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for event in events {
            let metadata_json = if event.metadata.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&event.metadata).map_err(|error| {
                    RepositoryError::Decode(format!("metadata serialization failed: {error}"))
                })?)
            };
            sqlx::query(
                "INSERT INTO conversation_event (
                    event_id,
                    event_type,
                    schema_version,
                    trace_id,
                    sequence_number,
                    tenant_id,
                    conversation_id,
                    occurred_at,
                    data_json,
                    metadata_json
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (trace_id, sequence_number) DO NOTHING",
            )
            .bind(&event.event_id)
            .bind(event.event_type.as_str())
            .bind(&event.schema_version)
            .bind(event.trace_id.as_str())
            .bind(event.sequence_number as i64)
            .bind(&event.tenant_id.0)
            .bind(&event.conversation_id.0)
            .bind(event.occurred_at.to_rfc3339())
            .bind(event.data.to_string())
            .bind(metadata_json.as_deref())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn list_for_trace(
        &self,
        trace_id: &TraceId,
    ) -> Result<Vec<ConversationEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                event_id,
                event_type,
                schema_version,
                trace_id,
                sequence_number,
                tenant_id,
                conversation_id,
                occurred_at,
                data_json,
                metadata_json
             FROM conversation_event
             WHERE trace_id = ?
             ORDER BY sequence_number ASC",
        )
        .bind(trace_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(event_from_row).collect()
    }

    /// Operational lookup for dashboards and support tooling.
    pub async fn list_for_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<ConversationEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                event_id,
                event_type,
                schema_version,
                trace_id,
                sequence_number,
                tenant_id,
                conversation_id,
                occurred_at,
                data_json,
                metadata_json
             FROM conversation_event
             WHERE conversation_id = ?
             ORDER BY trace_id ASC, sequence_number ASC",
        )
        .bind(&conversation_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(event_from_row).collect()
    }

    pub async fn list_for_tenant_between(
        &self,
        tenant_id: &TenantId,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ConversationEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                event_id,
                event_type,
                schema_version,
                trace_id,
                sequence_number,
                tenant_id,
                conversation_id,
                occurred_at,
                data_json,
                metadata_json
             FROM conversation_event
             WHERE tenant_id = ? AND occurred_at >= ? AND occurred_at < ?
             ORDER BY occurred_at ASC",
        )
        .bind(&tenant_id.0)
        .bind(from.to_rfc3339())
        .bind(until.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(event_from_row).collect()
    }
}

#[async_trait::async_trait]
impl EventStore for SqlEventLogRepository {
    async fn append_batch(&self, events: &[ConversationEvent]) -> Result<(), StoreError> {
        self.append(events).await.map_err(|error| StoreError::Write(error.to_string()))
    }

    async fn events_for_trace(
        &self,
        trace_id: &TraceId,
    ) -> Result<Vec<ConversationEvent>, StoreError> {
        self.list_for_trace(trace_id)
            .await
            .map_err(|error| StoreError::Read(error.to_string()))
    }
}

fn event_from_row(row: SqliteRow) -> Result<ConversationEvent, RepositoryError> {
    let event_type_raw: String = row.get("event_type");
    let event_type = EventType::parse(&event_type_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown event type tag `{event_type_raw}`"))
    })?;

    let occurred_at_raw: String = row.get("occurred_at");
    let occurred_at = DateTime::parse_from_rfc3339(&occurred_at_raw)
        .map_err(|error| {
            RepositoryError::Decode(format!("invalid occurred_at `{occurred_at_raw}`: {error}"))
        })?
        .with_timezone(&Utc);

    let data_raw: String = row.get("data_json");
    let data = serde_json::from_str(&data_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid data payload: {error}")))?;

    let metadata: BTreeMap<String, String> = match row.get::<Option<String>, _>("metadata_json") {
        Some(raw) => serde_json::from_str(&raw)
            .map_err(|error| RepositoryError::Decode(format!("invalid metadata: {error}")))?,
        None => BTreeMap::new(),
    };

    let sequence_number: i64 = row.get("sequence_number");

    Ok(ConversationEvent {
        event_id: row.get("event_id"),
        event_type,
        schema_version: row.get("schema_version"),
        trace_id: TraceId(row.get("trace_id")),
        sequence_number: sequence_number as u64,
        tenant_id: TenantId(row.get("tenant_id")),
        conversation_id: ConversationId(row.get("conversation_id")),
        occurred_at,
        data,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use voxflow_core::{
        ConversationId, EventDraft, EventStore, EventType, TenantId, TraceId,
    };

    use crate::{connect_with_settings, migrations};

    use super::SqlEventLogRepository;

    async fn repository() -> SqlEventLogRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("memory db");
        migrations::run_pending(&pool).await.expect("migrations apply");
        SqlEventLogRepository::new(pool)
    }

    fn event(
        trace: &TraceId,
        sequence: u64,
        event_type: EventType,
    ) -> voxflow_core::ConversationEvent {
        EventDraft::new(
            event_type,
            TenantId("t-100".to_owned()),
            ConversationId("c-1".to_owned()),
            json!({"objective_id": "email"}),
        )
        .with_metadata("locale", "en-US")
        .into_event(trace.clone(), sequence, json!({"objective_id": "email"}))
    }

    #[tokio::test]
    async fn appended_events_replay_in_sequence_order() {
        let repository = repository().await;
        let trace = TraceId::generate();

        repository
            .append(&[
                event(&trace, 2, EventType::ObjectiveStarted),
                event(&trace, 1, EventType::ConversationStarted),
                event(&trace, 3, EventType::ConversationEnded),
            ])
            .await
            .expect("append");

        let replayed = repository.events_for_trace(&trace).await.expect("replay");
        let sequences: Vec<u64> =
            replayed.iter().map(|event| event.sequence_number).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(replayed[0].metadata.get("locale").map(String::as_str), Some("en-US"));
    }

    #[tokio::test]
    async fn duplicate_appends_on_the_trace_sequence_key_are_ignored() {
        let repository = repository().await;
        let trace = TraceId::generate();
        let batch = vec![event(&trace, 1, EventType::ConversationStarted)];

        repository.append(&batch).await.expect("first write");
        repository.append(&batch).await.expect("retried flush of the same rows");

        let replayed = repository.list_for_trace(&trace).await.expect("replay");
        assert_eq!(replayed.len(), 1);
    }

    #[tokio::test]
    async fn conversation_lookup_spans_traces() {
        let repository = repository().await;
        let first = TraceId::generate();
        let second = TraceId::generate();

        repository
            .append(&[
                event(&first, 1, EventType::ConversationStarted),
                event(&second, 1, EventType::ConversationStarted),
            ])
            .await
            .expect("append");

        let events = repository
            .list_for_conversation(&ConversationId("c-1".to_owned()))
            .await
            .expect("conversation lookup");
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn tenant_window_lookup_filters_by_time() {
        let repository = repository().await;
        let trace = TraceId::generate();
        repository
            .append(&[event(&trace, 1, EventType::ConversationStarted)])
            .await
            .expect("append");

        let now = voxflow_core::chrono::Utc::now();
        let events = repository
            .list_for_tenant_between(
                &TenantId("t-100".to_owned()),
                now - voxflow_core::chrono::Duration::minutes(5),
                now + voxflow_core::chrono::Duration::minutes(5),
            )
            .await
            .expect("tenant lookup");
        assert_eq!(events.len(), 1);

        let none = repository
            .list_for_tenant_between(
                &TenantId("t-100".to_owned()),
                now + voxflow_core::chrono::Duration::minutes(10),
                now + voxflow_core::chrono::Duration::minutes(20),
            )
            .await
            .expect("empty window");
        assert!(none.is_empty());
    }
}
