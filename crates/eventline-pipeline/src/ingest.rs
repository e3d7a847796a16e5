//! Ingest Gateway: the write side of the `/ingest` endpoint.

use chrono::{DateTime, Utc};
use eventline_core::normalize::normalize_message_text;
use sqlx::PgPool;

use crate::error::PipelineResult;
use crate::repo::{EventMessageRow, ProcessingStateRow, RawMessageRow};

#[derive(Debug, Clone, serde::Serialize)]
pub struct IngestResult {
    pub status: &'static str,
    pub raw_message_id: i64,
    pub event_id: Option<i64>,
    pub event_action: Option<String>,
}

/// Normalize, idempotently persist, and enqueue a raw message for Phase-2
/// extraction. Never drives extraction itself.
pub async fn process_ingest_payload(
    source_channel_id: &str,
    source_channel_name: Option<&str>,
    upstream_message_id: i64,
    message_time: DateTime<Utc>,
    raw_text: &str,
    pool: &PgPool,
) -> PipelineResult<IngestResult> {
    let normalized_text = normalize_message_text(raw_text);

    let (row, is_new) = RawMessageRow::insert_or_get(
        source_channel_id,
        source_channel_name,
        upstream_message_id,
        raw_text,
        &normalized_text,
        message_time,
        pool,
    )
    .await?;

    if !is_new {
        let event_id = EventMessageRow::find_event_id_for_message(row.id, pool).await?;

        let event_action = match event_id {
            Some(id) => {
                sqlx::query_as::<_, (String,)>(
                    "SELECT event_action FROM routing_decisions WHERE event_id = $1 ORDER BY created_at DESC LIMIT 1",
                )
                .bind(id)
                .fetch_optional(pool)
                .await?
                .map(|(action,)| action)
            }
            None => None,
        };

        return Ok(IngestResult {
            status: "duplicate",
            raw_message_id: row.id,
            event_id,
            event_action,
        });
    }

    ProcessingStateRow::ensure(row.id, pool).await?;

    Ok(IngestResult {
        status: "created",
        raw_message_id: row.id,
        event_id: None,
        event_action: None,
    })
}
