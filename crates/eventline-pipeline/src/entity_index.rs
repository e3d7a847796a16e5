//! Indexes the country/org/person/ticker entities named in an extraction so
//! they can be queried independent of any one event or message.

use chrono::{DateTime, Utc};
use eventline_core::types::ExtractionPayload;
use sqlx::PgPool;

use crate::error::PipelineResult;
use crate::repo::EntityMentionRow;

#[allow(clippy::too_many_arguments)]
async fn upsert_entity_mention(
    raw_message_id: i64,
    entity_type: &str,
    entity_value: &str,
    event_id: Option<i64>,
    topic: &str,
    is_breaking: bool,
    event_time: Option<DateTime<Utc>>,
    pool: &PgPool,
) -> PipelineResult<EntityMentionRow> {
    let existing = sqlx::query_as::<_, EntityMentionRow>(
        "SELECT * FROM entity_mentions WHERE raw_message_id = $1 AND entity_type = $2 AND entity_value = $3",
    )
    .bind(raw_message_id)
    .bind(entity_type)
    .bind(entity_value)
    .fetch_optional(pool)
    .await?;

    // topic/is_breaking/event_time are set only at first insert — a
    // re-insert may only upgrade event_id, never rewrite the original
    // snapshot those fields captured.
    if let Some(row) = existing {
        if event_id.is_some() {
            let upgraded = sqlx::query_as::<_, EntityMentionRow>(
                "UPDATE entity_mentions SET event_id = $2 WHERE id = $1 RETURNING *",
            )
            .bind(row.id)
            .bind(event_id)
            .fetch_one(pool)
            .await?;
            return Ok(upgraded);
        }
        return Ok(row);
    }

    sqlx::query_as::<_, EntityMentionRow>(
        r#"
        INSERT INTO entity_mentions (raw_message_id, entity_type, entity_value, event_id, topic, is_breaking, event_time)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(raw_message_id)
    .bind(entity_type)
    .bind(entity_value)
    .bind(event_id)
    .bind(topic)
    .bind(is_breaking)
    .bind(event_time)
    .fetch_one(pool)
    .await
    .map_err(Into::into)
}

/// Record entity mentions for every country, org, person, and ticker named
/// in an extraction. Tickers participate in this index even though the
/// triage entity signature excludes them.
pub async fn index_entities_for_extraction(
    raw_message_id: i64,
    event_id: Option<i64>,
    payload: &ExtractionPayload,
    pool: &PgPool,
) -> PipelineResult<()> {
    let event_time = payload.event_time;
    let topic = payload.topic.as_str();
    let is_breaking = payload.is_breaking;

    for country in &payload.entities.countries {
        upsert_entity_mention(raw_message_id, "country", country, event_id, topic, is_breaking, event_time, pool).await?;
    }
    for org in &payload.entities.orgs {
        upsert_entity_mention(raw_message_id, "org", org, event_id, topic, is_breaking, event_time, pool).await?;
    }
    for person in &payload.entities.people {
        upsert_entity_mention(raw_message_id, "person", person, event_id, topic, is_breaking, event_time, pool).await?;
    }
    for ticker in &payload.entities.tickers {
        upsert_entity_mention(raw_message_id, "ticker", ticker, event_id, topic, is_breaking, event_time, pool).await?;
    }
    Ok(())
}

/// Query entity mentions by type and optional value/time filters, most
/// recent event-time first (nulls last), ties broken by id descending.
pub async fn query_entity_mentions(
    entity_type: &str,
    entity_value: Option<&str>,
    since: Option<DateTime<Utc>>,
    limit: i64,
    pool: &PgPool,
) -> PipelineResult<Vec<EntityMentionRow>> {
    sqlx::query_as::<_, EntityMentionRow>(
        r#"
        SELECT * FROM entity_mentions
        WHERE entity_type = $1
          AND ($2::text IS NULL OR entity_value = $2)
          AND ($3::timestamptz IS NULL OR event_time >= $3)
        ORDER BY event_time DESC NULLS LAST, id DESC
        LIMIT $4
        "#,
    )
    .bind(entity_type)
    .bind(entity_value)
    .bind(since)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(Into::into)
}
