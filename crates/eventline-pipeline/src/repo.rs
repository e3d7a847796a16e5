//! Row types and CRUD queries for the persisted schema.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

use crate::error::PipelineResult;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RawMessageRow {
    pub id: i64,
    pub source_channel_id: String,
    pub source_channel_name: Option<String>,
    pub upstream_message_id: i64,
    pub raw_text: String,
    pub normalized_text: String,
    pub message_time: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

impl RawMessageRow {
    /// Insert a raw message, tolerating a concurrent duplicate insert by
    /// falling back to a lookup on the unique `(source_channel_id,
    /// upstream_message_id)` pair.
    pub async fn insert_or_get(
        source_channel_id: &str,
        source_channel_name: Option<&str>,
        upstream_message_id: i64,
        raw_text: &str,
        normalized_text: &str,
        message_time: DateTime<Utc>,
        pool: &PgPool,
    ) -> PipelineResult<(Self, bool)> {
        let inserted = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO raw_messages
                (source_channel_id, source_channel_name, upstream_message_id, raw_text, normalized_text, message_time)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (source_channel_id, upstream_message_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(source_channel_id)
        .bind(source_channel_name)
        .bind(upstream_message_id)
        .bind(raw_text)
        .bind(normalized_text)
        .bind(message_time)
        .fetch_optional(pool)
        .await?;

        if let Some(row) = inserted {
            return Ok((row, true));
        }

        // Lost the race (or this is a genuine replay): the conflicting row
        // is the one Ingest's duplicate-outcome path must return.
        let existing = sqlx::query_as::<_, Self>(
            "SELECT * FROM raw_messages WHERE source_channel_id = $1 AND upstream_message_id = $2",
        )
        .bind(source_channel_id)
        .bind(upstream_message_id)
        .fetch_one(pool)
        .await?;
        Ok((existing, false))
    }

    pub async fn find_by_id(id: i64, pool: &PgPool) -> PipelineResult<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM raw_messages WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProcessingStateRow {
    pub id: i64,
    pub raw_message_id: i64,
    pub status: String,
    pub attempt_count: i32,
    pub last_attempted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub locked_until: Option<DateTime<Utc>>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub owner_run_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessingStateRow {
    pub async fn ensure(raw_message_id: i64, pool: &PgPool) -> PipelineResult<Self> {
        if let Some(row) = sqlx::query_as::<_, Self>(
            "SELECT * FROM message_processing_states WHERE raw_message_id = $1",
        )
        .bind(raw_message_id)
        .fetch_optional(pool)
        .await?
        {
            return Ok(row);
        }

        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO message_processing_states (raw_message_id, status)
            VALUES ($1, 'pending')
            ON CONFLICT (raw_message_id) DO UPDATE SET raw_message_id = EXCLUDED.raw_message_id
            RETURNING *
            "#,
        )
        .bind(raw_message_id)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    /// Messages eligible for another extraction attempt: `pending`,
    /// `failed`, or `in_progress` with an expired lease.
    pub async fn find_eligible(limit: i64, pool: &PgPool) -> PipelineResult<Vec<EligibleMessage>> {
        sqlx::query_as::<_, EligibleMessage>(
            r#"
            SELECT
                s.id AS state_id,
                s.raw_message_id AS raw_message_id,
                s.status AS status,
                s.attempt_count AS attempt_count,
                m.normalized_text AS normalized_text,
                m.message_time AS message_time,
                m.source_channel_name AS source_channel_name
            FROM message_processing_states s
            JOIN raw_messages m ON m.id = s.raw_message_id
            WHERE s.status IN ('pending', 'failed')
               OR (s.status = 'in_progress' AND s.lease_expires_at IS NOT NULL AND s.lease_expires_at < now())
            ORDER BY m.message_time ASC, m.id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn mark_in_progress(
        raw_message_id: i64,
        lease_seconds: i64,
        owner_run_id: &str,
        pool: &PgPool,
    ) -> PipelineResult<()> {
        sqlx::query(
            r#"
            UPDATE message_processing_states
            SET status = 'in_progress',
                lease_expires_at = now() + make_interval(secs => $2),
                owner_run_id = $3,
                attempt_count = attempt_count + 1,
                last_attempted_at = now(),
                last_error = NULL,
                updated_at = now()
            WHERE raw_message_id = $1
            "#,
        )
        .bind(raw_message_id)
        .bind(lease_seconds as f64)
        .bind(owner_run_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn mark_success(raw_message_id: i64, pool: &PgPool) -> PipelineResult<()> {
        sqlx::query(
            r#"
            UPDATE message_processing_states
            SET status = 'completed', completed_at = now(), last_error = NULL, lease_expires_at = NULL,
                owner_run_id = NULL, updated_at = now()
            WHERE raw_message_id = $1
            "#,
        )
        .bind(raw_message_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn mark_failure(raw_message_id: i64, error: &str, pool: &PgPool) -> PipelineResult<()> {
        sqlx::query(
            r#"
            UPDATE message_processing_states
            SET status = 'failed', last_error = $2, lease_expires_at = NULL,
                owner_run_id = NULL, updated_at = now()
            WHERE raw_message_id = $1
            "#,
        )
        .bind(raw_message_id)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }
}

/// Flattened view over a processing state joined with its raw message,
/// everything the extraction loop needs for one eligible item.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EligibleMessage {
    pub state_id: i64,
    pub raw_message_id: i64,
    pub status: String,
    pub attempt_count: i32,
    pub normalized_text: String,
    pub message_time: DateTime<Utc>,
    pub source_channel_name: Option<String>,
}

/// Advisory, database-backed named lock used to serialize scheduler runs
/// across process instances.
pub struct ProcessingLock;

impl ProcessingLock {
    pub async fn acquire(
        lock_name: &str,
        hold_seconds: i64,
        owner_run_id: &str,
        pool: &PgPool,
    ) -> PipelineResult<bool> {
        let acquired = sqlx::query(
            r#"
            INSERT INTO processing_locks (lock_name, locked_until, owner_run_id)
            VALUES ($1, now() + make_interval(secs => $2), $3)
            ON CONFLICT (lock_name) DO UPDATE
                SET locked_until = now() + make_interval(secs => $2), owner_run_id = $3
                WHERE processing_locks.locked_until < now()
            "#,
        )
        .bind(lock_name)
        .bind(hold_seconds as f64)
        .bind(owner_run_id)
        .execute(pool)
        .await?;
        Ok(acquired.rows_affected() > 0)
    }

    pub async fn release(lock_name: &str, owner_run_id: &str, pool: &PgPool) -> PipelineResult<()> {
        sqlx::query("DELETE FROM processing_locks WHERE lock_name = $1 AND owner_run_id = $2")
            .bind(lock_name)
            .bind(owner_run_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Read-only peek at whether a run currently holds the lock, with no
    /// side effects — unlike `acquire`, never mutates the row.
    pub async fn is_held(lock_name: &str, pool: &PgPool) -> PipelineResult<bool> {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT count(*) FROM processing_locks WHERE lock_name = $1 AND locked_until > now()",
        )
        .bind(lock_name)
        .fetch_one(pool)
        .await?;
        Ok(row.0 > 0)
    }
}

/// A single extractor's constant schema version for this crate. Bumped
/// only when the persisted extraction shape changes in a way old rows
/// can't be read back as.
pub const EXTRACTION_SCHEMA_VERSION: i32 = 1;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExtractionRow {
    pub id: i64,
    pub raw_message_id: i64,
    pub extractor_name: String,
    pub schema_version: i32,
    pub processing_run_id: String,
    pub topic: String,
    pub entities: Value,
    pub affected_countries_first_order: Vec<String>,
    pub market_stats: Value,
    pub sentiment: String,
    pub confidence: f64,
    pub impact_score: f64,
    pub is_breaking: bool,
    pub breaking_window: String,
    pub event_time: Option<DateTime<Utc>>,
    pub source_claimed: Option<String>,
    pub summary_1_sentence: String,
    pub keywords: Vec<String>,
    pub event_fingerprint: String,
    pub canonicalization_rules: Vec<String>,
    pub prompt_version: String,
    pub model_name: String,
    pub llm_raw_response: String,
    pub payload_raw: Value,
    pub payload_canonical: Value,
    pub metadata: Value,
    pub validated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[allow(clippy::too_many_arguments)]
impl ExtractionRow {
    /// Persist a validated, canonicalized extraction. `payload` is the
    /// post-canonicalization payload; `payload_raw` is the pre-canonicalization
    /// JSON the model actually returned, kept for audit/replay.
    pub async fn upsert(
        raw_message_id: i64,
        payload: &eventline_core::types::ExtractionPayload,
        payload_raw: &Value,
        canonicalization_rules: &[&str],
        prompt_version: &str,
        model_name: &str,
        extractor_name: &str,
        processing_run_id: &str,
        llm_raw_response: &str,
        latency_ms: u64,
        retries: u32,
        response_id: Option<&str>,
        pool: &PgPool,
    ) -> PipelineResult<Self> {
        let entities = serde_json::to_value(&payload.entities)?;
        let market_stats = serde_json::to_value(&payload.market_stats)?;
        let payload_canonical = serde_json::to_value(payload)?;
        let rules: Vec<String> = canonicalization_rules.iter().map(|s| s.to_string()).collect();
        let metadata = serde_json::json!({
            "latency_ms": latency_ms,
            "retries": retries,
            "response_id": response_id,
            "canonicalization_rules": rules,
        });

        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO extractions
                (raw_message_id, extractor_name, schema_version, processing_run_id, topic,
                 entities, affected_countries_first_order, market_stats,
                 sentiment, confidence, impact_score, is_breaking, breaking_window, event_time,
                 source_claimed, summary_1_sentence, keywords, event_fingerprint,
                 canonicalization_rules, prompt_version, model_name, llm_raw_response,
                 payload_raw, payload_canonical, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, $21, $22, $23, $24, $25)
            ON CONFLICT (raw_message_id) DO UPDATE SET
                extractor_name = EXCLUDED.extractor_name,
                schema_version = EXCLUDED.schema_version,
                processing_run_id = EXCLUDED.processing_run_id,
                topic = EXCLUDED.topic,
                entities = EXCLUDED.entities,
                affected_countries_first_order = EXCLUDED.affected_countries_first_order,
                market_stats = EXCLUDED.market_stats,
                sentiment = EXCLUDED.sentiment,
                confidence = EXCLUDED.confidence,
                impact_score = EXCLUDED.impact_score,
                is_breaking = EXCLUDED.is_breaking,
                breaking_window = EXCLUDED.breaking_window,
                event_time = EXCLUDED.event_time,
                source_claimed = EXCLUDED.source_claimed,
                summary_1_sentence = EXCLUDED.summary_1_sentence,
                keywords = EXCLUDED.keywords,
                event_fingerprint = EXCLUDED.event_fingerprint,
                canonicalization_rules = EXCLUDED.canonicalization_rules,
                prompt_version = EXCLUDED.prompt_version,
                model_name = EXCLUDED.model_name,
                llm_raw_response = EXCLUDED.llm_raw_response,
                payload_raw = EXCLUDED.payload_raw,
                payload_canonical = EXCLUDED.payload_canonical,
                metadata = EXCLUDED.metadata,
                validated_at = now()
            RETURNING *
            "#,
        )
        .bind(raw_message_id)
        .bind(extractor_name)
        .bind(EXTRACTION_SCHEMA_VERSION)
        .bind(processing_run_id)
        .bind(payload.topic.as_str())
        .bind(entities)
        .bind(&payload.affected_countries_first_order)
        .bind(market_stats)
        .bind(payload.sentiment.as_str())
        .bind(payload.confidence)
        .bind(payload.impact_score)
        .bind(payload.is_breaking)
        .bind(payload.breaking_window.as_str())
        .bind(payload.event_time)
        .bind(&payload.source_claimed)
        .bind(&payload.summary_1_sentence)
        .bind(&payload.keywords)
        .bind(&payload.event_fingerprint)
        .bind(rules)
        .bind(prompt_version)
        .bind(model_name)
        .bind(llm_raw_response)
        .bind(payload_raw)
        .bind(payload_canonical)
        .bind(metadata)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_id(id: i64, pool: &PgPool) -> PipelineResult<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM extractions WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Recent same-topic extractions with a known `event_time` inside the
    /// merge window, excluding the extraction currently being processed —
    /// used for the soft-related-match check when no candidate event was
    /// found by fingerprint.
    pub async fn find_recent_by_topic(
        topic: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        exclude_raw_message_id: i64,
        pool: &PgPool,
    ) -> PipelineResult<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM extractions
            WHERE topic = $1
              AND event_time IS NOT NULL
              AND event_time BETWEEN $2 AND $3
              AND raw_message_id != $4
            ORDER BY created_at DESC
            LIMIT 20
            "#,
        )
        .bind(topic)
        .bind(window_start)
        .bind(window_end)
        .bind(exclude_raw_message_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    pub id: i64,
    pub event_fingerprint: String,
    pub topic: String,
    pub summary: String,
    pub impact_score: Option<f64>,
    pub is_breaking: bool,
    pub breaking_window: Option<String>,
    pub event_time: Option<DateTime<Utc>>,
    pub latest_extraction_id: Option<i64>,
    pub repeat_low_delta_count: i32,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl EventRow {
    /// I4: an extraction merges into an existing event only when the
    /// fingerprint matches exactly and the candidate's `event_time` falls
    /// inside the topic-aware merge window. Ties broken by most recently
    /// updated.
    pub async fn find_candidate(
        event_fingerprint: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        pool: &PgPool,
    ) -> PipelineResult<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM events
            WHERE event_fingerprint = $1
              AND event_time IS NOT NULL
              AND event_time BETWEEN $2 AND $3
            ORDER BY last_updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(event_fingerprint)
        .bind(window_start)
        .bind(window_end)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_id(id: i64, pool: &PgPool) -> PipelineResult<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Advance or reset the repeat-low-delta streak used by the triage
    /// engine's burst cap. Resets to zero whenever a non-repeat update
    /// lands on the event.
    pub async fn update_repeat_low_delta_counter(event_id: i64, is_repeat: bool, pool: &PgPool) -> PipelineResult<()> {
        sqlx::query(
            r#"
            UPDATE events
            SET repeat_low_delta_count = CASE WHEN $2 THEN repeat_low_delta_count + 1 ELSE 0 END
            WHERE id = $1
            "#,
        )
        .bind(event_id)
        .bind(is_repeat)
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventMessageRow {
    pub id: i64,
    pub event_id: i64,
    pub raw_message_id: i64,
    pub created_at: DateTime<Utc>,
}

impl EventMessageRow {
    /// Idempotently link a raw message to an event. I5: a raw message
    /// links to at most one event, so a second link attempt for the same
    /// message is a no-op rather than an error.
    pub async fn link(event_id: i64, raw_message_id: i64, pool: &PgPool) -> PipelineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO event_messages (event_id, raw_message_id)
            VALUES ($1, $2)
            ON CONFLICT (raw_message_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(raw_message_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn find_event_id_for_message(raw_message_id: i64, pool: &PgPool) -> PipelineResult<Option<i64>> {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT event_id FROM event_messages WHERE raw_message_id = $1",
        )
        .bind(raw_message_id)
        .fetch_optional(pool)
        .await?;
        Ok(row.map(|(id,)| id))
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EntityMentionRow {
    pub id: i64,
    pub raw_message_id: i64,
    pub entity_type: String,
    pub entity_value: String,
    pub event_id: Option<i64>,
    pub topic: String,
    pub is_breaking: bool,
    pub event_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoutingDecisionRow {
    pub id: i64,
    pub extraction_id: i64,
    pub event_id: Option<i64>,
    pub store_to: Vec<String>,
    pub publish_priority: String,
    pub requires_evidence: bool,
    pub event_action: String,
    pub triage_action: Option<String>,
    pub triage_rules: Vec<String>,
    pub flags: Vec<String>,
    pub rules_fired: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[allow(clippy::too_many_arguments)]
impl RoutingDecisionRow {
    pub async fn insert(
        extraction_id: i64,
        event_id: Option<i64>,
        decision: &eventline_core::types::RoutingDecisionData,
        pool: &PgPool,
    ) -> PipelineResult<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO routing_decisions
                (extraction_id, event_id, store_to, publish_priority, requires_evidence,
                 event_action, triage_action, triage_rules, flags, rules_fired)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(extraction_id)
        .bind(event_id)
        .bind(&decision.store_to)
        .bind(decision.publish_priority.as_str())
        .bind(decision.requires_evidence)
        .bind(decision.event_action.as_str())
        .bind(decision.triage_action.map(|t| t.as_str().to_string()))
        .bind(&decision.triage_rules)
        .bind(&decision.flags)
        .bind(&decision.rules_fired)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PublishedPostRow {
    pub id: i64,
    pub event_id: Option<i64>,
    pub destination: String,
    pub content: String,
    pub content_hash: String,
    pub published_at: DateTime<Utc>,
}

impl PublishedPostRow {
    /// I7: dedup compares `(destination, content_hash)` only within the
    /// rolling window — a post that aged out of the window is fair game
    /// to republish.
    pub async fn was_published_since(
        content_hash: &str,
        destination: &str,
        since: DateTime<Utc>,
        pool: &PgPool,
    ) -> PipelineResult<bool> {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT count(*) FROM published_posts WHERE content_hash = $1 AND destination = $2 AND published_at >= $3",
        )
        .bind(content_hash)
        .bind(destination)
        .bind(since)
        .fetch_one(pool)
        .await?;
        Ok(row.0 > 0)
    }

    pub async fn record(
        event_id: Option<i64>,
        destination: &str,
        content: &str,
        content_hash: &str,
        pool: &PgPool,
    ) -> PipelineResult<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO published_posts (event_id, destination, content, content_hash) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(event_id)
        .bind(destination)
        .bind(content)
        .bind(content_hash)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }
}
