//! Field-wise monotonic merge of an extraction into a candidate event.

use chrono::{DateTime, Utc};
use eventline_core::types::{ExtractionPayload, Topic};
use eventline_core::window::event_time_window;
use sqlx::PgPool;

use crate::error::PipelineResult;
use crate::repo::{EventMessageRow, EventRow};

fn breaking_window_rank(window: &str) -> i32 {
    match window {
        "15m" => 3,
        "1h" => 2,
        "4h" => 1,
        _ => 0,
    }
}

/// Find the most recently touched candidate event sharing this extraction's
/// fingerprint within the topic-aware merge window around `event_time`
/// (I4). `event_time` must already be the *effective* event time — callers
/// resolve a missing `event_time` to "now" before calling this.
pub async fn find_candidate_event(
    topic: Topic,
    is_breaking: bool,
    event_fingerprint: &str,
    event_time: DateTime<Utc>,
    pool: &PgPool,
) -> PipelineResult<Option<EventRow>> {
    let window = event_time_window(topic, is_breaking);
    let window_start = event_time - window;
    let window_end = event_time + window;
    EventRow::find_candidate(event_fingerprint, window_start, window_end, pool).await
}

/// Fields of an event that guarded-merge touched, for logging.
#[derive(Debug, Default, Clone)]
pub struct EventChanges {
    pub fields: Vec<&'static str>,
}

/// Apply an extraction's fields onto an in-memory copy of an event,
/// following the monotonic-refinement rules: summary only replaces when
/// non-empty and different, impact only rises, breaking state only
/// escalates, event_time and topic fill only when previously unset.
pub fn merge_extraction_into_event(event: &mut EventRow, extraction_id: i64, payload: &ExtractionPayload) -> EventChanges {
    let mut changes = EventChanges::default();

    if !payload.summary_1_sentence.trim().is_empty() && payload.summary_1_sentence != event.summary {
        event.summary = payload.summary_1_sentence.clone();
        changes.fields.push("summary");
    }

    match event.impact_score {
        None => {
            event.impact_score = Some(payload.impact_score);
            changes.fields.push("impact_score");
        }
        Some(existing) if payload.impact_score > existing => {
            event.impact_score = Some(payload.impact_score);
            changes.fields.push("impact_score");
        }
        _ => {}
    }

    if event.topic.is_empty() && event.topic != payload.topic.as_str() {
        event.topic = payload.topic.as_str().to_string();
        changes.fields.push("topic");
    }

    if payload.is_breaking && !event.is_breaking {
        event.is_breaking = true;
        changes.fields.push("is_breaking");
    }
    let incoming_rank = breaking_window_rank(payload.breaking_window.as_str());
    let existing_rank = event.breaking_window.as_deref().map(breaking_window_rank).unwrap_or(0);
    if payload.is_breaking && incoming_rank > existing_rank {
        event.breaking_window = Some(payload.breaking_window.as_str().to_string());
        changes.fields.push("breaking_window");
    }

    if event.event_time.is_none() {
        if let Some(event_time) = payload.event_time {
            event.event_time = Some(event_time);
            changes.fields.push("event_time");
        }
    }

    event.latest_extraction_id = Some(extraction_id);
    event.last_updated_at = Utc::now();
    changes.fields.sort_unstable();
    changes
}

/// Create or update the event a given extraction belongs to, given a
/// candidate already resolved by the caller (the triage-context builder
/// resolves the same candidate, so the query isn't repeated here). Always
/// links the raw message to the resulting event (I5).
pub async fn upsert_event(
    extraction_id: i64,
    raw_message_id: i64,
    payload: &ExtractionPayload,
    candidate: Option<EventRow>,
    pool: &PgPool,
) -> PipelineResult<(EventRow, bool)> {
    match candidate {
        Some(mut event) => {
            let changes = merge_extraction_into_event(&mut event, extraction_id, payload);
            let updated = sqlx::query_as::<_, EventRow>(
                r#"
                UPDATE events SET
                    summary = $2, impact_score = $3, topic = $4, is_breaking = $5,
                    breaking_window = $6, event_time = $7, latest_extraction_id = $8,
                    last_updated_at = now()
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(event.id)
            .bind(&event.summary)
            .bind(event.impact_score)
            .bind(&event.topic)
            .bind(event.is_breaking)
            .bind(&event.breaking_window)
            .bind(event.event_time)
            .bind(event.latest_extraction_id)
            .fetch_one(pool)
            .await?;

            EventMessageRow::link(updated.id, raw_message_id, pool).await?;
            tracing::info!(event_id = updated.id, fields = ?changes.fields, "event_update");
            Ok((updated, false))
        }
        None => {
            // A newly created event's time is always defaulted — never left
            // null — so later fingerprint+window lookups can actually find it.
            let effective_event_time = payload.event_time.unwrap_or_else(Utc::now);
            let created = sqlx::query_as::<_, EventRow>(
                r#"
                INSERT INTO events
                    (event_fingerprint, topic, summary, impact_score, is_breaking, breaking_window,
                     event_time, latest_extraction_id, repeat_low_delta_count)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0)
                RETURNING *
                "#,
            )
            .bind(&payload.event_fingerprint)
            .bind(payload.topic.as_str())
            .bind(&payload.summary_1_sentence)
            .bind(payload.impact_score)
            .bind(payload.is_breaking)
            .bind(if payload.is_breaking { Some(payload.breaking_window.as_str().to_string()) } else { None })
            .bind(effective_event_time)
            .bind(extraction_id)
            .fetch_one(pool)
            .await?;

            EventMessageRow::link(created.id, raw_message_id, pool).await?;
            tracing::info!(event_id = created.id, "event_create");
            Ok((created, true))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventline_core::types::{BreakingWindow, ExtractionEntities, Sentiment};

    fn base_event() -> EventRow {
        EventRow {
            id: 1,
            event_fingerprint: "a|b|c|d|e|f|g|h".to_string(),
            topic: "geopolitics".to_string(),
            summary: "Initial summary.".to_string(),
            impact_score: Some(50.0),
            is_breaking: false,
            breaking_window: None,
            event_time: Some(Utc::now()),
            latest_extraction_id: Some(1),
            repeat_low_delta_count: 0,
            created_at: Utc::now(),
            last_updated_at: Utc::now(),
        }
    }

    fn base_payload() -> ExtractionPayload {
        ExtractionPayload {
            topic: Topic::Geopolitics,
            entities: ExtractionEntities::default(),
            affected_countries_first_order: vec![],
            market_stats: vec![],
            sentiment: Sentiment::Unknown,
            confidence: 0.8,
            impact_score: 50.0,
            is_breaking: false,
            breaking_window: BreakingWindow::None,
            event_time: None,
            source_claimed: None,
            summary_1_sentence: "Initial summary.".to_string(),
            keywords: vec![],
            event_fingerprint: "a|b|c|d|e|f|g|h".to_string(),
        }
    }

    #[test]
    fn impact_only_rises() {
        let mut event = base_event();
        let mut payload = base_payload();
        payload.impact_score = 30.0;
        let changes = merge_extraction_into_event(&mut event, 2, &payload);
        assert_eq!(event.impact_score, Some(50.0));
        assert!(!changes.fields.contains(&"impact_score"));

        payload.impact_score = 70.0;
        let changes = merge_extraction_into_event(&mut event, 3, &payload);
        assert_eq!(event.impact_score, Some(70.0));
        assert!(changes.fields.contains(&"impact_score"));
    }

    #[test]
    fn summary_only_replaces_when_non_empty_and_different() {
        let mut event = base_event();
        let mut payload = base_payload();
        payload.summary_1_sentence = "   ".to_string();
        let changes = merge_extraction_into_event(&mut event, 2, &payload);
        assert_eq!(event.summary, "Initial summary.");
        assert!(!changes.fields.contains(&"summary"));

        payload.summary_1_sentence = "Updated summary.".to_string();
        let changes = merge_extraction_into_event(&mut event, 3, &payload);
        assert_eq!(event.summary, "Updated summary.");
        assert!(changes.fields.contains(&"summary"));
    }

    #[test]
    fn breaking_state_only_escalates() {
        let mut event = base_event();
        let mut payload = base_payload();
        payload.is_breaking = true;
        payload.breaking_window = BreakingWindow::OneHour;
        let changes = merge_extraction_into_event(&mut event, 2, &payload);
        assert!(event.is_breaking);
        assert_eq!(event.breaking_window.as_deref(), Some("1h"));
        assert!(changes.fields.contains(&"is_breaking"));
        assert!(changes.fields.contains(&"breaking_window"));

        payload.breaking_window = BreakingWindow::FourHours;
        let changes = merge_extraction_into_event(&mut event, 3, &payload);
        assert_eq!(event.breaking_window.as_deref(), Some("1h"));
        assert!(!changes.fields.contains(&"breaking_window"));
    }

    #[test]
    fn event_time_fills_only_when_previously_unset() {
        let mut event = base_event();
        event.event_time = None;
        let mut payload = base_payload();
        let now = Utc::now();
        payload.event_time = Some(now);
        let changes = merge_extraction_into_event(&mut event, 2, &payload);
        assert_eq!(event.event_time, Some(now));
        assert!(changes.fields.contains(&"event_time"));

        let later = now + chrono::Duration::hours(1);
        payload.event_time = Some(later);
        let changes = merge_extraction_into_event(&mut event, 3, &payload);
        assert_eq!(event.event_time, Some(now));
        assert!(!changes.fields.contains(&"event_time"));
    }
}
