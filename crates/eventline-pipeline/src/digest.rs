//! Periodic digest runner: builds one grouped-by-topic summary of
//! recently touched events and publishes it at most once per rolling
//! window, deduplicated by content hash so a retried or overlapping run
//! never double-posts (I7).

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use crate::error::PipelineResult;
use crate::repo::{EventRow, PublishedPostRow};

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DigestSummary {
    pub candidates: u32,
    pub status: &'static str,
    pub content_hash: String,
}

fn topic_label(topic: &str) -> String {
    match topic {
        "macro_econ" => "Macro Econ",
        "central_banks" => "Central Banks",
        "equities" => "Equities",
        "credit" => "Credit",
        "rates" => "Rates",
        "fx" => "FX",
        "commodities" => "Commodities",
        "crypto" => "Crypto",
        "war_security" => "War / Security",
        "geopolitics" => "Geopolitics",
        "company_specific" => "Company Specific",
        _ => "Other",
    }
    .to_string()
}

/// Render the digest text for a set of events, grouped by topic label and
/// sorted alphabetically within and across groups.
fn build_digest_text(events: &[EventRow], window_hours: i64) -> String {
    let mut by_topic: BTreeMap<String, Vec<&EventRow>> = BTreeMap::new();
    for event in events {
        by_topic.entry(topic_label(&event.topic)).or_default().push(event);
    }

    let now = Utc::now().format("%Y-%m-%d %H:%M UTC");
    let mut lines = Vec::new();
    lines.push(format!("Eventline Digest — last {window_hours}h (generated {now})"));
    lines.push(String::new());

    if by_topic.is_empty() {
        lines.push("Counts: 0".to_string());
    } else {
        let counts = by_topic
            .iter()
            .map(|(topic, items)| format!("{topic}: {}", items.len()))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("Counts: {counts}"));
    }
    lines.push(String::new());

    for (topic, items) in &by_topic {
        lines.push(format!("== {topic} =="));
        for event in items {
            let summary = event.summary.trim();
            let summary = if summary.is_empty() { "(no summary)" } else { summary };
            let impact = event
                .impact_score
                .map(|v| v.to_string())
                .unwrap_or_else(|| "n/a".to_string());
            lines.push(format!("- {summary} (impact={impact})"));
        }
        lines.push(String::new());
    }

    lines.push("Note: informational only; no investment advice. Uncorroborated items may be included and are labeled accordingly.".to_string());
    let mut text = lines.join("\n").trim().to_string();
    text.push('\n');
    text
}

fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

async fn digest_candidates(since: DateTime<Utc>, pool: &PgPool) -> PipelineResult<Vec<EventRow>> {
    sqlx::query_as::<_, EventRow>(
        r#"
        SELECT * FROM events
        WHERE last_updated_at >= $1
           OR (event_time IS NOT NULL AND event_time >= $1)
        ORDER BY last_updated_at DESC
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await
    .map_err(Into::into)
}

/// Run one digest cycle over events touched in the last `window_hours`
/// hours, publishing the rendered text to `destination` unless an
/// identical digest already published there within the same window (I7).
pub async fn run_digest(window_hours: i64, destination: &str, pool: &PgPool) -> PipelineResult<DigestSummary> {
    let since = Utc::now() - Duration::hours(window_hours);
    let candidates = digest_candidates(since, pool).await?;
    let text = build_digest_text(&candidates, window_hours);
    let hash = content_hash(&text);

    let mut summary = DigestSummary {
        candidates: candidates.len() as u32,
        status: "published",
        content_hash: hash.clone(),
    };

    if PublishedPostRow::was_published_since(&hash, destination, since, pool).await? {
        summary.status = "skipped_duplicate";
        tracing::info!(destination, hash = %hash, "digest_skip_duplicate");
        return Ok(summary);
    }

    PublishedPostRow::record(None, destination, &text, &hash, pool).await?;
    tracing::info!(destination, hash = %hash, candidates = summary.candidates, "digest_published");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: i64, topic: &str, summary: &str) -> EventRow {
        EventRow {
            id,
            event_fingerprint: "a|b|c|d|e|f|g|h".to_string(),
            topic: topic.to_string(),
            summary: summary.to_string(),
            impact_score: Some(70.0),
            is_breaking: false,
            breaking_window: None,
            event_time: Some(Utc::now()),
            latest_extraction_id: None,
            repeat_low_delta_count: 0,
            created_at: Utc::now(),
            last_updated_at: Utc::now(),
        }
    }

    #[test]
    fn content_hash_is_stable_and_sensitive_to_text() {
        let a = build_digest_text(&[event(1, "equities", "Apple beats earnings.")], 24);
        let b = build_digest_text(&[event(1, "equities", "Apple beats earnings.")], 24);
        let c = build_digest_text(&[event(1, "equities", "Apple misses earnings.")], 24);
        assert_eq!(content_hash(&a), content_hash(&b));
        assert_ne!(content_hash(&a), content_hash(&c));
    }

    #[test]
    fn groups_events_by_topic_label_alphabetically() {
        let events = vec![
            event(1, "equities", "Apple beats earnings."),
            event(2, "war_security", "Missile strike reported."),
        ];
        let text = build_digest_text(&events, 24);
        let equities_pos = text.find("== Equities ==").unwrap();
        let war_pos = text.find("== War / Security ==").unwrap();
        assert!(equities_pos < war_pos);
    }

    #[test]
    fn empty_candidates_still_render_counts_line() {
        let text = build_digest_text(&[], 24);
        assert!(text.contains("Counts: 0"));
    }
}
