//! Resolves the real `TriageContext` the triage engine needs: the
//! candidate event (if any) sharing this extraction's fingerprint within
//! its merge window, the last-known snapshot of that event for novelty
//! comparison, and — when no candidate was found — whether a soft-related
//! event nearby shares enough entities to warrant a downgrade.

use chrono::{DateTime, Utc};
use eventline_core::triage::{
    classify_source, entity_signature_from_entities, impact_band, soft_related_overlap_count, summary_tags,
    CandidateEventContext, TriageContext,
};
use eventline_core::types::{ExtractionEntities, ExtractionPayload};
use eventline_core::window::event_time_window;
use sqlx::PgPool;

use crate::error::PipelineResult;
use crate::event_upsert::find_candidate_event;
use crate::repo::{EventRow, ExtractionRow};

/// The triage context plus the resolved candidate event, so the caller can
/// reuse the same row for the upsert instead of re-querying it.
pub struct ResolvedContext {
    pub triage_context: TriageContext,
    pub candidate: Option<EventRow>,
}

/// Build the real triage context for an extraction against the current
/// database state. `event_time` must be the already-resolved effective
/// event time (payload time, or "now" when absent).
pub async fn resolve_triage_context(
    raw_message_id: i64,
    payload: &ExtractionPayload,
    event_time: DateTime<Utc>,
    pool: &PgPool,
) -> PipelineResult<ResolvedContext> {
    let candidate = find_candidate_event(
        payload.topic,
        payload.is_breaking,
        &payload.event_fingerprint,
        event_time,
        pool,
    )
    .await?;

    let Some(event) = candidate else {
        let soft_related_match = has_soft_related_match(raw_message_id, payload, event_time, pool).await?;
        return Ok(ResolvedContext {
            triage_context: TriageContext {
                existing_event_id: None,
                candidate_event: None,
                soft_related_match,
                burst_low_delta_prior_count: 0,
            },
            candidate: None,
        });
    };

    let candidate_event = match event.latest_extraction_id {
        Some(extraction_id) => candidate_event_context(extraction_id, pool).await?,
        None => None,
    };

    Ok(ResolvedContext {
        triage_context: TriageContext {
            existing_event_id: Some(event.id),
            candidate_event,
            soft_related_match: false,
            burst_low_delta_prior_count: event.repeat_low_delta_count,
        },
        candidate: Some(event),
    })
}

async fn candidate_event_context(extraction_id: i64, pool: &PgPool) -> PipelineResult<Option<CandidateEventContext>> {
    let Some(extraction) = ExtractionRow::find_by_id(extraction_id, pool).await? else {
        return Ok(None);
    };

    let entities: ExtractionEntities = serde_json::from_value(extraction.entities.clone())?;

    Ok(Some(CandidateEventContext {
        impact_band: Some(impact_band(extraction.impact_score).to_string()),
        entities: Some(entity_signature_from_entities(&entities)),
        summary_tags: Some(
            summary_tags(&extraction.summary_1_sentence)
                .into_iter()
                .map(|s| s.to_string())
                .collect(),
        ),
        source_class: Some(classify_source(extraction.source_claimed.as_deref(), &extraction.summary_1_sentence).to_string()),
    }))
}

/// When no candidate event was found by fingerprint, check nearby
/// same-topic extractions for enough entity overlap to count as a soft
/// related match (>= 2 shared entities, per the triage engine's threshold).
async fn has_soft_related_match(
    raw_message_id: i64,
    payload: &ExtractionPayload,
    event_time: DateTime<Utc>,
    pool: &PgPool,
) -> PipelineResult<bool> {
    let window = event_time_window(payload.topic, payload.is_breaking);
    let nearby = ExtractionRow::find_recent_by_topic(
        payload.topic.as_str(),
        event_time - window,
        event_time + window,
        raw_message_id,
        pool,
    )
    .await?;

    for extraction in &nearby {
        let entities: ExtractionEntities = serde_json::from_value(extraction.entities.clone())?;
        let candidate_entities = entity_signature_from_entities(&entities);
        if soft_related_overlap_count(payload, &candidate_entities) >= 2 {
            return Ok(true);
        }
    }
    Ok(false)
}
