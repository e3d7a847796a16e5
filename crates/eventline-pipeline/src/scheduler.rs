//! Phase-2 extraction worker: claims a batch of eligible raw messages under
//! an advisory lock and drives each through the full extraction pipeline.

use chrono::Utc;
use eventline_core::prompt::render_extraction_prompt;
use eventline_core::routing::{route_extraction, RoutingConfig};
use eventline_core::triage::compute_triage_action;
use eventline_core::validate::parse_and_validate_extraction;
use eventline_core::CoreError;
use eventline_extract::ExtractionClient;
use sqlx::PgPool;

use crate::context::resolve_triage_context;
use crate::entity_index::index_entities_for_extraction;
use crate::error::{PipelineError, PipelineResult};
use crate::event_upsert::upsert_event;
use crate::repo::{EligibleMessage, EventRow, ExtractionRow, ProcessingLock, ProcessingStateRow, RoutingDecisionRow};

const LOCK_NAME: &str = "phase2_extraction";
const EXTRACTOR_NAME: &str = "extract-and-score-openai-v1";

/// Side-effect-free peek at whether a phase-2 run currently holds the
/// advisory lock, for the admin status endpoint.
pub async fn is_lock_held(pool: &PgPool) -> PipelineResult<bool> {
    ProcessingLock::is_held(LOCK_NAME, pool).await
}

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct RunSummary {
    pub processing_run_id: String,
    pub selected: u32,
    pub processed: u32,
    pub completed: u32,
    pub failed: u32,
    pub skipped: u32,
    /// Set when the whole run aborted before or during the message loop
    /// (configuration error, persistence failure acquiring/releasing the
    /// lock). Per-message failures never set this — they're counted in
    /// `failed` instead.
    pub aborted: Option<String>,
}

pub struct Phase2Config {
    pub extraction_enabled: bool,
    pub api_key_set: bool,
    pub batch_size: i64,
    pub lease_seconds: i64,
    pub scheduler_lock_seconds: i64,
    pub evidence_enabled: bool,
}

fn classify_error(err: &PipelineError) -> String {
    match err {
        PipelineError::Core(CoreError::InvalidJson(msg)) => format!("validation_error:invalid_json:{msg}"),
        PipelineError::Core(CoreError::SchemaError(msg)) => format!("validation_error:schema_error:{msg}"),
        PipelineError::Extract(e) => format!("provider_error:{e}"),
        PipelineError::Validation(msg) => format!("validation_error:{msg}"),
        PipelineError::Provider(msg) => format!("provider_error:{msg}"),
        other => format!("persistence_error:{other}"),
    }
}

async fn process_one(
    message: &EligibleMessage,
    client: &dyn ExtractionClient,
    config: &Phase2Config,
    run_id: &str,
    pool: &PgPool,
) -> PipelineResult<()> {
    let rendered = render_extraction_prompt(
        &message.normalized_text,
        message.message_time,
        message.source_channel_name.as_deref(),
    )
    .map_err(PipelineError::Core)?;

    let llm_response = client.extract(&rendered.prompt_text).await?;

    let mut payload = parse_and_validate_extraction(&llm_response.raw_text).map_err(PipelineError::Core)?;
    let payload_raw = serde_json::to_value(&payload)?;
    let rules = eventline_core::canonicalize::canonicalize_extraction(&mut payload);

    let extraction = ExtractionRow::upsert(
        message.raw_message_id,
        &payload,
        &payload_raw,
        &rules,
        rendered.prompt_version,
        &llm_response.model_name,
        EXTRACTOR_NAME,
        run_id,
        &llm_response.raw_text,
        llm_response.latency_ms,
        llm_response.retries,
        llm_response.response_id.as_deref(),
        pool,
    )
    .await?;

    let effective_event_time = payload.event_time.unwrap_or_else(Utc::now);
    let resolved = resolve_triage_context(message.raw_message_id, &payload, effective_event_time, pool).await?;

    let triage = compute_triage_action(&payload, &resolved.triage_context);

    let local_incident_downgrade = triage
        .reason_codes
        .iter()
        .any(|r| r == "triage:local_incident_downgrade");

    let routing_config = RoutingConfig { evidence_enabled: config.evidence_enabled };
    let mut decision = route_extraction(
        &payload,
        triage.triage_action,
        resolved.triage_context.existing_event_id,
        local_incident_downgrade,
        &routing_config,
    );
    decision.triage_rules = triage.reason_codes.clone();

    // A repeat-low-delta or soft-related-downgrade verdict against an
    // already-known event advances the burst streak; anything else on a
    // known event resets it. A freshly-created event always starts at 0.
    if let Some(existing_event_id) = resolved.triage_context.existing_event_id {
        let is_repeat = triage
            .reason_codes
            .iter()
            .any(|r| r == "triage:repeat_downgrade" || r == "triage:soft_related_downgrade");
        EventRow::update_repeat_low_delta_counter(existing_event_id, is_repeat, pool).await?;
    }

    let event_id = if decision.event_action != eventline_core::types::EventAction::Ignore {
        let (event, _created) = upsert_event(extraction.id, message.raw_message_id, &payload, resolved.candidate, pool).await?;
        index_entities_for_extraction(message.raw_message_id, Some(event.id), &payload, pool).await?;
        Some(event.id)
    } else {
        index_entities_for_extraction(message.raw_message_id, None, &payload, pool).await?;
        None
    };

    RoutingDecisionRow::insert(extraction.id, event_id, &decision, pool).await?;

    Ok(())
}

/// Run a single Phase-2 batch. Returns an empty, zeroed summary (not an
/// error) if the advisory lock is already held elsewhere.
pub async fn process_phase2_batch(
    client: &dyn ExtractionClient,
    config: &Phase2Config,
    pool: &PgPool,
) -> PipelineResult<RunSummary> {
    let run_id = uuid::Uuid::new_v4().to_string();
    let mut summary = RunSummary {
        processing_run_id: run_id.clone(),
        ..Default::default()
    };

    if !ProcessingLock::acquire(LOCK_NAME, config.scheduler_lock_seconds, &run_id, pool).await? {
        tracing::info!(run_id = %run_id, "phase2_lock_busy");
        return Ok(summary);
    }

    let result = run_batch_locked(&run_id, client, config, pool, &mut summary).await;

    ProcessingLock::release(LOCK_NAME, &run_id, pool).await?;

    if let Err(err) = result {
        summary.aborted = Some(classify_error(&err));
    }
    Ok(summary)
}

async fn run_batch_locked(
    run_id: &str,
    client: &dyn ExtractionClient,
    config: &Phase2Config,
    pool: &PgPool,
    summary: &mut RunSummary,
) -> PipelineResult<()> {
    if !config.extraction_enabled {
        return Err(PipelineError::Configuration(
            "phase2 extraction is disabled".to_string(),
        ));
    }
    if !config.api_key_set {
        return Err(PipelineError::Configuration(
            "model API key is not configured".to_string(),
        ));
    }

    tracing::info!(extractor = EXTRACTOR_NAME, "Using extractor");

    let eligible = ProcessingStateRow::find_eligible(config.batch_size, pool).await?;
    summary.selected = eligible.len() as u32;

    for message in &eligible {
        if message.status == "completed" {
            summary.skipped += 1;
            continue;
        }

        ProcessingStateRow::mark_in_progress(message.raw_message_id, config.lease_seconds, run_id, pool).await?;

        match process_one(message, client, config, run_id, pool).await {
            Ok(()) => {
                ProcessingStateRow::mark_success(message.raw_message_id, pool).await?;
                summary.completed += 1;
            }
            Err(err) => {
                let last_error = classify_error(&err);
                tracing::warn!(
                    raw_message_id = message.raw_message_id,
                    error = %last_error,
                    "phase2_extraction_failed"
                );
                ProcessingStateRow::mark_failure(message.raw_message_id, &last_error, pool).await?;
                summary.failed += 1;
            }
        }
        summary.processed += 1;
    }

    tracing::info!(
        run_id,
        selected = summary.selected,
        processed = summary.processed,
        completed = summary.completed,
        failed = summary.failed,
        skipped = summary.skipped,
        "phase2_run_done"
    );

    Ok(())
}
