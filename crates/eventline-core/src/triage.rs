//! Decides whether an extraction promotes a new event, updates an existing
//! one, bumps a monitor, or is archived outright.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::types::ExtractionPayload;

static LOCAL_GEO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-z]+,\s*[A-Z]{2}\b").unwrap());

const REACTION_LEXICON: &[&str] = &[
    "condemn",
    "concern",
    "urge",
    "calls for",
    "unacceptable",
    "warns",
    "responds",
];
const OPERATIONAL_LEXICON: &[&str] = &[
    "strike",
    "attacked",
    "launched",
    "killed",
    "injured",
    "casualties",
    "missile",
    "troops",
    "explosion",
];
const LOCAL_INCIDENT_LEXICON: &[&str] = &[
    "police",
    "incident",
    "injured",
    "city",
    "county",
    "sheriff",
    "public safety",
];
const ATTRIBUTION_AUTHORITY_MARKERS: &[&str] = &[
    "police",
    "ministry",
    "official",
    "military",
    "agency",
    "spokesperson",
];
const COMMENTARY_MARKERS: &[&str] = &["commentary", "analyst", "opinion", "urges", "condemns", "concerned"];
const CONFLICT_GEO_MARKERS: &[&str] = &[
    "missile",
    "strike",
    "military",
    "airstrike",
    "drone",
    "cross-border",
    "invasion",
    "army",
    "navy",
    "tehran",
    "israel",
    "iran",
    "ukraine",
    "russia",
];

fn normalize_text(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Impact band for the numeric `impact_score` field.
pub fn impact_band(score: f64) -> &'static str {
    if score >= 85.0 {
        "critical"
    } else if score >= 70.0 {
        "high"
    } else if score >= 55.0 {
        "medium"
    } else {
        "low"
    }
}

/// Confidence band for the numeric `confidence` field.
pub fn confidence_band(score: f64) -> &'static str {
    if score >= 0.85 {
        "strong"
    } else if score >= 0.75 {
        "usable"
    } else {
        "weak"
    }
}

fn band_rank(name: &str) -> i32 {
    match name {
        "low" => 0,
        "medium" => 1,
        "high" => 2,
        "critical" => 3,
        _ => -1,
    }
}

/// Classify the apparent authority of a claimed source plus its summary.
///
/// `according to` is checked against the summary text, not `source_claimed`
/// — every other authority marker is checked against `source_claimed` only.
/// This asymmetry is intentional.
pub fn classify_source(source_claimed: Option<&str>, summary: &str) -> &'static str {
    let source = normalize_text(source_claimed.unwrap_or(""));
    let summary_norm = normalize_text(summary);
    if ATTRIBUTION_AUTHORITY_MARKERS.iter().any(|m| source.contains(m)) {
        return "authority";
    }
    if summary_norm.contains("according to") {
        return "authority";
    }
    let combined = format!("{source} {summary_norm}");
    if COMMENTARY_MARKERS.iter().any(|m| combined.contains(m)) {
        return "commentary";
    }
    "unknown"
}

pub fn summary_tags(summary: &str) -> HashSet<&'static str> {
    let normalized = normalize_text(summary);
    let mut tags = HashSet::new();
    if REACTION_LEXICON.iter().any(|t| normalized.contains(t)) {
        tags.insert("reaction");
    }
    if OPERATIONAL_LEXICON.iter().any(|t| normalized.contains(t)) {
        tags.insert("operational");
    }
    if LOCAL_INCIDENT_LEXICON.iter().any(|t| normalized.contains(t)) {
        tags.insert("local_incident");
    }
    tags
}

/// The set of `country:`/`org:`/`person:` tags derived from a raw entities
/// value; tickers do not participate in the signature. Shared by triage
/// (from a freshly-parsed payload) and the pipeline crate (from a stored
/// JSONB `entities` column it deserializes into `ExtractionEntities`).
pub fn entity_signature_from_entities(entities: &crate::types::ExtractionEntities) -> HashSet<String> {
    let mut out = HashSet::new();
    for value in &entities.countries {
        if !value.is_empty() {
            out.insert(format!("country:{}", normalize_text(value)));
        }
    }
    for value in &entities.orgs {
        if !value.is_empty() {
            out.insert(format!("org:{}", normalize_text(value)));
        }
    }
    for value in &entities.people {
        if !value.is_empty() {
            out.insert(format!("person:{}", normalize_text(value)));
        }
    }
    out
}

/// The set of `country:`/`org:`/`person:` tags derived from an extraction's
/// entities; tickers do not participate in the signature.
pub fn entity_signature(extraction: &ExtractionPayload) -> HashSet<String> {
    entity_signature_from_entities(&extraction.entities)
}

/// Number of entity-signature elements an extraction shares with a
/// candidate event's entity set.
pub fn soft_related_overlap_count(extraction: &ExtractionPayload, candidate_entities: &HashSet<String>) -> usize {
    if candidate_entities.is_empty() {
        return 0;
    }
    entity_signature(extraction).intersection(candidate_entities).count()
}

/// True iff the extraction describes a noisy local/domestic incident that
/// should never carry top urgency.
pub fn is_local_domestic_incident(extraction: &ExtractionPayload) -> bool {
    let summary = extraction.summary_1_sentence.as_str();
    let source = extraction.source_claimed.as_deref().unwrap_or("");
    let combined = format!("{summary} {} {source}", extraction.keywords.join(" "));
    let normalized = normalize_text(&combined);

    let has_local_authority = ["police", "sheriff", "public safety"]
        .iter()
        .any(|t| normalized.contains(t));
    let has_incident_language = ["incident", "injured", "wounded", "casualt"]
        .iter()
        .any(|t| normalized.contains(t));
    let has_local_geo = LOCAL_GEO_RE.is_match(summary)
        || [" city ", " county ", " state "].iter().any(|t| normalized.contains(t));
    let has_conflict_marker = CONFLICT_GEO_MARKERS.iter().any(|t| normalized.contains(t));

    has_local_authority
        && has_incident_language
        && (has_local_geo || normalized.contains("police"))
        && !has_conflict_marker
}

/// Snapshot of the last-known extraction for a candidate event, used to
/// judge material newness.
#[derive(Debug, Clone, Default)]
pub struct CandidateEventContext {
    pub impact_band: Option<String>,
    pub entities: Option<HashSet<String>>,
    pub summary_tags: Option<HashSet<String>>,
    pub source_class: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TriageContext {
    pub existing_event_id: Option<i64>,
    pub candidate_event: Option<CandidateEventContext>,
    pub soft_related_match: bool,
    pub burst_low_delta_prior_count: i32,
}

fn materially_new(extraction: &ExtractionPayload, candidate: Option<&CandidateEventContext>) -> bool {
    let candidate = match candidate {
        Some(c) => c,
        None => return true,
    };

    let current_entities = entity_signature(extraction);
    let candidate_entities = candidate.entities.clone().unwrap_or_default();
    if !current_entities.difference(&candidate_entities).collect::<Vec<_>>().is_empty() {
        return true;
    }

    let current_band = impact_band(extraction.impact_score);
    if let Some(candidate_band) = &candidate.impact_band {
        if band_rank(current_band) > band_rank(candidate_band) {
            return true;
        }
    }

    let current_tags = summary_tags(&extraction.summary_1_sentence);
    let candidate_tags: HashSet<&str> = candidate
        .summary_tags
        .as_ref()
        .map(|s| s.iter().map(|x| x.as_str()).collect())
        .unwrap_or_default();
    let reaction_to_operational = current_tags.contains("operational")
        && !candidate_tags.contains("operational")
        && candidate_tags.contains("reaction");
    if reaction_to_operational {
        return true;
    }

    let current_source_class = classify_source(extraction.source_claimed.as_deref(), &extraction.summary_1_sentence);
    if candidate.source_class.as_deref() == Some("commentary") && current_source_class == "authority" {
        return true;
    }

    false
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriageDecision {
    pub triage_action: crate::types::TriageAction,
    pub reason_codes: Vec<String>,
}

/// Run the full triage decision table for an extraction.
pub fn compute_triage_action(extraction: &ExtractionPayload, context: &TriageContext) -> TriageDecision {
    use crate::types::TriageAction;

    let mut reasons = Vec::new();
    let impact = impact_band(extraction.impact_score);
    let conf = confidence_band(extraction.confidence);
    reasons.push(format!("triage:score_band:{impact}"));
    reasons.push(format!("triage:confidence_band:{conf}"));

    let local_incident = is_local_domestic_incident(extraction);
    if local_incident {
        reasons.push("triage:local_incident_downgrade".to_string());
    }

    let mut novelty_state = if context.existing_event_id.is_none() {
        "new_event"
    } else {
        "related_update"
    };
    let materially_new_flag = materially_new(extraction, context.candidate_event.as_ref());

    if context.existing_event_id.is_some() && !materially_new_flag {
        novelty_state = "repeat_low_delta";
        reasons.push("triage:repeat_downgrade".to_string());
    }

    if context.soft_related_match {
        reasons.push("triage:soft_related_match".to_string());
    }

    if context.existing_event_id.is_none() && context.soft_related_match && !materially_new_flag {
        reasons.push("triage:soft_related_downgrade".to_string());
        novelty_state = "repeat_low_delta";
    }

    let mut action = if conf == "weak" && impact == "low" {
        reasons.push("triage:low_signal_archive".to_string());
        TriageAction::Archive
    } else if novelty_state == "new_event"
        && matches!(impact, "high" | "critical")
        && matches!(conf, "usable" | "strong")
    {
        reasons.push("triage:new_event_promote".to_string());
        TriageAction::Promote
    } else if novelty_state == "related_update" && materially_new_flag {
        reasons.push("triage:related_material_update".to_string());
        TriageAction::Update
    } else {
        TriageAction::Monitor
    };

    if novelty_state == "repeat_low_delta" {
        if context.burst_low_delta_prior_count >= 2 {
            reasons.push("triage:burst_cap_monitor".to_string());
            action = TriageAction::Monitor;
        } else if context.burst_low_delta_prior_count >= 1 {
            reasons.push("triage:burst_cap_update".to_string());
            action = TriageAction::Update;
        }
    }

    if local_incident && matches!(action, TriageAction::Promote | TriageAction::Update) {
        action = TriageAction::Monitor;
    }

    TriageDecision {
        triage_action: action,
        reason_codes: reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BreakingWindow, ExtractionEntities, Sentiment, Topic, TriageAction};

    fn base_extraction() -> ExtractionPayload {
        ExtractionPayload {
            topic: Topic::Geopolitics,
            entities: ExtractionEntities::default(),
            affected_countries_first_order: vec![],
            market_stats: vec![],
            sentiment: Sentiment::Unknown,
            confidence: 0.0,
            impact_score: 0.0,
            is_breaking: false,
            breaking_window: BreakingWindow::None,
            event_time: None,
            source_claimed: None,
            summary_1_sentence: String::new(),
            keywords: vec![],
            event_fingerprint: "a|b|c|d|e|f|g|h".to_string(),
        }
    }

    #[test]
    fn low_signal_archives() {
        let mut e = base_extraction();
        e.impact_score = 10.0;
        e.confidence = 0.2;
        let decision = compute_triage_action(&e, &TriageContext::default());
        assert_eq!(decision.triage_action, TriageAction::Archive);
        assert!(decision.reason_codes.contains(&"triage:low_signal_archive".to_string()));
    }

    #[test]
    fn high_impact_new_event_promotes() {
        let mut e = base_extraction();
        e.impact_score = 85.0;
        e.confidence = 0.85;
        e.is_breaking = true;
        let decision = compute_triage_action(&e, &TriageContext::default());
        assert_eq!(decision.triage_action, TriageAction::Promote);
        assert!(decision.reason_codes.contains(&"triage:new_event_promote".to_string()));
    }

    #[test]
    fn material_update_on_existing_event() {
        let mut e = base_extraction();
        e.impact_score = 75.0;
        e.confidence = 0.8;
        e.is_breaking = true;
        e.entities.countries = vec!["Iran".to_string()];
        let context = TriageContext {
            existing_event_id: Some(1),
            candidate_event: Some(CandidateEventContext {
                impact_band: Some("medium".to_string()),
                entities: Some(HashSet::new()),
                summary_tags: Some(HashSet::new()),
                source_class: Some("unknown".to_string()),
            }),
            ..Default::default()
        };
        let decision = compute_triage_action(&e, &context);
        assert_eq!(decision.triage_action, TriageAction::Update);
        assert!(decision
            .reason_codes
            .contains(&"triage:related_material_update".to_string()));
    }

    #[test]
    fn local_incident_forces_monitor() {
        let mut e = base_extraction();
        e.impact_score = 90.0;
        e.confidence = 0.9;
        e.is_breaking = true;
        e.summary_1_sentence =
            "Police report multiple people injured in Austin, TX incident.".to_string();
        let decision = compute_triage_action(&e, &TriageContext::default());
        assert_eq!(decision.triage_action, TriageAction::Monitor);
        assert!(decision
            .reason_codes
            .contains(&"triage:local_incident_downgrade".to_string()));
    }

    #[test]
    fn burst_cap_update_then_monitor() {
        let mut e = base_extraction();
        e.impact_score = 75.0;
        e.confidence = 0.8;
        let context_one = TriageContext {
            existing_event_id: Some(1),
            candidate_event: Some(CandidateEventContext {
                impact_band: Some("high".to_string()),
                entities: Some(entity_signature(&e)),
                summary_tags: Some(HashSet::new()),
                source_class: Some("unknown".to_string()),
            }),
            burst_low_delta_prior_count: 1,
            ..Default::default()
        };
        let decision_one = compute_triage_action(&e, &context_one);
        assert_eq!(decision_one.triage_action, TriageAction::Update);
        assert!(decision_one
            .reason_codes
            .contains(&"triage:burst_cap_update".to_string()));

        let context_two = TriageContext {
            burst_low_delta_prior_count: 2,
            ..context_one
        };
        let decision_two = compute_triage_action(&e, &context_two);
        assert_eq!(decision_two.triage_action, TriageAction::Monitor);
        assert!(decision_two
            .reason_codes
            .contains(&"triage:burst_cap_monitor".to_string()));
    }

    #[test]
    fn classify_source_according_to_checks_summary_not_source() {
        assert_eq!(classify_source(Some("random blog"), "according to witnesses"), "authority");
        assert_eq!(classify_source(Some("ministry spokesperson"), ""), "authority");
        assert_eq!(classify_source(None, "just a commentary piece"), "commentary");
        assert_eq!(classify_source(None, "plain statement"), "unknown");
    }
}
