//! Maps a topic and triage outcome onto publish destinations, priority, and
//! evidence requirements.

use crate::types::{EventAction, ExtractionPayload, PublishPriority, RoutingDecisionData, Topic, TriageAction};

/// Ordered `(threshold, priority)` bands, evaluated high to low.
const IMPACT_PRIORITY_THRESHOLDS: &[(f64, PublishPriority)] = &[
    (80.0, PublishPriority::High),
    (60.0, PublishPriority::Medium),
    (30.0, PublishPriority::Low),
    (0.0, PublishPriority::None),
];

fn topic_destinations(topic: Topic) -> Vec<String> {
    let names: &[&str] = match topic {
        Topic::MacroEcon | Topic::CentralBanks | Topic::Rates | Topic::Fx | Topic::Commodities => {
            &["macro_events"]
        }
        Topic::Equities | Topic::CompanySpecific => &["stocks_events"],
        Topic::Credit => &["credit_events"],
        Topic::Crypto => &["crypto_events"],
        Topic::WarSecurity | Topic::Geopolitics => &["war_security_events"],
        Topic::Other => &["other_events"],
    };
    names.iter().map(|s| s.to_string()).collect()
}

fn priority_from_impact(impact_score: f64) -> PublishPriority {
    for (threshold, priority) in IMPACT_PRIORITY_THRESHOLDS {
        if impact_score >= *threshold {
            return *priority;
        }
    }
    PublishPriority::None
}

/// Whether the crate's routing configuration requires an evidence source
/// before an item can publish. Disabled by default, matching the inherited
/// default configuration.
pub struct RoutingConfig {
    pub evidence_enabled: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self { evidence_enabled: false }
    }
}

/// Produce the full routing decision for an extraction, given the triage
/// outcome that was already computed for it.
pub fn route_extraction(
    extraction: &ExtractionPayload,
    triage_action: TriageAction,
    existing_event_id: Option<i64>,
    local_incident_downgrade: bool,
    config: &RoutingConfig,
) -> RoutingDecisionData {
    let mut rules_fired = Vec::new();

    let store_to = topic_destinations(extraction.topic);
    rules_fired.push(format!("topic_to_dest:{}", extraction.topic.as_str()));

    let mut priority = priority_from_impact(extraction.impact_score);
    rules_fired.push(format!("impact_to_priority:{}", priority.as_str()));

    // Triage action caps the effective priority: an archived or monitored
    // item never publishes above "low" regardless of raw impact.
    priority = match triage_action {
        TriageAction::Archive => PublishPriority::None,
        TriageAction::Monitor => priority.min(PublishPriority::Low),
        TriageAction::Update => priority.min(PublishPriority::Medium),
        TriageAction::Promote => priority,
    };
    if local_incident_downgrade {
        priority = priority.min(PublishPriority::Low);
        rules_fired.push("local_incident_cap:low".to_string());
    }
    rules_fired.push(format!("triage_cap:{}", priority.as_str()));

    let requires_evidence = local_incident_downgrade
        || (config.evidence_enabled
            && (extraction.is_breaking
                || extraction.impact_score >= 60.0
                || (matches!(
                    extraction.topic,
                    Topic::MacroEcon | Topic::WarSecurity | Topic::Credit
                ) && extraction.confidence >= 0.6)));
    if requires_evidence {
        rules_fired.push("requires_evidence:rule_default".to_string());
    }

    let mut event_action = if extraction.summary_1_sentence.trim().is_empty() {
        EventAction::Ignore
    } else {
        EventAction::Create
    };

    // Triage overrides the base action: an archived extraction never
    // touches an event, and an update against a known event merges rather
    // than creating a new one.
    if triage_action == TriageAction::Archive {
        event_action = EventAction::Ignore;
        rules_fired.push("triage_override:archive_ignores".to_string());
    } else if triage_action == TriageAction::Update && existing_event_id.is_some() {
        event_action = EventAction::Update;
        rules_fired.push("triage_override:update_merges".to_string());
    }
    rules_fired.push(format!("event_action:{}", event_action.as_str()));

    let mut flags = Vec::new();
    if requires_evidence {
        flags.push("unconfirmed".to_string());
    }
    if matches!(priority, PublishPriority::High) {
        flags.push("high_impact".to_string());
    }
    if extraction.is_breaking {
        flags.push("breaking".to_string());
    }
    if local_incident_downgrade {
        flags.push("local_incident".to_string());
    }

    RoutingDecisionData {
        store_to,
        publish_priority: priority,
        requires_evidence,
        event_action,
        triage_action: Some(triage_action),
        triage_rules: Vec::new(),
        flags,
        rules_fired,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BreakingWindow, ExtractionEntities, Sentiment};

    fn base_extraction() -> ExtractionPayload {
        ExtractionPayload {
            topic: Topic::WarSecurity,
            entities: ExtractionEntities::default(),
            affected_countries_first_order: vec![],
            market_stats: vec![],
            sentiment: Sentiment::Unknown,
            confidence: 0.7,
            impact_score: 65.0,
            is_breaking: true,
            breaking_window: BreakingWindow::OneHour,
            event_time: None,
            source_claimed: None,
            summary_1_sentence: "A missile struck a facility.".to_string(),
            keywords: vec![],
            event_fingerprint: "a|b|c|d|e|f|g|h".to_string(),
        }
    }

    #[test]
    fn topic_maps_to_expected_destinations() {
        let e = base_extraction();
        let decision = route_extraction(&e, TriageAction::Promote, None, false, &RoutingConfig::default());
        assert_eq!(decision.store_to, vec!["war_security_events"]);
    }

    #[test]
    fn impact_threshold_sets_priority() {
        let mut e = base_extraction();
        e.impact_score = 82.0;
        let decision = route_extraction(&e, TriageAction::Promote, None, false, &RoutingConfig::default());
        assert_eq!(decision.publish_priority, PublishPriority::High);
        assert!(decision.flags.contains(&"high_impact".to_string()));
    }

    #[test]
    fn monitor_triage_caps_priority_at_low() {
        let mut e = base_extraction();
        e.impact_score = 95.0;
        let decision = route_extraction(&e, TriageAction::Monitor, None, false, &RoutingConfig::default());
        assert_eq!(decision.publish_priority, PublishPriority::Low);
    }

    #[test]
    fn archive_triage_forces_no_priority() {
        let mut e = base_extraction();
        e.impact_score = 95.0;
        let decision = route_extraction(&e, TriageAction::Archive, None, false, &RoutingConfig::default());
        assert_eq!(decision.publish_priority, PublishPriority::None);
    }

    #[test]
    fn evidence_required_when_enabled_and_breaking() {
        let e = base_extraction();
        let config = RoutingConfig { evidence_enabled: true };
        let decision = route_extraction(&e, TriageAction::Promote, None, false, &config);
        assert!(decision.requires_evidence);
        assert!(decision.flags.contains(&"unconfirmed".to_string()));
    }

    #[test]
    fn evidence_not_required_when_disabled() {
        let e = base_extraction();
        let decision = route_extraction(&e, TriageAction::Promote, None, false, &RoutingConfig::default());
        assert!(!decision.requires_evidence);
        assert!(!decision.flags.contains(&"unconfirmed".to_string()));
    }

    #[test]
    fn empty_summary_ignores_event() {
        let mut e = base_extraction();
        e.summary_1_sentence = "   ".to_string();
        let decision = route_extraction(&e, TriageAction::Monitor, None, false, &RoutingConfig::default());
        assert_eq!(decision.event_action, EventAction::Ignore);
    }

    #[test]
    fn archive_triage_ignores_event_even_with_summary() {
        let e = base_extraction();
        let decision = route_extraction(&e, TriageAction::Archive, Some(1), false, &RoutingConfig::default());
        assert_eq!(decision.event_action, EventAction::Ignore);
    }

    #[test]
    fn update_triage_caps_priority_at_medium() {
        let mut e = base_extraction();
        e.impact_score = 95.0;
        let decision = route_extraction(&e, TriageAction::Update, Some(1), false, &RoutingConfig::default());
        assert_eq!(decision.publish_priority, PublishPriority::Medium);
    }

    #[test]
    fn update_triage_against_existing_event_merges() {
        let e = base_extraction();
        let decision = route_extraction(&e, TriageAction::Update, Some(42), false, &RoutingConfig::default());
        assert_eq!(decision.event_action, EventAction::Update);
    }

    #[test]
    fn update_triage_without_existing_event_still_creates() {
        let e = base_extraction();
        let decision = route_extraction(&e, TriageAction::Update, None, false, &RoutingConfig::default());
        assert_eq!(decision.event_action, EventAction::Create);
    }

    #[test]
    fn local_incident_downgrade_caps_priority_forces_evidence_and_flags() {
        let mut e = base_extraction();
        e.impact_score = 90.0;
        let decision = route_extraction(&e, TriageAction::Update, Some(1), true, &RoutingConfig::default());
        assert_eq!(decision.publish_priority, PublishPriority::Low);
        assert!(decision.requires_evidence);
        assert!(decision.flags.contains(&"local_incident".to_string()));
        assert!(decision.flags.contains(&"unconfirmed".to_string()));
    }
}
