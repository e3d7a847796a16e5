//! Deterministic post-validation canonicalization pass.
//!
//! Normalizes casing, aliasing, and ordering on a validated extraction
//! payload and records which rules fired, in the field order below (the
//! order is asserted by `rule_order_matches_spec_order`).

use std::sync::LazyLock;

use regex::Regex;

use crate::types::ExtractionPayload;

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static TICKER_CLEAN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Z0-9.\-]").unwrap());
static PRONOUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(it|they|he|she)\b").unwrap());

static HIGH_RISK_TERMS: &[&str] = &[
    "killing",
    "killed",
    "assassination",
    "death of",
    "strike",
    "attack",
    "attacked",
    "targeting",
    "casualties",
    "injured",
    "wounded",
    "dead",
    "invasion",
    "military escalation",
    "direct strike",
    "major incident",
    "launched",
    "missile",
    "missiles",
];

static ATTRIBUTION_MARKERS: &[&str] = &[
    "according to",
    "said",
    "says",
    "reported",
    "reportedly",
    "claims",
    "claimed",
    "responded to reports",
];

fn country_alias(lower: &str) -> Option<&'static str> {
    Some(match lower {
        "us" | "u.s." | "u.s" | "usa" => "United States",
        "uk" | "u.k." | "u.k" => "United Kingdom",
        "uae" => "United Arab Emirates",
        "eu" => "European Union",
        _ => return None,
    })
}

fn normalize_spaces(value: &str) -> String {
    WS_RE.replace_all(value.trim(), " ").to_string()
}

fn title_case(value: &str) -> String {
    value
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn canonical_country(value: &str) -> String {
    let cleaned = normalize_spaces(value);
    if cleaned.is_empty() {
        return String::new();
    }
    let lower = cleaned.to_lowercase();
    if let Some(canonical) = country_alias(&lower) {
        return canonical.to_string();
    }
    if cleaned == lower {
        title_case(&cleaned)
    } else {
        cleaned
    }
}

fn canonical_countries(values: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for raw in values {
        let canonical = canonical_country(raw);
        if canonical.is_empty() {
            continue;
        }
        let key = canonical.to_lowercase();
        if !seen.insert(key) {
            continue;
        }
        out.push(canonical);
    }
    out.sort_by_key(|a| a.to_lowercase());
    out
}

fn canonical_tickers(values: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for raw in values {
        let cleaned = normalize_spaces(raw).to_uppercase();
        let cleaned = TICKER_CLEAN_RE.replace_all(&cleaned, "").to_string();
        if cleaned.is_empty() || !seen.insert(cleaned.clone()) {
            continue;
        }
        out.push(cleaned);
    }
    out.sort();
    out
}

fn canonical_text_list(values: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for raw in values {
        let cleaned = normalize_spaces(raw);
        if cleaned.is_empty() {
            continue;
        }
        let key = cleaned.to_lowercase();
        if !seen.insert(key) {
            continue;
        }
        out.push(cleaned);
    }
    out.sort_by_key(|a| a.to_lowercase());
    out
}

fn canonical_source(value: Option<&str>) -> Option<String> {
    let cleaned = normalize_spaces(value?);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn canonicalize_fingerprint_country_component(fingerprint: &str, countries: &[String]) -> String {
    let mut parts: Vec<&str> = fingerprint.split('|').collect();
    if parts.len() < 8 {
        return fingerprint.to_string();
    }
    let joined = countries.join(",");
    parts[2] = &joined;
    parts.join("|")
}

fn summary_has_high_risk_language(summary: &str) -> bool {
    let normalized = normalize_spaces(summary).to_lowercase();
    HIGH_RISK_TERMS.iter().any(|t| normalized.contains(t))
}

fn summary_has_attribution(summary: &str) -> bool {
    let normalized = normalize_spaces(summary).to_lowercase();
    ATTRIBUTION_MARKERS.iter().any(|t| normalized.contains(t))
}

fn best_actor(payload: &ExtractionPayload) -> Option<String> {
    if let Some(source) = payload.source_claimed.as_deref() {
        if !source.trim().is_empty() {
            return Some(normalize_spaces(source));
        }
    }
    for org in &payload.entities.orgs {
        if !org.trim().is_empty() {
            return Some(normalize_spaces(org));
        }
    }
    for person in &payload.entities.people {
        if !person.trim().is_empty() {
            return Some(normalize_spaces(person));
        }
    }
    for country in &payload.entities.countries {
        if !country.trim().is_empty() {
            return Some(normalize_spaces(country));
        }
    }
    None
}

fn rewrite_summary_safely(payload: &ExtractionPayload) -> (String, Vec<&'static str>) {
    let summary_raw = payload.summary_1_sentence.clone();
    let mut summary = normalize_spaces(&summary_raw);
    let mut rules = Vec::new();
    if summary.is_empty() {
        return (summary_raw, rules);
    }

    let actor = best_actor(payload);
    if PRONOUN_RE.is_match(&summary) {
        if let Some(actor) = &actor {
            summary = PRONOUN_RE.replacen(&summary, 1, actor.as_str()).to_string();
            rules.push("summary_pronoun_disambiguated");
        }
    }

    if summary_has_high_risk_language(&summary) && !summary_has_attribution(&summary) {
        let claim = summary.trim_end_matches('.');
        summary = match &actor {
            Some(actor) => format!("{actor} said {}.", claim.to_lowercase()),
            None => format!("Reportedly, {}.", claim.to_lowercase()),
        };
        rules.push("summary_high_risk_attribution_rewrite");
    }

    (summary, rules)
}

/// Canonicalize a validated extraction payload in place, returning the
/// stable rule identifiers that fired.
pub fn canonicalize_extraction(payload: &mut ExtractionPayload) -> Vec<&'static str> {
    let mut rules = Vec::new();

    let canonical_countries_list = canonical_countries(&payload.entities.countries);
    if canonical_countries_list != payload.entities.countries {
        rules.push("country_alias_normalization");
    }
    payload.entities.countries = canonical_countries_list.clone();

    let affected = canonical_countries(&payload.affected_countries_first_order);
    if affected != payload.affected_countries_first_order {
        rules.push("affected_country_alias_normalization");
    }
    payload.affected_countries_first_order = affected;

    let tickers = canonical_tickers(&payload.entities.tickers);
    if tickers != payload.entities.tickers {
        rules.push("ticker_normalization");
    }
    payload.entities.tickers = tickers;

    let orgs = canonical_text_list(&payload.entities.orgs);
    if orgs != payload.entities.orgs {
        rules.push("org_text_normalization");
    }
    payload.entities.orgs = orgs;

    let people = canonical_text_list(&payload.entities.people);
    if people != payload.entities.people {
        rules.push("person_text_normalization");
    }
    payload.entities.people = people;

    let source_claimed = canonical_source(payload.source_claimed.as_deref());
    if source_claimed != payload.source_claimed {
        rules.push("source_text_normalization");
    }
    payload.source_claimed = source_claimed;

    let (summary, summary_rules) = rewrite_summary_safely(payload);
    if summary != payload.summary_1_sentence {
        rules.extend(summary_rules);
    }
    payload.summary_1_sentence = summary;

    let canonical_fingerprint =
        canonicalize_fingerprint_country_component(&payload.event_fingerprint, &canonical_countries_list);
    if canonical_fingerprint != payload.event_fingerprint {
        rules.push("event_fingerprint_country_normalization");
    }
    payload.event_fingerprint = canonical_fingerprint;

    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BreakingWindow, ExtractionEntities, Sentiment, Topic};

    fn base_payload() -> ExtractionPayload {
        ExtractionPayload {
            topic: Topic::Geopolitics,
            entities: ExtractionEntities {
                countries: vec!["us".to_string(), "U.S.".to_string(), "United States".to_string()],
                orgs: vec![],
                people: vec![],
                tickers: vec![],
            },
            affected_countries_first_order: vec![],
            market_stats: vec![],
            sentiment: Sentiment::Unknown,
            confidence: 0.5,
            impact_score: 50.0,
            is_breaking: false,
            breaking_window: BreakingWindow::None,
            event_time: None,
            source_claimed: None,
            summary_1_sentence: "Something happened.".to_string(),
            keywords: vec![],
            event_fingerprint: "topic|kw|src|tags|a|b|c|d".to_string(),
        }
    }

    #[test]
    fn country_alias_law() {
        let mut payload = base_payload();
        canonicalize_extraction(&mut payload);
        assert_eq!(payload.entities.countries, vec!["United States".to_string()]);
    }

    #[test]
    fn fingerprint_country_component_matches_canonical_join() {
        let mut payload = base_payload();
        canonicalize_extraction(&mut payload);
        let parts: Vec<&str> = payload.event_fingerprint.split('|').collect();
        assert_eq!(parts[2], "United States");
    }

    #[test]
    fn ticker_normalization_strips_and_dedups() {
        let mut payload = base_payload();
        payload.entities.tickers = vec!["aapl".to_string(), "AAPL!".to_string(), "msft".to_string()];
        let rules = canonicalize_extraction(&mut payload);
        assert_eq!(payload.entities.tickers, vec!["AAPL".to_string(), "MSFT".to_string()]);
        assert!(rules.contains(&"ticker_normalization"));
    }

    #[test]
    fn pronoun_disambiguation_uses_best_actor() {
        let mut payload = base_payload();
        payload.source_claimed = Some("Pentagon".to_string());
        payload.summary_1_sentence = "They announced a new policy.".to_string();
        let rules = canonicalize_extraction(&mut payload);
        assert_eq!(payload.summary_1_sentence, "Pentagon announced a new policy.");
        assert!(rules.contains(&"summary_pronoun_disambiguated"));
    }

    #[test]
    fn high_risk_rewrite_adds_attribution() {
        let mut payload = base_payload();
        payload.source_claimed = Some("Ministry of Defense".to_string());
        payload.summary_1_sentence = "Missile strike killed several soldiers".to_string();
        let rules = canonicalize_extraction(&mut payload);
        assert_eq!(
            payload.summary_1_sentence,
            "Ministry of Defense said missile strike killed several soldiers."
        );
        assert!(rules.contains(&"summary_high_risk_attribution_rewrite"));
    }

    #[test]
    fn high_risk_rewrite_without_actor_uses_reportedly() {
        let mut payload = base_payload();
        payload.summary_1_sentence = "Missile strike killed several soldiers".to_string();
        let rules = canonicalize_extraction(&mut payload);
        assert_eq!(
            payload.summary_1_sentence,
            "Reportedly, missile strike killed several soldiers."
        );
        assert!(rules.contains(&"summary_high_risk_attribution_rewrite"));
    }

    #[test]
    fn high_risk_rewrite_skipped_when_attribution_present() {
        let mut payload = base_payload();
        payload.summary_1_sentence = "Officials said a missile strike killed soldiers".to_string();
        let rules = canonicalize_extraction(&mut payload);
        assert_eq!(
            payload.summary_1_sentence,
            "Officials said a missile strike killed soldiers"
        );
        assert!(!rules.contains(&"summary_high_risk_attribution_rewrite"));
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let mut payload = base_payload();
        payload.entities.orgs = vec!["  Nato  ".to_string()];
        canonicalize_extraction(&mut payload);
        let second_pass_rules = canonicalize_extraction(&mut payload);
        assert!(second_pass_rules.is_empty());
    }

    #[test]
    fn rule_order_matches_spec_order() {
        let mut payload = base_payload();
        payload.entities.orgs = vec!["  nato  ".to_string(), "Nato".to_string()];
        payload.entities.people = vec!["  jane doe  ".to_string()];
        payload.entities.tickers = vec!["aapl!".to_string()];
        payload.source_claimed = Some("  Ministry of Defense  ".to_string());
        payload.summary_1_sentence = "They launched a missile".to_string();

        let rules = canonicalize_extraction(&mut payload);

        let expected_order = [
            "country_alias_normalization",
            "ticker_normalization",
            "org_text_normalization",
            "person_text_normalization",
            "source_text_normalization",
            "summary_pronoun_disambiguated",
            "summary_high_risk_attribution_rewrite",
            "event_fingerprint_country_normalization",
        ];
        let positions: Vec<usize> = expected_order
            .iter()
            .filter_map(|name| rules.iter().position(|r| r == name))
            .collect();
        let sorted = {
            let mut p = positions.clone();
            p.sort();
            p
        };
        assert_eq!(positions, sorted, "rules should fire in spec field order: {rules:?}");
    }
}
