//! Parses and strictly validates a model's raw extraction response.

use crate::error::{CoreError, CoreResult};
use crate::types::ExtractionPayload;

/// Parse a model's raw JSON text into an [`ExtractionPayload`], rejecting
/// unknown fields and out-of-range numeric fields.
///
/// Errors are categorized the way callers expect to log and count them:
/// `invalid_json` for text that isn't a JSON object at all, `schema_error`
/// for anything that parses but fails shape or range checks.
pub fn parse_and_validate_extraction(raw_text: &str) -> CoreResult<ExtractionPayload> {
    let value: serde_json::Value = serde_json::from_str(raw_text)
        .map_err(|e| CoreError::InvalidJson(e.to_string()))?;

    if !value.is_object() {
        return Err(CoreError::InvalidJson("root must be object".to_string()));
    }

    let payload: ExtractionPayload =
        serde_json::from_value(value).map_err(|e| CoreError::SchemaError(e.to_string()))?;

    validate_ranges(&payload)?;

    Ok(payload)
}

fn validate_ranges(payload: &ExtractionPayload) -> CoreResult<()> {
    if !(0.0..=1.0).contains(&payload.confidence) {
        return Err(CoreError::SchemaError(format!(
            "confidence must be in [0, 1], got {}",
            payload.confidence
        )));
    }
    if !(0.0..=100.0).contains(&payload.impact_score) {
        return Err(CoreError::SchemaError(format!(
            "impact_score must be in [0, 100], got {}",
            payload.impact_score
        )));
    }
    if payload.event_fingerprint.trim().is_empty() {
        return Err(CoreError::SchemaError("event_fingerprint must not be empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_json() -> &'static str {
        r#"{
            "topic": "equities",
            "entities": {"countries": [], "orgs": [], "people": [], "tickers": ["AAPL"]},
            "affected_countries_first_order": [],
            "market_stats": [],
            "sentiment": "neutral",
            "confidence": 0.9,
            "impact_score": 40.0,
            "is_breaking": false,
            "breaking_window": "none",
            "event_time": null,
            "source_claimed": null,
            "summary_1_sentence": "Apple shares rose.",
            "keywords": [],
            "event_fingerprint": "a|b|c|d|e|f|g|h"
        }"#
    }

    #[test]
    fn parses_valid_payload() {
        let payload = parse_and_validate_extraction(valid_json()).unwrap();
        assert_eq!(payload.entities.tickers, vec!["AAPL".to_string()]);
    }

    #[test]
    fn rejects_non_json() {
        let err = parse_and_validate_extraction("not json").unwrap_err();
        assert!(matches!(err, CoreError::InvalidJson(_)));
    }

    #[test]
    fn rejects_non_object_root() {
        let err = parse_and_validate_extraction("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, CoreError::InvalidJson(_)));
    }

    #[test]
    fn rejects_unknown_fields() {
        let bad = valid_json().replace("\"keywords\": [],", "\"keywords\": [], \"extra_field\": 1,");
        let err = parse_and_validate_extraction(&bad).unwrap_err();
        assert!(matches!(err, CoreError::SchemaError(_)));
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        let bad = valid_json().replace("\"confidence\": 0.9,", "\"confidence\": 1.5,");
        let err = parse_and_validate_extraction(&bad).unwrap_err();
        assert!(matches!(err, CoreError::SchemaError(_)));
    }

    #[test]
    fn rejects_out_of_range_impact_score() {
        let bad = valid_json().replace("\"impact_score\": 40.0,", "\"impact_score\": 150.0,");
        let err = parse_and_validate_extraction(&bad).unwrap_err();
        assert!(matches!(err, CoreError::SchemaError(_)));
    }

    #[test]
    fn rejects_invalid_topic() {
        let bad = valid_json().replace("\"topic\": \"equities\",", "\"topic\": \"not_a_topic\",");
        let err = parse_and_validate_extraction(&bad).unwrap_err();
        assert!(matches!(err, CoreError::SchemaError(_)));
    }

    #[test]
    fn rejects_missing_required_top_level_field() {
        let bad = valid_json().replace("\"keywords\": [],", "");
        let err = parse_and_validate_extraction(&bad).unwrap_err();
        assert!(matches!(err, CoreError::SchemaError(_)));
    }
}
