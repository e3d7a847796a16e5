//! Deterministic text normalization for dedup/extraction stability.
//!
//! Preserves numbers, tickers, and units; only strips wire-service noise.

use std::sync::LazyLock;

use regex::Regex;

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static LEADING_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:(?:\*+\s*)?(?:⚠️|\u{1f6a8}|BREAKING:?|ALERT:?|URGENT:?|\[BREAKING\])\s*)+")
        .unwrap()
});

static DATELINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[A-Z][A-Z .'-]{1,40}\s*\((?:AP|REUTERS|AFP|BLOOMBERG)\)\s*[—:-]\s*").unwrap()
});

static SOURCE_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*[-–—]\s*(?:AP|REUTERS|AFP|AXIOS|BLOOMBERG)\s*$").unwrap()
});

static PUNCT_REPEAT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([!?.,:;])\1+").unwrap());

/// Strip wire-service markup noise from a raw message, leaving a stable
/// string suitable for dedup and extraction prompting.
pub fn normalize_message_text(raw_text: &str) -> String {
    let text = raw_text.trim();
    let text = WS_RE.replace_all(text, " ");
    let text = LEADING_MARKER_RE.replace(&text, "");
    let text = DATELINE_RE.replace(&text, "");
    let text = SOURCE_SUFFIX_RE.replace(&text, "");
    let text = PUNCT_REPEAT_RE.replace_all(&text, "$1");
    WS_RE.replace_all(text.trim(), " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_and_collapses_whitespace() {
        assert_eq!(normalize_message_text("  hello   world  "), "hello world");
    }

    #[test]
    fn strips_breaking_prefix() {
        assert_eq!(
            normalize_message_text("BREAKING: market falls 2%"),
            "market falls 2%"
        );
    }

    #[test]
    fn strips_dateline() {
        assert_eq!(
            normalize_message_text("LONDON (REUTERS) \u{2014} oil prices rise"),
            "oil prices rise"
        );
    }

    #[test]
    fn strips_source_suffix() {
        assert_eq!(
            normalize_message_text("Fed holds rates steady - REUTERS"),
            "Fed holds rates steady"
        );
    }

    #[test]
    fn collapses_repeated_punctuation() {
        assert_eq!(normalize_message_text("really???"), "really?");
        assert_eq!(normalize_message_text("wait..."), "wait.");
    }

    #[test]
    fn preserves_numbers_tickers_and_units() {
        let input = "AAPL up 3.5% to $192.30, 10yr yield at 4.25%";
        assert_eq!(normalize_message_text(input), input);
    }

    #[test]
    fn is_idempotent() {
        let input = "  BREAKING: ***LONDON (AP) \u{2014} stocks slide!!! - AFP  ";
        let once = normalize_message_text(input);
        let twice = normalize_message_text(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn handles_empty_input() {
        assert_eq!(normalize_message_text(""), "");
    }
}
