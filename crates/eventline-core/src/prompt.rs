//! Renders the extraction prompt sent to the model.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::CoreResult;
use crate::template::render_template;

/// Identifies which revision of the extraction prompt produced a given
/// response, so a later change to the wording doesn't silently reinterpret
/// old extractions.
pub const PROMPT_VERSION: &str = "extraction_agent_v2";

const EXTRACTION_TEMPLATE: &str = include_str!("../prompts/extraction_agent_v2.txt");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub prompt_version: &'static str,
    pub prompt_text: String,
}

/// Render the extraction prompt for a single normalized message.
pub fn render_extraction_prompt(
    normalized_text: &str,
    message_time: DateTime<Utc>,
    source_channel_name: Option<&str>,
) -> CoreResult<RenderedPrompt> {
    let message_time_str = message_time.to_rfc3339();
    let source_channel_name = source_channel_name.unwrap_or("");
    let vars = HashMap::from([
        ("normalized_text", normalized_text),
        ("message_time", message_time_str.as_str()),
        ("source_channel_name", source_channel_name),
    ]);

    let prompt_text = render_template(EXTRACTION_TEMPLATE, &vars)?;

    Ok(RenderedPrompt {
        prompt_version: PROMPT_VERSION,
        prompt_text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn renders_with_all_placeholders_filled() {
        let time = Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap();
        let rendered =
            render_extraction_prompt("Oil prices rise 3%.", time, Some("reuters_wire")).unwrap();
        assert_eq!(rendered.prompt_version, "extraction_agent_v2");
        assert!(rendered.prompt_text.contains("Oil prices rise 3%."));
        assert!(rendered.prompt_text.contains("reuters_wire"));
        assert!(!rendered.prompt_text.contains("{{"));
    }

    #[test]
    fn renders_with_missing_source_channel() {
        let time = Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap();
        let rendered = render_extraction_prompt("Oil prices rise 3%.", time, None).unwrap();
        assert!(!rendered.prompt_text.contains("{{"));
    }
}
