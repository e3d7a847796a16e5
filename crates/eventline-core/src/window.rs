//! Topic-aware candidate-matching window for the event resolver.

use chrono::Duration;

use crate::types::Topic;

/// How far back the event resolver should look for a candidate event to
/// merge into, based on topic and breaking status.
pub fn event_time_window(topic: Topic, is_breaking: bool) -> Duration {
    if matches!(topic, Topic::MacroEcon) {
        Duration::hours(48)
    } else if is_breaking {
        Duration::hours(6)
    } else {
        Duration::hours(24)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macro_econ_gets_48_hours() {
        assert_eq!(event_time_window(Topic::MacroEcon, false), Duration::hours(48));
        assert_eq!(event_time_window(Topic::MacroEcon, true), Duration::hours(48));
    }

    #[test]
    fn breaking_gets_6_hours() {
        assert_eq!(event_time_window(Topic::Geopolitics, true), Duration::hours(6));
    }

    #[test]
    fn default_is_24_hours() {
        assert_eq!(event_time_window(Topic::Equities, false), Duration::hours(24));
    }
}
