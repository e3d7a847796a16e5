use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed topic taxonomy recognized by the validator and routing engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    MacroEcon,
    CentralBanks,
    Equities,
    Credit,
    Rates,
    Fx,
    Commodities,
    Crypto,
    WarSecurity,
    Geopolitics,
    CompanySpecific,
    Other,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::MacroEcon => "macro_econ",
            Topic::CentralBanks => "central_banks",
            Topic::Equities => "equities",
            Topic::Credit => "credit",
            Topic::Rates => "rates",
            Topic::Fx => "fx",
            Topic::Commodities => "commodities",
            Topic::Crypto => "crypto",
            Topic::WarSecurity => "war_security",
            Topic::Geopolitics => "geopolitics",
            Topic::CompanySpecific => "company_specific",
            Topic::Other => "other",
        }
    }

    pub fn from_str_opt(value: &str) -> Option<Self> {
        Some(match value {
            "macro_econ" => Topic::MacroEcon,
            "central_banks" => Topic::CentralBanks,
            "equities" => Topic::Equities,
            "credit" => Topic::Credit,
            "rates" => Topic::Rates,
            "fx" => Topic::Fx,
            "commodities" => Topic::Commodities,
            "crypto" => Topic::Crypto,
            "war_security" => Topic::WarSecurity,
            "geopolitics" => Topic::Geopolitics,
            "company_specific" => Topic::CompanySpecific,
            "other" => Topic::Other,
            _ => return None,
        })
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
    Mixed,
    Unknown,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
            Sentiment::Mixed => "mixed",
            Sentiment::Unknown => "unknown",
        }
    }

    pub fn from_str_opt(value: &str) -> Option<Self> {
        Some(match value {
            "positive" => Sentiment::Positive,
            "negative" => Sentiment::Negative,
            "neutral" => Sentiment::Neutral,
            "mixed" => Sentiment::Mixed,
            "unknown" => Sentiment::Unknown,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakingWindow {
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    None,
}

impl BreakingWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakingWindow::FifteenMinutes => "15m",
            BreakingWindow::OneHour => "1h",
            BreakingWindow::FourHours => "4h",
            BreakingWindow::None => "none",
        }
    }

    pub fn from_str_opt(value: &str) -> Option<Self> {
        Some(match value {
            "15m" => BreakingWindow::FifteenMinutes,
            "1h" => BreakingWindow::OneHour,
            "4h" => BreakingWindow::FourHours,
            "none" => BreakingWindow::None,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishPriority {
    None,
    Low,
    Medium,
    High,
}

impl PublishPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishPriority::None => "none",
            PublishPriority::Low => "low",
            PublishPriority::Medium => "medium",
            PublishPriority::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    Create,
    Update,
    Ignore,
}

impl EventAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::Create => "create",
            EventAction::Update => "update",
            EventAction::Ignore => "ignore",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageAction {
    Archive,
    Monitor,
    Update,
    Promote,
}

impl TriageAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriageAction::Archive => "archive",
            TriageAction::Monitor => "monitor",
            TriageAction::Update => "update",
            TriageAction::Promote => "promote",
        }
    }
}

/// Structured entity bundle on an extraction, mirroring the model's own
/// `entities` object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionEntities {
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde(default)]
    pub orgs: Vec<String>,
    #[serde(default)]
    pub people: Vec<String>,
    #[serde(default)]
    pub tickers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarketStat {
    pub label: String,
    pub value: f64,
    pub unit: String,
    #[serde(default)]
    pub context: Option<String>,
}

/// Validated (and, after canonicalization, canonical) extraction payload.
/// Produced by the Validator from raw model text; mutated in place by the
/// Canonicalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionPayload {
    pub topic: Topic,
    pub entities: ExtractionEntities,
    pub affected_countries_first_order: Vec<String>,
    pub market_stats: Vec<MarketStat>,
    pub sentiment: Sentiment,
    pub confidence: f64,
    pub impact_score: f64,
    pub is_breaking: bool,
    pub breaking_window: BreakingWindow,
    pub event_time: Option<DateTime<Utc>>,
    pub source_claimed: Option<String>,
    pub summary_1_sentence: String,
    pub keywords: Vec<String>,
    pub event_fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecisionData {
    pub store_to: Vec<String>,
    pub publish_priority: PublishPriority,
    pub requires_evidence: bool,
    pub event_action: EventAction,
    pub triage_action: Option<TriageAction>,
    #[serde(default)]
    pub triage_rules: Vec<String>,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub rules_fired: Vec<String>,
}
