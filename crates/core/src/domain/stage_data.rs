//! Typed per-stage qualification data.
//!
//! Free-text BANT answers are interpreted here, at the extraction boundary, into a fixed schema
//! per stage. Scoring rules only ever see these typed records.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::bant::{keys, BantValues};
use crate::domain::stage::SalesStage;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    Confirmed,
    Estimated,
    NoBudget,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityLevel {
    DecisionMaker,
    Influencer,
    Technical,
    NoAuthority,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeedFit {
    Strong,
    Partial,
    Weak,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineHorizon {
    Immediate,
    ThisQuarter,
    ThisYear,
    NoTimeline,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoveryData {
    #[serde(default)]
    pub pain_point: Option<String>,
    #[serde(default)]
    pub urgency: Option<Urgency>,
    #[serde(default)]
    pub current_solution: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetData {
    #[serde(default)]
    pub status: Option<BudgetStatus>,
    #[serde(default)]
    pub amount: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthorityData {
    #[serde(default)]
    pub level: Option<AuthorityLevel>,
    #[serde(default)]
    pub decision_process: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NeedData {
    #[serde(default)]
    pub need: Option<String>,
    #[serde(default)]
    pub fit: Option<NeedFit>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimelineData {
    #[serde(default)]
    pub horizon: Option<TimelineHorizon>,
    #[serde(default)]
    pub target: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "fields", rename_all = "snake_case")]
pub enum StageData {
    Discovery(DiscoveryData),
    Budget(BudgetData),
    Authority(AuthorityData),
    Need(NeedData),
    Timeline(TimelineData),
}

impl StageData {
    pub fn stage(&self) -> SalesStage {
        match self {
            Self::Discovery(_) => SalesStage::Discovery,
            Self::Budget(_) => SalesStage::Budget,
            Self::Authority(_) => SalesStage::Authority,
            Self::Need(_) => SalesStage::Need,
            Self::Timeline(_) => SalesStage::Timeline,
        }
    }

    /// Decodes raw structured fields for `stage`. Unknown keys and wrong shapes are rejected.
    pub fn from_json(stage: SalesStage, fields: Value) -> Result<Self, DomainError> {
        let malformed = |error: serde_json::Error| DomainError::MalformedStageData {
            stage: stage.as_str().to_string(),
            detail: error.to_string(),
        };

        match stage {
            SalesStage::Discovery => serde_json::from_value(fields).map(Self::Discovery),
            SalesStage::Budget => serde_json::from_value(fields).map(Self::Budget),
            SalesStage::Authority => serde_json::from_value(fields).map(Self::Authority),
            SalesStage::Need => serde_json::from_value(fields).map(Self::Need),
            SalesStage::Timeline => serde_json::from_value(fields).map(Self::Timeline),
            SalesStage::Qualified | SalesStage::Disqualified => {
                return Err(DomainError::UnknownStage(stage.as_str().to_string()))
            }
        }
        .map_err(malformed)
    }

    /// Interprets collected free-text answers into the typed record for `stage`.
    pub fn from_bant(stage: SalesStage, values: &BantValues) -> Result<Self, DomainError> {
        let text = |key: &str| values.get(key).map(str::to_string);

        match stage {
            SalesStage::Discovery => Ok(Self::Discovery(DiscoveryData {
                pain_point: text(keys::PAIN_POINT),
                urgency: values.get(keys::URGENCY).map(classify_urgency),
                current_solution: text(keys::CURRENT_SOLUTION),
            })),
            SalesStage::Budget => Ok(Self::Budget(BudgetData {
                status: values.get(keys::BUDGET).map(classify_budget),
                amount: text(keys::BUDGET),
            })),
            SalesStage::Authority => Ok(Self::Authority(AuthorityData {
                level: values.get(keys::AUTHORITY).map(classify_authority),
                decision_process: text(keys::AUTHORITY),
            })),
            SalesStage::Need => Ok(Self::Need(NeedData {
                need: text(keys::NEED),
                fit: values.get(keys::NEED).map(classify_need),
            })),
            SalesStage::Timeline => Ok(Self::Timeline(TimelineData {
                horizon: values.get(keys::TIMELINE).map(classify_timeline),
                target: text(keys::TIMELINE),
            })),
            SalesStage::Qualified | SalesStage::Disqualified => {
                Err(DomainError::UnknownStage(stage.as_str().to_string()))
            }
        }
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| contains_phrase(haystack, needle))
}

/// Substring match that only accepts hits on word boundaries, so `now` does not match `know`.
pub fn contains_phrase(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, matched)| {
        let end = start + matched.len();
        let before = haystack[..start].chars().next_back();
        let after = haystack[end..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Negated buying phrases. Checked before any positive cue, since most of them embed one
/// (`not right now` contains `right now`).
pub const NOT_BUYING_CUES: &[&str] = &[
    "not right now",
    "not now",
    "not buying",
    "not looking",
    "not in a hurry",
    "not a priority",
    "maybe later",
];

pub fn classify_urgency(value: &str) -> Urgency {
    let normalized = value.to_ascii_lowercase();
    if contains_any(&normalized, NOT_BUYING_CUES)
        || contains_any(&normalized, &["low", "no rush", "eventually", "someday", "not urgent"])
    {
        Urgency::Low
    } else if contains_any(
        &normalized,
        &["critical", "urgent", "asap", "immediately", "right now", "bleeding"],
    ) {
        Urgency::Critical
    } else if contains_any(&normalized, &["high", "soon", "important", "pressing"]) {
        Urgency::High
    } else {
        Urgency::Medium
    }
}

pub fn classify_budget(value: &str) -> BudgetStatus {
    let normalized = value.to_ascii_lowercase();
    if contains_any(
        &normalized,
        &["no budget", "none", "don't have", "do not have", "no money", "can't afford", "zero"],
    ) {
        BudgetStatus::NoBudget
    } else if contains_any(&normalized, &["confirmed", "approved", "allocated", "signed off", "set aside"]) {
        BudgetStatus::Confirmed
    } else {
        BudgetStatus::Estimated
    }
}

pub fn classify_authority(value: &str) -> AuthorityLevel {
    let normalized = value.to_ascii_lowercase();
    if contains_any(
        &normalized,
        &["no authority", "not my call", "not me", "someone else", "no say", "can't decide"],
    ) {
        AuthorityLevel::NoAuthority
    } else if contains_any(
        &normalized,
        &["decision maker", "i decide", "my call", "owner", "founder", "ceo", "director", "final say"],
    ) {
        AuthorityLevel::DecisionMaker
    } else if contains_any(&normalized, &["technical", "engineer", "developer", "it team", "evaluating", "evaluation"]) {
        AuthorityLevel::Technical
    } else {
        AuthorityLevel::Influencer
    }
}

pub fn classify_need(value: &str) -> NeedFit {
    let normalized = value.to_ascii_lowercase();
    if contains_any(&normalized, &["nice to have", "not sure", "maybe", "just looking", "curious"]) {
        NeedFit::Weak
    } else if contains_any(&normalized, &["must", "essential", "critical", "exactly", "need it", "strong"]) {
        NeedFit::Strong
    } else {
        NeedFit::Partial
    }
}

pub fn classify_timeline(value: &str) -> TimelineHorizon {
    let normalized = value.to_ascii_lowercase();
    if contains_any(&normalized, NOT_BUYING_CUES)
        || contains_any(&normalized, &["no timeline", "no plans", "not planning", "someday", "no date"])
    {
        TimelineHorizon::NoTimeline
    } else if contains_any(
        &normalized,
        &["now", "immediately", "asap", "this week", "next week", "this month", "right away"],
    ) {
        TimelineHorizon::Immediate
    } else if contains_any(
        &normalized,
        &[
            "quarter", "next month", "30 days", "60 days", "90 days", "weeks", "q1", "q2", "q3",
            "q4",
        ],
    ) {
        TimelineHorizon::ThisQuarter
    } else {
        TimelineHorizon::ThisYear
    }
}
