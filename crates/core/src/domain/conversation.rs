use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::archetype::Archetype;
use crate::domain::bant::BantValues;
use crate::domain::lead::{Lead, LeadId};
use crate::domain::turn::TurnWindow;
use crate::flows::states::{SpinPhase, SupportState};

/// Everything the qualification engine keeps per conversation key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    pub key: String,
    pub phase: SpinPhase,
    pub lead: Lead,
    pub bant: BantValues,
    pub archetype: Archetype,
    pub turns: TurnWindow,
    pub updated_at: DateTime<Utc>,
}

impl ConversationSnapshot {
    pub fn new(key: impl Into<String>, window: usize, now: DateTime<Utc>) -> Self {
        let key = key.into();
        Self {
            lead: Lead::new(LeadId(key.clone()), now),
            key,
            phase: SpinPhase::Situation,
            bant: BantValues::default(),
            archetype: Archetype::Balanced,
            turns: TurnWindow::new(window),
            updated_at: now,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportCategory {
    Billing,
    Technical,
    Account,
    Cancellation,
    #[default]
    General,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Per-conversation state of the support flow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportSnapshot {
    pub key: String,
    pub state: SupportState,
    pub category: SupportCategory,
    pub priority: SupportPriority,
    pub issue_summary: Option<String>,
    pub turn_count: u32,
    pub escalated: bool,
    pub resolved: bool,
    pub turns: TurnWindow,
    pub updated_at: DateTime<Utc>,
}

impl SupportSnapshot {
    pub fn new(key: impl Into<String>, window: usize, now: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            state: SupportState::Greeting,
            category: SupportCategory::General,
            priority: SupportPriority::Normal,
            issue_summary: None,
            turn_count: 0,
            escalated: false,
            resolved: false,
            turns: TurnWindow::new(window),
            updated_at: now,
        }
    }
}
