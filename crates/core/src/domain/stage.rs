use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

pub const ORDINAL_STAGE_COUNT: u8 = 5;

/// Sales stage of a lead.
///
/// The five ordinal stages form the happy path. `Qualified` and `Disqualified` are terminal and
/// sit outside the ordering: they have no neighbours and compare as unordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SalesStage {
    Discovery,
    Budget,
    Authority,
    Need,
    Timeline,
    Qualified,
    Disqualified,
}

impl SalesStage {
    pub const ORDINAL: [SalesStage; 5] =
        [Self::Discovery, Self::Budget, Self::Authority, Self::Need, Self::Timeline];

    pub fn ordinal(self) -> Option<u8> {
        match self {
            Self::Discovery => Some(0),
            Self::Budget => Some(1),
            Self::Authority => Some(2),
            Self::Need => Some(3),
            Self::Timeline => Some(4),
            Self::Qualified | Self::Disqualified => None,
        }
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ORDINAL.get(usize::from(ordinal)).copied()
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Qualified | Self::Disqualified)
    }

    pub fn next(self) -> Option<Self> {
        self.ordinal().and_then(|ordinal| Self::from_ordinal(ordinal + 1))
    }

    pub fn previous(self) -> Option<Self> {
        self.ordinal().and_then(|ordinal| ordinal.checked_sub(1)).and_then(Self::from_ordinal)
    }

    /// Percentage along the happy path: `round(ordinal / 5 * 100)`.
    pub fn progress(self) -> u8 {
        match self {
            Self::Qualified => 100,
            Self::Disqualified => 0,
            ordinal_stage => {
                let ordinal = f64::from(ordinal_stage.ordinal().unwrap_or(0));
                (ordinal / f64::from(ORDINAL_STAGE_COUNT) * 100.0).round() as u8
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Budget => "budget",
            Self::Authority => "authority",
            Self::Need => "need",
            Self::Timeline => "timeline",
            Self::Qualified => "qualified",
            Self::Disqualified => "disqualified",
        }
    }
}

impl PartialOrd for SalesStage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.ordinal(), other.ordinal()) {
            (Some(left), Some(right)) => Some(left.cmp(&right)),
            _ if self == other => Some(Ordering::Equal),
            _ => None,
        }
    }
}

impl fmt::Display for SalesStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SalesStage {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "discovery" => Ok(Self::Discovery),
            "budget" => Ok(Self::Budget),
            "authority" => Ok(Self::Authority),
            "need" => Ok(Self::Need),
            "timeline" => Ok(Self::Timeline),
            "qualified" => Ok(Self::Qualified),
            "disqualified" => Ok(Self::Disqualified),
            other => Err(DomainError::UnknownStage(other.to_string())),
        }
    }
}
