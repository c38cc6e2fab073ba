use std::fmt;

use serde::{Deserialize, Serialize};

pub const MAX_SCORE: u8 = 100;
pub const QUALIFIED_THRESHOLD: u8 = 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

/// Bounded lead score in `0..=100`.
///
/// Arithmetic never fails: `add`/`subtract` saturate at the bounds and return a new value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct QualificationScore(u8);

impl QualificationScore {
    pub const ZERO: Self = Self(0);

    /// Builds a score, clamping out-of-range input.
    pub fn new(value: i64) -> Self {
        Self(value.clamp(0, i64::from(MAX_SCORE)) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn add(self, points: i64) -> Self {
        Self::new(i64::from(self.0).saturating_add(points))
    }

    pub fn subtract(self, points: i64) -> Self {
        Self::new(i64::from(self.0).saturating_sub(points))
    }

    /// Applies a signed delta through `add` or `subtract`.
    pub fn apply(self, delta: i64) -> Self {
        if delta >= 0 {
            self.add(delta)
        } else {
            self.subtract(delta.saturating_neg())
        }
    }

    pub fn level(self) -> ScoreLevel {
        match self.0 {
            0..=39 => ScoreLevel::Low,
            40..=59 => ScoreLevel::Medium,
            60..=79 => ScoreLevel::High,
            _ => ScoreLevel::VeryHigh,
        }
    }

    pub fn is_qualified(self) -> bool {
        self.0 >= QUALIFIED_THRESHOLD
    }
}

impl fmt::Display for QualificationScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for QualificationScore {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (0..=i64::from(MAX_SCORE)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(format!("qualification score {value} is outside 0..=100"))
        }
    }
}

impl From<QualificationScore> for i64 {
    fn from(value: QualificationScore) -> Self {
        i64::from(value.0)
    }
}
