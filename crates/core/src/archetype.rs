//! Keyword archetype classifier.
//!
//! Each turn the user message is scanned for per-profile keywords. The strictly highest count
//! wins; ties and empty scans fall back to the balanced profile. Weak signals (fewer than
//! [`HYSTERESIS_THRESHOLD`] hits) never replace a non-default profile chosen on an earlier turn.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::stage_data::contains_phrase;

pub const HYSTERESIS_THRESHOLD: u32 = 2;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Archetype {
    Analytical,
    Achiever,
    Relationship,
    Novelty,
    #[default]
    Balanced,
}

impl Archetype {
    pub const SCORED: [Archetype; 4] =
        [Self::Analytical, Self::Achiever, Self::Relationship, Self::Novelty];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Analytical => "analytical",
            Self::Achiever => "achiever",
            Self::Relationship => "relationship",
            Self::Novelty => "novelty",
            Self::Balanced => "balanced",
        }
    }

    pub fn profile(self) -> ArchetypeProfile {
        let (tone, triggers, avoid): (&str, &[&str], &[&str]) = match self {
            Self::Analytical => (
                "precise and factual; lead with numbers and concrete evidence",
                &["data", "proof", "benchmarks", "risk reduction"],
                &["hype", "vague promises", "emotional pressure"],
            ),
            Self::Achiever => (
                "direct and results-oriented; short sentences focused on outcomes",
                &["growth", "speed", "competitive edge", "winning"],
                &["long explanations", "small talk", "hesitation"],
            ),
            Self::Relationship => (
                "warm and reassuring; acknowledge the people involved",
                &["trust", "support", "team wellbeing", "partnership"],
                &["pushiness", "cold numbers first", "urgency pressure"],
            ),
            Self::Novelty => (
                "energetic and curious; highlight what is new or different",
                &["innovation", "exclusivity", "being first", "new possibilities"],
                &["routine framing", "long processes", "status quo"],
            ),
            Self::Balanced => (
                "friendly and professional; neutral pacing",
                &["clarity", "value"],
                &["jargon", "pressure"],
            ),
        };

        ArchetypeProfile {
            archetype: self,
            tone: tone.to_string(),
            triggers: triggers.iter().map(|item| (*item).to_string()).collect(),
            avoid: avoid.iter().map(|item| (*item).to_string()).collect(),
        }
    }

    fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::Analytical => &[
                "data", "numbers", "metrics", "roi", "compare", "comparison", "analysis",
                "details", "specs", "how exactly", "evidence", "report", "percent",
            ],
            Self::Achiever => &[
                "fast", "results", "goal", "goals", "win", "growth", "scale", "revenue",
                "target", "quickly", "bottom line", "performance",
            ],
            Self::Relationship => &[
                "team", "people", "trust", "help", "support", "together", "family",
                "feel", "care", "relationship", "partner",
            ],
            Self::Novelty => &[
                "new", "innovative", "latest", "cool", "exciting", "try", "first",
                "cutting edge", "different", "trend", "ai",
            ],
            Self::Balanced => &[],
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchetypeProfile {
    pub archetype: Archetype,
    pub tone: String,
    pub triggers: Vec<String>,
    pub avoid: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchetypeSelection {
    pub archetype: Archetype,
    pub scores: Vec<(Archetype, u32)>,
    pub retained: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ArchetypeClassifier;

impl ArchetypeClassifier {
    pub fn score(&self, message: &str) -> Vec<(Archetype, u32)> {
        let normalized = message.to_lowercase();
        Archetype::SCORED
            .iter()
            .map(|archetype| {
                let hits = archetype
                    .keywords()
                    .iter()
                    .filter(|keyword| contains_phrase(&normalized, keyword))
                    .count();
                (*archetype, u32::try_from(hits).unwrap_or(u32::MAX))
            })
            .collect()
    }

    pub fn classify(&self, message: &str, previous: Archetype) -> ArchetypeSelection {
        let scores = self.score(message);
        let max = scores.iter().map(|(_, score)| *score).max().unwrap_or(0);

        if max < HYSTERESIS_THRESHOLD && previous != Archetype::Balanced {
            return ArchetypeSelection { archetype: previous, scores, retained: true };
        }

        let leaders = scores.iter().filter(|(_, score)| *score == max).collect::<Vec<_>>();
        let archetype = match leaders.as_slice() {
            [(winner, score)] if *score > 0 => *winner,
            _ => Archetype::Balanced,
        };

        ArchetypeSelection { archetype, scores, retained: false }
    }
}
