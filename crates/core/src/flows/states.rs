use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::stage::SalesStage;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    Qualification,
    Support,
}

/// SPIN discovery phase. Ordinals line up with the ordinal sales stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpinPhase {
    Situation,
    Problem,
    Implication,
    NeedPayoff,
    Closing,
}

impl SpinPhase {
    pub const ALL: [SpinPhase; 5] =
        [Self::Situation, Self::Problem, Self::Implication, Self::NeedPayoff, Self::Closing];

    pub fn ordinal(self) -> u8 {
        match self {
            Self::Situation => 0,
            Self::Problem => 1,
            Self::Implication => 2,
            Self::NeedPayoff => 3,
            Self::Closing => 4,
        }
    }

    pub fn next(self) -> Option<Self> {
        Self::ALL.get(usize::from(self.ordinal()) + 1).copied()
    }

    /// Sales stage this phase collects data for.
    pub fn stage(self) -> SalesStage {
        match self {
            Self::Situation => SalesStage::Discovery,
            Self::Problem => SalesStage::Budget,
            Self::Implication => SalesStage::Authority,
            Self::NeedPayoff => SalesStage::Need,
            Self::Closing => SalesStage::Timeline,
        }
    }

    pub fn from_stage(stage: SalesStage) -> Option<Self> {
        stage.ordinal().and_then(|ordinal| Self::ALL.get(usize::from(ordinal)).copied())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Situation => "situation",
            Self::Problem => "problem",
            Self::Implication => "implication",
            Self::NeedPayoff => "need_payoff",
            Self::Closing => "closing",
        }
    }
}

impl fmt::Display for SpinPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseEvent {
    Advance,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseAction {
    EvaluateStage,
    PromptForMissingFields,
    OfferHandoff,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowContext {
    pub missing_required_fields: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportState {
    Greeting,
    IdentifyingIssue,
    Clarifying,
    Resolving,
    Escalating,
    Confirming,
    Closing,
}

impl SupportState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::IdentifyingIssue => "identifying_issue",
            Self::Clarifying => "clarifying",
            Self::Resolving => "resolving",
            Self::Escalating => "escalating",
            Self::Confirming => "confirming",
            Self::Closing => "closing",
        }
    }
}

impl fmt::Display for SupportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportEvent {
    CustomerMessage,
    IssueUnclear,
    IssueIdentified,
    EscalationRequired,
    SolutionOffered,
    ResolutionConfirmed,
    IssueReopened,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportAction {
    AskForDetails,
    ProposeSolution,
    HandToHuman,
    ConfirmResolution,
    CloseConversation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome<S, E, A> {
    pub from: S,
    pub to: S,
    pub event: E,
    pub actions: Vec<A>,
}

#[cfg(test)]
mod tests {
    use super::SpinPhase;
    use crate::domain::stage::SalesStage;

    #[test]
    fn phases_and_ordinal_stages_share_ordinals() {
        for phase in SpinPhase::ALL {
            assert_eq!(phase.stage().ordinal(), Some(phase.ordinal()));
            assert_eq!(SpinPhase::from_stage(phase.stage()), Some(phase));
        }
        assert_eq!(SpinPhase::from_stage(SalesStage::Qualified), None);
        assert_eq!(SpinPhase::Closing.next(), None);
    }

    #[test]
    fn phase_names_are_snake_case() {
        let encoded = serde_json::to_string(&SpinPhase::NeedPayoff).expect("serialize");
        assert_eq!(encoded, "\"need_payoff\"");
        assert_eq!(SpinPhase::NeedPayoff.to_string(), "need_payoff");
    }
}
