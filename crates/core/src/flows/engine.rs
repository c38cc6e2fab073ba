use std::fmt::Debug;

use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::states::{
    FlowContext, FlowType, PhaseAction, PhaseEvent, SpinPhase, SupportAction, SupportEvent,
    SupportState, TransitionOutcome,
};

pub type PhaseTransition = TransitionOutcome<SpinPhase, PhaseEvent, PhaseAction>;
pub type SupportTransition = TransitionOutcome<SupportState, SupportEvent, SupportAction>;

pub trait FlowDefinition {
    type State: Clone + Debug;
    type Event: Clone + Debug;
    type Action: Clone + Debug;

    fn flow_type(&self) -> FlowType;
    fn initial_state(&self) -> Self::State;
    fn transition(
        &self,
        current: &Self::State,
        event: &Self::Event,
        context: &FlowContext,
    ) -> Result<TransitionOutcome<Self::State, Self::Event, Self::Action>, FlowTransitionError>;
}

/// SPIN phase machine: situation -> problem -> implication -> need_payoff -> closing.
#[derive(Clone, Debug, Default)]
pub struct SpinFlow;

impl FlowDefinition for SpinFlow {
    type State = SpinPhase;
    type Event = PhaseEvent;
    type Action = PhaseAction;

    fn flow_type(&self) -> FlowType {
        FlowType::Qualification
    }

    fn initial_state(&self) -> SpinPhase {
        SpinPhase::Situation
    }

    fn transition(
        &self,
        current: &SpinPhase,
        event: &PhaseEvent,
        context: &FlowContext,
    ) -> Result<PhaseTransition, FlowTransitionError> {
        match event {
            PhaseEvent::Advance => {
                if !context.missing_required_fields.is_empty() {
                    return Err(FlowTransitionError::MissingRequiredFields {
                        state: current.to_string(),
                        missing_fields: context.missing_required_fields.clone(),
                    });
                }
                let to = current.next().ok_or_else(|| FlowTransitionError::InvalidTransition {
                    state: current.to_string(),
                    event: format!("{event:?}"),
                })?;
                let mut actions = vec![PhaseAction::EvaluateStage, PhaseAction::PromptForMissingFields];
                if to == SpinPhase::Closing {
                    actions.push(PhaseAction::OfferHandoff);
                }
                Ok(TransitionOutcome { from: *current, to, event: *event, actions })
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SupportFlow;

impl FlowDefinition for SupportFlow {
    type State = SupportState;
    type Event = SupportEvent;
    type Action = SupportAction;

    fn flow_type(&self) -> FlowType {
        FlowType::Support
    }

    fn initial_state(&self) -> SupportState {
        SupportState::Greeting
    }

    fn transition(
        &self,
        current: &SupportState,
        event: &SupportEvent,
        _context: &FlowContext,
    ) -> Result<SupportTransition, FlowTransitionError> {
        transition_support(current, event)
    }
}

fn transition_support(
    current: &SupportState,
    event: &SupportEvent,
) -> Result<SupportTransition, FlowTransitionError> {
    use SupportAction::{AskForDetails, CloseConversation, ConfirmResolution, HandToHuman, ProposeSolution};
    use SupportEvent::{
        CustomerMessage, EscalationRequired, IssueIdentified, IssueReopened, IssueUnclear,
        ResolutionConfirmed, SolutionOffered,
    };
    use SupportState::{
        Clarifying, Closing, Confirming, Escalating, Greeting, IdentifyingIssue, Resolving,
    };

    let (to, actions) = match (current, event) {
        (Greeting, CustomerMessage) | (Closing, CustomerMessage) => {
            (IdentifyingIssue, vec![AskForDetails])
        }
        (IdentifyingIssue, IssueUnclear)
        | (Clarifying, IssueUnclear)
        | (Resolving, IssueUnclear) => (Clarifying, vec![AskForDetails]),
        (IdentifyingIssue, IssueIdentified) | (Clarifying, IssueIdentified) => {
            (Resolving, vec![ProposeSolution])
        }
        (Confirming, IssueReopened) => (Resolving, vec![ProposeSolution]),
        (Resolving, SolutionOffered) => (Confirming, vec![ConfirmResolution]),
        (Escalating, EscalationRequired) => (Escalating, Vec::new()),
        (Closing, EscalationRequired) => {
            return Err(FlowTransitionError::InvalidTransition {
                state: current.to_string(),
                event: format!("{event:?}"),
            });
        }
        (_, EscalationRequired) => (Escalating, vec![HandToHuman]),
        (Confirming, ResolutionConfirmed) | (Escalating, ResolutionConfirmed) => {
            (Closing, vec![CloseConversation])
        }
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                state: current.to_string(),
                event: format!("{event:?}"),
            });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: *event, actions })
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn flow_type(&self) -> FlowType {
        self.flow.flow_type()
    }

    pub fn initial_state(&self) -> F::State {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &F::State,
        event: &F::Event,
        context: &FlowContext,
    ) -> Result<TransitionOutcome<F::State, F::Event, F::Action>, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &F::State,
        event: &F::Event,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome<F::State, F::Event, F::Action>, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit.conversation_key.clone(),
                        audit.correlation_id.clone(),
                        "flow.transition_applied",
                        AuditCategory::Flow,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("flow", format!("{:?}", self.flow_type()))
                    .with_metadata("from", format!("{:?}", outcome.from))
                    .with_metadata("to", format!("{:?}", outcome.to))
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.conversation_key.clone(),
                        audit.correlation_id.clone(),
                        "flow.transition_rejected",
                        AuditCategory::Flow,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("flow", format!("{:?}", self.flow_type()))
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<SpinFlow> {
    fn default() -> Self {
        Self::new(SpinFlow)
    }
}

impl Default for FlowEngine<SupportFlow> {
    fn default() -> Self {
        Self::new(SupportFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("missing required fields before transition from {state}: {missing_fields:?}")]
    MissingRequiredFields { state: String, missing_fields: Vec<String> },
    #[error("invalid transition from {state} using event {event}")]
    InvalidTransition { state: String, event: String },
}
