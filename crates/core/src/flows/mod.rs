pub mod engine;
pub mod states;

pub use engine::{
    FlowDefinition, FlowEngine, FlowTransitionError, PhaseTransition, SpinFlow, SupportFlow,
    SupportTransition,
};
pub use states::{
    FlowContext, FlowType, PhaseAction, PhaseEvent, SpinPhase, SupportAction, SupportEvent,
    SupportState, TransitionOutcome,
};
