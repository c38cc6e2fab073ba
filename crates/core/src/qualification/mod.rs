pub mod policy;
pub mod progress;
pub mod scoring;

pub use policy::{
    DisqualifyAdvice, DisqualifyFactor, QualificationPolicy, RiskAssessment, RiskLevel,
};
pub use progress::{conversation_progress, ready_for_handoff, snapshot_progress};
pub use scoring::{
    process_and_advance, process_stage, reevaluate_lead, AdvanceOutcome, ScoringRules,
    StageEvaluation,
};
