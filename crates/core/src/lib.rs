pub mod archetype;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod profile;
pub mod qualification;
pub mod store;
pub mod style;

pub use archetype::{Archetype, ArchetypeClassifier, ArchetypeProfile, ArchetypeSelection};
pub use domain::bant::{BantFieldDescriptor, BantSnapshot, BantValues};
pub use domain::conversation::{
    ConversationSnapshot, SupportCategory, SupportPriority, SupportSnapshot,
};
pub use domain::lead::{Lead, LeadId, StageRecord};
pub use domain::score::{QualificationScore, ScoreLevel};
pub use domain::stage::SalesStage;
pub use domain::stage_data::StageData;
pub use domain::turn::{ConversationTurn, TurnRole, TurnWindow};
pub use errors::{ApplicationError, DomainError, ErrorKind, InterfaceError};
pub use flows::{SpinPhase, SupportState};
pub use profile::AgentProfile;
pub use qualification::{QualificationPolicy, ScoringRules};
pub use store::{Snapshot, SnapshotKind, SnapshotStore, StoreError};
pub use style::{StyleIssue, StyleRules, SupportIssue, SupportStyleRules};
