use thiserror::Error;

use crate::domain::stage::SalesStage;
use crate::flows::FlowTransitionError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    BusinessRule,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown stage `{0}`")]
    UnknownStage(String),
    #[error("malformed data for stage `{stage}`: {detail}")]
    MalformedStageData { stage: String, detail: String },
    #[error("stage {stage} is not completed; missing: {missing_fields:?}")]
    StageNotCompleted { stage: SalesStage, missing_fields: Vec<String> },
    #[error("invalid stage transition from {from} to {to:?}")]
    InvalidStageTransition { from: SalesStage, to: Option<SalesStage> },
    #[error("lead cannot be qualified; unmet: {unmet:?}")]
    QualificationRejected { unmet: Vec<String> },
    #[error("lead is already in terminal stage {stage}")]
    AlreadyTerminal { stage: SalesStage },
    #[error("a disqualification reason is required")]
    InvalidDisqualifyReason,
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownStage(_)
            | Self::MalformedStageData { .. }
            | Self::InvalidDisqualifyReason
            | Self::InvariantViolation(_) => ErrorKind::Validation,
            Self::StageNotCompleted { .. }
            | Self::InvalidStageTransition { .. }
            | Self::QualificationRejected { .. }
            | Self::AlreadyTerminal { .. }
            | Self::FlowTransition(_) => ErrorKind::BusinessRule,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Conflict { .. } => "The conversation is not in a state that allows this action.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(error) => match error.kind() {
                ErrorKind::Validation => Self::BadRequest {
                    message: error.to_string(),
                    correlation_id: "unassigned".to_owned(),
                },
                ErrorKind::BusinessRule => Self::Conflict {
                    message: error.to_string(),
                    correlation_id: "unassigned".to_owned(),
                },
            },
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}
