use thiserror::Error;

use leadflow_core::errors::{ApplicationError, DomainError};
use leadflow_core::store::StoreError;

use crate::prompts::PromptError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error("no conversation stored for key `{0}`")]
    UnknownConversation(String),
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::UnknownConversation(_))
    }
}

impl From<EngineError> for ApplicationError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::Domain(error) => ApplicationError::Domain(error),
            EngineError::Store(error) => error.into(),
            EngineError::Prompt(error) => ApplicationError::Configuration(error.to_string()),
            EngineError::UnknownConversation(key) => {
                ApplicationError::Domain(DomainError::InvariantViolation(format!(
                    "no conversation stored for key `{key}`"
                )))
            }
        }
    }
}

pub(crate) fn validate_key(key: &str) -> Result<&str, DomainError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(DomainError::InvariantViolation("conversation key must not be empty".to_string()));
    }
    Ok(key)
}

pub(crate) fn validate_message(message: &str) -> Result<&str, DomainError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(DomainError::InvariantViolation("message text must not be empty".to_string()));
    }
    Ok(message)
}
