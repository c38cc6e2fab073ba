use std::fmt;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::domain::conversation::{ConversationSnapshot, SupportSnapshot};
use crate::errors::ApplicationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SnapshotKind {
    Qualification,
    Support,
}

impl SnapshotKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Qualification => "qualification",
            Self::Support => "support",
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value persisted once per conversation key.
pub trait Snapshot: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: SnapshotKind;
}

impl Snapshot for ConversationSnapshot {
    const KIND: SnapshotKind = SnapshotKind::Qualification;
}

impl Snapshot for SupportSnapshot {
    const KIND: SnapshotKind = SnapshotKind::Support;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("snapshot store unavailable: {0}")]
    Unavailable(String),
    #[error("snapshot `{key}` could not be decoded: {detail}")]
    Decode { key: String, detail: String },
    #[error("snapshot `{key}` could not be encoded: {detail}")]
    Encode { key: String, detail: String },
}

impl From<StoreError> for ApplicationError {
    fn from(error: StoreError) -> Self {
        ApplicationError::Persistence(error.to_string())
    }
}

/// Persistence port for per-conversation snapshots.
#[async_trait]
pub trait SnapshotStore<T: Snapshot>: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<T>, StoreError>;
    async fn save(&self, key: &str, snapshot: &T) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}
