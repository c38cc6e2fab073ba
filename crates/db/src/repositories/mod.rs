use leadflow_core::store::StoreError;
use thiserror::Error;

pub mod memory;
pub mod snapshot;

pub use memory::InMemorySnapshotStore;
pub use snapshot::SqlSnapshotStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error for `{key}`: {detail}")]
    Decode { key: String, detail: String },
    #[error("encode error for `{key}`: {detail}")]
    Encode { key: String, detail: String },
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(source) => StoreError::Unavailable(source.to_string()),
            RepositoryError::Decode { key, detail } => StoreError::Decode { key, detail },
            RepositoryError::Encode { key, detail } => StoreError::Encode { key, detail },
        }
    }
}

#[cfg(test)]
mod tests {
    use leadflow_core::store::StoreError;

    use super::RepositoryError;

    #[test]
    fn database_errors_surface_as_unavailable() {
        let error: StoreError = RepositoryError::Database(sqlx::Error::PoolTimedOut).into();
        assert!(matches!(error, StoreError::Unavailable(_)));
    }

    #[test]
    fn decode_errors_keep_the_conversation_key() {
        let error: StoreError =
            RepositoryError::Decode { key: "c-1".to_owned(), detail: "eof".to_owned() }.into();
        assert_eq!(
            error,
            StoreError::Decode { key: "c-1".to_owned(), detail: "eof".to_owned() }
        );
    }
}
