use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use tracing::debug;

use leadflow_core::store::{Snapshot, SnapshotStore, StoreError};

use super::RepositoryError;
use crate::DbPool;

/// Stores one JSON payload per `(kind, conversation_key)` in `conversation_snapshot`.
pub struct SqlSnapshotStore<T> {
    pool: DbPool,
    _snapshot: PhantomData<fn() -> T>,
}

impl<T> SqlSnapshotStore<T> {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, _snapshot: PhantomData }
    }
}

impl<T> Clone for SqlSnapshotStore<T> {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}

impl<T: Snapshot> SqlSnapshotStore<T> {
    async fn fetch(&self, key: &str) -> Result<Option<T>, RepositoryError> {
        let row = sqlx::query(
            "SELECT payload FROM conversation_snapshot WHERE kind = ? AND conversation_key = ?",
        )
        .bind(T::KIND.as_str())
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let payload: String = row.try_get("payload").map_err(|e| RepositoryError::Decode {
            key: key.to_owned(),
            detail: e.to_string(),
        })?;
        serde_json::from_str(&payload)
            .map(Some)
            .map_err(|e| RepositoryError::Decode { key: key.to_owned(), detail: e.to_string() })
    }

    async fn upsert(&self, key: &str, snapshot: &T) -> Result<(), RepositoryError> {
        let payload = serde_json::to_string(snapshot)
            .map_err(|e| RepositoryError::Encode { key: key.to_owned(), detail: e.to_string() })?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO conversation_snapshot (kind, conversation_key, payload, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(kind, conversation_key) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at",
        )
        .bind(T::KIND.as_str())
        .bind(key)
        .bind(&payload)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        debug!(
            event_name = "persistence.snapshot_saved",
            kind = T::KIND.as_str(),
            conversation_key = key,
            bytes = payload.len(),
            "snapshot saved"
        );
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM conversation_snapshot WHERE kind = ? AND conversation_key = ?")
                .bind(T::KIND.as_str())
                .bind(key)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl<T: Snapshot> SnapshotStore<T> for SqlSnapshotStore<T> {
    async fn load(&self, key: &str) -> Result<Option<T>, StoreError> {
        Ok(self.fetch(key).await?)
    }

    async fn save(&self, key: &str, snapshot: &T) -> Result<(), StoreError> {
        Ok(self.upsert(key, snapshot).await?)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.remove(key).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use leadflow_core::domain::conversation::{ConversationSnapshot, SupportSnapshot};
    use leadflow_core::domain::turn::TurnRole;
    use leadflow_core::flows::{SpinPhase, SupportState};
    use leadflow_core::store::{SnapshotStore, StoreError};

    use super::SqlSnapshotStore;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    #[tokio::test]
    async fn saves_and_reloads_conversation_snapshot() {
        let pool = setup().await;
        let store = SqlSnapshotStore::<ConversationSnapshot>::new(pool);

        let mut snapshot = ConversationSnapshot::new("lead-42", 20, Utc::now());
        snapshot.phase = SpinPhase::Implication;
        snapshot.bant.set("pain_point", "slow follow up");
        snapshot.turns.push(TurnRole::User, "we lose leads every week");

        store.save("lead-42", &snapshot).await.expect("save");
        let loaded = store.load("lead-42").await.expect("load").expect("present");

        assert_eq!(loaded.phase, SpinPhase::Implication);
        assert_eq!(loaded.bant.get("pain_point"), Some("slow follow up"));
        assert_eq!(loaded.turns.len(), 1);
    }

    #[tokio::test]
    async fn second_save_overwrites_payload() {
        let pool = setup().await;
        let store = SqlSnapshotStore::<ConversationSnapshot>::new(pool.clone());

        let mut snapshot = ConversationSnapshot::new("lead-1", 20, Utc::now());
        store.save("lead-1", &snapshot).await.expect("first save");
        snapshot.phase = SpinPhase::Closing;
        store.save("lead-1", &snapshot).await.expect("second save");

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversation_snapshot")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(rows, 1);

        let loaded = store.load("lead-1").await.expect("load").expect("present");
        assert_eq!(loaded.phase, SpinPhase::Closing);
    }

    #[tokio::test]
    async fn kinds_share_keys_without_colliding() {
        let pool = setup().await;
        let sales = SqlSnapshotStore::<ConversationSnapshot>::new(pool.clone());
        let support = SqlSnapshotStore::<SupportSnapshot>::new(pool);

        sales.save("shared", &ConversationSnapshot::new("shared", 20, Utc::now())).await.expect("sales");
        let mut ticket = SupportSnapshot::new("shared", 20, Utc::now());
        ticket.state = SupportState::Resolving;
        support.save("shared", &ticket).await.expect("support");

        assert_eq!(
            support.load("shared").await.expect("load").expect("present").state,
            SupportState::Resolving
        );
        assert!(sales.delete("shared").await.expect("delete"));
        assert!(sales.load("shared").await.expect("load").is_none());
        assert!(support.load("shared").await.expect("load").is_some());
    }

    #[tokio::test]
    async fn corrupt_payload_reports_decode_error() {
        let pool = setup().await;
        sqlx::query(
            "INSERT INTO conversation_snapshot (kind, conversation_key, payload, created_at, updated_at)
             VALUES ('qualification', 'broken', '{not json', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .expect("insert corrupt row");

        let store = SqlSnapshotStore::<ConversationSnapshot>::new(pool);
        let error = store.load("broken").await.expect_err("corrupt payload must fail");
        assert!(matches!(error, StoreError::Decode { ref key, .. } if key == "broken"));
    }
}
