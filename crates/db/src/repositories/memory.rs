use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use leadflow_core::store::{Snapshot, SnapshotStore, StoreError};

/// Process-local snapshot store; contents vanish with the process.
pub struct InMemorySnapshotStore<T> {
    snapshots: RwLock<HashMap<String, T>>,
}

impl<T> Default for InMemorySnapshotStore<T> {
    fn default() -> Self {
        Self { snapshots: RwLock::new(HashMap::new()) }
    }
}

impl<T> InMemorySnapshotStore<T> {
    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.is_empty()
    }
}

#[async_trait]
impl<T: Snapshot> SnapshotStore<T> for InMemorySnapshotStore<T> {
    async fn load(&self, key: &str) -> Result<Option<T>, StoreError> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots.get(key).cloned())
    }

    async fn save(&self, key: &str, snapshot: &T) -> Result<(), StoreError> {
        let mut snapshots = self.snapshots.write().await;
        snapshots.insert(key.to_owned(), snapshot.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut snapshots = self.snapshots.write().await;
        Ok(snapshots.remove(key).is_some())
    }
}
