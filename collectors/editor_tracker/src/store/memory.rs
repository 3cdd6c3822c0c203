use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{StoreConnection, StoreError, UsageStore};
use crate::edits::EditTotals;
use crate::model::{ActivityLog, ExtensionTime, SessionLog};

/// In-process store with the same collection semantics as `usage_store`.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemorySnapshot>>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemorySnapshot {
    pub sessions: Vec<SessionLog>,
    pub extension_times: BTreeMap<String, f64>,
    pub activity: BTreeMap<String, EditTotals>,
    pub connections: usize,
    pub refused: usize,
    pub unreachable: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MemorySnapshot {
        self.lock().clone()
    }

    /// Makes every subsequent `connect` fail until reset.
    #[cfg(test)]
    pub(crate) fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    fn lock(&self) -> MutexGuard<'_, MemorySnapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn connect(&self) -> Result<Box<dyn StoreConnection>, StoreError> {
        let mut state = self.lock();
        if state.unreachable {
            state.refused += 1;
            return Err(StoreError::Unreachable("memory store offline".to_string()));
        }
        state.connections += 1;
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl StoreConnection for MemoryStore {
    async fn find_session(
        &self,
        date: &str,
        start_time: &str,
    ) -> Result<Option<SessionLog>, StoreError> {
        Ok(self
            .lock()
            .sessions
            .iter()
            .find(|s| s.date == date && s.start_time == start_time)
            .cloned())
    }

    async fn insert_session(&self, log: &SessionLog) -> Result<(), StoreError> {
        self.lock().sessions.push(log.clone());
        Ok(())
    }

    async fn find_extension_time(
        &self,
        extension: &str,
    ) -> Result<Option<ExtensionTime>, StoreError> {
        Ok(self
            .lock()
            .extension_times
            .get(extension)
            .map(|total| ExtensionTime {
                extension: extension.to_string(),
                total_duration_seconds: *total,
            }))
    }

    async fn insert_extension_time(&self, rec: &ExtensionTime) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.extension_times.contains_key(&rec.extension) {
            return Err(StoreError::Duplicate {
                collection: "file_extension_time",
                key: rec.extension.clone(),
            });
        }
        state
            .extension_times
            .insert(rec.extension.clone(), rec.total_duration_seconds);
        Ok(())
    }

    async fn increment_extension_time(
        &self,
        extension: &str,
        seconds: f64,
    ) -> Result<bool, StoreError> {
        match self.lock().extension_times.get_mut(extension) {
            Some(total) => {
                *total += seconds;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn upsert_activity(&self, log: &ActivityLog) -> Result<(), StoreError> {
        *self.lock().activity.entry(log.date.clone()).or_default() += log.counts;
        Ok(())
    }

    async fn close(self: Box<Self>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn extension_insert_rejects_duplicates() {
        let store = MemoryStore::new();
        let conn = store.connect().await.unwrap();
        let rec = ExtensionTime {
            extension: "rs".to_string(),
            total_duration_seconds: 1.0,
        };
        conn.insert_extension_time(&rec).await.unwrap();
        assert!(matches!(
            conn.insert_extension_time(&rec).await,
            Err(StoreError::Duplicate { .. })
        ));
        assert!(conn.increment_extension_time("rs", 0.5).await.unwrap());
        assert!(!conn.increment_extension_time("md", 0.5).await.unwrap());
        conn.close().await;

        assert_eq!(store.snapshot().extension_times.get("rs"), Some(&1.5));
    }

    #[tokio::test]
    async fn unreachable_store_refuses_connections() {
        let store = MemoryStore::new();
        store.set_unreachable(true);
        assert!(store.connect().await.is_err());

        let snap = store.snapshot();
        assert_eq!(snap.connections, 0);
        assert_eq!(snap.refused, 1);
    }
}
