mod http;
mod memory;

pub use http::HttpStore;
pub use memory::{MemorySnapshot, MemoryStore};

use async_trait::async_trait;

use crate::model::{ActivityLog, ExtensionTime, SessionLog};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unreachable(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store rejected {op} ({status}): {code}")]
    Rejected {
        op: &'static str,
        status: u16,
        code: String,
    },

    #[error("duplicate {collection} record: {key}")]
    Duplicate {
        collection: &'static str,
        key: String,
    },
}

#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn StoreConnection>, StoreError>;
}

#[async_trait]
pub trait StoreConnection: Send + Sync {
    async fn find_session(
        &self,
        date: &str,
        start_time: &str,
    ) -> Result<Option<SessionLog>, StoreError>;

    async fn insert_session(&self, log: &SessionLog) -> Result<(), StoreError>;

    async fn find_extension_time(&self, extension: &str)
        -> Result<Option<ExtensionTime>, StoreError>;

    /// Fails with [`StoreError::Duplicate`] when the extension already exists.
    async fn insert_extension_time(&self, rec: &ExtensionTime) -> Result<(), StoreError>;

    async fn increment_extension_time(
        &self,
        extension: &str,
        seconds: f64,
    ) -> Result<bool, StoreError>;

    async fn upsert_activity(&self, log: &ActivityLog) -> Result<(), StoreError>;

    async fn close(self: Box<Self>);
}
