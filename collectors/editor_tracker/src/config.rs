use std::sync::Arc;
use std::time::Duration;

use crate::gateway::Gateway;
use crate::store::HttpStore;

pub const DEFAULT_DATABASE: &str = "vsCodeUsageDB";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_DATABASE_LEN: usize = 64;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid database name '{0}': use 1-64 of [A-Za-z0-9_-]")]
    InvalidDatabase(String),

    #[error("unsupported store URI '{0}': expected http:// or https://")]
    UnsupportedScheme(String),
}

/// Where tracked usage goes. No URI means persistence is off.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    pub uri: Option<String>,
    pub database: String,
    pub timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: None,
            database: DEFAULT_DATABASE.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl StoreConfig {
    /// Blank values count as absent.
    pub fn new(
        uri: Option<String>,
        database: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let uri = uri
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        if let Some(u) = &uri {
            if !(u.starts_with("http://") || u.starts_with("https://")) {
                return Err(ConfigError::UnsupportedScheme(u.clone()));
            }
        }

        let database = database
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string());
        if database.len() > MAX_DATABASE_LEN
            || !database
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ConfigError::InvalidDatabase(database));
        }

        Ok(Self {
            uri,
            database,
            timeout,
        })
    }

    pub fn gateway(&self) -> Gateway {
        match &self.uri {
            Some(uri) => Gateway::new(Arc::new(HttpStore::new(uri, &self.database, self.timeout))),
            None => Gateway::disabled(),
        }
    }
}
