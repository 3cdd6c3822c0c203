use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{StoreConnection, StoreError, UsageStore};
use crate::model::{ActivityLog, ExtensionTime, SessionLog};

/// Talks to a `usage_store` service, e.g. `http://127.0.0.1:17700`.
#[derive(Clone, Debug)]
pub struct HttpStore {
    base_url: String,
    database: String,
    timeout: Duration,
}

impl HttpStore {
    pub fn new(base_url: &str, database: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            database: database.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl UsageStore for HttpStore {
    async fn connect(&self) -> Result<Box<dyn StoreConnection>, StoreError> {
        let client = Client::builder()
            .timeout(self.timeout)
            .pool_max_idle_per_host(0)
            .build()?;

        let health = format!("{}/health", self.base_url);
        let resp = client
            .get(&health)
            .send()
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(StoreError::Unreachable(format!(
                "{health} answered {}",
                resp.status()
            )));
        }

        Ok(Box::new(HttpConnection {
            client,
            db_url: format!("{}/db/{}", self.base_url, self.database),
        }))
    }
}

struct HttpConnection {
    client: Client,
    db_url: String,
}

#[derive(Deserialize)]
struct Envelope<T> {
    ok: bool,
    data: Option<T>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct IncrementResult {
    matched: usize,
}

#[derive(Serialize)]
struct IncrementRequest {
    seconds: f64,
}

async fn read<T: DeserializeOwned>(
    op: &'static str,
    resp: Response,
) -> Result<Option<T>, StoreError> {
    let status = resp.status();
    let env: Envelope<T> = resp.json().await?;
    if !status.is_success() || !env.ok {
        return Err(StoreError::Rejected {
            op,
            status: status.as_u16(),
            code: env.error.unwrap_or_default(),
        });
    }
    Ok(env.data)
}

#[async_trait]
impl StoreConnection for HttpConnection {
    async fn find_session(
        &self,
        date: &str,
        start_time: &str,
    ) -> Result<Option<SessionLog>, StoreError> {
        let resp = self
            .client
            .get(format!("{}/usage_log", self.db_url))
            .query(&[("date", date), ("start_time", start_time)])
            .send()
            .await?;
        read("find_session", resp).await
    }

    async fn insert_session(&self, log: &SessionLog) -> Result<(), StoreError> {
        let resp = self
            .client
            .post(format!("{}/usage_log", self.db_url))
            .json(log)
            .send()
            .await?;
        read::<serde_json::Value>("insert_session", resp).await?;
        Ok(())
    }

    async fn find_extension_time(
        &self,
        extension: &str,
    ) -> Result<Option<ExtensionTime>, StoreError> {
        let resp = self
            .client
            .get(format!("{}/file_extension_time/{extension}", self.db_url))
            .send()
            .await?;
        read("find_extension_time", resp).await
    }

    async fn insert_extension_time(&self, rec: &ExtensionTime) -> Result<(), StoreError> {
        let resp = self
            .client
            .post(format!("{}/file_extension_time", self.db_url))
            .json(rec)
            .send()
            .await?;
        if resp.status() == StatusCode::CONFLICT {
            return Err(StoreError::Duplicate {
                collection: "file_extension_time",
                key: rec.extension.clone(),
            });
        }
        read::<serde_json::Value>("insert_extension_time", resp).await?;
        Ok(())
    }

    async fn increment_extension_time(
        &self,
        extension: &str,
        seconds: f64,
    ) -> Result<bool, StoreError> {
        let resp = self
            .client
            .post(format!("{}/file_extension_time/{extension}/inc", self.db_url))
            .json(&IncrementRequest { seconds })
            .send()
            .await?;
        let res: Option<IncrementResult> = read("increment_extension_time", resp).await?;
        Ok(res.map(|r| r.matched > 0).unwrap_or(false))
    }

    async fn upsert_activity(&self, log: &ActivityLog) -> Result<(), StoreError> {
        let resp = self
            .client
            .post(format!("{}/file_activity_log/{}/inc", self.db_url, log.date))
            .json(&log.counts)
            .send()
            .await?;
        read::<serde_json::Value>("upsert_activity", resp).await?;
        Ok(())
    }

    async fn close(self: Box<Self>) {
        debug!("closing store connection to {}", self.db_url);
    }
}
