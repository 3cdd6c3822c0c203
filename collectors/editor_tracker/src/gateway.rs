use std::sync::Arc;
use tracing::{debug, error, info};

use crate::model::{ActivityLog, ExtensionTime, SessionLog};
use crate::store::{StoreConnection, StoreError, UsageStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Skipped,
    Disabled,
    Failed,
}

/// Connect, write, disconnect. Errors never escape: they are logged and the
/// write is abandoned without retry.
#[derive(Clone, Default)]
pub struct Gateway {
    store: Option<Arc<dyn UsageStore>>,
}

impl Gateway {
    pub fn new(store: Arc<dyn UsageStore>) -> Self {
        Self { store: Some(store) }
    }

    pub fn disabled() -> Self {
        Self { store: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub async fn record_session(&self, log: &SessionLog) -> WriteOutcome {
        let conn = match self.open("record_session").await {
            Ok(conn) => conn,
            Err(outcome) => return outcome,
        };
        let result = record_session_on(conn.as_ref(), log).await;
        conn.close().await;
        match &result {
            Ok(WriteOutcome::Written) => info!(
                "logged session {} ({:.1}s)",
                log.start_time, log.duration_seconds
            ),
            Ok(WriteOutcome::Skipped) => info!("session {} already logged", log.start_time),
            _ => {}
        }
        settle("record_session", result)
    }

    pub async fn accumulate_extension_time(&self, extension: &str, seconds: f64) -> WriteOutcome {
        let conn = match self.open("accumulate_extension_time").await {
            Ok(conn) => conn,
            Err(outcome) => return outcome,
        };
        let result = accumulate_on(conn.as_ref(), extension, seconds).await;
        conn.close().await;
        if result.is_ok() {
            debug!("added {seconds:.1}s to .{extension}");
        }
        settle("accumulate_extension_time", result)
    }

    pub async fn flush_activity(&self, log: &ActivityLog) -> WriteOutcome {
        let conn = match self.open("flush_activity").await {
            Ok(conn) => conn,
            Err(outcome) => return outcome,
        };
        let result = conn
            .upsert_activity(log)
            .await
            .map(|()| WriteOutcome::Written);
        conn.close().await;
        if result.is_ok() {
            info!("flushed activity for {}: {:?}", log.date, log.counts);
        }
        settle("flush_activity", result)
    }

    async fn open(&self, op: &'static str) -> Result<Box<dyn StoreConnection>, WriteOutcome> {
        let Some(store) = &self.store else {
            debug!("{op}: persistence disabled");
            return Err(WriteOutcome::Disabled);
        };
        store.connect().await.map_err(|err| {
            error!("{op}: connect failed: {err}");
            WriteOutcome::Failed
        })
    }
}

fn settle(op: &'static str, result: Result<WriteOutcome, StoreError>) -> WriteOutcome {
    result.unwrap_or_else(|err| {
        error!("{op} failed: {err}");
        WriteOutcome::Failed
    })
}

async fn record_session_on(
    conn: &dyn StoreConnection,
    log: &SessionLog,
) -> Result<WriteOutcome, StoreError> {
    if conn.find_session(&log.date, &log.start_time).await?.is_some() {
        return Ok(WriteOutcome::Skipped);
    }
    conn.insert_session(log).await?;
    Ok(WriteOutcome::Written)
}

async fn accumulate_on(
    conn: &dyn StoreConnection,
    extension: &str,
    seconds: f64,
) -> Result<WriteOutcome, StoreError> {
    if conn.find_extension_time(extension).await?.is_some()
        && conn.increment_extension_time(extension, seconds).await?
    {
        return Ok(WriteOutcome::Written);
    }
    let rec = ExtensionTime {
        extension: extension.to_string(),
        total_duration_seconds: seconds,
    };
    match conn.insert_extension_time(&rec).await {
        Ok(()) => Ok(WriteOutcome::Written),
        // Another writer created it between our read and insert.
        Err(StoreError::Duplicate { .. }) => {
            conn.increment_extension_time(extension, seconds).await?;
            Ok(WriteOutcome::Written)
        }
        Err(err) => Err(err),
    }
}
