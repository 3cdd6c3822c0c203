use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::clock::{format_date, Clock, SystemClock};
use crate::edits::{EditCounter, EditTotals, TextEdit};
use crate::extension::ExtensionTimer;
use crate::gateway::{Gateway, WriteOutcome};
use crate::model::{ActivityLog, SessionLog};
use crate::session::SessionTimer;

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    Activate,
    Open { path: String },
    Close { path: String },
    Change {
        #[serde(default)]
        changes: Vec<TextEdit>,
    },
    Deactivate,
    Dispose,
}

#[derive(Debug, Default)]
pub struct ShutdownLatch(AtomicBool);

impl ShutdownLatch {
    pub fn try_fire(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_fired(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FlushReport {
    pub session: Option<SessionLog>,
    pub session_write: Option<WriteOutcome>,
    pub activity: ActivityLog,
    pub activity_write: WriteOutcome,
    pub extension_writes: Vec<WriteOutcome>,
    pub discarded_timers: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ShutdownOutcome {
    Flushed(FlushReport),
    AlreadyFlushed,
}

pub struct Tracker<C: Clock = SystemClock> {
    clock: C,
    gateway: Gateway,
    session: SessionTimer,
    extensions: ExtensionTimer,
    edits: EditCounter,
    pending: JoinSet<WriteOutcome>,
    finished_writes: Vec<WriteOutcome>,
    latch: ShutdownLatch,
}

impl Tracker<SystemClock> {
    pub fn new(gateway: Gateway) -> Self {
        Self::with_clock(gateway, SystemClock)
    }
}

impl<C: Clock> Tracker<C> {
    pub fn with_clock(gateway: Gateway, clock: C) -> Self {
        Self {
            clock,
            gateway,
            session: SessionTimer::default(),
            extensions: ExtensionTimer::default(),
            edits: EditCounter::default(),
            pending: JoinSet::new(),
            finished_writes: Vec::new(),
            latch: ShutdownLatch::default(),
        }
    }

    pub async fn handle(&mut self, event: HostEvent) -> Option<ShutdownOutcome> {
        if self.latch.is_fired() && !matches!(event, HostEvent::Deactivate | HostEvent::Dispose)
        {
            warn!("ignoring {event:?} after shutdown");
            return None;
        }

        match event {
            HostEvent::Activate => self.on_activate(),
            HostEvent::Open { path } => self.on_file_open(&path),
            HostEvent::Close { path } => {
                self.on_file_close(&path);
            }
            HostEvent::Change { changes } => {
                self.on_text_change(&changes);
            }
            HostEvent::Deactivate | HostEvent::Dispose => return Some(self.shutdown().await),
        }
        None
    }

    pub fn on_activate(&mut self) {
        let now = self.clock.now();
        if self.session.activate(now) {
            info!("session started at {now}");
        } else {
            debug!("already active; keeping first start");
        }
    }

    pub fn on_file_open(&mut self, path: &str) {
        match self.extensions.open(path, self.clock.now()) {
            Some(ext) => debug!("opened {path} (.{ext})"),
            None => debug!("opened {path} (no extension; not tracked)"),
        }
    }

    pub fn on_file_close(&mut self, path: &str) -> Option<f64> {
        let Some((ext, seconds)) = self.extensions.close(path, self.clock.now()) else {
            debug!("closed {path}: no open timer");
            return None;
        };
        debug!("closed {path}: {seconds:.1}s on .{ext}");

        self.reap_finished_writes();
        if self.gateway.is_enabled() {
            let gateway = self.gateway.clone();
            self.pending
                .spawn(async move { gateway.accumulate_extension_time(&ext, seconds).await });
        }
        Some(seconds)
    }

    pub fn on_text_change(&mut self, changes: &[TextEdit]) -> EditTotals {
        self.edits.record(changes)
    }

    pub fn edit_totals(&self) -> EditTotals {
        self.edits.totals()
    }

    fn reap_finished_writes(&mut self) {
        while let Some(joined) = self.pending.try_join_next() {
            self.finished_writes.push(write_outcome(joined));
        }
    }

    /// Flushes everything once. The latch is set before any write, so a
    /// failed write is not retried by a later shutdown signal.
    pub async fn shutdown(&mut self) -> ShutdownOutcome {
        if !self.latch.try_fire() {
            debug!("shutdown already handled");
            return ShutdownOutcome::AlreadyFlushed;
        }

        let end = self.clock.now();
        let discarded_timers = self.extensions.discard_all();
        if !discarded_timers.is_empty() {
            debug!("discarding open timers: {discarded_timers:?}");
        }

        while let Some(joined) = self.pending.join_next().await {
            self.finished_writes.push(write_outcome(joined));
        }
        let extension_writes = std::mem::take(&mut self.finished_writes);

        let session = self.session.finish(end);
        let session_write = match &session {
            Some(log) => Some(self.gateway.record_session(log).await),
            None => {
                warn!("shutdown without activation; no session recorded");
                None
            }
        };

        let activity = ActivityLog {
            date: format_date(end),
            counts: self.edits.take(),
        };
        let activity_write = self.gateway.flush_activity(&activity).await;

        info!(
            "shutdown flush done: session={session_write:?} activity={activity_write:?} extension_writes={}",
            extension_writes.len()
        );

        ShutdownOutcome::Flushed(FlushReport {
            session,
            session_write,
            activity,
            activity_write,
            extension_writes,
            discarded_timers,
        })
    }
}

fn write_outcome(joined: Result<WriteOutcome, tokio::task::JoinError>) -> WriteOutcome {
    joined.unwrap_or_else(|err| {
        error!("extension write task failed: {err}");
        WriteOutcome::Failed
    })
}
