use chrono::{DateTime, Utc};

use crate::clock::{elapsed_seconds, format_date, format_ts};
use crate::model::SessionLog;

#[derive(Debug, Default)]
pub struct SessionTimer {
    started: Option<DateTime<Utc>>,
}

impl SessionTimer {
    /// Records the session start. A repeated activation keeps the first stamp.
    pub fn activate(&mut self, now: DateTime<Utc>) -> bool {
        if self.started.is_some() {
            return false;
        }
        self.started = Some(now);
        true
    }

    pub fn finish(&self, end: DateTime<Utc>) -> Option<SessionLog> {
        let start = self.started?;
        Some(SessionLog {
            start_time: format_ts(start),
            end_time: format_ts(end),
            duration_seconds: elapsed_seconds(start, end),
            date: format_date(start),
        })
    }
}
