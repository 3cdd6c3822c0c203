use serde::{Deserialize, Serialize};

use crate::edits::EditTotals;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct SessionLog {
    pub start_time: String,
    pub end_time: String,
    pub duration_seconds: f64,
    pub date: String,
}

/// One row of `file_extension_time`, unique on `extension`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ExtensionTime {
    pub extension: String,
    pub total_duration_seconds: f64,
}

/// One row of `file_activity_log`, unique on `date`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ActivityLog {
    pub date: String,
    #[serde(flatten)]
    pub counts: EditTotals,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_log_uses_camel_case_counters() {
        let log = ActivityLog {
            date: "2026-10-17".to_string(),
            counts: EditTotals {
                lines_added: 1,
                lines_deleted: 2,
                words_added: 3,
                words_deleted: -4,
            },
        };
        let v = serde_json::to_value(&log).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "date": "2026-10-17",
                "linesAdded": 1,
                "linesDeleted": 2,
                "wordsAdded": 3,
                "wordsDeleted": -4
            })
        );
    }
}
