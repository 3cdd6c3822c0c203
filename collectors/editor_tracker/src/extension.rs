use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::clock::elapsed_seconds;

static EXTENSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.([A-Za-z0-9_]+)$").expect("valid regex"));

/// Extension of the file name in `path`, without the dot.
pub fn extension_of(path: &str) -> Option<String> {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    EXTENSION_RE
        .captures(name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// One open stamp per extension, not per file.
#[derive(Debug, Default)]
pub struct ExtensionTimer {
    open: HashMap<String, DateTime<Utc>>,
}

impl ExtensionTimer {
    pub fn open(&mut self, path: &str, now: DateTime<Utc>) -> Option<String> {
        let ext = extension_of(path)?;
        self.open.insert(ext.clone(), now);
        Some(ext)
    }

    pub fn close(&mut self, path: &str, now: DateTime<Utc>) -> Option<(String, f64)> {
        let ext = extension_of(path)?;
        let started = self.open.remove(&ext)?;
        Some((ext, elapsed_seconds(started, now)))
    }

    pub fn discard_all(&mut self) -> Vec<String> {
        let mut exts: Vec<String> = self.open.drain().map(|(ext, _)| ext).collect();
        exts.sort();
        exts
    }
}
