//! Editor usage tracking written to a `usage_store` service.

pub mod clock;
pub mod config;
pub mod edits;
pub mod extension;
pub mod gateway;
pub mod model;
pub mod session;
pub mod store;
pub mod tracker;

pub use config::{ConfigError, StoreConfig};
pub use edits::{EditTotals, TextEdit};
pub use gateway::{Gateway, WriteOutcome};
pub use model::{ActivityLog, ExtensionTime, SessionLog};
pub use tracker::{FlushReport, HostEvent, ShutdownOutcome, Tracker};
