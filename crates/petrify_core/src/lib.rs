//! Petrify core: pure domain types, the export stage machine and the activity log.
mod activity;
mod config;
mod dns;
mod entry;
mod stage;
mod target;

pub use activity::{
    local_clock, ActivityLog, Clock, LogRetention, LogSink, LogStore, MemoryLogStore, StoreError,
};
pub use config::{DeploymentCredentials, EdgeSettings, DEFAULT_STORAGE_DOMAIN};
pub use dns::{DnsRecord, DEFAULT_TTL};
pub use entry::{LogEntry, LogLevel, LogRun, TIMESTAMP_FORMAT};
pub use stage::{advance, ExportStage, StageEvent};
pub use target::{sanitize_filename, ContentItem, ContentKind, ExportTarget, HOME_FILENAME};
