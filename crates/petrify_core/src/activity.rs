//! Operator-facing activity log.
//!
//! Components write through the [`LogSink`] trait; [`ActivityLog`] is the
//! standard implementation and persists through a [`LogStore`] adapter
//! supplied by the surrounding application.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Local;
use petrify_logging::{petrify_error, petrify_info, petrify_warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entry::{LogEntry, LogLevel, LogRun, TIMESTAMP_FORMAT};

/// Produces the timestamp string stamped on each entry.
pub type Clock = Arc<dyn Fn() -> String + Send + Sync>;

/// Wall clock in the local timezone, formatted with [`TIMESTAMP_FORMAT`].
pub fn local_clock() -> Clock {
    Arc::new(|| Local::now().format(TIMESTAMP_FORMAT).to_string())
}

pub trait LogSink: Send + Sync {
    /// Open a new run; the retention policy decides what happens to older runs.
    fn begin_run(&self);

    fn append(&self, entry: LogEntry);

    /// Every retained entry, oldest first.
    fn read_all(&self) -> Vec<LogEntry>;

    fn timestamp(&self) -> String;

    fn info(&self, message: &str) {
        self.append(LogEntry::new(self.timestamp(), LogLevel::Info, message));
    }

    fn warning(&self, message: &str) {
        self.append(LogEntry::new(self.timestamp(), LogLevel::Warning, message));
    }

    fn error(&self, message: &str) {
        self.append(LogEntry::new(self.timestamp(), LogLevel::Error, message));
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("log store io error: {0}")]
    Io(String),
    #[error("log store format error: {0}")]
    Format(String),
}

/// Persistence adapter for the activity log.
pub trait LogStore: Send + Sync {
    fn load(&self) -> Result<Vec<LogRun>, StoreError>;
    fn save(&self, runs: &[LogRun]) -> Result<(), StoreError>;

    /// Run one load-modify-save `cycle` with every other writer of the same
    /// storage shut out. Stores shared between processes must override this;
    /// the default relies on the caller's in-process lock alone.
    fn exclusive(&self, cycle: &mut dyn FnMut()) -> Result<(), StoreError> {
        cycle();
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryLogStore {
    runs: Mutex<Vec<LogRun>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogStore for MemoryLogStore {
    fn load(&self) -> Result<Vec<LogRun>, StoreError> {
        Ok(lock(&self.runs).clone())
    }

    fn save(&self, runs: &[LogRun]) -> Result<(), StoreError> {
        *lock(&self.runs) = runs.to_vec();
        Ok(())
    }
}

/// How much history survives when a new run begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogRetention {
    /// Drop every previous run.
    TruncatePerRun,
    /// Keep at most this many runs, the new one included.
    KeepRuns(usize),
    /// Never drop anything.
    Accumulate,
}

impl Default for LogRetention {
    fn default() -> Self {
        LogRetention::KeepRuns(5)
    }
}

impl LogRetention {
    /// Trim `runs` so that one more run fits the policy.
    fn make_room(self, runs: &mut Vec<LogRun>) {
        match self {
            LogRetention::TruncatePerRun => runs.clear(),
            LogRetention::KeepRuns(limit) => {
                let keep = limit.max(1) - 1;
                if runs.len() > keep {
                    runs.drain(..runs.len() - keep);
                }
            }
            LogRetention::Accumulate => {}
        }
    }
}

pub struct ActivityLog {
    store: Box<dyn LogStore>,
    retention: LogRetention,
    clock: Clock,
    // Serializes load-modify-save cycles within this process.
    writer: Mutex<()>,
}

impl ActivityLog {
    pub fn new(store: Box<dyn LogStore>, retention: LogRetention) -> Self {
        Self::with_clock(store, retention, local_clock())
    }

    pub fn with_clock(store: Box<dyn LogStore>, retention: LogRetention, clock: Clock) -> Self {
        Self {
            store,
            retention,
            clock,
            writer: Mutex::new(()),
        }
    }

    /// Retained runs, oldest first.
    pub fn runs(&self) -> Vec<LogRun> {
        let _guard = lock(&self.writer);
        self.load_or_empty()
    }

    pub fn clear(&self) {
        self.update(Vec::clear);
    }

    /// Load, modify and save the runs as one step against other writers.
    fn update(&self, mut modify: impl FnMut(&mut Vec<LogRun>)) {
        let _guard = lock(&self.writer);
        let result = self.store.exclusive(&mut || {
            let mut runs = self.load_or_empty();
            modify(&mut runs);
            self.save_or_report(&runs);
        });
        if let Err(err) = result {
            petrify_error!("Activity log could not be locked: {}", err);
        }
    }

    fn load_or_empty(&self) -> Vec<LogRun> {
        match self.store.load() {
            Ok(runs) => runs,
            Err(err) => {
                petrify_warn!("Activity log could not be loaded, starting empty: {}", err);
                Vec::new()
            }
        }
    }

    fn save_or_report(&self, runs: &[LogRun]) {
        if let Err(err) = self.store.save(runs) {
            petrify_error!("Activity log could not be saved: {}", err);
        }
    }
}

impl LogSink for ActivityLog {
    fn begin_run(&self) {
        let retention = self.retention;
        self.update(|runs| {
            retention.make_room(runs);
            runs.push(LogRun::default());
        });
    }

    fn append(&self, entry: LogEntry) {
        match entry.level {
            LogLevel::Info => petrify_info!("{}", entry),
            LogLevel::Warning => petrify_warn!("{}", entry),
            LogLevel::Error => petrify_error!("{}", entry),
        }

        let mut pending = Some(entry);
        self.update(|runs| {
            if runs.is_empty() {
                runs.push(LogRun::default());
            }
            if let (Some(current), Some(entry)) = (runs.last_mut(), pending.take()) {
                current.entries.push(entry);
            }
        });
    }

    fn read_all(&self) -> Vec<LogEntry> {
        self.runs()
            .into_iter()
            .flat_map(|run| run.entries)
            .collect()
    }

    fn timestamp(&self) -> String {
        (self.clock)()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn fixed_clock() -> Clock {
        Arc::new(|| "2024-01-01 00:00:00".to_string())
    }

    fn log_with(retention: LogRetention) -> ActivityLog {
        ActivityLog::with_clock(Box::new(MemoryLogStore::new()), retention, fixed_clock())
    }

    fn run_with(log: &ActivityLog, message: &str) {
        log.begin_run();
        log.info(message);
    }

    fn messages(log: &ActivityLog) -> Vec<String> {
        log.read_all().into_iter().map(|e| e.message).collect()
    }

    #[test]
    fn truncate_per_run_keeps_only_latest() {
        let log = log_with(LogRetention::TruncatePerRun);
        run_with(&log, "first");
        run_with(&log, "second");
        assert_eq!(messages(&log), vec!["second"]);
    }

    #[test]
    fn keep_runs_acts_as_ring_buffer() {
        let log = log_with(LogRetention::KeepRuns(2));
        run_with(&log, "one");
        run_with(&log, "two");
        run_with(&log, "three");
        assert_eq!(messages(&log), vec!["two", "three"]);
        assert_eq!(log.runs().len(), 2);
    }

    #[test]
    fn keep_zero_runs_behaves_like_truncate() {
        let log = log_with(LogRetention::KeepRuns(0));
        run_with(&log, "one");
        run_with(&log, "two");
        assert_eq!(messages(&log), vec!["two"]);
    }

    #[test]
    fn accumulate_never_drops() {
        let log = log_with(LogRetention::Accumulate);
        for i in 0..10 {
            run_with(&log, &format!("run {i}"));
        }
        assert_eq!(log.read_all().len(), 10);
    }

    #[test]
    fn append_without_run_opens_implicit_run() {
        let log = log_with(LogRetention::TruncatePerRun);
        log.error("orphan");
        assert_eq!(log.runs().len(), 1);
        let entry = &log.read_all()[0];
        assert_eq!(entry.to_string(), "[2024-01-01 00:00:00] [error] orphan");
    }

    #[test]
    fn clear_empties_the_store() {
        let log = log_with(LogRetention::Accumulate);
        run_with(&log, "x");
        log.clear();
        assert!(log.read_all().is_empty());
    }

    /// Counts cycles and fails any that overlap.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryLogStore,
        inside: AtomicBool,
        cycles: Arc<AtomicUsize>,
    }

    impl LogStore for CountingStore {
        fn load(&self) -> Result<Vec<LogRun>, StoreError> {
            self.inner.load()
        }

        fn save(&self, runs: &[LogRun]) -> Result<(), StoreError> {
            self.inner.save(runs)
        }

        fn exclusive(&self, cycle: &mut dyn FnMut()) -> Result<(), StoreError> {
            assert!(!self.inside.swap(true, Ordering::SeqCst), "cycles overlap");
            cycle();
            self.inside.store(false, Ordering::SeqCst);
            self.cycles.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn every_write_is_one_exclusive_cycle() {
        let store = CountingStore::default();
        let cycles = store.cycles.clone();
        let log = ActivityLog::with_clock(Box::new(store), LogRetention::Accumulate, fixed_clock());

        log.begin_run();
        log.info("one");
        log.warning("two");
        log.clear();

        assert_eq!(cycles.load(Ordering::SeqCst), 4);
        assert!(log.read_all().is_empty());
    }

    /// A store whose lock can never be taken.
    struct Unlockable;

    impl LogStore for Unlockable {
        fn load(&self) -> Result<Vec<LogRun>, StoreError> {
            Ok(Vec::new())
        }

        fn save(&self, _runs: &[LogRun]) -> Result<(), StoreError> {
            panic!("saved without the lock");
        }

        fn exclusive(&self, _cycle: &mut dyn FnMut()) -> Result<(), StoreError> {
            Err(StoreError::Io("lock file is read-only".to_string()))
        }
    }

    #[test]
    fn unlockable_store_drops_the_write() {
        let log = ActivityLog::with_clock(Box::new(Unlockable), LogRetention::Accumulate, fixed_clock());
        log.begin_run();
        log.info("lost");
        assert!(log.read_all().is_empty());
    }

    #[test]
    fn concurrent_writers_do_not_lose_entries() {
        let log = Arc::new(log_with(LogRetention::Accumulate));
        log.begin_run();
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        log.info(&format!("t{t} #{i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(log.read_all().len(), 200);
    }
}
