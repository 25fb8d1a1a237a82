//! Export orchestration: prepare → fetch → copy → archive.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use petrify_core::{advance, ContentKind, ExportStage, ExportTarget, LogSink, StageEvent};
use petrify_logging::{petrify_debug, petrify_warn};
use thiserror::Error;

use crate::archive::Archiver;
use crate::content::ContentSource;
use crate::fetch::Fetcher;
use crate::persist::FileLock;
use crate::sink::{is_within, CopyStats, FileSink};

/// Platform asset trees copied into every export, relative to the platform root.
pub const DEFAULT_ASSET_DIRS: [&str; 2] = ["wp-includes/js", "wp-includes/css"];

/// Held in the build root for the lifetime of one run, across processes.
pub const RUN_LOCK_FILE: &str = ".lock";

/// A directory copied into the staging tree at `destination` (relative).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDir {
    pub source: PathBuf,
    pub destination: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub site_url: String,
    pub uploads_dir: PathBuf,
    /// Holds the staging dir and the archive; never copied into the export.
    pub build_root: PathBuf,
    pub staging_dir: PathBuf,
    pub archive_path: PathBuf,
    pub asset_dirs: Vec<AssetDir>,
}

impl ExportSettings {
    /// Standard layout: `{uploads}/{build_dir_name}/temp` for staging and
    /// `{uploads}/{build_dir_name}/{archive_name}` for the archive.
    pub fn with_layout(
        site_url: &str,
        uploads_dir: &Path,
        platform_root: &Path,
        build_dir_name: &str,
        archive_name: &str,
    ) -> Self {
        let build_root = uploads_dir.join(build_dir_name);
        let asset_dirs = DEFAULT_ASSET_DIRS
            .iter()
            .map(|relative| AssetDir {
                source: platform_root.join(relative),
                destination: PathBuf::from(relative),
            })
            .collect();
        Self {
            site_url: site_url.to_string(),
            uploads_dir: uploads_dir.to_path_buf(),
            staging_dir: build_root.join("temp"),
            archive_path: build_root.join(archive_name),
            build_root,
            asset_dirs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub archive_path: PathBuf,
    pub archive_bytes: u64,
    /// Pages, listings and files that failed without aborting the run.
    pub item_failures: usize,
    pub duration: Duration,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExportError {
    #[error("an export is already running for {0}")]
    AlreadyRunning(PathBuf),
    #[error("staging directory {path} could not be prepared: {reason}")]
    StagingDir { path: PathBuf, reason: String },
    #[error("archive {0} could not be created")]
    Archive(PathBuf),
}

/// Per-run state, owned by [`Exporter::run`].
struct ExportJob {
    stage: ExportStage,
    started: Instant,
    item_failures: usize,
    written: HashSet<String>,
}

impl ExportJob {
    fn new() -> Self {
        Self {
            stage: ExportStage::Idle,
            started: Instant::now(),
            item_failures: 0,
            written: HashSet::new(),
        }
    }

    fn advance(&mut self, event: StageEvent) {
        match advance(self.stage, event) {
            Some(next) => {
                petrify_debug!("export stage {} -> {}", self.stage, next);
                self.stage = next;
            }
            None => petrify_warn!("ignored {:?} while {}", event, self.stage),
        }
    }

    fn absorb(&mut self, stats: CopyStats) {
        self.item_failures += stats.failed;
    }
}

pub struct Exporter {
    settings: ExportSettings,
    fetcher: Arc<dyn Fetcher>,
    content: Arc<dyn ContentSource>,
    log: Arc<dyn LogSink>,
    sink: FileSink,
    archiver: Archiver,
}

impl Exporter {
    pub fn new(
        settings: ExportSettings,
        fetcher: Arc<dyn Fetcher>,
        content: Arc<dyn ContentSource>,
        log: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            sink: FileSink::new(log.clone()),
            archiver: Archiver::new(log.clone()),
            settings,
            fetcher,
            content,
            log,
        }
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    /// Run one export. Only staging-directory and archive failures fail the
    /// run; everything item-level is logged and counted in the report.
    pub async fn run(&self) -> Result<ExportReport, ExportError> {
        let staging = self.settings.staging_dir.clone();
        let lock = match FileLock::try_acquire(&self.settings.build_root.join(RUN_LOCK_FILE)) {
            Ok(Some(lock)) => Ok(lock),
            Ok(None) => {
                self.log.error(&format!(
                    "Export already running for {}; request rejected",
                    staging.display()
                ));
                return Err(ExportError::AlreadyRunning(staging));
            }
            Err(err) => Err(format!("cannot lock build root: {err}")),
        };

        self.log.begin_run();
        let mut job = ExportJob::new();
        self.log.info("Starting export...");

        job.advance(StageEvent::Start);
        let prepared = lock.and_then(|lock| {
            petrify_debug!("holding {}", lock.path().display());
            self.prepare().map(|()| lock)
        });
        let _lock = match prepared {
            Ok(lock) => lock,
            Err(reason) => {
                self.log.error(&format!(
                    "Failed to prepare build directory {}: {}",
                    staging.display(),
                    reason
                ));
                job.advance(StageEvent::Fatal);
                self.finish(&job);
                return Err(ExportError::StagingDir {
                    path: staging,
                    reason,
                });
            }
        };
        job.advance(StageEvent::Prepared);

        self.fetch_all(&mut job).await;
        job.advance(StageEvent::FetchesFinished);

        self.copy_all(&mut job);
        job.advance(StageEvent::CopiesFinished);

        let archive_path = self.settings.archive_path.clone();
        if !self.archiver.create_archive(&staging, &archive_path) {
            job.advance(StageEvent::Fatal);
            self.finish(&job);
            return Err(ExportError::Archive(archive_path));
        }
        job.advance(StageEvent::Archived);

        let duration = self.finish(&job);
        let archive_bytes = fs::metadata(&archive_path).map(|m| m.len()).unwrap_or(0);
        Ok(ExportReport {
            archive_path,
            archive_bytes,
            item_failures: job.item_failures,
            duration,
        })
    }

    fn prepare(&self) -> Result<(), String> {
        let staging = &self.settings.staging_dir;
        self.sink
            .remove_tree(staging)
            .map_err(|err| format!("cannot remove previous build: {err}"))?;
        fs::create_dir_all(staging).map_err(|err| err.to_string())?;

        let archive = &self.settings.archive_path;
        if let Err(err) = self.sink.remove_tree(archive) {
            self.log.warning(&format!(
                "Could not remove stale archive {}: {}",
                archive.display(),
                err
            ));
        }

        self.log
            .info(&format!("Build directory prepared: {}", staging.display()));
        Ok(())
    }

    async fn fetch_all(&self, job: &mut ExportJob) {
        self.export_target(&ExportTarget::home(&self.settings.site_url), job)
            .await;

        for kind in [ContentKind::Page, ContentKind::Post] {
            match self.content.published(kind).await {
                Ok(items) => {
                    self.log
                        .info(&format!("Found {} published {}s", items.len(), kind));
                    for item in &items {
                        self.export_target(&ExportTarget::for_item(item), job).await;
                    }
                }
                Err(err) => {
                    self.log
                        .error(&format!("Failed to list published {kind}s: {err}"));
                    job.item_failures += 1;
                }
            }
        }
    }

    async fn export_target(&self, target: &ExportTarget, job: &mut ExportJob) {
        let path = self.settings.staging_dir.join(&target.filename);
        if !is_within(&self.settings.staging_dir, &path) {
            self.log.error(&format!(
                "Failed: {} (unsafe filename {:?})",
                target.url, target.filename
            ));
            job.item_failures += 1;
            return;
        }

        let output = match self.fetcher.fetch(&target.url).await {
            Ok(output) => output,
            Err(err) => {
                self.log
                    .error(&format!("Failed: {} ({})", target.url, err));
                job.item_failures += 1;
                return;
            }
        };
        if !output.is_success() {
            self.log.error(&format!(
                "Failed: {} (HTTP {})",
                target.url, output.status
            ));
            job.item_failures += 1;
            return;
        }

        if !job.written.insert(target.filename.clone()) {
            self.log.warning(&format!(
                "{} overwrites an earlier export of {}",
                target.url, target.filename
            ));
        }
        if self.sink.write_file(&path, &output.bytes) {
            self.log
                .info(&format!("Exported: {} -> {}", target.url, target.filename));
        } else {
            job.item_failures += 1;
        }
    }

    fn copy_all(&self, job: &mut ExportJob) {
        let staging = &self.settings.staging_dir;
        let exclusions = vec![
            self.settings.build_root.clone(),
            staging.clone(),
            self.settings.archive_path.clone(),
        ];

        let stats = self.sink.copy_tree(
            &self.settings.uploads_dir,
            &staging.join("uploads"),
            &exclusions,
        );
        job.absorb(stats);
        self.log.info(&format!(
            "Copied uploads directory ({} files, {} skipped, {} failed)",
            stats.files, stats.skipped, stats.failed
        ));

        let mut totals = CopyStats::default();
        for asset in &self.settings.asset_dirs {
            let destination = staging.join(&asset.destination);
            if !is_within(staging, &destination) {
                self.log.error(&format!(
                    "Skipped asset directory with unsafe destination {}",
                    asset.destination.display()
                ));
                job.item_failures += 1;
                continue;
            }
            let stats = self.sink.copy_tree(&asset.source, &destination, &exclusions);
            job.absorb(stats);
            totals.files += stats.files;
            totals.failed += stats.failed;
        }
        self.log.info(&format!(
            "Copied platform assets ({} files, {} failed)",
            totals.files, totals.failed
        ));
    }

    fn finish(&self, job: &ExportJob) -> Duration {
        let duration = job.started.elapsed();
        let seconds = duration.as_secs_f64();
        if job.stage == ExportStage::Failed {
            self.log
                .error(&format!("Export failed after {seconds:.2} seconds"));
        } else {
            self.log
                .info(&format!("Export finished in {seconds:.2} seconds"));
        }
        duration
    }
}
