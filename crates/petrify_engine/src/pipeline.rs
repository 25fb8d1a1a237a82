//! Composition root: trigger → export → optional deploy.

use std::io;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use petrify_logging::{petrify_debug, petrify_info};

use crate::deploy::Deployer;
use crate::exporter::{ExportReport, Exporter};

/// Why the pipeline is being asked to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Manual,
    ContentUpdated {
        post_id: u64,
        /// `false` for the first save of new content.
        is_update: bool,
        is_autosave_or_revision: bool,
    },
}

impl Trigger {
    fn skip_reason(&self) -> Option<String> {
        match self {
            Trigger::Manual => None,
            Trigger::ContentUpdated {
                post_id,
                is_autosave_or_revision: true,
                ..
            } => Some(format!("post {post_id} is an autosave or revision")),
            Trigger::ContentUpdated {
                post_id,
                is_update: false,
                ..
            } => Some(format!("post {post_id} was newly created, not updated")),
            Trigger::ContentUpdated { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Skipped {
        reason: String,
    },
    Exported {
        report: ExportReport,
        deployed: bool,
        download_url: Option<String>,
    },
    Failed {
        reason: String,
        archive_path: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineSettings {
    pub deploy_enabled: bool,
    /// Public URL of the build root, used to build the download reference.
    pub public_base_url: Option<String>,
}

pub struct Pipeline {
    exporter: Exporter,
    deployer: Deployer,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(exporter: Exporter, deployer: Deployer, settings: PipelineSettings) -> Self {
        Self {
            exporter,
            deployer,
            settings,
        }
    }

    pub async fn handle(&self, trigger: Trigger) -> PipelineOutcome {
        if let Some(reason) = trigger.skip_reason() {
            petrify_debug!("Skipping export: {}", reason);
            return PipelineOutcome::Skipped { reason };
        }

        let report = match self.exporter.run().await {
            Ok(report) => report,
            Err(err) => {
                return PipelineOutcome::Failed {
                    reason: format!("Export failed: {err}"),
                    archive_path: None,
                }
            }
        };

        let mut deployed = false;
        if self.settings.deploy_enabled {
            if !self.deployer.upload(&report.archive_path).await {
                return PipelineOutcome::Failed {
                    reason: "Upload to object storage failed. Check logs.".to_string(),
                    archive_path: Some(report.archive_path),
                };
            }
            deployed = true;
        }

        let download_url = self.download_url(&report);
        PipelineOutcome::Exported {
            report,
            deployed,
            download_url,
        }
    }

    fn download_url(&self, report: &ExportReport) -> Option<String> {
        let base = self.settings.public_base_url.as_deref()?.trim();
        if base.is_empty() {
            return None;
        }
        let name = report.archive_path.file_name()?.to_str()?;
        Some(format!("{}/{}", base.trim_end_matches('/'), name))
    }
}

enum PipelineCommand {
    Run { id: u64, trigger: Trigger },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    Completed {
        id: u64,
        trigger: Trigger,
        outcome: PipelineOutcome,
    },
}

/// Runs a [`Pipeline`] on a dedicated worker thread.
///
/// Triggers are queued and handled strictly one after another, so a content
/// update arriving during a manual export waits instead of racing it.
pub struct PipelineHandle {
    cmd_tx: mpsc::Sender<PipelineCommand>,
    event_rx: mpsc::Receiver<PipelineEvent>,
    next_id: u64,
}

impl PipelineHandle {
    pub fn spawn(pipeline: Pipeline) -> io::Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        thread::Builder::new()
            .name("petrify-pipeline".to_string())
            .spawn(move || {
                while let Ok(command) = cmd_rx.recv() {
                    match command {
                        PipelineCommand::Run { id, trigger } => {
                            petrify_info!("Pipeline run {} started for {:?}", id, trigger);
                            let outcome = runtime.block_on(pipeline.handle(trigger.clone()));
                            let _ = event_tx.send(PipelineEvent::Completed {
                                id,
                                trigger,
                                outcome,
                            });
                        }
                    }
                }
            })?;

        Ok(Self {
            cmd_tx,
            event_rx,
            next_id: 1,
        })
    }

    /// Queue a trigger; returns the id echoed in its completion event.
    pub fn submit(&mut self, trigger: Trigger) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let _ = self.cmd_tx.send(PipelineCommand::Run { id, trigger });
        id
    }

    pub fn try_recv(&self) -> Option<PipelineEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<PipelineEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    /// Block until the next completion; `None` once the worker has stopped.
    pub fn recv(&self) -> Option<PipelineEvent> {
        self.event_rx.recv().ok()
    }
}
