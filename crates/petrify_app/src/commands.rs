//! Subcommand implementations. Each wires engine components from the
//! configuration and reports the result on stdout.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use petrify_core::{ActivityLog, DnsRecord, LogSink};
use petrify_engine::{
    human_size, Deployer, EdgeClient, Exporter, Pipeline, PipelineEvent, PipelineHandle,
    PipelineOutcome, ReqwestFetcher, Trigger,
};
use petrify_logging::petrify_info;
use tokio::runtime::Runtime;

use crate::config::AppConfig;
use crate::persistence::RonLogStore;

pub struct Context {
    config: AppConfig,
    log: Arc<ActivityLog>,
}

impl Context {
    pub fn new(config: AppConfig) -> Self {
        let store = RonLogStore::new(config.log.path.clone());
        let log = Arc::new(ActivityLog::new(Box::new(store), config.log.retention));
        Self { config, log }
    }

    fn deployer(&self) -> Deployer {
        Deployer::new(
            self.config.credentials(),
            &self.config.storage.storage_domain,
            self.log.clone(),
        )
    }

    fn pipeline(&self, deploy: bool) -> Result<Pipeline> {
        let exporter = Exporter::new(
            self.config.export_settings(),
            Arc::new(ReqwestFetcher::new(self.config.fetch_settings())),
            self.config.content_source()?,
            self.log.clone(),
        );
        Ok(Pipeline::new(
            exporter,
            self.deployer(),
            self.config.pipeline_settings(deploy),
        ))
    }

    fn edge_client(&self) -> Result<EdgeClient> {
        Ok(EdgeClient::new(self.config.edge.clone(), self.log.clone())?)
    }
}

pub fn export(ctx: &Context, deploy: bool) -> Result<()> {
    run_trigger(ctx, Trigger::Manual, deploy)
}

pub fn content_updated(ctx: &Context, post_id: u64, is_update: bool, revision: bool) -> Result<()> {
    let trigger = Trigger::ContentUpdated {
        post_id,
        is_update,
        is_autosave_or_revision: revision,
    };
    run_trigger(ctx, trigger, true)
}

fn run_trigger(ctx: &Context, trigger: Trigger, deploy: bool) -> Result<()> {
    let mut handle = PipelineHandle::spawn(ctx.pipeline(deploy)?)?;
    let id = handle.submit(trigger);
    let Some(PipelineEvent::Completed { outcome, .. }) = handle.recv() else {
        bail!("pipeline worker stopped before run {id} completed");
    };
    report(outcome)
}

fn report(outcome: PipelineOutcome) -> Result<()> {
    match outcome {
        PipelineOutcome::Skipped { reason } => {
            println!("Skipped: {reason}");
            Ok(())
        }
        PipelineOutcome::Exported {
            report,
            deployed,
            download_url,
        } => {
            println!(
                "Archive {} ({}) built in {:.2} seconds",
                report.archive_path.display(),
                human_size(report.archive_bytes),
                report.duration.as_secs_f64()
            );
            if report.item_failures > 0 {
                println!(
                    "{} item(s) failed; see `petrify log` for details",
                    report.item_failures
                );
            }
            if deployed {
                println!("Uploaded to object storage");
            }
            if let Some(url) = download_url {
                println!("Download: {url}");
            }
            Ok(())
        }
        PipelineOutcome::Failed {
            reason,
            archive_path,
        } => {
            if let Some(path) = archive_path {
                println!("Archive kept at {}", path.display());
            }
            bail!(reason)
        }
    }
}

pub fn deploy(ctx: &Context, runtime: &Runtime, archive: &Path) -> Result<()> {
    if !runtime.block_on(ctx.deployer().upload(archive)) {
        bail!("Upload to object storage failed. Check `petrify log`.");
    }
    println!("Uploaded {}", archive.display());
    Ok(())
}

pub fn show_log(ctx: &Context, clear: bool) {
    if clear {
        ctx.log.clear();
        petrify_info!("Activity log cleared");
        return;
    }
    for entry in ctx.log.read_all() {
        println!("{entry}");
    }
}

pub fn dns_list(ctx: &Context, runtime: &Runtime) -> Result<()> {
    let client = ctx.edge_client()?;
    let records = runtime.block_on(client.list())?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

pub fn dns_add(ctx: &Context, runtime: &Runtime, record: &DnsRecord) -> Result<()> {
    let client = ctx.edge_client()?;
    let response = runtime.block_on(client.add(record))?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

pub fn dns_delete(ctx: &Context, runtime: &Runtime, id: &str) -> Result<()> {
    let client = ctx.edge_client()?;
    let response = runtime.block_on(client.delete(id))?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
