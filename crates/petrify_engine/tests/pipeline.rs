mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{memory_log, messages, SiteFixture, ARCHIVE_NAME};
use petrify_core::{ActivityLog, DeploymentCredentials, LogRetention, LogSink};
use petrify_engine::{
    Deployer, ObjectStore, Pipeline, PipelineEvent, PipelineHandle, PipelineOutcome,
    PipelineSettings, PutReceipt, StorageError, Trigger,
};
use pretty_assertions::assert_eq;

struct AcceptingStore;

#[async_trait]
impl ObjectStore for AcceptingStore {
    async fn put_object(
        &self,
        _bucket: &str,
        _key: &str,
        _source: &Path,
        _content_type: &str,
    ) -> Result<PutReceipt, StorageError> {
        Ok(PutReceipt {
            etag: Some("etag-1".to_string()),
        })
    }
}

fn pipeline(
    site: &SiteFixture,
    site_url: &str,
    log: Arc<ActivityLog>,
    deployer: Deployer,
    settings: PipelineSettings,
) -> Pipeline {
    Pipeline::new(site.exporter(site_url, log), deployer, settings)
}

fn unconfigured_deployer(log: Arc<ActivityLog>) -> Deployer {
    Deployer::new(DeploymentCredentials::default(), "", log)
}

fn complete_credentials() -> DeploymentCredentials {
    DeploymentCredentials {
        access_key_id: "AKIA".to_string(),
        secret_access_key: "secret".to_string(),
        account_id: "acct".to_string(),
        bucket: "builds".to_string(),
    }
}

#[tokio::test]
async fn revisions_and_new_content_are_skipped() {
    let site = SiteFixture::new();
    let log = memory_log(LogRetention::Accumulate);
    let pipeline = pipeline(
        &site,
        "http://site.test",
        log.clone(),
        unconfigured_deployer(log.clone()),
        PipelineSettings::default(),
    );

    let revision = pipeline
        .handle(Trigger::ContentUpdated {
            post_id: 7,
            is_update: true,
            is_autosave_or_revision: true,
        })
        .await;
    let created = pipeline
        .handle(Trigger::ContentUpdated {
            post_id: 8,
            is_update: false,
            is_autosave_or_revision: false,
        })
        .await;

    assert!(matches!(revision, PipelineOutcome::Skipped { .. }), "{revision:?}");
    assert!(matches!(created, PipelineOutcome::Skipped { .. }), "{created:?}");
    assert!(log.read_all().is_empty());
    assert!(!site.settings("http://site.test").archive_path.exists());
}

#[tokio::test]
async fn manual_export_without_deploy_reports_download_url() {
    let server = common::mock_site().await;
    let site = SiteFixture::new();
    let log = memory_log(LogRetention::TruncatePerRun);
    let pipeline = pipeline(
        &site,
        &server.uri(),
        log.clone(),
        unconfigured_deployer(log.clone()),
        PipelineSettings {
            deploy_enabled: false,
            public_base_url: Some("https://example.test/uploads/petrify-builds/".to_string()),
        },
    );

    match pipeline.handle(Trigger::Manual).await {
        PipelineOutcome::Exported {
            report,
            deployed,
            download_url,
        } => {
            assert!(!deployed);
            assert!(report.archive_path.is_file());
            assert_eq!(
                download_url.as_deref(),
                Some(format!("https://example.test/uploads/petrify-builds/{ARCHIVE_NAME}").as_str())
            );
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn content_update_with_deploy_uploads_archive() {
    let server = common::mock_site().await;
    let site = SiteFixture::new();
    let log = memory_log(LogRetention::TruncatePerRun);
    let deployer = Deployer::with_store(complete_credentials(), Arc::new(AcceptingStore), log.clone());
    let pipeline = pipeline(
        &site,
        &server.uri(),
        log.clone(),
        deployer,
        PipelineSettings {
            deploy_enabled: true,
            public_base_url: None,
        },
    );

    let outcome = pipeline
        .handle(Trigger::ContentUpdated {
            post_id: 1,
            is_update: true,
            is_autosave_or_revision: false,
        })
        .await;

    match outcome {
        PipelineOutcome::Exported {
            deployed,
            download_url,
            ..
        } => {
            assert!(deployed);
            assert_eq!(download_url, None);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(
        messages(log.as_ref()).last().unwrap(),
        "Uploaded to object storage successfully. ETag: etag-1"
    );
}

#[tokio::test]
async fn deploy_without_credentials_fails_but_keeps_archive() {
    let server = common::mock_site().await;
    let site = SiteFixture::new();
    let log = memory_log(LogRetention::TruncatePerRun);
    let pipeline = pipeline(
        &site,
        &server.uri(),
        log.clone(),
        unconfigured_deployer(log.clone()),
        PipelineSettings {
            deploy_enabled: true,
            public_base_url: None,
        },
    );

    match pipeline.handle(Trigger::Manual).await {
        PipelineOutcome::Failed {
            archive_path: Some(path),
            ..
        } => assert!(path.is_file()),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn failed_export_is_reported_without_archive() {
    let server = common::mock_site().await;
    let site = SiteFixture::new();
    let mut settings = site.settings(&server.uri());
    settings.archive_path = site.temp.path().join("missing").join(ARCHIVE_NAME);
    let log = memory_log(LogRetention::TruncatePerRun);
    let pipeline = Pipeline::new(
        site.exporter_with(settings, &server.uri(), log.clone()),
        unconfigured_deployer(log.clone()),
        PipelineSettings::default(),
    );

    match pipeline.handle(Trigger::Manual).await {
        PipelineOutcome::Failed {
            reason,
            archive_path: None,
        } => assert!(reason.starts_with("Export failed"), "{reason}"),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn handle_runs_queued_triggers_in_order() {
    let server = common::mock_site().await;
    let site = SiteFixture::new();
    let log = memory_log(LogRetention::KeepRuns(5));
    let pipeline = pipeline(
        &site,
        &server.uri(),
        log.clone(),
        unconfigured_deployer(log.clone()),
        PipelineSettings::default(),
    );

    let mut handle = PipelineHandle::spawn(pipeline).unwrap();
    let first = handle.submit(Trigger::Manual);
    let second = handle.submit(Trigger::ContentUpdated {
        post_id: 3,
        is_update: true,
        is_autosave_or_revision: false,
    });
    let third = handle.submit(Trigger::ContentUpdated {
        post_id: 4,
        is_update: true,
        is_autosave_or_revision: true,
    });

    let mut completed = Vec::new();
    for _ in 0..3 {
        let event = tokio::task::block_in_place(|| handle.recv_timeout(Duration::from_secs(30)))
            .expect("pipeline event");
        let PipelineEvent::Completed { id, outcome, .. } = event;
        completed.push((id, outcome));
    }

    assert_eq!(
        completed.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
        vec![first, second, third]
    );
    assert!(matches!(completed[0].1, PipelineOutcome::Exported { .. }));
    assert!(matches!(completed[1].1, PipelineOutcome::Exported { .. }));
    assert!(matches!(completed[2].1, PipelineOutcome::Skipped { .. }));
    // Two exports ran one after the other; neither was rejected as overlapping.
    assert_eq!(log.runs().len(), 2);
    assert!(handle.try_recv().is_none());
}
