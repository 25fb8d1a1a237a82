#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use petrify_core::{ActivityLog, ContentItem, ContentKind, LogEntry, LogRetention, LogSink, MemoryLogStore};
use petrify_engine::{
    ExportSettings, Exporter, FetchSettings, ReqwestFetcher, StaticContentSource,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const BUILD_DIR: &str = "petrify-builds";
pub const ARCHIVE_NAME: &str = "petrify-build.zip";

pub fn memory_log(retention: LogRetention) -> Arc<ActivityLog> {
    petrify_logging::initialize_for_tests();
    Arc::new(ActivityLog::with_clock(
        Box::new(MemoryLogStore::new()),
        retention,
        Arc::new(|| "2024-01-01 12:00:00".to_string()),
    ))
}

pub fn messages(log: &dyn LogSink) -> Vec<String> {
    log.read_all().into_iter().map(|entry| entry.message).collect()
}

pub fn errors(log: &dyn LogSink) -> Vec<LogEntry> {
    log.read_all()
        .into_iter()
        .filter(|entry| entry.level == petrify_core::LogLevel::Error)
        .collect()
}

/// A site with a home page, an `about` page and a `hello-world` post.
pub async fn mock_site() -> MockServer {
    let server = MockServer::start().await;
    for (route, body) in [
        ("/", "<html><body>home</body></html>"),
        ("/about/", "<html><body>about us</body></html>"),
        ("/hello-world/", "<html><body>first post</body></html>"),
    ] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8"))
            .mount(&server)
            .await;
    }
    server
}

pub fn site_items(site_url: &str) -> Vec<ContentItem> {
    vec![
        ContentItem {
            id: 2,
            slug: "about".to_string(),
            url: format!("{site_url}/about/"),
            kind: ContentKind::Page,
        },
        ContentItem {
            id: 1,
            slug: "hello-world".to_string(),
            url: format!("{site_url}/hello-world/"),
            kind: ContentKind::Post,
        },
    ]
}

/// Uploads and platform asset trees on disk.
pub struct SiteFixture {
    pub temp: TempDir,
    pub uploads: PathBuf,
    pub platform: PathBuf,
}

impl SiteFixture {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let uploads = temp.path().join("uploads");
        let platform = temp.path().join("platform");

        write(&uploads.join("2024/01/photo.jpg"), b"jpeg bytes");
        write(&uploads.join("2024/02/doc.pdf"), b"pdf bytes");
        // Leftovers of an earlier build must never be re-archived.
        write(&uploads.join(BUILD_DIR).join("stale.txt"), b"old");
        write(&platform.join("wp-includes/js/app.js"), b"console.log(1)");
        write(&platform.join("wp-includes/css/site.css"), b"body{}");

        Self {
            temp,
            uploads,
            platform,
        }
    }

    pub fn settings(&self, site_url: &str) -> ExportSettings {
        ExportSettings::with_layout(site_url, &self.uploads, &self.platform, BUILD_DIR, ARCHIVE_NAME)
    }

    pub fn exporter(&self, site_url: &str, log: Arc<ActivityLog>) -> Exporter {
        self.exporter_with(self.settings(site_url), site_url, log)
    }

    pub fn exporter_with(&self, settings: ExportSettings, site_url: &str, log: Arc<ActivityLog>) -> Exporter {
        Exporter::new(
            settings,
            Arc::new(ReqwestFetcher::new(FetchSettings::default())),
            Arc::new(StaticContentSource::new(site_items(site_url))),
            log,
        )
    }
}

pub fn write(path: &Path, bytes: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
}
