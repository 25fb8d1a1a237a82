//! RON configuration file for the `petrify` binary.
//!
//! Every section is optional. Secrets may be supplied through the
//! environment instead of the file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use petrify_core::{
    ContentItem, DeploymentCredentials, EdgeSettings, LogRetention, DEFAULT_STORAGE_DOMAIN,
};
use petrify_engine::{
    AssetDir, ContentError, ContentSource, ExportSettings, FetchSettings, PipelineSettings,
    StaticContentSource, WpRestContentSource, DEFAULT_ASSET_DIRS,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "petrify.ron";

pub const ENV_ACCESS_KEY_ID: &str = "PETRIFY_ACCESS_KEY_ID";
pub const ENV_SECRET_ACCESS_KEY: &str = "PETRIFY_SECRET_ACCESS_KEY";
pub const ENV_API_TOKEN: &str = "PETRIFY_API_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("invalid configuration {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub site: SiteConfig,
    pub build: BuildConfig,
    pub content: ContentConfig,
    pub storage: StorageConfig,
    pub edge: EdgeSettings,
    pub deploy_enabled: bool,
    pub log: LogConfig,
    pub fetch: FetchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub url: String,
    pub uploads_dir: PathBuf,
    /// Root of the platform install; asset dirs are resolved against it.
    pub platform_root: PathBuf,
    /// Public URL of `uploads_dir`, used to report the archive download link.
    pub public_base_url: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost".to_string(),
            uploads_dir: PathBuf::from("wp-content/uploads"),
            platform_root: PathBuf::from("."),
            public_base_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub build_dir_name: String,
    pub archive_name: String,
    /// Relative to `site.platform_root`; copied to the same relative path.
    pub asset_dirs: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            build_dir_name: "petrify-builds".to_string(),
            archive_name: "petrify-build.zip".to_string(),
            asset_dirs: DEFAULT_ASSET_DIRS.iter().map(|dir| dir.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub source: ContentSourceConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum ContentSourceConfig {
    /// Items listed inline.
    Static(Vec<ContentItem>),
    /// The site's REST API.
    #[default]
    Rest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub account_id: String,
    pub bucket: String,
    pub storage_domain: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            access_key_id: String::new(),
            secret_access_key: String::new(),
            account_id: String::new(),
            bucket: String::new(),
            storage_domain: DEFAULT_STORAGE_DOMAIN.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Persisted activity log.
    pub path: PathBuf,
    pub retention: LogRetention,
    /// Diagnostic log file; terminal only when unset.
    pub diagnostics: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("petrify-activity.ron"),
            retention: LogRetention::default(),
            diagnostics: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub request_timeout_secs: u64,
    pub redirect_limit: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let defaults = FetchSettings::default();
        Self {
            request_timeout_secs: defaults.request_timeout.as_secs(),
            redirect_limit: defaults.redirect_limit,
        }
    }
}

impl AppConfig {
    /// Read `path`. A missing file yields the defaults unless `required`.
    pub fn load(path: &Path, required: bool) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound && !required => {
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::parse(&content).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        ron::from_str(content).map_err(|err| err.to_string())
    }

    /// Replace secrets with non-empty values from `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let targets = [
            (ENV_ACCESS_KEY_ID, &mut self.storage.access_key_id),
            (ENV_SECRET_ACCESS_KEY, &mut self.storage.secret_access_key),
            (ENV_API_TOKEN, &mut self.edge.api_token),
        ];
        for (name, slot) in targets {
            if let Some(value) = lookup(name).filter(|value| !value.trim().is_empty()) {
                *slot = value;
            }
        }
    }

    pub fn export_settings(&self) -> ExportSettings {
        let mut settings = ExportSettings::with_layout(
            &self.site.url,
            &self.site.uploads_dir,
            &self.site.platform_root,
            &self.build.build_dir_name,
            &self.build.archive_name,
        );
        settings.asset_dirs = self
            .build
            .asset_dirs
            .iter()
            .map(|relative| AssetDir {
                source: self.site.platform_root.join(relative),
                destination: PathBuf::from(relative),
            })
            .collect();
        settings
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            request_timeout: Duration::from_secs(self.fetch.request_timeout_secs),
            redirect_limit: self.fetch.redirect_limit,
            ..FetchSettings::default()
        }
    }

    pub fn content_source(&self) -> Result<Arc<dyn ContentSource>, ContentError> {
        Ok(match &self.content.source {
            ContentSourceConfig::Static(items) => Arc::new(StaticContentSource::new(items.clone())),
            ContentSourceConfig::Rest => Arc::new(WpRestContentSource::new(
                &self.site.url,
                Duration::from_secs(self.fetch.request_timeout_secs),
            )?),
        })
    }

    pub fn credentials(&self) -> DeploymentCredentials {
        DeploymentCredentials {
            access_key_id: self.storage.access_key_id.clone(),
            secret_access_key: self.storage.secret_access_key.clone(),
            account_id: self.storage.account_id.clone(),
            bucket: self.storage.bucket.clone(),
        }
    }

    pub fn pipeline_settings(&self, deploy: bool) -> PipelineSettings {
        let public_base_url = self.site.public_base_url.as_ref().map(|base| {
            format!(
                "{}/{}",
                base.trim_end_matches('/'),
                self.build.build_dir_name
            )
        });
        PipelineSettings {
            deploy_enabled: self.deploy_enabled && deploy,
            public_base_url,
        }
    }
}
