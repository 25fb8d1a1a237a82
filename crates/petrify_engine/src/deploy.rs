//! Upload of the export archive to S3-compatible object storage.

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use petrify_core::{DeploymentCredentials, LogSink, DEFAULT_STORAGE_DOMAIN};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutReceipt {
    pub etag: Option<String>,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cannot read {path}: {reason}")]
    Source { path: String, reason: String },
    #[error("object storage request failed: {0}")]
    Provider(String),
}

#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
        content_type: &str,
    ) -> Result<PutReceipt, StorageError>;
}

/// S3 client pointed at `https://{account_id}.{storage_domain}`, region `auto`.
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    pub fn new(credentials: &DeploymentCredentials, storage_domain: &str) -> Self {
        let provider = Credentials::new(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.clone(),
            None,
            None,
            "petrify",
        );
        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("auto"))
            .endpoint_url(credentials.endpoint(storage_domain))
            .credentials_provider(provider)
            .build();
        Self {
            client: aws_sdk_s3::Client::from_conf(config),
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
        content_type: &str,
    ) -> Result<PutReceipt, StorageError> {
        let body = ByteStream::from_path(source)
            .await
            .map_err(|err| StorageError::Source {
                path: source.display().to_string(),
                reason: err.to_string(),
            })?;
        let output = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|err| StorageError::Provider(DisplayErrorContext(&err).to_string()))?;
        Ok(PutReceipt {
            etag: output.e_tag().map(str::to_string),
        })
    }
}

pub struct Deployer {
    credentials: DeploymentCredentials,
    storage_domain: String,
    store: Option<Arc<dyn ObjectStore>>,
    log: Arc<dyn LogSink>,
}

impl Deployer {
    /// Deployer that builds an [`S3ObjectStore`] once the credentials check out.
    pub fn new(credentials: DeploymentCredentials, storage_domain: &str, log: Arc<dyn LogSink>) -> Self {
        let storage_domain = if storage_domain.trim().is_empty() {
            DEFAULT_STORAGE_DOMAIN.to_string()
        } else {
            storage_domain.trim().to_string()
        };
        Self {
            credentials,
            storage_domain,
            store: None,
            log,
        }
    }

    pub fn with_store(
        credentials: DeploymentCredentials,
        store: Arc<dyn ObjectStore>,
        log: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            credentials,
            storage_domain: DEFAULT_STORAGE_DOMAIN.to_string(),
            store: Some(store),
            log,
        }
    }

    /// Upload `archive_path` under its file name. Every failure, local or
    /// remote, is logged and reported as `false`.
    pub async fn upload(&self, archive_path: &Path) -> bool {
        let readable = File::open(archive_path)
            .and_then(|file| file.metadata())
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !readable {
            self.log.error(&format!(
                "File not found or not readable: {}",
                archive_path.display()
            ));
            return false;
        }

        let missing = self.credentials.missing_fields();
        if !missing.is_empty() {
            self.log.error(&format!(
                "Missing storage credentials or bucket configuration: {}",
                missing.join(", ")
            ));
            return false;
        }

        let Some(key) = archive_path.file_name().and_then(|name| name.to_str()) else {
            self.log.error(&format!(
                "Archive path has no usable file name: {}",
                archive_path.display()
            ));
            return false;
        };

        let store: Arc<dyn ObjectStore> = match &self.store {
            Some(store) => store.clone(),
            None => Arc::new(S3ObjectStore::new(&self.credentials, &self.storage_domain)),
        };

        let digest = sha256_hex(archive_path).unwrap_or_else(|_| "unavailable".to_string());
        self.log.info(&format!(
            "Uploading {} to bucket {} (sha256 {})",
            key, self.credentials.bucket, digest
        ));

        match store
            .put_object(&self.credentials.bucket, key, archive_path, ARCHIVE_CONTENT_TYPE)
            .await
        {
            Ok(receipt) => {
                let etag = receipt.etag.as_deref().unwrap_or("N/A");
                self.log
                    .info(&format!("Uploaded to object storage successfully. ETag: {etag}"));
                true
            }
            Err(err) => {
                self.log.error(&format!("Upload failed: {err}"));
                false
            }
        }
    }
}

fn sha256_hex(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(64);
    for byte in digest.iter() {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    Ok(hex)
}
