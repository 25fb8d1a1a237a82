//! Petrify engine: fetching, staging, archiving and publishing a site snapshot.
mod archive;
mod content;
mod deploy;
mod edge;
mod exporter;
mod fetch;
mod persist;
mod pipeline;
mod sink;
mod types;

pub use archive::{human_size, read_manifest, ArchiveError, ArchiveManifest, Archiver, ManifestEntry};
pub use content::{ContentError, ContentSource, StaticContentSource, WpRestContentSource};
pub use deploy::{Deployer, ObjectStore, PutReceipt, S3ObjectStore, StorageError, ARCHIVE_CONTENT_TYPE};
pub use edge::{EdgeClient, EdgeError, EdgeErrorKind};
pub use exporter::{
    AssetDir, ExportError, ExportReport, ExportSettings, Exporter, DEFAULT_ASSET_DIRS,
    RUN_LOCK_FILE,
};
pub use fetch::{FetchSettings, Fetcher, ReqwestFetcher};
pub use persist::{ensure_output_dir, AtomicFileWriter, FileLock, PersistError};
pub use pipeline::{
    Pipeline, PipelineEvent, PipelineHandle, PipelineOutcome, PipelineSettings, Trigger,
};
pub use sink::{is_within, CopyStats, FileSink};
pub use types::{FailureKind, FetchError, FetchMetadata, FetchOutput};
