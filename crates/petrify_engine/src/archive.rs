use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Component, Path};
use std::sync::Arc;

use petrify_core::LogSink;
use thiserror::Error;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::sink::is_within;

/// One archive entry: `/`-separated path relative to the staging root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub path: String,
    pub is_dir: bool,
}

pub type ArchiveManifest = Vec<ManifestEntry>;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("cannot open archive destination {path}: {source}")]
    Destination { path: String, source: io::Error },
    #[error("cannot resolve staging root {path}: {source}")]
    StagingRoot { path: String, source: io::Error },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

pub struct Archiver {
    log: Arc<dyn LogSink>,
}

impl Archiver {
    pub fn new(log: Arc<dyn LogSink>) -> Self {
        Self { log }
    }

    /// Zip every file and directory below `staging_root` into `archive_path`.
    ///
    /// Entries are written in pre-order, sorted by file name, so the manifest
    /// is identical for identical trees. Symlinks and paths that do not
    /// resolve beneath the root are skipped with a warning. Returns `false`
    /// (and leaves no archive behind) when the archive cannot be written.
    pub fn create_archive(&self, staging_root: &Path, archive_path: &Path) -> bool {
        match self.write_archive(staging_root, archive_path) {
            Ok(entries) => {
                let size = fs::metadata(archive_path).map(|m| m.len()).unwrap_or(0);
                self.log.info(&format!(
                    "ZIP archive created ({}, {} entries)",
                    human_size(size),
                    entries
                ));
                true
            }
            Err(err) => {
                if !matches!(err, ArchiveError::Destination { .. }) {
                    let _ = fs::remove_file(archive_path);
                }
                self.log
                    .error(&format!("Failed to create ZIP archive: {err}"));
                false
            }
        }
    }

    fn write_archive(&self, staging_root: &Path, archive_path: &Path) -> Result<usize, ArchiveError> {
        let canonical_root =
            fs::canonicalize(staging_root).map_err(|source| ArchiveError::StagingRoot {
                path: staging_root.display().to_string(),
                source,
            })?;
        let file = File::create(archive_path).map_err(|source| ArchiveError::Destination {
            path: archive_path.display().to_string(),
            source,
        })?;
        let canonical_archive = fs::canonicalize(archive_path).ok();

        let mut zip = ZipWriter::new(file);
        let file_options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);
        let dir_options = SimpleFileOptions::default().unix_permissions(0o755);
        let mut written = 0usize;

        let walker = WalkDir::new(staging_root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    self.log.warning(&format!("Skipped unreadable entry: {err}"));
                    continue;
                }
            };
            let path = entry.path();

            if entry.file_type().is_symlink() {
                self.log
                    .warning(&format!("Skipped symlink {}", path.display()));
                continue;
            }

            let resolved = fs::canonicalize(path).ok();
            let hygienic = is_within(staging_root, path)
                && resolved
                    .as_deref()
                    .is_some_and(|resolved| is_within(&canonical_root, resolved));
            let name = if hygienic { entry_name(staging_root, path) } else { None };
            let Some(name) = name else {
                self.log.warning(&format!(
                    "Skipped entry outside staging root: {}",
                    path.display()
                ));
                continue;
            };
            if resolved.is_some() && resolved == canonical_archive {
                continue;
            }

            if entry.file_type().is_dir() {
                zip.add_directory(name, dir_options)?;
                written += 1;
            } else if entry.file_type().is_file() {
                // Read fully first so a failing file never leaves a half-written entry.
                let bytes = match fs::read(path) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        self.log
                            .error(&format!("Failed to read {}: {}", path.display(), err));
                        continue;
                    }
                };
                zip.start_file(name, file_options)?;
                zip.write_all(&bytes)?;
                written += 1;
            }
        }

        zip.finish()?;
        Ok(written)
    }
}

/// Entry name for `path` relative to `root`, joined with `/`.
fn entry_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Entries of an existing archive, in archive order.
pub fn read_manifest(archive_path: &Path) -> Result<ArchiveManifest, ArchiveError> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;
    let mut manifest = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive.by_index(index)?;
        manifest.push(ManifestEntry {
            path: entry.name().trim_end_matches('/').to_string(),
            is_dir: entry.is_dir(),
        });
    }
    Ok(manifest)
}

/// Human readable byte count, e.g. `512 B`, `1.5 KB`, `3.2 MB`.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
