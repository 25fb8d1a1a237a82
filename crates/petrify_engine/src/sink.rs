//! Filesystem primitives used to assemble the staging tree.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use petrify_core::LogSink;
use petrify_logging::petrify_debug;
use walkdir::WalkDir;

use crate::persist::AtomicFileWriter;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CopyStats {
    pub files: usize,
    pub dirs: usize,
    /// Symlinks, excluded paths and special files.
    pub skipped: usize,
    pub failed: usize,
}

pub struct FileSink {
    log: Arc<dyn LogSink>,
}

impl FileSink {
    pub fn new(log: Arc<dyn LogSink>) -> Self {
        Self { log }
    }

    /// Recursively copy `src` into `dst`.
    ///
    /// Entries whose source path string starts with one of `exclude_prefixes`
    /// are skipped along with everything below them; pass absolute paths so a
    /// prefix cannot match a partial segment by accident. Symlinks are neither
    /// followed nor copied. A failed entry is logged and the walk continues.
    pub fn copy_tree(&self, src: &Path, dst: &Path, exclude_prefixes: &[PathBuf]) -> CopyStats {
        let mut stats = CopyStats::default();

        match fs::symlink_metadata(src) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                self.log.warning(&format!(
                    "Skipped copy of {}: not a directory",
                    src.display()
                ));
                return stats;
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                petrify_debug!("copy_tree source {:?} does not exist", src);
                return stats;
            }
            Err(err) => {
                self.log
                    .error(&format!("Failed to read {}: {}", src.display(), err));
                stats.failed += 1;
                return stats;
            }
        }

        if let Err(err) = fs::create_dir_all(dst) {
            self.log
                .error(&format!("Failed to create {}: {}", dst.display(), err));
            stats.failed += 1;
            return stats;
        }

        let prefixes: Vec<String> = exclude_prefixes
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        let mut excluded = 0usize;

        let walker = WalkDir::new(src)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let path = entry.path().to_string_lossy();
                let skip = prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()));
                if skip {
                    excluded += 1;
                }
                !skip
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    self.log.error(&format!("Failed to read entry: {err}"));
                    stats.failed += 1;
                    continue;
                }
            };

            let file_type = entry.file_type();
            if file_type.is_symlink() {
                petrify_debug!("Skipping symlink {:?}", entry.path());
                stats.skipped += 1;
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(src) else {
                stats.skipped += 1;
                continue;
            };
            let target = dst.join(relative);

            if file_type.is_dir() {
                match fs::create_dir_all(&target) {
                    Ok(()) => stats.dirs += 1,
                    Err(err) => {
                        self.log.error(&format!(
                            "Failed to create {}: {}",
                            target.display(),
                            err
                        ));
                        stats.failed += 1;
                    }
                }
            } else if file_type.is_file() {
                match fs::copy(entry.path(), &target) {
                    Ok(_) => stats.files += 1,
                    Err(err) => {
                        self.log.error(&format!(
                            "Failed to copy {} -> {}: {}",
                            entry.path().display(),
                            target.display(),
                            err
                        ));
                        stats.failed += 1;
                    }
                }
            } else {
                stats.skipped += 1;
            }
        }

        stats.skipped += excluded;
        stats
    }

    /// Write `bytes` to `path` atomically. Failures are logged, never raised.
    pub fn write_file(&self, path: &Path, bytes: &[u8]) -> bool {
        let result = AtomicFileWriter::for_path(path).and_then(|(writer, name)| writer.write(&name, bytes));
        match result {
            Ok(_) => true,
            Err(err) => {
                self.log
                    .error(&format!("Failed to write {}: {}", path.display(), err));
                false
            }
        }
    }

    /// Recursively delete `path`. A missing path is not an error and a
    /// symlink is unlinked rather than followed.
    pub fn remove_tree(&self, path: &Path) -> io::Result<()> {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err),
        };
        if meta.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        }
    }
}

/// True when `candidate` is strictly below `root` using only normal path
/// components (no `..`, no root or prefix jumps).
pub fn is_within(root: &Path, candidate: &Path) -> bool {
    match candidate.strip_prefix(root) {
        Ok(relative) => {
            !relative.as_os_str().is_empty()
                && relative
                    .components()
                    .all(|component| matches!(component, Component::Normal(_)))
        }
        Err(_) => false,
    }
}
