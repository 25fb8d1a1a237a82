use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::PathBuf;

use petrify_core::{LogRun, LogStore, StoreError};
use petrify_engine::{AtomicFileWriter, FileLock};
use petrify_logging::petrify_debug;

/// Activity log persisted as a RON file, replaced atomically on every save.
///
/// Writers in other processes are excluded through `{path}.lock`.
pub struct RonLogStore {
    path: PathBuf,
}

impl RonLogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("activity"));
        name.push(".lock");
        self.path.with_file_name(name)
    }
}

impl LogStore for RonLogStore {
    fn load(&self) -> Result<Vec<LogRun>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                petrify_debug!("No activity log at {:?} yet", self.path);
                return Ok(Vec::new());
            }
            Err(err) => return Err(StoreError::Io(err.to_string())),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        ron::from_str(&content).map_err(|err| StoreError::Format(err.to_string()))
    }

    fn save(&self, runs: &[LogRun]) -> Result<(), StoreError> {
        let pretty = ron::ser::PrettyConfig::new();
        let content = ron::ser::to_string_pretty(&runs, pretty)
            .map_err(|err| StoreError::Format(err.to_string()))?;

        let (writer, name) =
            AtomicFileWriter::for_path(&self.path).map_err(|err| StoreError::Io(err.to_string()))?;
        writer
            .write(&name, content.as_bytes())
            .map_err(|err| StoreError::Io(err.to_string()))?;
        Ok(())
    }

    fn exclusive(&self, cycle: &mut dyn FnMut()) -> Result<(), StoreError> {
        let _lock =
            FileLock::acquire(&self.lock_path()).map_err(|err| StoreError::Io(err.to_string()))?;
        cycle();
        Ok(())
    }
}
