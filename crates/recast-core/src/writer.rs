/*!
# Writers

Destinations for printed files. The runner only calls a writer for files that
reached the `Printed` state and actually changed, for extra files emitted by
file rules, and for source files a file rule asked to delete.
*/

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Component, Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

pub trait Writer: Send + Sync {
    fn write(&self, file: &Path, text: &str) -> io::Result<()>;

    /// Delete `file` from the destination. Deleting a file that is not
    /// there is not an error.
    fn remove(&self, file: &Path) -> io::Result<()>;
}

/// Writes to the filesystem, in place or mirrored under an output directory
#[derive(Debug, Clone, Default)]
pub struct FsWriter {
    output_dir: Option<PathBuf>,
}

impl FsWriter {
    /// Overwrite each file in place
    pub fn in_place() -> Self {
        Self { output_dir: None }
    }

    /// Mirror each file's relative path below `dir`
    pub fn to_directory(dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: Some(dir.into()),
        }
    }

    /// Where `file` ends up
    pub fn target(&self, file: &Path) -> PathBuf {
        match &self.output_dir {
            None => file.to_path_buf(),
            Some(dir) => {
                let relative: PathBuf = file
                    .components()
                    .filter(|component| matches!(component, Component::Normal(_)))
                    .collect();
                dir.join(relative)
            }
        }
    }
}

impl Writer for FsWriter {
    fn write(&self, file: &Path, text: &str) -> io::Result<()> {
        let target = self.target(file);
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        debug!(target = %target.display(), bytes = text.len(), "writing");
        std::fs::write(&target, text)
    }

    /// In place this deletes the source file; under an output directory
    /// only the mirrored copy, if any, goes.
    fn remove(&self, file: &Path) -> io::Result<()> {
        let target = self.target(file);
        debug!(target = %target.display(), "removing");
        match std::fs::remove_file(&target) {
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            result => result,
        }
    }
}

/// Collects output in memory
#[derive(Debug, Default)]
pub struct MemoryWriter {
    files: Mutex<BTreeMap<PathBuf, String>>,
    removed: Mutex<BTreeSet<PathBuf>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, file: &Path) -> Option<String> {
        self.files.lock().get(file).cloned()
    }

    /// Paths written so far, sorted
    pub fn files(&self) -> Vec<PathBuf> {
        self.files.lock().keys().cloned().collect()
    }

    /// Paths removed so far, sorted
    pub fn removed(&self) -> Vec<PathBuf> {
        self.removed.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.files.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.lock().is_empty()
    }
}

impl Writer for MemoryWriter {
    fn write(&self, file: &Path, text: &str) -> io::Result<()> {
        self.files.lock().insert(file.to_path_buf(), text.to_string());
        self.removed.lock().remove(file);
        Ok(())
    }

    fn remove(&self, file: &Path) -> io::Result<()> {
        self.files.lock().remove(file);
        self.removed.lock().insert(file.to_path_buf());
        Ok(())
    }
}
