//! The storage manager boundary.
//!
//! A [`Manager`] turns logical `open(label, name, mode)` calls into actual
//! byte sinks and exposes everything it opened through `artifacts`. Two
//! implementations are provided: [`MultiFileManager`] creates real files
//! under a base directory, [`MemoryManager`] hands out shared in-memory
//! buffers (useful for tests and for callers that want serialized output
//! without touching the filesystem).

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dataex_core::Result;
use tracing::debug;

/// How to open a named output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Create the output, truncating anything already there.
    Create,
    /// Create the output, refusing to clobber an existing one.
    CreateNew,
}

/// A produced output, as exposed through `artifacts`.
#[derive(Debug, Clone)]
pub enum Artifact {
    /// A file on disk.
    File(PathBuf),
    /// A shared in-memory buffer.
    Buffer(Arc<Mutex<Vec<u8>>>),
}

impl Artifact {
    /// The file path, when this artifact is a file.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Artifact::File(p) => Some(p),
            Artifact::Buffer(_) => None,
        }
    }

    /// A snapshot of the bytes, when this artifact is a memory buffer.
    pub fn bytes(&self) -> Option<Vec<u8>> {
        match self {
            Artifact::File(_) => None,
            Artifact::Buffer(buf) => buf.lock().ok().map(|b| b.clone()),
        }
    }
}

/// Label -> produced outputs.
pub type Artifacts = HashMap<String, Vec<Artifact>>;

/// A writable handle produced by a manager.
///
/// Owned exclusively by one writer for the run's lifetime; closed on drop.
#[derive(Debug)]
pub enum SinkHandle {
    /// Backed by a real file.
    File(std::fs::File),
    /// Backed by a shared byte buffer.
    Buffer(Arc<Mutex<Vec<u8>>>),
}

impl Write for SinkHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            SinkHandle::File(f) => f.write(buf),
            SinkHandle::Buffer(b) => {
                let mut guard = b
                    .lock()
                    .map_err(|_| io::Error::other("memory buffer lock poisoned"))?;
                guard.extend_from_slice(buf);
                Ok(buf.len())
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            SinkHandle::File(f) => f.flush(),
            SinkHandle::Buffer(_) => Ok(()),
        }
    }
}

/// Storage boundary: opens logical outputs and tracks what was produced.
pub trait Manager {
    /// Open a writable output named `filename` under the given artifact
    /// `label`.
    fn open(&mut self, label: &str, filename: &str, mode: OpenMode) -> Result<SinkHandle>;

    /// Everything opened so far, keyed by label.
    fn artifacts(&self) -> &Artifacts;

    /// Release any resources held by the manager itself. Handles already
    /// given out stay valid until dropped.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Manager that creates one file per `open` under a base directory.
#[derive(Debug)]
pub struct MultiFileManager {
    directory: PathBuf,
    artifacts: Artifacts,
}

impl MultiFileManager {
    /// Create a manager rooted at `directory` (created on first open).
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            artifacts: Artifacts::new(),
        }
    }
}

impl Manager for MultiFileManager {
    fn open(&mut self, label: &str, filename: &str, mode: OpenMode) -> Result<SinkHandle> {
        std::fs::create_dir_all(&self.directory)?;
        let path = self.directory.join(filename);
        let mut options = OpenOptions::new();
        options.write(true);
        match mode {
            OpenMode::Create => options.create(true).truncate(true),
            OpenMode::CreateNew => options.create_new(true),
        };
        let file = options.open(&path)?;
        debug!(label, path = %path.display(), "opened output file");
        self.artifacts
            .entry(label.to_string())
            .or_default()
            .push(Artifact::File(path));
        Ok(SinkHandle::File(file))
    }

    fn artifacts(&self) -> &Artifacts {
        &self.artifacts
    }
}

/// Manager that hands out shared in-memory buffers instead of files.
#[derive(Debug, Default)]
pub struct MemoryManager {
    artifacts: Artifacts,
}

impl MemoryManager {
    /// Create an empty in-memory manager.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Manager for MemoryManager {
    fn open(&mut self, label: &str, filename: &str, _mode: OpenMode) -> Result<SinkHandle> {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        debug!(label, filename, "opened memory buffer");
        self.artifacts
            .entry(label.to_string())
            .or_default()
            .push(Artifact::Buffer(Arc::clone(&buffer)));
        Ok(SinkHandle::Buffer(buffer))
    }

    fn artifacts(&self) -> &Artifacts {
        &self.artifacts
    }
}
