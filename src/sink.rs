//! Persistence sinks for capture artifacts

use crate::{Error, Result};
use log::debug;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Destination for `(folder, filename, bytes)` artifacts.
///
/// Failures are reported as `Error::Persistence` and never retried here.
pub trait PersistenceSink {
    fn write_file(&mut self, folder: &str, filename: &str, bytes: &[u8]) -> Result<()>;

    /// Read back a previously written file, if the sink supports it
    fn read_file(&self, _folder: &str, _filename: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// Writes artifacts under a root directory.
///
/// Each file is written to a `.part` sibling first and renamed into place,
/// so an interrupted write never leaves a truncated artifact.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn path(&self, folder: &str, filename: &str) -> PathBuf {
        self.root.join(folder).join(filename)
    }
}

impl PersistenceSink for DirectorySink {
    fn write_file(&mut self, folder: &str, filename: &str, bytes: &[u8]) -> Result<()> {
        let dir = self.root.join(folder);
        fs::create_dir_all(&dir)
            .map_err(|e| Error::Persistence(format!("cannot create {}: {}", dir.display(), e)))?;

        let target = dir.join(filename);
        let partial = dir.join(format!("{}.part", filename));
        let written = fs::File::create(&partial).and_then(|mut f| {
            f.write_all(bytes)?;
            f.sync_all()
        });
        if let Err(e) = written.and_then(|_| fs::rename(&partial, &target)) {
            let _ = fs::remove_file(&partial);
            return Err(Error::Persistence(format!("cannot write {}: {}", target.display(), e)));
        }
        debug!("wrote {} ({} bytes)", target.display(), bytes.len());
        Ok(())
    }

    fn read_file(&self, folder: &str, filename: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(folder, filename);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Persistence(format!("cannot read {}: {}", path.display(), e))),
        }
    }
}

/// In-memory sink keyed by `folder + filename`
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, folder: &str, filename: &str) -> Option<&[u8]> {
        self.files.get(&format!("{}{}", folder, filename)).map(Vec::as_slice)
    }

    /// Stored paths in sorted order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }
}

impl PersistenceSink for MemorySink {
    fn write_file(&mut self, folder: &str, filename: &str, bytes: &[u8]) -> Result<()> {
        self.files.insert(format!("{}{}", folder, filename), bytes.to_vec());
        Ok(())
    }

    fn read_file(&self, folder: &str, filename: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.get(folder, filename).map(<[u8]>::to_vec))
    }
}
