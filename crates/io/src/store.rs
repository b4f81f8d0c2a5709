// Shipment log and archive snapshots (JSON)
//
// Both files are read whole and rewritten whole. Writes go to a temp file in
// the same directory and are renamed over the target, so readers only ever
// see a complete snapshot.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use parcelflow_recon::{Archive, ArchiveEntry, LogEntry, Persist, ReconError, ShipmentLog};

use crate::error::IoError;

#[derive(Debug, Clone)]
pub struct JsonStore {
    log_path: PathBuf,
    archive_path: PathBuf,
}

impl JsonStore {
    pub fn new(log_path: impl Into<PathBuf>, archive_path: impl Into<PathBuf>) -> Self {
        Self { log_path: log_path.into(), archive_path: archive_path.into() }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Missing or corrupt files load as an empty log.
    pub fn load_log(&self) -> Result<ShipmentLog, IoError> {
        let entries: Vec<LogEntry> = load_snapshot(&self.log_path)?;
        let log = ShipmentLog::from_entries(entries);
        tracing::debug!(path = %self.log_path.display(), entries = log.len(), "loaded shipment log");
        Ok(log)
    }

    /// Missing or corrupt files load as an empty archive.
    pub fn load_archive(&self) -> Result<Archive, IoError> {
        let entries: Vec<ArchiveEntry> = load_snapshot(&self.archive_path)?;
        let archive = Archive::from_entries(entries);
        tracing::debug!(path = %self.archive_path.display(), entries = archive.len(), "loaded archive");
        Ok(archive)
    }
}

impl Persist for JsonStore {
    fn persist_log(&mut self, log: &ShipmentLog) -> Result<(), ReconError> {
        write_atomic(&self.log_path, log)
            .map_err(|e| ReconError::Persist { target: "shipment log", message: e.to_string() })
    }

    fn persist_archive(&mut self, archive: &Archive) -> Result<(), ReconError> {
        write_atomic(&self.archive_path, archive)
            .map_err(|e| ReconError::Persist { target: "archive", message: e.to_string() })
    }
}

/// Path a corrupt snapshot is copied to before it gets overwritten.
pub fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".corrupt");
    path.with_file_name(name)
}

fn load_snapshot<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, IoError> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(IoError::read(path, e)),
    };

    let parsed = match std::str::from_utf8(&bytes) {
        Ok(content) if content.trim().is_empty() => return Ok(Vec::new()),
        Ok(content) => serde_json::from_str(content).map_err(|e| e.to_string()),
        Err(e) => Err(format!("not valid UTF-8: {e}")),
    };

    match parsed {
        Ok(items) => Ok(items),
        Err(e) => {
            let backup = corrupt_path(path);
            match fs::copy(path, &backup) {
                Ok(_) => tracing::warn!(
                    path = %path.display(),
                    backup = %backup.display(),
                    error = %e,
                    "state file is corrupt; starting empty"
                ),
                Err(copy_err) => tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    backup_error = %copy_err,
                    "state file is corrupt and could not be backed up; starting empty"
                ),
            }
            Ok(Vec::new())
        }
    }
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub fn write_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), IoError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| IoError::write(&dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| IoError::write(path, e))?;
    serde_json::to_writer_pretty(tmp.as_file_mut(), value)
        .map_err(|e| IoError::write(path, std::io::Error::other(e)))?;
    tmp.as_file_mut()
        .write_all(b"\n")
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| IoError::write(path, e))?;
    tmp.persist(path).map_err(|e| IoError::write(path, e.error))?;
    Ok(())
}
