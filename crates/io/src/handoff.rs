// Tracking hand-off: marketplace import CSV for archived orders
//
// Every exported order is remembered in a JSON history file so the next
// export only carries orders the marketplace has not seen yet.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use parcelflow_config::HandoffSettings;
use parcelflow_recon::Archive;

use crate::error::IoError;
use crate::store::write_atomic;

/// One row of the marketplace tracking import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HandoffRecord {
    pub order_id: String,
    pub carrier_name: String,
    pub carrier_url: String,
    pub tracking_number: String,
    pub datetime_created: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandoffResult {
    /// `None` when there was nothing new to export.
    pub written: Option<PathBuf>,
    pub exported: Vec<String>,
    pub already_exported: usize,
    /// Archived orders without a tracking number (never exported).
    pub missing_tracking: Vec<String>,
}

pub fn export_handoff(
    archive: &Archive,
    settings: &HandoffSettings,
    out: &Path,
    history_path: &Path,
    now: DateTime<Local>,
) -> Result<HandoffResult, IoError> {
    // A stale import file must never be picked up twice
    match fs::remove_file(out) {
        Ok(()) => tracing::debug!(path = %out.display(), "removed previous import file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(IoError::write(out, e)),
    }

    let mut history = load_history(history_path)?;
    let seen: HashSet<String> = history.iter().map(|r| r.order_id.clone()).collect();
    let created = now.format("%Y-%m-%d %H:%M:%S").to_string();

    let mut result = HandoffResult::default();
    let mut records = Vec::new();
    for entry in archive.iter() {
        let order_id = entry.order_id();
        let Some(tracking) = entry.tracking_number.as_deref().filter(|t| !t.trim().is_empty()) else {
            tracing::warn!(order_id, "archived without a tracking number; not exported");
            result.missing_tracking.push(order_id.to_string());
            continue;
        };
        if seen.contains(order_id) {
            result.already_exported += 1;
            continue;
        }
        records.push(HandoffRecord {
            order_id: order_id.to_string(),
            carrier_name: settings.carrier_name.clone(),
            carrier_url: settings.tracking_url(tracking),
            tracking_number: tracking.to_string(),
            datetime_created: created.clone(),
        });
    }

    if records.is_empty() {
        tracing::info!("no new shipments to hand off");
        return Ok(result);
    }

    if let Some(dir) = out.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| IoError::write(dir, e))?;
    }
    let mut writer = csv::Writer::from_path(out)
        .map_err(|e| IoError::write(out, std::io::Error::other(e)))?;
    for record in &records {
        writer.serialize(record).map_err(|e| IoError::write(out, std::io::Error::other(e)))?;
    }
    writer.flush().map_err(|e| IoError::write(out, e))?;

    result.exported = records.iter().map(|r| r.order_id.clone()).collect();
    history.extend(records);
    write_atomic(history_path, &history)?;

    tracing::info!(path = %out.display(), count = result.exported.len(), "wrote marketplace import file");
    result.written = Some(out.to_path_buf());
    Ok(result)
}

/// Unreadable history is treated as empty (with a warning).
fn load_history(path: &Path) -> Result<Vec<HandoffRecord>, IoError> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(IoError::read(path, e)),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    match serde_json::from_slice(&bytes) {
        Ok(history) => Ok(history),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "export history unreadable; treating as empty");
            Ok(Vec::new())
        }
    }
}
