// Shipping confirmations: one JSON line per newly archived order
//
// The line carries what a customer notice needs (who, which order, which
// tracking number). Delivering it is left to whatever tails the file.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use parcelflow_recon::ArchiveEntry;

use crate::error::IoError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub order_id: String,
    pub customer_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    pub subject: String,
    pub recorded_at: DateTime<Utc>,
}

impl Confirmation {
    pub fn for_entry(entry: &ArchiveEntry, at: DateTime<Utc>) -> Self {
        Self {
            order_id: entry.order_id().to_string(),
            customer_name: entry.order.customer_name(),
            email: entry.order.email.clone(),
            tracking_number: entry.tracking_number.clone(),
            subject: format!("Your order {} has shipped!", entry.order_id()),
            recorded_at: at,
        }
    }
}

/// Append one confirmation line per entry. Returns how many were written.
pub fn append_confirmations<'a, I>(path: &Path, entries: I, at: DateTime<Utc>) -> Result<usize, IoError>
where
    I: IntoIterator<Item = &'a ArchiveEntry>,
{
    let mut lines = String::new();
    let mut count = 0;
    for entry in entries {
        let line = serde_json::to_string(&Confirmation::for_entry(entry, at))
            .map_err(|e| IoError::write(path, std::io::Error::other(e)))?;
        lines.push_str(&line);
        lines.push('\n');
        count += 1;
    }
    if count == 0 {
        return Ok(0);
    }

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| IoError::write(dir, e))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| IoError::write(path, e))?;
    file.write_all(lines.as_bytes()).map_err(|e| IoError::write(path, e))?;

    tracing::info!(path = %path.display(), count, "recorded shipping confirmations");
    Ok(count)
}
