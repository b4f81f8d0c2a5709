use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CarrierError;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// A single order from the order feed. Immutable once read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub address_line_1: String,
    #[serde(default)]
    pub address_line_2: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    pub country: String,
    /// Order total in minor units (cents). Never float.
    pub total_cents: i64,
    pub product_sku: String,
    pub quantity: u32,
}

impl Order {
    pub fn customer_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// Package description sent to the carrier, e.g. `2x SKU-123`.
    pub fn description(&self) -> String {
        format!("{}x {}", self.quantity, self.product_sku)
    }

    /// Order total as a decimal string (`49.99`, `-0.50`).
    pub fn total_decimal(&self) -> String {
        let sign = if self.total_cents < 0 { "-" } else { "" };
        let abs = self.total_cents.unsigned_abs();
        format!("{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// File name stem for artifacts named after an order id.
///
/// Ids come from a marketplace, so nothing may escape the target directory.
/// Anything outside `[A-Za-z0-9_-.]` (and a leading dot) is percent-encoded,
/// which keeps distinct ids on distinct files.
pub fn order_file_stem(order_id: &str) -> String {
    let mut stem = String::with_capacity(order_id.len());
    for (i, c) in order_id.char_indices() {
        if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') || (c == '.' && i > 0) {
            stem.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                stem.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    stem
}

// ---------------------------------------------------------------------------
// Shipment creation
// ---------------------------------------------------------------------------

/// What the carrier hands back for a created shipment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipmentConfirmation {
    pub shipment_id: String,
    pub tracking_number: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    Success,
    Failed,
    Exception,
}

impl std::fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Failed => write!(f, "FAILED"),
            Self::Exception => write!(f, "EXCEPTION"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentAttempt {
    pub status: ShipmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ShipmentAttempt {
    pub fn success(shipment_id: impl Into<String>, tracking_number: Option<String>) -> Self {
        Self {
            status: ShipmentStatus::Success,
            shipment_id: Some(shipment_id.into()),
            tracking_number,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: ShipmentStatus::Failed,
            shipment_id: None,
            tracking_number: None,
            error: Some(error.into()),
        }
    }

    pub fn exception(error: impl Into<String>) -> Self {
        Self {
            status: ShipmentStatus::Exception,
            shipment_id: None,
            tracking_number: None,
            error: Some(error.into()),
        }
    }

    /// Remote errors are carrier refusals (`FAILED`); transport and data
    /// problems mean we never got a usable answer (`EXCEPTION`).
    pub fn from_result(result: Result<ShipmentConfirmation, CarrierError>) -> Self {
        match result {
            Ok(c) => Self::success(c.shipment_id, c.tracking_number),
            Err(CarrierError::Remote(msg)) => Self::failed(msg),
            Err(e @ CarrierError::Transport(_)) => Self::exception(e.to_string()),
            Err(e @ CarrierError::Data { .. }) => Self::exception(e.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ShipmentStatus::Success
    }
}

// ---------------------------------------------------------------------------
// Label retrieval
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LabelStatus {
    Success,
    ApiError,
    InvalidData,
    Exception,
    Skipped,
}

impl std::fmt::Display for LabelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::ApiError => write!(f, "API_ERROR"),
            Self::InvalidData => write!(f, "INVALID_DATA"),
            Self::Exception => write!(f, "EXCEPTION"),
            Self::Skipped => write!(f, "SKIPPED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelAttempt {
    pub status: LabelStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LabelAttempt {
    pub fn success(label_path: impl Into<PathBuf>) -> Self {
        Self {
            status: LabelStatus::Success,
            label_path: Some(label_path.into()),
            error: None,
        }
    }

    /// Label retrieval was not attempted because shipment creation failed.
    pub fn skipped() -> Self {
        Self { status: LabelStatus::Skipped, label_path: None, error: None }
    }

    pub fn exception(error: impl Into<String>) -> Self {
        Self {
            status: LabelStatus::Exception,
            label_path: None,
            error: Some(error.into()),
        }
    }

    pub fn from_error(err: &CarrierError) -> Self {
        let status = match err {
            CarrierError::Remote(_) => LabelStatus::ApiError,
            CarrierError::Transport(_) => LabelStatus::Exception,
            CarrierError::Data { .. } => LabelStatus::InvalidData,
        };
        let message = match err {
            CarrierError::Remote(msg) => msg.clone(),
            other => other.to_string(),
        };
        Self { status, label_path: None, error: Some(message) }
    }

    pub fn is_success(&self) -> bool {
        self.status == LabelStatus::Success
    }
}

// ---------------------------------------------------------------------------
// Durable state
// ---------------------------------------------------------------------------

/// One record per order: the latest shipment and label outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub order_id: String,
    pub shipment: ShipmentAttempt,
    pub label: LabelAttempt,
    /// Number of times this order went through the pipeline.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    pub recorded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_label_retry_at: Option<DateTime<Utc>>,
}

fn default_attempts() -> u32 {
    1
}

impl LogEntry {
    /// Both sub-outcomes succeeded: the order may be archived.
    pub fn is_complete(&self) -> bool {
        self.shipment.is_success() && self.label.is_success()
    }

    /// Shipment exists but the label is still missing.
    pub fn needs_label(&self) -> bool {
        self.shipment.is_success() && !self.label.is_success()
    }

    pub fn error(&self) -> Option<&str> {
        self.label.error.as_deref().or(self.shipment.error.as_deref())
    }
}

/// The shipment-result log. At most one entry per order id; serialized as a
/// plain JSON array in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShipmentLog {
    entries: Vec<LogEntry>,
}

impl ShipmentLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a log from raw entries, collapsing duplicates (last one wins).
    /// Older tools appended instead of upserting, so snapshots on disk can
    /// carry repeats.
    pub fn from_entries(entries: Vec<LogEntry>) -> Self {
        let mut log = Self::new();
        for entry in entries {
            log.upsert(entry);
        }
        log
    }

    pub fn get(&self, order_id: &str) -> Option<&LogEntry> {
        self.entries.iter().find(|e| e.order_id == order_id)
    }

    /// Insert or replace the entry for `entry.order_id`.
    pub fn upsert(&mut self, entry: LogEntry) -> &LogEntry {
        match self.entries.iter().position(|e| e.order_id == entry.order_id) {
            Some(idx) => {
                self.entries[idx] = entry;
                &self.entries[idx]
            }
            None => {
                self.entries.push(entry);
                let last = self.entries.len() - 1;
                &self.entries[last]
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A fully completed order, handed to downstream systems.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub order: Order,
    pub shipment_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    pub label_path: PathBuf,
    pub archived_at: DateTime<Utc>,
}

impl ArchiveEntry {
    pub fn order_id(&self) -> &str {
        &self.order.order_id
    }
}

/// Append-only set of completed orders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Archive {
    entries: Vec<ArchiveEntry>,
}

impl Archive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an archive from raw entries, keeping the first copy of any
    /// repeated order id.
    pub fn from_entries(entries: Vec<ArchiveEntry>) -> Self {
        let mut archive = Self::new();
        for entry in entries {
            archive.append(entry);
        }
        archive
    }

    pub fn contains(&self, order_id: &str) -> bool {
        self.entries.iter().any(|e| e.order_id() == order_id)
    }

    pub fn get(&self, order_id: &str) -> Option<&ArchiveEntry> {
        self.entries.iter().find(|e| e.order_id() == order_id)
    }

    /// Append unless the order is already present. Returns whether the
    /// archive changed.
    pub(crate) fn append(&mut self, entry: ArchiveEntry) -> bool {
        if self.contains(entry.order_id()) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArchiveEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_stems_are_distinct_and_contained() {
        assert_eq!(order_file_stem("BB-1002_3.1"), "BB-1002_3.1");
        assert_eq!(order_file_stem("A 1"), "A%201");
        assert_eq!(order_file_stem("A%201"), "A%25201");
        assert_eq!(order_file_stem(".."), "%2E.");
        assert_eq!(order_file_stem("a/../b"), "a%2F..%2Fb");
        assert_eq!(order_file_stem("Ä"), "%C3%84");
        assert_ne!(order_file_stem("A 1"), order_file_stem("A_1"));
    }

    fn entry(order_id: &str, shipment: ShipmentAttempt, label: LabelAttempt) -> LogEntry {
        LogEntry {
            order_id: order_id.into(),
            shipment,
            label,
            attempts: 1,
            recorded_at: Utc::now(),
            last_label_retry_at: None,
        }
    }

    #[test]
    fn total_decimal_formats_cents() {
        let mut order = crate::tracker::tests::order("A1");
        order.total_cents = 4999;
        assert_eq!(order.total_decimal(), "49.99");
        order.total_cents = 5;
        assert_eq!(order.total_decimal(), "0.05");
        order.total_cents = -150;
        assert_eq!(order.total_decimal(), "-1.50");
    }

    #[test]
    fn remote_errors_fail_shipment_others_raise() {
        let a = ShipmentAttempt::from_result(Err(CarrierError::Remote("bad postal code".into())));
        assert_eq!(a.status, ShipmentStatus::Failed);
        assert_eq!(a.error.as_deref(), Some("bad postal code"));

        let b = ShipmentAttempt::from_result(Err(CarrierError::Transport("timed out".into())));
        assert_eq!(b.status, ShipmentStatus::Exception);

        let c = ShipmentAttempt::from_result(Err(CarrierError::data("no shipment id")));
        assert_eq!(c.status, ShipmentStatus::Exception);
    }

    #[test]
    fn label_error_taxonomy() {
        assert_eq!(
            LabelAttempt::from_error(&CarrierError::Remote("x".into())).status,
            LabelStatus::ApiError
        );
        assert_eq!(
            LabelAttempt::from_error(&CarrierError::Transport("x".into())).status,
            LabelStatus::Exception
        );
        assert_eq!(
            LabelAttempt::from_error(&CarrierError::data("not base64")).status,
            LabelStatus::InvalidData
        );
    }

    #[test]
    fn status_wire_names() {
        let json = serde_json::to_string(&LabelStatus::InvalidData).unwrap();
        assert_eq!(json, "\"INVALID_DATA\"");
        let json = serde_json::to_string(&ShipmentStatus::Exception).unwrap();
        assert_eq!(json, "\"EXCEPTION\"");
    }

    #[test]
    fn log_upsert_replaces() {
        let mut log = ShipmentLog::new();
        log.upsert(entry("A1", ShipmentAttempt::failed("x"), LabelAttempt::skipped()));
        log.upsert(entry("B2", ShipmentAttempt::failed("y"), LabelAttempt::skipped()));
        log.upsert(entry(
            "A1",
            ShipmentAttempt::success("99", None),
            LabelAttempt::success("labels/A1.pdf"),
        ));

        assert_eq!(log.len(), 2);
        assert!(log.get("A1").unwrap().is_complete());
        // Position is kept on replace
        assert_eq!(log.iter().next().unwrap().order_id, "A1");
    }

    #[test]
    fn log_from_entries_collapses_duplicates() {
        let log = ShipmentLog::from_entries(vec![
            entry("A1", ShipmentAttempt::failed("x"), LabelAttempt::skipped()),
            entry("A1", ShipmentAttempt::success("7", None), LabelAttempt::exception("io")),
        ]);
        assert_eq!(log.len(), 1);
        assert!(log.get("A1").unwrap().needs_label());
    }

    #[test]
    fn log_serializes_as_array() {
        let mut log = ShipmentLog::new();
        log.upsert(entry("A1", ShipmentAttempt::failed("x"), LabelAttempt::skipped()));
        let value = serde_json::to_value(&log).unwrap();
        assert!(value.is_array());
        assert_eq!(value[0]["shipment"]["status"], "FAILED");
        assert_eq!(value[0]["label"]["status"], "SKIPPED");
        assert!(value[0]["shipment"].get("shipment_id").is_none());
    }

    #[test]
    fn attempts_default_when_missing() {
        let json = r#"[{
            "order_id": "A1",
            "shipment": {"status": "SUCCESS", "shipment_id": "99"},
            "label": {"status": "API_ERROR", "error": "not ready"},
            "recorded_at": "2026-01-10T12:00:00Z"
        }]"#;
        let log: ShipmentLog = serde_json::from_str(json).unwrap();
        let e = log.get("A1").unwrap();
        assert_eq!(e.attempts, 1);
        assert!(e.needs_label());
        assert_eq!(e.error(), Some("not ready"));
    }
}
