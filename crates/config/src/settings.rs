// Settings file (TOML)
//
// Located by, in order:
// 1. --config flag
// 2. PFLOW_CONFIG environment variable
// 3. <platform config dir>/parcelflow/config.toml
//
// A missing file at the platform location is not an error: every section has
// defaults, and `validate()` reports what still has to be filled in.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::columns::OrderColumns;

pub const CONFIG_ENV: &str = "PFLOW_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("config is incomplete: {}", .0.join("; "))]
    Invalid(Vec<String>),
    #[error("missing carrier {0}")]
    MissingCredential(&'static str),
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarrierSettings {
    /// SOAP service endpoint (no `?wsdl`).
    pub endpoint: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub shipper_num: String,
    pub service_type: String,
    pub signature_required: bool,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Extra label fetch attempts on transport faults.
    pub label_retries: u32,
    /// First backoff step; doubles per retry.
    pub backoff_ms: u64,
    /// Keep every raw SOAP response under `paths.responses_dir`.
    pub save_responses: bool,
}

impl Default for CarrierSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://canship.canpar.com/canshipws/services/CanshipBusinessService".into(),
            user: None,
            password: None,
            shipper_num: String::new(),
            service_type: "1".into(),
            signature_required: true,
            timeout_secs: 60,
            label_retries: 3,
            backoff_ms: 1000,
            save_responses: true,
        }
    }
}

/// Shipper (pickup) address printed on every label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickupAddress {
    pub name: String,
    pub street: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    pub country: String,
    pub phone: String,
}

impl Default for PickupAddress {
    fn default() -> Self {
        Self {
            name: String::new(),
            street: String::new(),
            city: String::new(),
            province: String::new(),
            postal_code: String::new(),
            country: "CA".into(),
            phone: String::new(),
        }
    }
}

/// Every order ships as one package of these dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageSettings {
    pub weight_lbs: f64,
    pub length_in: u32,
    pub width_in: u32,
    pub height_in: u32,
}

impl Default for PackageSettings {
    fn default() -> Self {
        Self { weight_lbs: 3.0, length_in: 16, width_in: 12, height_in: 3 }
    }
}

/// Where state lives. Every file defaults to a name under `state_dir`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub state_dir: PathBuf,
    pub log_file: Option<PathBuf>,
    pub archive_file: Option<PathBuf>,
    pub labels_dir: Option<PathBuf>,
    pub failed_labels_dir: Option<PathBuf>,
    pub responses_dir: Option<PathBuf>,
    pub export_history_file: Option<PathBuf>,
    pub confirmations_file: Option<PathBuf>,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            log_file: None,
            archive_file: None,
            labels_dir: None,
            failed_labels_dir: None,
            responses_dir: None,
            export_history_file: None,
            confirmations_file: None,
        }
    }
}

fn default_state_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("parcelflow"))
        .unwrap_or_else(|| PathBuf::from("."))
}

impl PathSettings {
    fn under(&self, explicit: &Option<PathBuf>, name: &str) -> PathBuf {
        explicit.clone().unwrap_or_else(|| self.state_dir.join(name))
    }

    pub fn log_file(&self) -> PathBuf {
        self.under(&self.log_file, "shipments_log.json")
    }

    pub fn archive_file(&self) -> PathBuf {
        self.under(&self.archive_file, "archive.json")
    }

    pub fn labels_dir(&self) -> PathBuf {
        self.under(&self.labels_dir, "labels")
    }

    pub fn failed_labels_dir(&self) -> PathBuf {
        self.under(&self.failed_labels_dir, "failed_labels")
    }

    pub fn responses_dir(&self) -> PathBuf {
        self.under(&self.responses_dir, "xml_responses")
    }

    pub fn export_history_file(&self) -> PathBuf {
        self.under(&self.export_history_file, "export_history.json")
    }

    /// One JSON line per shipping confirmation.
    pub fn confirmations_file(&self) -> PathBuf {
        self.under(&self.confirmations_file, "shipping_confirmations.jsonl")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderSettings {
    pub columns: OrderColumns,
    /// Used when the feed has no country column or the cell is blank.
    pub default_country: String,
}

impl Default for OrderSettings {
    fn default() -> Self {
        Self { columns: OrderColumns::default(), default_country: "CA".into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Stop retrying an order after this many attempts. Unset = no limit.
    pub max_attempts: Option<u32>,
}

/// Tracking hand-off to the marketplace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoffSettings {
    pub carrier_name: String,
    /// `{}` is replaced with the tracking number.
    pub tracking_url_template: String,
}

impl Default for HandoffSettings {
    fn default() -> Self {
        Self {
            carrier_name: "Canpar".into(),
            tracking_url_template: "https://www.canpar.com/en/track/track.htm?i={}".into(),
        }
    }
}

impl HandoffSettings {
    pub fn tracking_url(&self, tracking_number: &str) -> String {
        self.tracking_url_template.replace("{}", tracking_number)
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub carrier: CarrierSettings,
    pub pickup: PickupAddress,
    pub package: PackageSettings,
    pub paths: PathSettings,
    pub orders: OrderSettings,
    pub retry: RetrySettings,
    pub handoff: HandoffSettings,
}

impl Settings {
    /// Platform default location.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("parcelflow")
            .join("config.toml")
    }

    /// Pick the config file to use. An explicit path (flag or env) is
    /// returned even if it does not exist so loading can report it; the
    /// platform default is only returned when present.
    pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
            return Some(PathBuf::from(path));
        }
        let default = Self::config_path();
        default.exists().then_some(default)
    }

    /// Locate and load, falling back to defaults when no file is found.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        match Self::locate(explicit) {
            Some(path) => Ok((Self::load(&path)?, Some(path))),
            None => {
                tracing::debug!("no config file found; using defaults");
                Ok((Self::default(), None))
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let settings = Self::from_toml_str(&contents)
            .map_err(|message| ConfigError::Parse { path: path.to_path_buf(), message })?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(settings)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, String> {
        toml::from_str(contents).map_err(|e| e.message().to_string())
    }

    /// Every problem that would stop a shipment pass, one message each.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let c = &self.carrier;
        if !(c.endpoint.starts_with("http://") || c.endpoint.starts_with("https://")) {
            problems.push(format!("carrier.endpoint must be an http(s) URL (got '{}')", c.endpoint));
        }
        if c.shipper_num.trim().is_empty() {
            problems.push("carrier.shipper_num is required".into());
        }
        if c.service_type.trim().is_empty() {
            problems.push("carrier.service_type is required".into());
        }
        if c.timeout_secs == 0 {
            problems.push("carrier.timeout_secs must be greater than 0".into());
        }

        let p = &self.pickup;
        for (field, value) in [
            ("name", &p.name),
            ("street", &p.street),
            ("city", &p.city),
            ("province", &p.province),
            ("postal_code", &p.postal_code),
            ("country", &p.country),
        ] {
            if value.trim().is_empty() {
                problems.push(format!("pickup.{field} is required"));
            }
        }

        let k = &self.package;
        if !(k.weight_lbs > 0.0) {
            problems.push("package.weight_lbs must be greater than 0".into());
        }
        if k.length_in == 0 || k.width_in == 0 || k.height_in == 0 {
            problems.push("package dimensions must be greater than 0".into());
        }

        if self.retry.max_attempts == Some(0) {
            problems.push("retry.max_attempts must be at least 1 when set".into());
        }

        problems.extend(self.orders.columns.problems());

        if !self.handoff.tracking_url_template.contains("{}") {
            problems.push("handoff.tracking_url_template must contain '{}'".into());
        }

        problems
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}
