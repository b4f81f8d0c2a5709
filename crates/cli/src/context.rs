//! Per-invocation state: settings, the snapshot store and the tracker built
//! from it.

use std::path::{Path, PathBuf};

use parcelflow_config::Settings;
use parcelflow_io::{JsonStore, OrderFile};
use parcelflow_recon::{Order, OrderSource, RetryPolicy, Tracker};

use crate::{CliError, GlobalArgs};

pub struct Context {
    pub settings: Settings,
    /// `None` when running on built-in defaults.
    pub config_path: Option<PathBuf>,
    pub store: JsonStore,
}

impl Context {
    pub fn load(global: &GlobalArgs) -> Result<Self, CliError> {
        let (settings, config_path) =
            Settings::load_or_default(global.config.as_deref()).map_err(CliError::config)?;
        let store = JsonStore::new(settings.paths.log_file(), settings.paths.archive_file());
        Ok(Self { settings, config_path, store })
    }

    pub fn tracker(&self) -> Result<Tracker, CliError> {
        let log = self.store.load_log().map_err(CliError::state)?;
        let archive = self.store.load_archive().map_err(CliError::state)?;
        let policy = RetryPolicy { max_attempts: self.settings.retry.max_attempts };
        Ok(Tracker::new(log, archive).with_policy(policy))
    }

    pub fn load_orders(&self, path: &Path) -> Result<Vec<Order>, CliError> {
        OrderFile::new(path, &self.settings.orders)
            .and_then(|feed| feed.load_orders())
            .map_err(CliError::orders)
    }

    /// Orders from an optional feed; no feed means no orders.
    pub fn load_optional_orders(&self, path: Option<&Path>) -> Result<Vec<Order>, CliError> {
        match path {
            Some(p) => self.load_orders(p),
            None => Ok(Vec::new()),
        }
    }
}
