//! Collaborator seams. The engine only ever sees these traits; the concrete
//! carrier client and file stores live in other crates.

use std::path::PathBuf;

use crate::error::{CarrierError, ReconError};
use crate::model::{Archive, Order, ShipmentConfirmation, ShipmentLog};

/// Read-only order feed.
pub trait OrderSource {
    type Error: std::error::Error;

    fn load_orders(&self) -> Result<Vec<Order>, Self::Error>;
}

/// The shipping carrier. Calls are blocking and bounded by the
/// implementation's timeout.
pub trait Carrier {
    fn create_shipment(&mut self, order: &Order) -> Result<ShipmentConfirmation, CarrierError>;

    /// Fetch the label for an existing shipment. Returns the decoded PDF bytes.
    fn get_label(&mut self, order_id: &str, shipment_id: &str) -> Result<Vec<u8>, CarrierError>;
}

/// Where label artifacts end up.
pub trait LabelSink {
    /// Persist a label PDF and return its path.
    fn save_label(&mut self, order_id: &str, pdf: &[u8]) -> std::io::Result<PathBuf>;

    /// Keep an unusable label payload around for inspection.
    fn save_rejected(&mut self, order_id: &str, payload: &str) -> std::io::Result<PathBuf>;
}

/// Durable snapshot storage for the log and the archive.
pub trait Persist {
    fn persist_log(&mut self, log: &ShipmentLog) -> Result<(), ReconError>;
    fn persist_archive(&mut self, archive: &Archive) -> Result<(), ReconError>;
}
