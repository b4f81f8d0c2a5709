// File I/O: order feeds, state snapshots, label files, reports

pub mod confirmations;
pub mod csv;
pub mod error;
pub mod handoff;
pub mod json;
pub mod labels;
pub mod orders;
pub mod sqlite;
pub mod store;
pub mod xlsx;

pub use confirmations::{append_confirmations, Confirmation};
pub use error::IoError;
pub use handoff::{export_handoff, HandoffRecord, HandoffResult};
pub use labels::LabelDirectory;
pub use orders::{OrderFile, OrderFormat};
pub use sqlite::ShipmentDb;
pub use store::JsonStore;
pub use xlsx::SummaryRow;
