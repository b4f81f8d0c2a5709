//! `parcelflow-recon`: shipment reconciliation tracker.
//!
//! Pure engine crate: receives pre-loaded orders and state, talks to the
//! carrier and the stores through the traits in [`ports`], returns what
//! happened. No CLI or IO dependencies.

pub mod error;
pub mod evidence;
pub mod model;
pub mod pipeline;
pub mod ports;
pub mod state;
pub mod tracker;

pub use error::{CarrierError, ReconError};
pub use evidence::{BatchSummary, StatusSummary};
pub use model::{
    order_file_stem, Archive, ArchiveEntry, LabelAttempt, LabelStatus, LogEntry, Order, ShipmentAttempt,
    ShipmentConfirmation, ShipmentLog, ShipmentStatus,
};
pub use pipeline::{run_batch, BatchReport, OrderOutcome, PassMode};
pub use ports::{Carrier, LabelSink, OrderSource, Persist};
pub use state::OrderState;
pub use tracker::{LabelRetry, PendingOrder, Promotion, Resume, RetryPolicy, Tracker};
