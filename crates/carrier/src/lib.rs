//! Carrier client for `pflow`.
//!
//! Speaks the two SOAP operations the shipment pipeline needs:
//!
//! - `processShipment`: create a shipment for an order, returning the
//!   carrier's shipment id and the first package barcode (tracking number)
//! - `getLabels`: fetch the base64 PDF label for an existing shipment
//!
//! [`CanparClient`] implements [`parcelflow_recon::Carrier`], so the batch
//! pipeline never sees HTTP or XML. Failures come back as
//! [`parcelflow_recon::CarrierError`]: a non-empty `error` element is
//! `Remote`, SOAP faults and HTTP/network failures are `Transport`, and
//! unusable payloads are `Data`.

mod client;
pub mod soap;

pub use client::CanparClient;
pub use soap::Operation;
