use crate::state::OrderState;

/// Failure reported by a carrier call.
///
/// The three kinds drive how an attempt is recorded: see
/// [`crate::model::ShipmentAttempt::from_result`] and
/// [`crate::model::LabelAttempt::from_error`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CarrierError {
    /// The carrier answered with a structured error (bad address, unknown
    /// shipment, rejected credentials).
    #[error("carrier rejected request: {0}")]
    Remote(String),
    /// Protocol or network failure: timeout, HTTP error, SOAP fault.
    #[error("carrier transport fault: {0}")]
    Transport(String),
    /// The carrier answered but the payload could not be used.
    /// `payload` keeps the raw value when there is one worth inspecting.
    #[error("malformed carrier response: {message}")]
    Data {
        message: String,
        payload: Option<String>,
    },
}

impl CarrierError {
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data { message: message.into(), payload: None }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReconError {
    /// Writing the log or archive snapshot failed. The batch stops here:
    /// carrying on would repeat side effects on the next run.
    #[error("cannot persist {target}: {message}")]
    Persist { target: &'static str, message: String },
    /// Internal state machine violation.
    #[error("order '{order_id}': invalid transition {from} -> {to}")]
    InvalidTransition {
        order_id: String,
        from: OrderState,
        to: OrderState,
    },
    /// Label-only retry for an order the log has no shipment for.
    #[error("order '{0}' has no successful shipment to retry a label for")]
    NoShipment(String),
}
