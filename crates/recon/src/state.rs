use serde::Serialize;

/// Where an order sits in the fulfillment flow.
///
/// ```text
/// New -> ShipmentPending -> ShipmentFailed            (retried by the next full pass)
///                        -> ShipmentOk -> LabelPending -> LabelFailed   (retried)
///                                                      -> LabelOk -> Archived
/// ```
///
/// `*Pending` states only exist while the pipeline is working on an order;
/// the durable states are derived from the log and archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    New,
    ShipmentPending,
    ShipmentFailed,
    ShipmentOk,
    LabelPending,
    LabelFailed,
    LabelOk,
    Archived,
}

impl OrderState {
    pub fn can_transition_to(self, next: OrderState) -> bool {
        use OrderState::*;
        matches!(
            (self, next),
            (New, ShipmentPending)
                | (ShipmentFailed, ShipmentPending)
                | (ShipmentPending, ShipmentFailed)
                | (ShipmentPending, ShipmentOk)
                | (ShipmentOk, LabelPending)
                | (LabelFailed, LabelPending)
                | (LabelPending, LabelFailed)
                | (LabelPending, LabelOk)
                | (LabelOk, Archived)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == OrderState::Archived
    }

    /// Durable states a later pass picks up again.
    pub fn is_retryable(self) -> bool {
        matches!(self, OrderState::ShipmentFailed | OrderState::LabelFailed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::ShipmentPending => "shipment_pending",
            Self::ShipmentFailed => "shipment_failed",
            Self::ShipmentOk => "shipment_ok",
            Self::LabelPending => "label_pending",
            Self::LabelFailed => "label_failed",
            Self::LabelOk => "label_ok",
            Self::Archived => "archived",
        }
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
