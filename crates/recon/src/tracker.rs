use std::collections::HashSet;

use chrono::{DateTime, Utc};
use crate::error::ReconError;
use crate::model::{Archive, ArchiveEntry, LabelAttempt, LogEntry, Order, ShipmentAttempt, ShipmentLog};
use crate::state::OrderState;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Limits on how often an order is put back through the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn allows(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }
}

// ---------------------------------------------------------------------------
// Selection results
// ---------------------------------------------------------------------------

/// Where processing of a pending order picks up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resume {
    /// No usable shipment yet.
    CreateShipment,
    /// The carrier already has a shipment; only the label is missing.
    FetchLabel { shipment: ShipmentAttempt },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOrder<'a> {
    pub order: &'a Order,
    pub resume: Resume,
}

/// A label-only retry candidate, read from the log alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRetry {
    pub order_id: String,
    pub shipment: ShipmentAttempt,
}

impl LabelRetry {
    pub fn shipment_id(&self) -> &str {
        self.shipment.shipment_id.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Promotion {
    Archived,
    AlreadyArchived,
    /// Shipment or label has not succeeded (or there is no log entry).
    NotEligible,
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Owns the in-memory copy of the shipment log and the archive and decides
/// what still needs doing. Persisting is the caller's job (see
/// [`crate::pipeline::run_batch`]).
#[derive(Debug, Clone, Default)]
pub struct Tracker {
    log: ShipmentLog,
    archive: Archive,
    policy: RetryPolicy,
}

impl Tracker {
    pub fn new(log: ShipmentLog, archive: Archive) -> Self {
        Self { log, archive, policy: RetryPolicy::default() }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn log(&self) -> &ShipmentLog {
        &self.log
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Orders that still need work, in source order.
    ///
    /// An order is pending when it has no log entry, or its entry shows a
    /// shipment or label failure. Archived orders never come back. Orders
    /// whose entry has used up the retry budget are left out (see
    /// [`Tracker::exhausted`]). Repeated ids in `orders` are returned once.
    pub fn select_pending<'a>(&self, orders: &'a [Order]) -> Vec<PendingOrder<'a>> {
        let archived: HashSet<&str> = self.archive.iter().map(|e| e.order_id()).collect();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut pending = Vec::new();

        for order in orders {
            let id = order.order_id.as_str();
            if !seen.insert(id) {
                tracing::warn!(order_id = id, "duplicate order id in source; processing once");
                continue;
            }
            if archived.contains(id) {
                continue;
            }

            let Some(entry) = self.log.get(id) else {
                pending.push(PendingOrder { order, resume: Resume::CreateShipment });
                continue;
            };

            if entry.is_complete() || !self.policy.allows(entry.attempts) {
                continue;
            }

            if entry.shipment.is_success() {
                if entry.shipment.shipment_id.is_none() {
                    // Creating another shipment could double-ship the order.
                    tracing::warn!(
                        order_id = id,
                        "shipment recorded as successful without an id; needs manual review"
                    );
                    continue;
                }
                pending.push(PendingOrder {
                    order,
                    resume: Resume::FetchLabel { shipment: entry.shipment.clone() },
                });
            } else {
                pending.push(PendingOrder { order, resume: Resume::CreateShipment });
            }
        }

        pending
    }

    /// The narrow retry pass: entries whose shipment exists but whose label
    /// does not, read from the log without needing the order feed.
    pub fn select_label_retries(&self) -> Vec<LabelRetry> {
        self.log
            .iter()
            .filter(|e| e.needs_label())
            .filter(|e| e.shipment.shipment_id.is_some())
            .filter(|e| !self.archive.contains(&e.order_id))
            .filter(|e| self.policy.allows(e.attempts))
            .map(|e| LabelRetry { order_id: e.order_id.clone(), shipment: e.shipment.clone() })
            .collect()
    }

    /// Label retry candidates held back by the retry cap.
    pub fn exhausted_label_retries(&self) -> Vec<String> {
        self.log
            .iter()
            .filter(|e| e.needs_label() && e.shipment.shipment_id.is_some())
            .filter(|e| !self.archive.contains(&e.order_id))
            .filter(|e| !self.policy.allows(e.attempts))
            .map(|e| e.order_id.clone())
            .collect()
    }

    /// Ids (from `orders`) whose failures hit the retry cap.
    pub fn exhausted(&self, orders: &[Order]) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        orders
            .iter()
            .filter(|o| seen.insert(o.order_id.as_str()))
            .filter_map(|o| self.log.get(&o.order_id))
            .filter(|e| !e.is_complete() && !self.policy.allows(e.attempts))
            .filter(|e| !self.archive.contains(&e.order_id))
            .map(|e| e.order_id.clone())
            .collect()
    }

    /// Upsert the log entry for `order_id`.
    ///
    /// A failed shipment always records the label as `SKIPPED`: the label
    /// outcome never masks the shipment failure. Archived orders are closed;
    /// recording against one is an invalid transition and leaves the log
    /// untouched.
    pub fn record_attempt(
        &mut self,
        order_id: &str,
        shipment: ShipmentAttempt,
        label: LabelAttempt,
    ) -> Result<&LogEntry, ReconError> {
        self.record_attempt_at(order_id, shipment, label, Utc::now())
    }

    pub fn record_attempt_at(
        &mut self,
        order_id: &str,
        shipment: ShipmentAttempt,
        label: LabelAttempt,
        at: DateTime<Utc>,
    ) -> Result<&LogEntry, ReconError> {
        self.ensure_open(order_id, OrderState::ShipmentPending)?;
        let label = if shipment.is_success() { label } else { LabelAttempt::skipped() };
        let prior = self.log.get(order_id);
        let attempts = prior.map_or(0, |e| e.attempts) + 1;
        let last_label_retry_at = prior.and_then(|e| e.last_label_retry_at);

        Ok(self.log.upsert(LogEntry {
            order_id: order_id.to_string(),
            shipment,
            label,
            attempts,
            recorded_at: at,
            last_label_retry_at,
        }))
    }

    /// Record the outcome of a label-only retry, keeping the recorded shipment.
    pub fn record_label_retry(
        &mut self,
        order_id: &str,
        label: LabelAttempt,
    ) -> Result<&LogEntry, ReconError> {
        self.record_label_retry_at(order_id, label, Utc::now())
    }

    pub fn record_label_retry_at(
        &mut self,
        order_id: &str,
        label: LabelAttempt,
        at: DateTime<Utc>,
    ) -> Result<&LogEntry, ReconError> {
        self.ensure_open(order_id, OrderState::LabelPending)?;
        let prior = self
            .log
            .get(order_id)
            .filter(|e| e.shipment.is_success())
            .ok_or_else(|| ReconError::NoShipment(order_id.to_string()))?;

        let entry = LogEntry {
            order_id: order_id.to_string(),
            shipment: prior.shipment.clone(),
            label,
            attempts: prior.attempts + 1,
            recorded_at: at,
            last_label_retry_at: Some(at),
        };
        Ok(self.log.upsert(entry))
    }

    fn ensure_open(&self, order_id: &str, to: OrderState) -> Result<(), ReconError> {
        if self.archive.contains(order_id) {
            return Err(ReconError::InvalidTransition {
                order_id: order_id.to_string(),
                from: OrderState::Archived,
                to,
            });
        }
        Ok(())
    }

    /// Move a completed order into the archive. Idempotent.
    pub fn promote_to_archive(&mut self, order: &Order) -> Promotion {
        self.promote_to_archive_at(order, Utc::now())
    }

    pub fn promote_to_archive_at(&mut self, order: &Order, at: DateTime<Utc>) -> Promotion {
        if self.archive.contains(&order.order_id) {
            return Promotion::AlreadyArchived;
        }
        let Some(entry) = self.log.get(&order.order_id).filter(|e| e.is_complete()) else {
            return Promotion::NotEligible;
        };
        let (Some(shipment_id), Some(label_path)) =
            (entry.shipment.shipment_id.clone(), entry.label.label_path.clone())
        else {
            return Promotion::NotEligible;
        };

        self.archive.append(ArchiveEntry {
            order: order.clone(),
            shipment_id,
            tracking_number: entry.shipment.tracking_number.clone(),
            label_path,
            archived_at: at,
        });
        Promotion::Archived
    }

    /// Promote every completed-but-unarchived order found in `orders`.
    /// Covers a crash between writing the log and writing the archive.
    pub fn heal_archive(&mut self, orders: &[Order]) -> Vec<String> {
        let mut healed = Vec::new();
        for order in orders {
            if self.promote_to_archive(order) == Promotion::Archived {
                tracing::info!(order_id = %order.order_id, "archived order left behind by an earlier run");
                healed.push(order.order_id.clone());
            }
        }
        healed
    }

    /// Durable state of an order.
    pub fn state_of(&self, order_id: &str) -> OrderState {
        if self.archive.contains(order_id) {
            return OrderState::Archived;
        }
        match self.log.get(order_id) {
            None => OrderState::New,
            Some(e) if !e.shipment.is_success() => OrderState::ShipmentFailed,
            Some(e) if e.label.is_success() => OrderState::LabelOk,
            Some(_) => OrderState::LabelFailed,
        }
    }
}
