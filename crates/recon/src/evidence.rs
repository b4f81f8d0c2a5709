use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::model::Order;
use crate::pipeline::OrderOutcome;
use crate::state::OrderState;
use crate::tracker::{Promotion, Tracker};

/// Counts for a single batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub shipments_created: usize,
    pub shipment_failures: usize,
    pub labels_saved: usize,
    pub label_failures: usize,
    pub archived: usize,
    pub healed: usize,
    pub exhausted: usize,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[OrderOutcome], healed: usize, exhausted: usize) -> Self {
        let mut s = BatchSummary { processed: outcomes.len(), healed, exhausted, ..Default::default() };

        for o in outcomes {
            if !o.entry.shipment.is_success() {
                s.shipment_failures += 1;
                continue;
            }
            if !o.resumed {
                s.shipments_created += 1;
            }
            if o.entry.label.is_success() {
                s.labels_saved += 1;
            } else {
                s.label_failures += 1;
            }
            if o.promotion == Promotion::Archived {
                s.archived += 1;
            }
        }
        s
    }

    pub fn failures(&self) -> usize {
        self.shipment_failures + self.label_failures
    }
}

/// Snapshot of where every known order stands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub total: usize,
    pub by_state: BTreeMap<OrderState, usize>,
    /// Orders that will be picked up by the next pass.
    pub retryable: Vec<String>,
}

impl StatusSummary {
    /// Covers the union of `orders`, the log and the archive.
    pub fn compute(tracker: &Tracker, orders: &[Order]) -> Self {
        let ids: BTreeSet<&str> = orders
            .iter()
            .map(|o| o.order_id.as_str())
            .chain(tracker.log().iter().map(|e| e.order_id.as_str()))
            .chain(tracker.archive().iter().map(|e| e.order_id()))
            .collect();

        let mut summary = StatusSummary { total: ids.len(), ..Default::default() };
        for id in ids {
            let state = tracker.state_of(id);
            *summary.by_state.entry(state).or_insert(0) += 1;
            let within_budget = tracker.log().get(id).map_or(true, |e| tracker.policy().allows(e.attempts));
            if state.is_retryable() && within_budget {
                summary.retryable.push(id.to_string());
            }
        }
        summary
    }

    pub fn count(&self, state: OrderState) -> usize {
        self.by_state.get(&state).copied().unwrap_or(0)
    }
}
