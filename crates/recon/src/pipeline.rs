//! One processing pass over an order batch.
//!
//! Orders are processed sequentially. After every recorded attempt the log
//! is persisted, and after every promotion the archive is persisted, so a
//! crash never loses more than the order in flight. Carrier and sink
//! failures are recorded against the order; only a persistence failure
//! stops the batch.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{CarrierError, ReconError};
use crate::evidence::BatchSummary;
use crate::model::{LabelAttempt, LogEntry, Order, ShipmentAttempt};
use crate::ports::{Carrier, LabelSink, Persist};
use crate::state::OrderState;
use crate::tracker::{Promotion, Resume, Tracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassMode {
    /// Create missing shipments and fetch missing labels.
    Full,
    /// Only fetch labels for shipments that already exist.
    LabelsOnly,
}

#[derive(Debug, Clone)]
pub struct OrderOutcome {
    pub order_id: String,
    /// Log entry as written after this attempt.
    pub entry: LogEntry,
    pub promotion: Promotion,
    /// True when processing picked up from an existing shipment.
    pub resumed: bool,
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub mode: PassMode,
    pub outcomes: Vec<OrderOutcome>,
    /// Orders archived at batch start because an earlier run stopped
    /// between the log write and the archive write.
    pub healed: Vec<String>,
    /// Orders skipped because they ran out of attempts.
    pub exhausted: Vec<String>,
    pub summary: BatchSummary,
}

/// Run one pass. `orders` is the current order feed; in
/// [`PassMode::LabelsOnly`] it is only used to archive orders whose label
/// arrives, and may be empty.
pub fn run_batch<C, L, P>(
    tracker: &mut Tracker,
    orders: &[Order],
    carrier: &mut C,
    labels: &mut L,
    store: &mut P,
    mode: PassMode,
) -> Result<BatchReport, ReconError>
where
    C: Carrier + ?Sized,
    L: LabelSink + ?Sized,
    P: Persist + ?Sized,
{
    let healed = tracker.heal_archive(orders);
    if !healed.is_empty() {
        store.persist_archive(tracker.archive())?;
    }
    let exhausted = match mode {
        PassMode::Full => tracker.exhausted(orders),
        PassMode::LabelsOnly => tracker.exhausted_label_retries(),
    };
    for id in &exhausted {
        tracing::warn!(order_id = %id, "retry limit reached; skipping");
    }

    let mut outcomes = Vec::new();
    match mode {
        PassMode::Full => {
            let work: Vec<(Order, Resume)> = tracker
                .select_pending(orders)
                .into_iter()
                .map(|p| (p.order.clone(), p.resume))
                .collect();
            tracing::info!(pending = work.len(), total = orders.len(), "starting shipment pass");

            for (order, resume) in work {
                let outcome = process_order(tracker, &order, resume, carrier, labels, store)?;
                outcomes.push(outcome);
            }
        }
        PassMode::LabelsOnly => {
            let by_id: HashMap<&str, &Order> =
                orders.iter().map(|o| (o.order_id.as_str(), o)).collect();
            let retries = tracker.select_label_retries();
            tracing::info!(pending = retries.len(), "starting label retry pass");

            for retry in retries {
                let order_id = retry.order_id.as_str();
                advance(order_id, tracker.state_of(order_id), OrderState::LabelPending)?;
                let label = fetch_label(carrier, labels, order_id, retry.shipment_id());
                let entry = tracker.record_label_retry(order_id, label)?.clone();
                store.persist_log(tracker.log())?;
                note_label(order_id, &entry)?;

                let promotion = match by_id.get(order_id) {
                    Some(order) => promote(tracker, order, store)?,
                    None if entry.is_complete() => {
                        tracing::warn!(
                            order_id,
                            "label saved but order is not in the current feed; archiving deferred"
                        );
                        Promotion::NotEligible
                    }
                    None => Promotion::NotEligible,
                };
                outcomes.push(OrderOutcome {
                    order_id: retry.order_id,
                    entry,
                    promotion,
                    resumed: true,
                });
            }
        }
    }

    let summary = BatchSummary::from_outcomes(&outcomes, healed.len(), exhausted.len());
    tracing::info!(
        processed = summary.processed,
        archived = summary.archived,
        shipment_failures = summary.shipment_failures,
        label_failures = summary.label_failures,
        "batch finished"
    );

    Ok(BatchReport { mode, outcomes, healed, exhausted, summary })
}

fn process_order<C, L, P>(
    tracker: &mut Tracker,
    order: &Order,
    resume: Resume,
    carrier: &mut C,
    labels: &mut L,
    store: &mut P,
) -> Result<OrderOutcome, ReconError>
where
    C: Carrier + ?Sized,
    L: LabelSink + ?Sized,
    P: Persist + ?Sized,
{
    let order_id = order.order_id.as_str();
    let from = tracker.state_of(order_id);

    let (entry, resumed) = match resume {
        Resume::CreateShipment => {
            advance(order_id, from, OrderState::ShipmentPending)?;
            let shipment = ShipmentAttempt::from_result(carrier.create_shipment(order));

            let label = match (shipment.is_success(), shipment.shipment_id.as_deref()) {
                (true, Some(shipment_id)) => {
                    advance(order_id, OrderState::ShipmentPending, OrderState::ShipmentOk)?;
                    advance(order_id, OrderState::ShipmentOk, OrderState::LabelPending)?;
                    fetch_label(carrier, labels, order_id, shipment_id)
                }
                _ => {
                    advance(order_id, OrderState::ShipmentPending, OrderState::ShipmentFailed)?;
                    tracing::warn!(
                        order_id,
                        status = %shipment.status,
                        error = shipment.error.as_deref().unwrap_or_default(),
                        "shipment not created"
                    );
                    LabelAttempt::skipped()
                }
            };
            (tracker.record_attempt(order_id, shipment, label)?.clone(), false)
        }
        Resume::FetchLabel { shipment } => {
            advance(order_id, from, OrderState::LabelPending)?;
            let shipment_id = shipment.shipment_id.as_deref().unwrap_or_default();
            tracing::info!(order_id, shipment_id, "resuming from existing shipment");
            let label = fetch_label(carrier, labels, order_id, shipment_id);
            (tracker.record_label_retry(order_id, label)?.clone(), true)
        }
    };

    store.persist_log(tracker.log())?;
    if entry.shipment.is_success() {
        note_label(order_id, &entry)?;
    }

    let promotion = promote(tracker, order, store)?;
    Ok(OrderOutcome { order_id: order_id.to_string(), entry, promotion, resumed })
}

/// Fetch and store a label. Never fails: every problem becomes a
/// non-success [`LabelAttempt`].
fn fetch_label<C, L>(carrier: &mut C, labels: &mut L, order_id: &str, shipment_id: &str) -> LabelAttempt
where
    C: Carrier + ?Sized,
    L: LabelSink + ?Sized,
{
    match carrier.get_label(order_id, shipment_id) {
        Ok(pdf) => match labels.save_label(order_id, &pdf) {
            Ok(path) => LabelAttempt::success(path),
            Err(e) => {
                tracing::warn!(order_id, error = %e, "cannot save label");
                LabelAttempt::exception(format!("cannot save label: {e}"))
            }
        },
        Err(err) => {
            if let CarrierError::Data { payload: Some(payload), .. } = &err {
                match labels.save_rejected(order_id, payload) {
                    Ok(path) => tracing::info!(order_id, path = %path.display(), "kept rejected label payload"),
                    Err(e) => tracing::warn!(order_id, error = %e, "cannot keep rejected label payload"),
                }
            }
            tracing::warn!(order_id, error = %err, "label not retrieved");
            LabelAttempt::from_error(&err)
        }
    }
}

fn promote<P>(tracker: &mut Tracker, order: &Order, store: &mut P) -> Result<Promotion, ReconError>
where
    P: Persist + ?Sized,
{
    let promotion = tracker.promote_to_archive(order);
    if promotion == Promotion::Archived {
        advance(&order.order_id, OrderState::LabelOk, OrderState::Archived)?;
        store.persist_archive(tracker.archive())?;
    }
    Ok(promotion)
}

fn note_label(order_id: &str, entry: &LogEntry) -> Result<(), ReconError> {
    let to = if entry.label.is_success() { OrderState::LabelOk } else { OrderState::LabelFailed };
    advance(order_id, OrderState::LabelPending, to).map(|_| ())
}

fn advance(order_id: &str, from: OrderState, to: OrderState) -> Result<OrderState, ReconError> {
    if !from.can_transition_to(to) {
        return Err(ReconError::InvalidTransition { order_id: order_id.to_string(), from, to });
    }
    tracing::debug!(order_id, %from, %to, "transition");
    Ok(to)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::path::PathBuf;

    use super::*;
    use crate::model::{Archive, LabelStatus, ShipmentConfirmation, ShipmentLog, ShipmentStatus};
    use crate::tracker::tests::order;

    // ── Test doubles ──

    #[derive(Default)]
    pub(crate) struct ScriptedCarrier {
        pub shipments: HashMap<String, Result<ShipmentConfirmation, CarrierError>>,
        pub labels: HashMap<String, VecDeque<Result<Vec<u8>, CarrierError>>>,
        pub create_calls: Vec<String>,
        pub label_calls: Vec<(String, String)>,
    }

    impl ScriptedCarrier {
        pub fn ship(mut self, id: &str, result: Result<ShipmentConfirmation, CarrierError>) -> Self {
            self.shipments.insert(id.into(), result);
            self
        }

        pub fn label(mut self, id: &str, result: Result<Vec<u8>, CarrierError>) -> Self {
            self.labels.entry(id.into()).or_default().push_back(result);
            self
        }
    }

    impl Carrier for ScriptedCarrier {
        fn create_shipment(&mut self, order: &Order) -> Result<ShipmentConfirmation, CarrierError> {
            self.create_calls.push(order.order_id.clone());
            self.shipments
                .get(&order.order_id)
                .cloned()
                .unwrap_or_else(|| Err(CarrierError::Transport("unscripted".into())))
        }

        fn get_label(&mut self, order_id: &str, shipment_id: &str) -> Result<Vec<u8>, CarrierError> {
            self.label_calls.push((order_id.into(), shipment_id.into()));
            self.labels
                .get_mut(order_id)
                .and_then(|q| q.pop_front())
                .unwrap_or_else(|| Err(CarrierError::Transport("unscripted".into())))
        }
    }

    #[derive(Default)]
    pub(crate) struct MemorySink {
        pub saved: Vec<(String, Vec<u8>)>,
        pub rejected: Vec<(String, String)>,
        pub fail_writes: bool,
    }

    impl LabelSink for MemorySink {
        fn save_label(&mut self, order_id: &str, pdf: &[u8]) -> std::io::Result<PathBuf> {
            if self.fail_writes {
                return Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"));
            }
            self.saved.push((order_id.into(), pdf.to_vec()));
            Ok(PathBuf::from(format!("labels/{order_id}.pdf")))
        }

        fn save_rejected(&mut self, order_id: &str, payload: &str) -> std::io::Result<PathBuf> {
            self.rejected.push((order_id.into(), payload.into()));
            Ok(PathBuf::from(format!("failed_labels/{order_id}_invalid_label.txt")))
        }
    }

    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub log: Option<ShipmentLog>,
        pub archive: Option<Archive>,
        pub log_writes: usize,
        pub archive_writes: usize,
        pub fail_log: bool,
    }

    impl Persist for MemoryStore {
        fn persist_log(&mut self, log: &ShipmentLog) -> Result<(), ReconError> {
            if self.fail_log {
                return Err(ReconError::Persist { target: "log", message: "disk full".into() });
            }
            self.log_writes += 1;
            self.log = Some(log.clone());
            Ok(())
        }

        fn persist_archive(&mut self, archive: &Archive) -> Result<(), ReconError> {
            self.archive_writes += 1;
            self.archive = Some(archive.clone());
            Ok(())
        }
    }

    fn confirm(id: &str, tracking: &str) -> Result<ShipmentConfirmation, CarrierError> {
        Ok(ShipmentConfirmation { shipment_id: id.into(), tracking_number: Some(tracking.into()) })
    }

    fn run(
        tracker: &mut Tracker,
        orders: &[Order],
        carrier: &mut ScriptedCarrier,
        sink: &mut MemorySink,
        store: &mut MemoryStore,
        mode: PassMode,
    ) -> BatchReport {
        run_batch(tracker, orders, carrier, sink, store, mode).unwrap()
    }

    // ── Scenarios ──

    #[test]
    fn happy_path_archives() {
        let orders = vec![order("A1")];
        let mut tracker = Tracker::default();
        let mut carrier = ScriptedCarrier::default().ship("A1", confirm("99", "D1")).label("A1", Ok(b"%PDF".to_vec()));
        let mut sink = MemorySink::default();
        let mut store = MemoryStore::default();

        let report = run(&mut tracker, &orders, &mut carrier, &mut sink, &mut store, PassMode::Full);

        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].promotion, Promotion::Archived);
        assert_eq!(carrier.label_calls, vec![("A1".to_string(), "99".to_string())]);
        assert_eq!(sink.saved.len(), 1);
        assert_eq!(store.archive.as_ref().unwrap().len(), 1);
        assert_eq!(store.log.as_ref().unwrap().len(), 1);
        assert_eq!(tracker.state_of("A1"), OrderState::Archived);
        assert_eq!(report.summary.archived, 1);
    }

    #[test]
    fn label_failure_then_resume_without_new_shipment() {
        let orders = vec![order("A1")];
        let mut tracker = Tracker::default();
        let mut sink = MemorySink::default();
        let mut store = MemoryStore::default();

        let mut first = ScriptedCarrier::default()
            .ship("A1", confirm("99", "D1"))
            .label("A1", Err(CarrierError::Remote("label not ready".into())));
        let report = run(&mut tracker, &orders, &mut first, &mut sink, &mut store, PassMode::Full);
        assert_eq!(report.outcomes[0].entry.label.status, LabelStatus::ApiError);
        assert!(tracker.archive().is_empty());

        let mut second = ScriptedCarrier::default().label("A1", Ok(b"%PDF".to_vec()));
        let report = run(&mut tracker, &orders, &mut second, &mut sink, &mut store, PassMode::Full);

        assert!(second.create_calls.is_empty());
        assert_eq!(second.label_calls, vec![("A1".to_string(), "99".to_string())]);
        assert!(report.outcomes[0].resumed);
        assert_eq!(report.outcomes[0].promotion, Promotion::Archived);
        assert_eq!(tracker.archive().get("A1").unwrap().shipment_id, "99");
    }

    #[test]
    fn shipment_failure_skips_label() {
        let orders = vec![order("A1")];
        let mut tracker = Tracker::default();
        let mut carrier =
            ScriptedCarrier::default().ship("A1", Err(CarrierError::Remote("invalid postal code".into())));
        let mut sink = MemorySink::default();
        let mut store = MemoryStore::default();

        let report = run(&mut tracker, &orders, &mut carrier, &mut sink, &mut store, PassMode::Full);

        let entry = &report.outcomes[0].entry;
        assert_eq!(entry.shipment.status, ShipmentStatus::Failed);
        assert_eq!(entry.label.status, LabelStatus::Skipped);
        assert!(carrier.label_calls.is_empty());
        assert_eq!(store.archive_writes, 0);
        assert_eq!(report.summary.shipment_failures, 1);
    }

    #[test]
    fn one_failure_does_not_stop_the_batch() {
        let orders = vec![order("A1"), order("B2")];
        let mut tracker = Tracker::default();
        let mut carrier = ScriptedCarrier::default()
            .ship("A1", Err(CarrierError::Transport("connection reset".into())))
            .ship("B2", confirm("7", "D7"))
            .label("B2", Ok(b"%PDF".to_vec()));
        let mut sink = MemorySink::default();
        let mut store = MemoryStore::default();

        let report = run(&mut tracker, &orders, &mut carrier, &mut sink, &mut store, PassMode::Full);

        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.outcomes[0].entry.shipment.status, ShipmentStatus::Exception);
        assert_eq!(report.outcomes[1].promotion, Promotion::Archived);
        assert_eq!(store.log_writes, 2);
    }

    #[test]
    fn empty_source_writes_nothing() {
        let mut tracker = Tracker::default();
        let mut carrier = ScriptedCarrier::default();
        let mut sink = MemorySink::default();
        let mut store = MemoryStore::default();

        let report = run(&mut tracker, &[], &mut carrier, &mut sink, &mut store, PassMode::Full);

        assert!(report.outcomes.is_empty());
        assert_eq!(store.log_writes, 0);
        assert_eq!(store.archive_writes, 0);
    }

    #[test]
    fn invalid_label_payload_is_kept() {
        let orders = vec![order("A1")];
        let mut tracker = Tracker::default();
        let mut carrier = ScriptedCarrier::default().ship("A1", confirm("99", "D1")).label(
            "A1",
            Err(CarrierError::Data { message: "label is not base64".into(), payload: Some("@@@".into()) }),
        );
        let mut sink = MemorySink::default();
        let mut store = MemoryStore::default();

        let report = run(&mut tracker, &orders, &mut carrier, &mut sink, &mut store, PassMode::Full);

        assert_eq!(report.outcomes[0].entry.label.status, LabelStatus::InvalidData);
        assert_eq!(sink.rejected, vec![("A1".to_string(), "@@@".to_string())]);
        assert!(sink.saved.is_empty());
    }

    #[test]
    fn sink_failure_is_label_exception() {
        let orders = vec![order("A1")];
        let mut tracker = Tracker::default();
        let mut carrier = ScriptedCarrier::default().ship("A1", confirm("99", "D1")).label("A1", Ok(b"%PDF".to_vec()));
        let mut sink = MemorySink { fail_writes: true, ..Default::default() };
        let mut store = MemoryStore::default();

        let report = run(&mut tracker, &orders, &mut carrier, &mut sink, &mut store, PassMode::Full);

        let entry = &report.outcomes[0].entry;
        assert!(entry.shipment.is_success());
        assert_eq!(entry.label.status, LabelStatus::Exception);
        assert!(tracker.archive().is_empty());
    }

    #[test]
    fn persist_failure_aborts() {
        let orders = vec![order("A1"), order("B2")];
        let mut tracker = Tracker::default();
        let mut carrier = ScriptedCarrier::default()
            .ship("A1", Err(CarrierError::Remote("x".into())))
            .ship("B2", Err(CarrierError::Remote("y".into())));
        let mut sink = MemorySink::default();
        let mut store = MemoryStore { fail_log: true, ..Default::default() };

        let err = run_batch(&mut tracker, &orders, &mut carrier, &mut sink, &mut store, PassMode::Full)
            .unwrap_err();

        assert!(matches!(err, ReconError::Persist { target: "log", .. }));
        assert_eq!(carrier.create_calls, vec!["A1".to_string()]);
    }

    #[test]
    fn rerun_after_success_is_a_no_op() {
        let orders = vec![order("A1")];
        let mut tracker = Tracker::default();
        let mut carrier = ScriptedCarrier::default().ship("A1", confirm("99", "D1")).label("A1", Ok(b"%PDF".to_vec()));
        let mut sink = MemorySink::default();
        let mut store = MemoryStore::default();
        run(&mut tracker, &orders, &mut carrier, &mut sink, &mut store, PassMode::Full);

        let mut again = ScriptedCarrier::default();
        let report = run(&mut tracker, &orders, &mut again, &mut sink, &mut store, PassMode::Full);

        assert!(report.outcomes.is_empty());
        assert!(again.create_calls.is_empty());
        assert_eq!(tracker.archive().len(), 1);
    }

    #[test]
    fn crash_between_log_and_archive_heals() {
        let orders = vec![order("A1")];
        let mut log = ShipmentLog::new();
        log.upsert(LogEntry {
            order_id: "A1".into(),
            shipment: ShipmentAttempt::success("99", Some("D1".into())),
            label: LabelAttempt::success("labels/A1.pdf"),
            attempts: 1,
            recorded_at: chrono::Utc::now(),
            last_label_retry_at: None,
        });
        let mut tracker = Tracker::new(log, Archive::new());
        let mut carrier = ScriptedCarrier::default();
        let mut sink = MemorySink::default();
        let mut store = MemoryStore::default();

        let report = run(&mut tracker, &orders, &mut carrier, &mut sink, &mut store, PassMode::Full);

        assert_eq!(report.healed, vec!["A1".to_string()]);
        assert_eq!(store.archive_writes, 1);
        assert!(carrier.create_calls.is_empty());
    }

    #[test]
    fn labels_only_pass_never_creates_shipments() {
        let orders = vec![order("A1"), order("B2")];
        let mut tracker = Tracker::default();
        tracker.record_attempt(
            "A1",
            ShipmentAttempt::success("99", Some("D1".into())),
            LabelAttempt::exception("timeout"),
        ).unwrap();
        tracker.record_attempt("B2", ShipmentAttempt::failed("bad address"), LabelAttempt::skipped()).unwrap();
        let mut carrier = ScriptedCarrier::default().label("A1", Ok(b"%PDF".to_vec()));
        let mut sink = MemorySink::default();
        let mut store = MemoryStore::default();

        let report = run(&mut tracker, &orders, &mut carrier, &mut sink, &mut store, PassMode::LabelsOnly);

        assert!(carrier.create_calls.is_empty());
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].promotion, Promotion::Archived);
        assert!(report.outcomes[0].entry.last_label_retry_at.is_some());
        assert_eq!(tracker.state_of("B2"), OrderState::ShipmentFailed);
    }

    #[test]
    fn labels_only_defers_archive_without_order() {
        let mut tracker = Tracker::default();
        tracker.record_attempt("A1", ShipmentAttempt::success("99", None), LabelAttempt::exception("timeout")).unwrap();
        let mut carrier = ScriptedCarrier::default().label("A1", Ok(b"%PDF".to_vec()));
        let mut sink = MemorySink::default();
        let mut store = MemoryStore::default();

        let report = run(&mut tracker, &[], &mut carrier, &mut sink, &mut store, PassMode::LabelsOnly);

        assert_eq!(report.outcomes[0].promotion, Promotion::NotEligible);
        assert!(report.outcomes[0].entry.is_complete());
        assert_eq!(tracker.state_of("A1"), OrderState::LabelOk);

        // The next full pass with the feed picks it up
        let mut idle = ScriptedCarrier::default();
        let report = run(&mut tracker, &[order("A1")], &mut idle, &mut sink, &mut store, PassMode::Full);
        assert_eq!(report.healed, vec!["A1".to_string()]);
    }

    #[test]
    fn labels_only_reports_capped_entries_without_feed() {
        let mut tracker = Tracker::default().with_policy(crate::RetryPolicy { max_attempts: Some(2) });
        tracker.record_attempt("A1", ShipmentAttempt::success("99", None), LabelAttempt::exception("timeout")).unwrap();
        tracker.record_label_retry("A1", LabelAttempt::exception("timeout")).unwrap();
        let mut carrier = ScriptedCarrier::default();
        let mut sink = MemorySink::default();
        let mut store = MemoryStore::default();

        let report = run(&mut tracker, &[], &mut carrier, &mut sink, &mut store, PassMode::LabelsOnly);

        assert!(report.outcomes.is_empty());
        assert!(carrier.label_calls.is_empty());
        assert_eq!(report.exhausted, vec!["A1".to_string()]);
        assert_eq!(report.summary.exhausted, 1);
    }
}
