//! `pflow ship` and `pflow retry-labels`: one pass of the batch pipeline,
//! plus the optional XLSX summary and SQLite mirror of what happened.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::Args;

use parcelflow_carrier::CanparClient;
use parcelflow_config::resolve_credentials;
use parcelflow_io::{append_confirmations, xlsx, LabelDirectory, ShipmentDb, SummaryRow};
use parcelflow_recon::{
    run_batch, BatchReport, LabelStatus, Order, OrderOutcome, PassMode, Promotion, ShipmentStatus,
    Tracker,
};

use crate::context::Context;
use crate::exit_codes::{
    EXIT_CARRIER_SETUP, EXIT_CARRIER_UNREACHABLE, EXIT_SHIP_FAILURES, EXIT_SHIP_REPORT,
};
use crate::{CliError, GlobalArgs};

#[derive(Args, Debug, Default)]
pub struct ReportArgs {
    /// Write an XLSX summary of this pass
    #[arg(long, value_name = "FILE")]
    pub summary: Option<PathBuf>,

    /// Mirror results into a SQLite database
    #[arg(long, value_name = "FILE")]
    pub db: Option<PathBuf>,

    /// Print the pass result as JSON to stdout
    #[arg(long)]
    pub json: bool,
}

pub fn cmd_ship(global: &GlobalArgs, orders: PathBuf, reports: ReportArgs) -> Result<(), CliError> {
    let ctx = Context::load(global)?;
    let orders = ctx.load_orders(&orders)?;
    run_pass(&ctx, global, &orders, PassMode::Full, &reports)
}

pub fn cmd_retry_labels(
    global: &GlobalArgs,
    orders: Option<PathBuf>,
    reports: ReportArgs,
) -> Result<(), CliError> {
    let ctx = Context::load(global)?;
    let orders = ctx.load_optional_orders(orders.as_deref())?;
    run_pass(&ctx, global, &orders, PassMode::LabelsOnly, &reports)
}

fn run_pass(
    ctx: &Context,
    global: &GlobalArgs,
    orders: &[Order],
    mode: PassMode,
    reports: &ReportArgs,
) -> Result<(), CliError> {
    ctx.settings.validate().map_err(CliError::config)?;
    let credentials =
        resolve_credentials(&ctx.settings.carrier, global.user.as_deref(), global.password.as_deref())
            .map_err(CliError::config)?;
    tracing::debug!(
        user_source = credentials.user_source.as_str(),
        password_source = credentials.password_source.as_str(),
        "resolved carrier credentials"
    );

    let mut tracker = ctx.tracker()?;
    let mut carrier = CanparClient::new(&ctx.settings, credentials)
        .map_err(|e| CliError::new(EXIT_CARRIER_SETUP, e.to_string()))?;
    let mut labels = LabelDirectory::new(ctx.settings.paths.labels_dir(), ctx.settings.paths.failed_labels_dir());
    let mut store = ctx.store.clone();

    let report = run_batch(&mut tracker, orders, &mut carrier, &mut labels, &mut store, mode)
        .map_err(CliError::recon)?;

    // State is already safe on disk; report problems come after the summary
    let report_result = record_confirmations(ctx, &tracker, &report)
        .and_then(|_| write_reports(&tracker, orders, &report, reports));

    print_summary(&report);
    if reports.json {
        let json = serde_json::to_string_pretty(&report_json(&report))
            .map_err(|e| CliError::io(format!("JSON serialization error: {e}")))?;
        println!("{json}");
    }

    report_result?;
    exit_for(&report)
}

// ── Reports ─────────────────────────────────────────────────────────

fn write_reports(
    tracker: &Tracker,
    orders: &[Order],
    report: &BatchReport,
    reports: &ReportArgs,
) -> Result<(), CliError> {
    let by_id: HashMap<&str, &Order> = orders.iter().map(|o| (o.order_id.as_str(), o)).collect();
    let lookup = |outcome: &OrderOutcome| find_order(&by_id, tracker, &outcome.order_id);

    if let Some(path) = &reports.summary {
        let rows: Vec<SummaryRow> =
            report.outcomes.iter().map(|o| SummaryRow::from_outcome(o, lookup(o))).collect();
        xlsx::write_summary(path, &rows).map_err(|e| report_err(path, e))?;
        eprintln!("wrote {}", path.display());
    }

    if let Some(path) = &reports.db {
        let mut db = ShipmentDb::open(path).map_err(|e| report_err(path, e))?;
        for outcome in &report.outcomes {
            db.record(lookup(outcome), outcome, tracker.state_of(&outcome.order_id))
                .map_err(|e| report_err(path, e))?;
        }
        eprintln!("updated {}", path.display());
    }

    Ok(())
}

/// One confirmation line for every order this pass archived, healed ones included.
fn record_confirmations(ctx: &Context, tracker: &Tracker, report: &BatchReport) -> Result<(), CliError> {
    let archived = report
        .outcomes
        .iter()
        .filter(|o| o.promotion == Promotion::Archived)
        .map(|o| o.order_id.as_str())
        .chain(report.healed.iter().map(String::as_str))
        .filter_map(|id| tracker.archive().get(id));
    let path = ctx.settings.paths.confirmations_file();
    append_confirmations(&path, archived, Utc::now()).map_err(|e| report_err(&path, e))?;
    Ok(())
}

/// The feed wins; orders only known from the archive still get their details.
fn find_order<'a>(
    by_id: &HashMap<&str, &'a Order>,
    tracker: &'a Tracker,
    order_id: &str,
) -> Option<&'a Order> {
    by_id
        .get(order_id)
        .copied()
        .or_else(|| tracker.archive().get(order_id).map(|a| &a.order))
}

fn report_err(path: &Path, err: parcelflow_io::IoError) -> CliError {
    CliError::new(EXIT_SHIP_REPORT, format!("{}: {}", path.display(), err))
        .with_hint("the shipment log is up to date; re-run to regenerate the report")
}

fn print_summary(report: &BatchReport) {
    let s = &report.summary;
    let label = match report.mode {
        PassMode::Full => "ship",
        PassMode::LabelsOnly => "retry-labels",
    };
    eprintln!(
        "{label}: {} processed, {} shipments created, {} labels saved, {} archived, {} shipment failures, {} label failures",
        s.processed, s.shipments_created, s.labels_saved, s.archived, s.shipment_failures, s.label_failures,
    );
    if s.healed > 0 {
        eprintln!("  archived {} order(s) left over from an interrupted run", s.healed);
    }
    if s.exhausted > 0 {
        eprintln!("  skipped {} order(s) that reached the retry limit", s.exhausted);
    }
    for outcome in report.outcomes.iter().filter(|o| !o.entry.is_complete()) {
        eprintln!(
            "  {}: shipment {}, label {}: {}",
            outcome.order_id,
            outcome.entry.shipment.status,
            outcome.entry.label.status,
            outcome.entry.error().unwrap_or("-"),
        );
    }
}

fn report_json(report: &BatchReport) -> serde_json::Value {
    let orders: Vec<serde_json::Value> = report
        .outcomes
        .iter()
        .map(|o| {
            serde_json::json!({
                "order_id": o.order_id,
                "shipment": o.entry.shipment,
                "label": o.entry.label,
                "attempts": o.entry.attempts,
                "resumed": o.resumed,
                "archived": o.promotion == Promotion::Archived,
            })
        })
        .collect();

    serde_json::json!({
        "mode": report.mode,
        "summary": report.summary,
        "healed": report.healed,
        "exhausted": report.exhausted,
        "orders": orders,
    })
}

// ── Exit status ─────────────────────────────────────────────────────

/// A pass where nothing worked and every failure is an exception (no
/// carrier refusal) points at the endpoint rather than at the orders.
fn carrier_unreachable(report: &BatchReport) -> bool {
    !report.outcomes.is_empty()
        && report.outcomes.iter().all(|o| {
            let shipment = &o.entry.shipment;
            let label = &o.entry.label;
            shipment.status == ShipmentStatus::Exception
                || (shipment.is_success() && label.status == LabelStatus::Exception)
        })
        && report.summary.labels_saved == 0
        && report.summary.shipments_created == 0
}

fn exit_for(report: &BatchReport) -> Result<(), CliError> {
    if carrier_unreachable(report) {
        return Err(CliError::new(
            EXIT_CARRIER_UNREACHABLE,
            format!("every carrier call failed ({} order(s))", report.outcomes.len()),
        )
        .with_hint("check carrier.endpoint, the network, and the carrier credentials"));
    }
    let failures = report.summary.failures();
    if failures > 0 {
        return Err(CliError::new(
            EXIT_SHIP_FAILURES,
            format!("{failures} order(s) failed; details are in the shipment log"),
        )
        .with_hint("re-run `pflow ship` (or `pflow retry-labels` for missing labels) to retry"));
    }
    Ok(())
}
