//! `pflow status`: counts per order state, read-only.

use std::path::PathBuf;

use parcelflow_recon::{OrderState, StatusSummary};

use crate::context::Context;
use crate::{CliError, GlobalArgs};

const DISPLAY_ORDER: [OrderState; 5] = [
    OrderState::New,
    OrderState::ShipmentFailed,
    OrderState::LabelFailed,
    OrderState::LabelOk,
    OrderState::Archived,
];

pub fn cmd_status(global: &GlobalArgs, orders: Option<PathBuf>, json: bool) -> Result<(), CliError> {
    let ctx = Context::load(global)?;
    let orders = ctx.load_optional_orders(orders.as_deref())?;
    let tracker = ctx.tracker()?;
    let summary = StatusSummary::compute(&tracker, &orders);

    if json {
        let out = serde_json::json!({
            "log": ctx.store.log_path(),
            "archive": ctx.store.archive_path(),
            "status": summary,
        });
        let text = serde_json::to_string_pretty(&out)
            .map_err(|e| CliError::io(format!("JSON serialization error: {e}")))?;
        println!("{text}");
        return Ok(());
    }

    println!("{}", render(&summary));
    Ok(())
}

fn render(summary: &StatusSummary) -> String {
    let mut out = format!("{} order(s) known\n", summary.total);
    for state in DISPLAY_ORDER {
        out.push_str(&format!("  {:<16} {}\n", state.as_str(), summary.count(state)));
    }
    if summary.retryable.is_empty() {
        out.push_str("nothing to retry");
    } else {
        out.push_str(&format!("to retry: {}", summary.retryable.join(", ")));
    }
    out
}
