//! `pflow export`: tracking import file for the marketplace.
//!
//! Only archived orders that were never exported before are written; the
//! export history lives next to the shipment log.

use std::path::PathBuf;

use chrono::Local;

use parcelflow_io::{export_handoff, IoError};

use crate::context::Context;
use crate::exit_codes::EXIT_EXPORT_WRITE;
use crate::{CliError, GlobalArgs};

pub fn cmd_export(global: &GlobalArgs, out: PathBuf, json: bool) -> Result<(), CliError> {
    let ctx = Context::load(global)?;
    let archive = ctx.store.load_archive().map_err(CliError::state)?;
    let history = ctx.settings.paths.export_history_file();

    let result = export_handoff(&archive, &ctx.settings.handoff, &out, &history, Local::now())
        .map_err(|e| match e {
            IoError::Read { .. } => CliError::state(e),
            other => CliError::new(EXIT_EXPORT_WRITE, other.to_string()),
        })?;

    if json {
        let value = serde_json::json!({
            "written": result.written,
            "exported": result.exported,
            "already_exported": result.already_exported,
            "missing_tracking": result.missing_tracking,
        });
        let text = serde_json::to_string_pretty(&value)
            .map_err(|e| CliError::io(format!("JSON serialization error: {e}")))?;
        println!("{text}");
    }

    match &result.written {
        Some(path) => eprintln!("exported {} order(s) to {}", result.exported.len(), path.display()),
        None => eprintln!("no new shipments to export ({} already exported)", result.already_exported),
    }
    if !result.missing_tracking.is_empty() {
        eprintln!(
            "warning: {} archived order(s) have no tracking number: {}",
            result.missing_tracking.len(),
            result.missing_tracking.join(", ")
        );
    }
    Ok(())
}
