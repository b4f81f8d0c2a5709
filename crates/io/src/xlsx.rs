// Excel order feeds (xlsx, xls, ods) and the per-run shipment summary (xlsx)
//
// Import: first sheet only, first row is the header.
// Export: one summary row per processed order, for the people packing boxes.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader, Sheets};
use chrono::{DateTime, Local};
use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook};

use parcelflow_recon::{Order, OrderOutcome};

use crate::error::IoError;
use crate::orders::RawTable;

pub const SUMMARY_HEADERS: [&str; 9] = [
    "Order number",
    "Customer Name",
    "SKU",
    "Quantity",
    "Tracking Number",
    "Shipment API Status",
    "Label API Status",
    "Error Details",
    "Timestamp",
];

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

pub fn read_table(path: &Path) -> Result<RawTable, IoError> {
    let mut workbook: Sheets<_> = open_workbook_auto(path)
        .map_err(|e| IoError::parse(path, format!("failed to open spreadsheet: {}", e)))?;

    let range = match workbook.worksheet_range_at(0) {
        Some(r) => r.map_err(|e| IoError::parse(path, format!("failed to read first sheet: {}", e)))?,
        None => return Err(IoError::parse(path, "spreadsheet contains no sheets")),
    };

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(row) => row.iter().map(|c| cell_to_string(c).trim().to_string()).collect(),
        None => return Ok(RawTable::default()),
    };

    let rows = rows
        .map(|row| row.iter().map(|c| cell_to_string(c).trim().to_string()).collect::<Vec<_>>())
        .filter(|row| row.iter().any(|c| !c.is_empty()))
        .collect();

    Ok(RawTable { headers, rows })
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        // Integers without decimals (quantities, phone numbers, zip codes)
        Data::Float(n) if n.is_finite() && n.fract() == 0.0 => format!("{:.0}", n),
        Data::Float(n) => format!("{:.2}", n),
        Data::Int(n) => n.to_string(),
        Data::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Summary export
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow {
    pub order_number: String,
    pub customer_name: String,
    pub sku: String,
    pub quantity: u32,
    pub tracking_number: String,
    pub shipment_status: String,
    pub label_status: String,
    pub error_details: String,
    pub timestamp: String,
}

impl SummaryRow {
    /// `order` may be missing on a label-only pass without an order feed.
    pub fn from_outcome(outcome: &OrderOutcome, order: Option<&Order>) -> Self {
        let entry = &outcome.entry;
        let recorded: DateTime<Local> = entry.recorded_at.with_timezone(&Local);
        Self {
            order_number: outcome.order_id.clone(),
            customer_name: order.map(Order::customer_name).unwrap_or_default(),
            sku: order.map(|o| o.product_sku.clone()).unwrap_or_default(),
            quantity: order.map_or(0, |o| o.quantity),
            tracking_number: entry.shipment.tracking_number.clone().unwrap_or_else(|| "N/A".into()),
            shipment_status: entry.shipment.status.to_string(),
            label_status: entry.label.status.to_string(),
            error_details: entry.error().unwrap_or("None").to_string(),
            timestamp: recorded.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

pub fn write_summary(path: &Path, rows: &[SummaryRow]) -> Result<(), IoError> {
    let xlsx = |e: rust_xlsxwriter::XlsxError| IoError::Xlsx(e.to_string());

    let mut workbook = XlsxWorkbook::new();
    let header = Format::new().set_bold();
    let worksheet = workbook.add_worksheet().set_name("Summary").map_err(xlsx)?;

    for (col, title) in SUMMARY_HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *title, &header).map_err(xlsx)?;
    }

    for (i, row) in rows.iter().enumerate() {
        let r = (i + 1) as u32;
        worksheet.write_string(r, 0, &row.order_number).map_err(xlsx)?;
        worksheet.write_string(r, 1, &row.customer_name).map_err(xlsx)?;
        worksheet.write_string(r, 2, &row.sku).map_err(xlsx)?;
        worksheet.write_number(r, 3, row.quantity as f64).map_err(xlsx)?;
        worksheet.write_string(r, 4, &row.tracking_number).map_err(xlsx)?;
        worksheet.write_string(r, 5, &row.shipment_status).map_err(xlsx)?;
        worksheet.write_string(r, 6, &row.label_status).map_err(xlsx)?;
        worksheet.write_string(r, 7, &row.error_details).map_err(xlsx)?;
        worksheet.write_string(r, 8, &row.timestamp).map_err(xlsx)?;
    }
    worksheet.autofit();

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| IoError::write(dir, e))?;
    }
    workbook.save(path).map_err(xlsx)?;
    tracing::info!(path = %path.display(), rows = rows.len(), "wrote shipment summary");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_numbers_keep_their_digits() {
        assert_eq!(cell_to_string(&Data::Float(2.0)), "2");
        assert_eq!(cell_to_string(&Data::Float(1234567890123456.0)), "1234567890123456");
        assert_eq!(cell_to_string(&Data::Float(9007199254740992.0)), "9007199254740992");
        assert_eq!(cell_to_string(&Data::Float(49.99)), "49.99");
    }
    use chrono::Utc;
    use parcelflow_recon::{LabelAttempt, LogEntry, Promotion, ShipmentAttempt};
    use tempfile::tempdir;

    fn outcome(id: &str, shipment: ShipmentAttempt, label: LabelAttempt) -> OrderOutcome {
        OrderOutcome {
            order_id: id.into(),
            entry: LogEntry {
                order_id: id.into(),
                shipment,
                label,
                attempts: 1,
                recorded_at: Utc::now(),
                last_label_retry_at: None,
            },
            promotion: Promotion::NotEligible,
            resumed: false,
        }
    }

    #[test]
    fn summary_row_for_failed_shipment() {
        let o = outcome("A1", ShipmentAttempt::failed("Invalid postal code"), LabelAttempt::skipped());
        let row = SummaryRow::from_outcome(&o, None);
        assert_eq!(row.tracking_number, "N/A");
        assert_eq!(row.shipment_status, "FAILED");
        assert_eq!(row.label_status, "SKIPPED");
        assert_eq!(row.error_details, "Invalid postal code");
        assert_eq!(row.customer_name, "");
    }

    #[test]
    fn summary_written_and_readable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reports/summary.xlsx");
        let o = outcome(
            "A1",
            ShipmentAttempt::success("99", Some("D123".into())),
            LabelAttempt::success("labels/A1.pdf"),
        );
        let rows = vec![SummaryRow::from_outcome(&o, None)];

        write_summary(&path, &rows).unwrap();

        let table = read_table(&path).unwrap();
        assert_eq!(table.headers, SUMMARY_HEADERS.map(String::from).to_vec());
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0][0], "A1");
        assert_eq!(table.rows[0][4], "D123");
        assert_eq!(table.rows[0][6], "SUCCESS");
        assert_eq!(table.rows[0][7], "None");
    }

    #[test]
    fn missing_workbook_is_parse_error() {
        let dir = tempdir().unwrap();
        assert!(read_table(&dir.path().join("nope.xlsx")).is_err());
    }
}
