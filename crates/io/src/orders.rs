// Order feeds: marketplace exports (CSV, XLSX) and pending-order JSON files

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parcelflow_config::{OrderColumns, OrderSettings};
use parcelflow_recon::{Order, OrderSource};

use crate::error::IoError;

/// A header row plus string cells, as read from a spreadsheet-like file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderFormat {
    Csv,
    Xlsx,
    Json,
}

impl OrderFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" | "tsv" | "txt" => Some(Self::Csv),
            "xlsx" | "xlsm" | "xls" | "ods" => Some(Self::Xlsx),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// An order feed on disk.
#[derive(Debug, Clone)]
pub struct OrderFile {
    path: PathBuf,
    format: OrderFormat,
    columns: OrderColumns,
    default_country: String,
}

impl OrderFile {
    pub fn new(path: impl Into<PathBuf>, settings: &OrderSettings) -> Result<Self, IoError> {
        let path = path.into();
        let format =
            OrderFormat::from_path(&path).ok_or_else(|| IoError::UnsupportedFormat(path.clone()))?;
        Ok(Self {
            path,
            format,
            columns: settings.columns.clone(),
            default_country: settings.default_country.clone(),
        })
    }
}

impl OrderSource for OrderFile {
    type Error = IoError;

    fn load_orders(&self) -> Result<Vec<Order>, IoError> {
        let orders = match self.format {
            OrderFormat::Json => crate::json::read_orders(&self.path)?,
            OrderFormat::Csv => {
                let table = crate::csv::read_table(&self.path)?;
                orders_from_table(&self.path, &table, &self.columns, &self.default_country)?
            }
            OrderFormat::Xlsx => {
                let table = crate::xlsx::read_table(&self.path)?;
                orders_from_table(&self.path, &table, &self.columns, &self.default_country)?
            }
        };
        tracing::info!(path = %self.path.display(), count = orders.len(), "loaded orders");
        Ok(orders)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Map rows to orders by header name.
///
/// Rows without an order number are skipped. A quantity that does not parse
/// becomes 1 and a total that does not parse becomes 0, each with a warning.
pub fn orders_from_table(
    path: &Path,
    table: &RawTable,
    columns: &OrderColumns,
    default_country: &str,
) -> Result<Vec<Order>, IoError> {
    let index: HashMap<&str, usize> = table
        .headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.as_str(), i))
        .collect();

    let missing: Vec<String> = columns
        .required()
        .iter()
        .filter(|(_, header)| !index.contains_key(*header))
        .map(|(_, header)| header.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(IoError::MissingColumns { path: path.to_path_buf(), columns: missing });
    }

    let mut orders = Vec::with_capacity(table.rows.len());
    for (i, row) in table.rows.iter().enumerate() {
        // 1-based, header is line 1
        let line = i + 2;
        let cell = |header: &str| -> String {
            index
                .get(header)
                .and_then(|&col| row.get(col))
                .map(|v| v.trim().to_string())
                .unwrap_or_default()
        };

        let order_id = cell(&columns.order_id);
        if order_id.is_empty() {
            tracing::warn!(line, "row has no order number; skipped");
            continue;
        }

        let raw_qty = cell(&columns.quantity);
        let quantity = parse_quantity(&raw_qty).unwrap_or_else(|| {
            tracing::warn!(line, order_id = %order_id, value = %raw_qty, "bad quantity; using 1");
            1
        });

        let raw_total = cell(&columns.total);
        let total_cents = parse_money_string(&raw_total).unwrap_or_else(|e| {
            tracing::warn!(line, order_id = %order_id, value = %raw_total, error = %e, "bad order total; using 0");
            0
        });

        let country = match cell(&columns.country) {
            c if c.is_empty() => default_country.to_string(),
            c => c,
        };

        orders.push(Order {
            order_id,
            first_name: cell(&columns.first_name),
            last_name: cell(&columns.last_name),
            email: cell(&columns.email),
            phone: cell(&columns.phone),
            address_line_1: cell(&columns.address_line_1),
            address_line_2: cell(&columns.address_line_2),
            city: cell(&columns.city),
            province: cell(&columns.province),
            postal_code: cell(&columns.postal_code),
            country,
            total_cents,
            product_sku: cell(&columns.sku),
            quantity,
        });
    }

    Ok(orders)
}

/// Whole numbers, also when a spreadsheet wrote them as `2.0`.
fn parse_quantity(s: &str) -> Option<u32> {
    let s = s.trim();
    if let Ok(n) = s.parse::<u32>() {
        return Some(n);
    }
    let f: f64 = s.parse().ok()?;
    (f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64).then(|| f as u32)
}

/// Parse a money string like "49.99", "$1,234.5" or "-3" into minor units.
/// No floats: dollars and cents are parsed separately.
pub fn parse_money_string(s: &str) -> Result<i64, String> {
    let cleaned: String = s.trim().chars().filter(|c| !matches!(c, '$' | ',' | ' ')).collect();
    let (negative, s) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.as_str()),
    };
    if s.is_empty() {
        return Err("empty amount".to_string());
    }

    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    let digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
    if !digits(whole) || !digits(frac) || (whole.is_empty() && frac.is_empty()) {
        return Err(format!("not an amount: {}", s));
    }
    if frac.len() > 2 {
        return Err(format!("too many decimal places: {}", s));
    }

    let dollars: i64 = match whole {
        "" => 0,
        w => w.parse().map_err(|e| format!("bad dollars: {}", e))?,
    };
    let cents: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().map_err(|e| format!("bad cents: {}", e))? * 10,
        _ => frac.parse().map_err(|e| format!("bad cents: {}", e))?,
    };
    let minor = dollars
        .checked_mul(100)
        .and_then(|d| d.checked_add(cents))
        .ok_or_else(|| format!("amount out of range: {}", s))?;
    Ok(if negative { -minor } else { minor })
}
