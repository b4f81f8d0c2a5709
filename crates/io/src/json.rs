// JSON order files (array of orders, as written by the marketplace poller)

use std::path::Path;

use parcelflow_recon::Order;

use crate::error::IoError;

pub fn read_orders(path: &Path) -> Result<Vec<Order>, IoError> {
    let content = crate::csv::read_file_as_utf8(path)?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let orders: Vec<Order> =
        serde_json::from_str(&content).map_err(|e| IoError::parse(path, e.to_string()))?;

    Ok(orders
        .into_iter()
        .filter(|o| {
            let keep = !o.order_id.trim().is_empty();
            if !keep {
                tracing::warn!(path = %path.display(), "order without order_id; skipped");
            }
            keep
        })
        .collect())
}
