// SQLite mirror of processed orders, for reporting tools that want SQL

use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use parcelflow_recon::{Order, OrderOutcome, OrderState};

use crate::error::IoError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    id INTEGER PRIMARY KEY,
    order_number TEXT NOT NULL UNIQUE,
    customer_name TEXT,
    email TEXT,
    phone TEXT,
    address_line_1 TEXT,
    address_line_2 TEXT,
    city TEXT,
    province TEXT,
    postal_code TEXT,
    country TEXT,
    sku TEXT,
    quantity INTEGER,
    total_cents INTEGER,          -- minor units
    status TEXT NOT NULL,         -- new, shipment_failed, label_failed, label_ok, archived
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS shipments (
    id INTEGER PRIMARY KEY,
    order_id INTEGER NOT NULL REFERENCES orders (id),
    carrier_shipment_id TEXT,
    tracking_number TEXT,
    label_path TEXT,
    shipment_status TEXT NOT NULL,
    label_status TEXT NOT NULL,
    error_details TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS status_history (
    id INTEGER PRIMARY KEY,
    order_id INTEGER NOT NULL REFERENCES orders (id),
    status TEXT NOT NULL,
    note TEXT,
    changed_at TEXT NOT NULL
);
"#;

pub struct ShipmentDb {
    conn: Connection,
}

impl ShipmentDb {
    pub fn open(path: &Path) -> Result<Self, IoError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| IoError::write(dir, e))?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, IoError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, IoError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Mirror one processed order: upsert the order row, add a shipment row
    /// and a status-history row. `order` is `None` when only the log knows
    /// the order (label-only pass without a feed).
    pub fn record(
        &mut self,
        order: Option<&Order>,
        outcome: &OrderOutcome,
        state: OrderState,
    ) -> Result<(), IoError> {
        let now = Utc::now().to_rfc3339();
        let entry = &outcome.entry;
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO orders (order_number, customer_name, email, phone, address_line_1,
                 address_line_2, city, province, postal_code, country, sku, quantity,
                 total_cents, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)
             ON CONFLICT (order_number) DO UPDATE SET
                 customer_name = COALESCE(excluded.customer_name, orders.customer_name),
                 email = COALESCE(excluded.email, orders.email),
                 phone = COALESCE(excluded.phone, orders.phone),
                 address_line_1 = COALESCE(excluded.address_line_1, orders.address_line_1),
                 address_line_2 = COALESCE(excluded.address_line_2, orders.address_line_2),
                 city = COALESCE(excluded.city, orders.city),
                 province = COALESCE(excluded.province, orders.province),
                 postal_code = COALESCE(excluded.postal_code, orders.postal_code),
                 country = COALESCE(excluded.country, orders.country),
                 sku = COALESCE(excluded.sku, orders.sku),
                 quantity = COALESCE(excluded.quantity, orders.quantity),
                 total_cents = COALESCE(excluded.total_cents, orders.total_cents),
                 status = excluded.status,
                 updated_at = excluded.updated_at",
            params![
                outcome.order_id,
                order.map(Order::customer_name),
                order.map(|o| o.email.as_str()),
                order.map(|o| o.phone.as_str()),
                order.map(|o| o.address_line_1.as_str()),
                order.map(|o| o.address_line_2.as_str()),
                order.map(|o| o.city.as_str()),
                order.map(|o| o.province.as_str()),
                order.map(|o| o.postal_code.as_str()),
                order.map(|o| o.country.as_str()),
                order.map(|o| o.product_sku.as_str()),
                order.map(|o| o.quantity),
                order.map(|o| o.total_cents),
                state.as_str(),
                now,
            ],
        )?;

        let order_row: i64 = tx.query_row(
            "SELECT id FROM orders WHERE order_number = ?1",
            params![outcome.order_id],
            |row| row.get(0),
        )?;

        tx.execute(
            "INSERT INTO shipments (order_id, carrier_shipment_id, tracking_number, label_path,
                 shipment_status, label_status, error_details, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                order_row,
                entry.shipment.shipment_id,
                entry.shipment.tracking_number,
                entry.label.label_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
                entry.shipment.status.to_string(),
                entry.label.status.to_string(),
                entry.error(),
                now,
            ],
        )?;

        tx.execute(
            "INSERT INTO status_history (order_id, status, note, changed_at) VALUES (?1, ?2, ?3, ?4)",
            params![order_row, state.as_str(), entry.error(), now],
        )?;

        tx.commit()?;
        Ok(())
    }

    pub fn order_status(&self, order_number: &str) -> Result<Option<String>, IoError> {
        Ok(self
            .conn
            .query_row(
                "SELECT status FROM orders WHERE order_number = ?1",
                params![order_number],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Status changes for an order, oldest first.
    pub fn history(&self, order_number: &str) -> Result<Vec<String>, IoError> {
        let mut stmt = self.conn.prepare(
            "SELECT h.status FROM status_history h
             JOIN orders o ON o.id = h.order_id
             WHERE o.order_number = ?1
             ORDER BY h.id",
        )?;
        let rows = stmt.query_map(params![order_number], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn shipment_count(&self, order_number: &str) -> Result<i64, IoError> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM shipments s JOIN orders o ON o.id = s.order_id
             WHERE o.order_number = ?1",
            params![order_number],
            |row| row.get(0),
        )?)
    }
}
