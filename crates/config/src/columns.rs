use serde::{Deserialize, Serialize};

/// Header names in the marketplace order export. Defaults match the
/// marketplace's own column titles; override any of them in
/// `[orders.columns]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderColumns {
    pub order_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address_line_1: String,
    pub address_line_2: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    /// Optional; `orders.default_country` applies when absent.
    pub country: String,
    pub total: String,
    pub sku: String,
    pub quantity: String,
}

impl Default for OrderColumns {
    fn default() -> Self {
        Self {
            order_id: "Order number".into(),
            first_name: "Shipping address first name".into(),
            last_name: "Shipping address last name".into(),
            email: "Shipping address email".into(),
            phone: "Shipping address phone".into(),
            address_line_1: "Shipping address street 1".into(),
            address_line_2: "Shipping address street 2".into(),
            city: "Shipping address city".into(),
            province: "Shipping address state".into(),
            postal_code: "Shipping address zip".into(),
            country: "Shipping address country".into(),
            total: "Total order amount incl. VAT (including shipping charges)".into(),
            sku: "Offer SKU".into(),
            quantity: "Quantity".into(),
        }
    }
}

impl OrderColumns {
    /// Columns a feed must carry. The rest may be missing.
    pub fn required(&self) -> [(&'static str, &str); 8] {
        [
            ("order_id", &self.order_id),
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("address_line_1", &self.address_line_1),
            ("city", &self.city),
            ("province", &self.province),
            ("postal_code", &self.postal_code),
            ("sku", &self.sku),
        ]
    }

    pub(crate) fn problems(&self) -> Vec<String> {
        self.required()
            .iter()
            .filter(|(_, header)| header.trim().is_empty())
            .map(|(field, _)| format!("orders.columns.{field} must not be empty"))
            .collect()
    }
}
