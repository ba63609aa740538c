//! Inventory, sales and forecast values.

use serde::{Deserialize, Serialize};

/// An inventory row for one shop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockItem {
    pub id: String,
    pub name: String,
    pub generic_name: Option<String>,
    /// Salt composition, e.g. "paracetamol 650mg".
    pub composition: Option<String>,
    pub quantity: i64,
    pub cost_price: f64,
    pub sale_price: f64,
    pub batch: Option<String>,
    pub expiry: Option<String>,
}

impl StockItem {
    pub fn new(name: impl Into<String>, quantity: i64, cost_price: f64, sale_price: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            generic_name: None,
            composition: None,
            quantity,
            cost_price,
            sale_price,
            batch: None,
            expiry: None,
        }
    }

    pub fn with_generic(mut self, generic: impl Into<String>) -> Self {
        self.generic_name = Some(generic.into());
        self
    }

    pub fn with_composition(mut self, composition: impl Into<String>) -> Self {
        self.composition = Some(composition.into());
        self
    }

    /// Profit per unit.
    pub fn profit(&self) -> f64 {
        self.sale_price - self.cost_price
    }

    /// Margin as a percentage of the sale price.
    pub fn margin_pct(&self) -> f64 {
        if self.sale_price <= 0.0 {
            return 0.0;
        }
        self.profit() / self.sale_price * 100.0
    }

    pub fn in_stock(&self) -> bool {
        self.quantity > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    #[serde(alias = "name", alias = "item_name")]
    pub item: String,
    pub quantity: u32,
    #[serde(default)]
    pub amount: f64,
    /// RFC 3339 timestamp.
    #[serde(alias = "date", alias = "created_at")]
    pub sold_at: String,
}

impl SaleRecord {
    pub fn new(item: impl Into<String>, quantity: u32, amount: f64, sold_at: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            quantity,
            amount,
            sold_at: sold_at.into(),
        }
    }
}

/// Aggregate of recent sales.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SalesSummary {
    pub days: u32,
    pub bills: u32,
    pub units: u64,
    pub revenue: f64,
    /// (item, units), best sellers first.
    pub top_items: Vec<(String, u64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastEntry {
    #[serde(alias = "name", alias = "drug")]
    pub item: String,
    #[serde(alias = "predicted", alias = "demand")]
    pub predicted_demand: u32,
    #[serde(default)]
    pub current_stock: Option<i64>,
    #[serde(default, alias = "reorder", alias = "reorder_quantity")]
    pub suggested_reorder: u32,
    #[serde(default)]
    pub rationale: Option<String>,
}

/// Incoming stock awaiting review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockDraft {
    pub id: String,
    pub item_name: String,
    pub quantity: u32,
    pub batch: Option<String>,
    pub expiry: Option<String>,
    pub price: Option<f64>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderEntry {
    pub item_name: String,
    pub quantity: u32,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientNote {
    pub patient_name: String,
    pub note: String,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profit_and_margin() {
        let item = StockItem::new("Dolo 650", 10, 20.0, 30.0);
        assert_eq!(item.profit(), 10.0);
        assert!((item.margin_pct() - 33.333).abs() < 0.01);
    }

    #[test]
    fn test_zero_price_margin() {
        let item = StockItem::new("Sample", 1, 0.0, 0.0);
        assert_eq!(item.margin_pct(), 0.0);
    }

    #[test]
    fn test_sale_record_aliases() {
        let sale: SaleRecord =
            serde_json::from_str(r#"{"name":"Crocin","quantity":3,"date":"2026-10-01T10:00:00Z"}"#)
                .unwrap();
        assert_eq!(sale.item, "Crocin");
        assert_eq!(sale.amount, 0.0);
    }
}
