//! Sales history operations.

use std::collections::HashMap;

use rusqlite::params;

use super::{Database, DbResult};
use crate::models::{SaleRecord, SalesSummary};

impl Database {
    pub fn insert_sale(&self, shop_id: &str, sale: &SaleRecord) -> DbResult<()> {
        self.conn.execute(
            "INSERT INTO sales (id, shop_id, item_name, quantity, amount, sold_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                uuid::Uuid::new_v4().to_string(),
                shop_id,
                sale.item,
                sale.quantity,
                sale.amount,
                sale.sold_at,
            ],
        )?;
        Ok(())
    }

    /// Sales at or after `since` (RFC 3339), oldest first.
    pub fn list_sales_since(&self, shop_id: &str, since: &str) -> DbResult<Vec<SaleRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT item_name, quantity, amount, sold_at
            FROM sales
            WHERE shop_id = ?1 AND sold_at >= ?2
            ORDER BY sold_at
            "#,
        )?;
        let rows = stmt.query_map(params![shop_id, since], |row| {
            Ok(SaleRecord {
                item: row.get(0)?,
                quantity: row.get(1)?,
                amount: row.get(2)?,
                sold_at: row.get(3)?,
            })
        })?;

        let mut sales = Vec::new();
        for row in rows {
            sales.push(row?);
        }
        Ok(sales)
    }

    /// Totals and best sellers over the last `days` days.
    pub fn sales_summary(&self, shop_id: &str, days: u32) -> DbResult<SalesSummary> {
        let since = (chrono::Utc::now() - chrono::Duration::days(i64::from(days))).to_rfc3339();
        let sales = self.list_sales_since(shop_id, &since)?;
        Ok(summarize(days, &sales))
    }
}

const TOP_ITEMS: usize = 5;

pub(crate) fn summarize(days: u32, sales: &[SaleRecord]) -> SalesSummary {
    let mut by_item: HashMap<&str, u64> = HashMap::new();
    let mut summary = SalesSummary {
        days,
        ..SalesSummary::default()
    };

    for sale in sales {
        summary.bills += 1;
        summary.units += u64::from(sale.quantity);
        summary.revenue += sale.amount;
        *by_item.entry(sale.item.as_str()).or_default() += u64::from(sale.quantity);
    }

    let mut top: Vec<(String, u64)> = by_item
        .into_iter()
        .map(|(item, units)| (item.to_string(), units))
        .collect();
    top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top.truncate(TOP_ITEMS);
    summary.top_items = top;
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sales_summary_recent_only() {
        let db = Database::open_in_memory().unwrap();
        let now = chrono::Utc::now();
        let recent = (now - chrono::Duration::days(1)).to_rfc3339();
        let old = (now - chrono::Duration::days(40)).to_rfc3339();

        db.insert_sale("shop-1", &SaleRecord::new("Dolo 650", 2, 60.0, recent.clone())).unwrap();
        db.insert_sale("shop-1", &SaleRecord::new("Crocin", 5, 100.0, recent.clone())).unwrap();
        db.insert_sale("shop-1", &SaleRecord::new("Dolo 650", 1, 30.0, recent)).unwrap();
        db.insert_sale("shop-1", &SaleRecord::new("Pan 40", 9, 900.0, old)).unwrap();

        let summary = db.sales_summary("shop-1", 7).unwrap();
        assert_eq!(summary.bills, 3);
        assert_eq!(summary.units, 8);
        assert_eq!(summary.revenue, 190.0);
        assert_eq!(summary.top_items[0], ("Crocin".to_string(), 5));
        assert_eq!(summary.top_items[1], ("Dolo 650".to_string(), 3));
    }

    #[test]
    fn test_sales_scoped_by_shop() {
        let db = Database::open_in_memory().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        db.insert_sale("shop-2", &SaleRecord::new("Dolo 650", 2, 60.0, now)).unwrap();
        assert_eq!(db.sales_summary("shop-1", 7).unwrap().bills, 0);
    }
}
