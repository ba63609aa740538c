//! Inventory database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbResult};
use crate::models::StockItem;

const STOCK_COLUMNS: &str = "id, name, generic_name, composition, quantity, cost_price, sale_price, batch, expiry";

impl Database {
    /// Insert or update an inventory row.
    pub fn upsert_stock_item(&self, shop_id: &str, item: &StockItem) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO inventory (
                id, shop_id, name, generic_name, composition, quantity,
                cost_price, sale_price, batch, expiry, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, datetime('now'))
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                generic_name = excluded.generic_name,
                composition = excluded.composition,
                quantity = excluded.quantity,
                cost_price = excluded.cost_price,
                sale_price = excluded.sale_price,
                batch = excluded.batch,
                expiry = excluded.expiry,
                updated_at = datetime('now')
            WHERE inventory.shop_id = excluded.shop_id
            "#,
            params![
                item.id,
                shop_id,
                item.name,
                item.generic_name,
                item.composition,
                item.quantity,
                item.cost_price,
                item.sale_price,
                item.batch,
                item.expiry,
            ],
        )?;
        Ok(())
    }

    pub fn get_stock_item(&self, shop_id: &str, id: &str) -> DbResult<Option<StockItem>> {
        let sql = format!("SELECT {STOCK_COLUMNS} FROM inventory WHERE shop_id = ?1 AND id = ?2");
        Ok(self
            .conn
            .query_row(&sql, params![shop_id, id], stock_from_row)
            .optional()?)
    }

    /// Case-insensitive substring search over name, generic name and
    /// composition. Exact name matches sort first.
    pub fn find_stock(&self, shop_id: &str, term: &str, limit: usize) -> DbResult<Vec<StockItem>> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return Ok(Vec::new());
        }
        let pattern = format!("%{}%", escape_like(&term));
        let sql = format!(
            r#"
            SELECT {STOCK_COLUMNS}
            FROM inventory
            WHERE shop_id = ?1
              AND (lower(name) LIKE ?2 ESCAPE '\'
                   OR lower(coalesce(generic_name, '')) LIKE ?2 ESCAPE '\'
                   OR lower(coalesce(composition, '')) LIKE ?2 ESCAPE '\')
            ORDER BY (lower(name) = ?3) DESC, quantity DESC, name
            LIMIT ?4
            "#
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![shop_id, pattern, term, limit as i64], stock_from_row)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    pub fn list_inventory(&self, shop_id: &str) -> DbResult<Vec<StockItem>> {
        let sql = format!("SELECT {STOCK_COLUMNS} FROM inventory WHERE shop_id = ?1 ORDER BY name");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([shop_id], stock_from_row)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    /// Items sharing a generic name or composition (case-insensitive).
    pub fn related_stock(
        &self,
        shop_id: &str,
        generic: Option<&str>,
        composition: Option<&str>,
    ) -> DbResult<Vec<StockItem>> {
        let generic = generic.map(str::trim).filter(|g| !g.is_empty());
        let composition = composition.map(str::trim).filter(|c| !c.is_empty());
        if generic.is_none() && composition.is_none() {
            return Ok(Vec::new());
        }
        let sql = format!(
            r#"
            SELECT {STOCK_COLUMNS}
            FROM inventory
            WHERE shop_id = ?1
              AND ((?2 IS NOT NULL AND lower(generic_name) = lower(?2))
                   OR (?3 IS NOT NULL AND lower(composition) = lower(?3)))
            ORDER BY name
            "#
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![shop_id, generic, composition], stock_from_row)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }
}

fn stock_from_row(row: &Row<'_>) -> rusqlite::Result<StockItem> {
    Ok(StockItem {
        id: row.get(0)?,
        name: row.get(1)?,
        generic_name: row.get(2)?,
        composition: row.get(3)?,
        quantity: row.get(4)?,
        cost_price: row.get(5)?,
        sale_price: row.get(6)?,
        batch: row.get(7)?,
        expiry: row.get(8)?,
    })
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
