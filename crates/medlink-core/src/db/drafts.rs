//! Side-effect tables written by tools: stock drafts, the reorder list and
//! patient notes.
//!
//! Every write carries an idempotency key and uses `INSERT OR IGNORE`, so
//! replaying the same invocation never writes twice. Each write returns
//! whether anything new was stored.

use rusqlite::params;

use super::{now_rfc3339, Database, DbError, DbResult};
use crate::models::{PatientNote, ReorderEntry, StockDraft};

/// A line to stage as incoming stock.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftLine {
    pub item_name: String,
    pub quantity: u32,
    pub batch: Option<String>,
    pub expiry: Option<String>,
    pub price: Option<f64>,
}

impl DraftLine {
    pub fn new(item_name: impl Into<String>, quantity: u32) -> Self {
        Self {
            item_name: item_name.into(),
            quantity,
            batch: None,
            expiry: None,
            price: None,
        }
    }
}

impl Database {
    /// Stage stock lines atomically. Returns `false` if this key was already
    /// written.
    pub fn insert_stock_drafts(
        &mut self,
        shop_id: &str,
        idempotency_key: &str,
        lines: &[DraftLine],
    ) -> DbResult<bool> {
        if lines.is_empty() {
            return Err(DbError::Constraint("no stock lines to draft".into()));
        }
        let created_at = now_rfc3339();
        let tx = self.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR IGNORE INTO stock_drafts (
                    id, shop_id, idempotency_key, line_no, item_name,
                    quantity, batch, expiry, price, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )?;
            for (line_no, line) in lines.iter().enumerate() {
                inserted += stmt.execute(params![
                    uuid::Uuid::new_v4().to_string(),
                    shop_id,
                    idempotency_key,
                    line_no as i64,
                    line.item_name,
                    line.quantity,
                    line.batch,
                    line.expiry,
                    line.price,
                    created_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted > 0)
    }

    /// Pending drafts, oldest first.
    pub fn list_pending_stock_drafts(&self, shop_id: &str) -> DbResult<Vec<StockDraft>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, item_name, quantity, batch, expiry, price, created_at
            FROM stock_drafts
            WHERE shop_id = ?1 AND status = 'pending'
            ORDER BY created_at, idempotency_key, line_no
            "#,
        )?;
        let rows = stmt.query_map([shop_id], |row| {
            Ok(StockDraft {
                id: row.get(0)?,
                item_name: row.get(1)?,
                quantity: row.get(2)?,
                batch: row.get(3)?,
                expiry: row.get(4)?,
                price: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?;

        let mut drafts = Vec::new();
        for row in rows {
            drafts.push(row?);
        }
        Ok(drafts)
    }

    pub fn add_to_reorder_list(
        &self,
        shop_id: &str,
        idempotency_key: &str,
        item_name: &str,
        quantity: u32,
    ) -> DbResult<bool> {
        let inserted = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO reorder_list (id, shop_id, idempotency_key, item_name, quantity, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                uuid::Uuid::new_v4().to_string(),
                shop_id,
                idempotency_key,
                item_name,
                quantity,
                now_rfc3339(),
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn list_reorder_list(&self, shop_id: &str) -> DbResult<Vec<ReorderEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT item_name, quantity, created_at FROM reorder_list WHERE shop_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map([shop_id], |row| {
            Ok(ReorderEntry {
                item_name: row.get(0)?,
                quantity: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    pub fn save_patient_note(
        &self,
        shop_id: &str,
        idempotency_key: &str,
        patient_name: &str,
        note: &str,
    ) -> DbResult<bool> {
        let inserted = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO patient_notes (id, shop_id, idempotency_key, patient_name, note, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                uuid::Uuid::new_v4().to_string(),
                shop_id,
                idempotency_key,
                patient_name,
                note,
                now_rfc3339(),
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Notes for a patient (case-insensitive name match), newest first.
    pub fn list_patient_notes(&self, shop_id: &str, patient_name: &str) -> DbResult<Vec<PatientNote>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT patient_name, note, created_at
            FROM patient_notes
            WHERE shop_id = ?1 AND patient_name = ?2 COLLATE NOCASE
            ORDER BY created_at DESC
            "#,
        )?;
        let rows = stmt.query_map(params![shop_id, patient_name], |row| {
            Ok(PatientNote {
                patient_name: row.get(0)?,
                note: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;

        let mut notes = Vec::new();
        for row in rows {
            notes.push(row?);
        }
        Ok(notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_drafts_written_once() {
        let mut db = Database::open_in_memory().unwrap();
        let lines = vec![DraftLine::new("Dolo 650", 30), DraftLine::new("Crocin", 10)];

        assert!(db.insert_stock_drafts("shop-1", "key-1", &lines).unwrap());
        assert!(!db.insert_stock_drafts("shop-1", "key-1", &lines).unwrap());

        let drafts = db.list_pending_stock_drafts("shop-1").unwrap();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].item_name, "Dolo 650");
        assert_eq!(drafts[0].quantity, 30);
    }

    #[test]
    fn test_empty_draft_rejected() {
        let mut db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.insert_stock_drafts("shop-1", "key", &[]),
            Err(DbError::Constraint(_))
        ));
    }

    #[test]
    fn test_reorder_list_idempotent() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.add_to_reorder_list("shop-1", "k1", "Azithral 500", 2).unwrap());
        assert!(!db.add_to_reorder_list("shop-1", "k1", "Azithral 500", 2).unwrap());
        assert!(db.add_to_reorder_list("shop-1", "k2", "Pan 40", 1).unwrap());

        let list = db.list_reorder_list("shop-1").unwrap();
        assert_eq!(list.len(), 2);
        assert!(db.list_reorder_list("shop-2").unwrap().is_empty());
    }

    #[test]
    fn test_patient_notes() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.save_patient_note("shop-1", "n1", "Ramesh", "Allergic to penicillin").unwrap());
        assert!(!db.save_patient_note("shop-1", "n1", "Ramesh", "Allergic to penicillin").unwrap());

        let notes = db.list_patient_notes("shop-1", "ramesh").unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].note, "Allergic to penicillin");
    }
}
