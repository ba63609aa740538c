//! SQLite schema definition.

/// Complete database schema. Every table is scoped by `shop_id`.
pub const SCHEMA: &str = r#"
-- ============================================================================
-- Inventory
-- ============================================================================

CREATE TABLE IF NOT EXISTS inventory (
    id TEXT PRIMARY KEY,
    shop_id TEXT NOT NULL,
    name TEXT NOT NULL,
    generic_name TEXT,
    composition TEXT,
    quantity INTEGER NOT NULL DEFAULT 0,
    cost_price REAL NOT NULL DEFAULT 0,
    sale_price REAL NOT NULL DEFAULT 0,
    batch TEXT,
    expiry TEXT,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_inventory_shop_name ON inventory(shop_id, name COLLATE NOCASE);
CREATE INDEX IF NOT EXISTS idx_inventory_shop_generic ON inventory(shop_id, generic_name COLLATE NOCASE);

-- ============================================================================
-- Sales
-- ============================================================================

CREATE TABLE IF NOT EXISTS sales (
    id TEXT PRIMARY KEY,
    shop_id TEXT NOT NULL,
    item_name TEXT NOT NULL,
    quantity INTEGER NOT NULL CHECK (quantity >= 0),
    amount REAL NOT NULL DEFAULT 0,
    sold_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sales_shop_time ON sales(shop_id, sold_at);

-- ============================================================================
-- Tool side effects (idempotent: one row set per idempotency key)
-- ============================================================================

CREATE TABLE IF NOT EXISTS stock_drafts (
    id TEXT PRIMARY KEY,
    shop_id TEXT NOT NULL,
    idempotency_key TEXT NOT NULL,
    line_no INTEGER NOT NULL,
    item_name TEXT NOT NULL,
    quantity INTEGER NOT NULL,
    batch TEXT,
    expiry TEXT,
    price REAL,
    status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'accepted', 'rejected')),
    created_at TEXT NOT NULL,
    UNIQUE (idempotency_key, line_no)
);

CREATE INDEX IF NOT EXISTS idx_stock_drafts_shop ON stock_drafts(shop_id, status);

CREATE TABLE IF NOT EXISTS reorder_list (
    id TEXT PRIMARY KEY,
    shop_id TEXT NOT NULL,
    idempotency_key TEXT NOT NULL UNIQUE,
    item_name TEXT NOT NULL,
    quantity INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_reorder_shop ON reorder_list(shop_id);

CREATE TABLE IF NOT EXISTS patient_notes (
    id TEXT PRIMARY KEY,
    shop_id TEXT NOT NULL,
    idempotency_key TEXT NOT NULL UNIQUE,
    patient_name TEXT NOT NULL,
    note TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_patient_notes_shop ON patient_notes(shop_id, patient_name COLLATE NOCASE);
"#;
