//! MedLink Core Library
//!
//! Resilient AI-capability orchestration for a retail pharmacy.
//!
//! # Architecture
//!
//! ```text
//!   chat · analyze document · voice bill · interactions · market · compliance · forecast
//!                                         │
//!                                  [Rate Limiter]  ── RateLimited ──► caller
//!                                         │
//!                           [Deterministic safety rules]
//!                  duplicate therapy · banned / Schedule H1 tables
//!                                         │
//!              ┌──────────────────────────┼──────────────────────────┐
//!              ▼                          ▼                          ▼
//!         Workflow tier           Tool router / completion     Vision / speech
//!              │                          │                          │
//!              └────────── first usable answer wins ─────────────────┘
//!                                         │
//!                        Offline tier (parser, local stock, averages)
//!                                         │
//!                          CapabilityResponse (never empty)
//! ```
//!
//! # Core Principle
//!
//! **Never assert safety on missing information.** When nothing can be
//! confirmed, interaction and compliance checks say so explicitly.
//!
//! # Modules
//!
//! - [`orchestrator`]: tier plans for the seven capabilities
//! - [`drugs`]: brand→generic resolution, interaction and compliance rules, substitutes
//! - [`tools`]: tool router and executor over the local store
//! - [`offline`]: heuristic order parser
//! - [`ratelimit`]: per-endpoint throttle
//! - [`db`]: SQLite store (inventory, sales, drafts, reorder list, notes)
//! - [`config`], [`logging`]: configuration and tracing setup

pub mod config;
pub mod db;
pub mod drugs;
pub mod error;
pub mod logging;
pub mod models;
pub mod offline;
pub mod orchestrator;
pub mod ratelimit;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::OrchestratorConfig;
pub use db::Database;
pub use drugs::{DrugEngine, MarginPolicy};
pub use error::{CapabilityError, RateLimited};
pub use medlink_llm::{DocumentType, MediaPayload};
pub use models::{
    CallerContext, CapabilityKind, CapabilityRequest, CapabilityResponse, HistoryTurn, Provenance,
    SaleRecord, StockItem,
};
pub use offline::OfflineParser;
pub use orchestrator::{Collaborators, Orchestrator};
pub use ratelimit::RateLimiter;

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

use medlink_llm::Role;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum MedLinkError {
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

impl From<RateLimited> for MedLinkError {
    fn from(e: RateLimited) -> Self {
        MedLinkError::RateLimited(e.to_string())
    }
}

impl From<db::DbError> for MedLinkError {
    fn from(e: db::DbError) -> Self {
        MedLinkError::DatabaseError(e.to_string())
    }
}

impl From<config::ConfigError> for MedLinkError {
    fn from(e: config::ConfigError) -> Self {
        MedLinkError::ConfigError(e.to_string())
    }
}

impl From<CapabilityError> for MedLinkError {
    fn from(e: CapabilityError) -> Self {
        MedLinkError::RuntimeError(e.to_string())
    }
}

impl From<serde_json::Error> for MedLinkError {
    fn from(e: serde_json::Error) -> Self {
        MedLinkError::SerializationError(e.to_string())
    }
}

impl From<std::io::Error> for MedLinkError {
    fn from(e: std::io::Error) -> Self {
        MedLinkError::RuntimeError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for MedLinkError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        MedLinkError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a store at `db_path`. Configuration comes from
/// `config_path` (TOML) when given, then `MEDLINK_*` environment overrides.
#[uniffi::export]
pub fn open_core(db_path: String, config_path: Option<String>) -> Result<Arc<MedLinkCore>, MedLinkError> {
    let mut config = match config_path {
        Some(path) => OrchestratorConfig::load(path)?,
        None => OrchestratorConfig::default(),
    };
    config.apply_env()?;
    let db = Database::open(&db_path)?;
    MedLinkCore::from_config(config, db).map(Arc::new)
}

/// In-memory store with default configuration (for testing).
#[uniffi::export]
pub fn open_core_in_memory() -> Result<Arc<MedLinkCore>, MedLinkError> {
    let mut config = OrchestratorConfig::default();
    config.apply_env()?;
    let db = Database::open_in_memory()?;
    MedLinkCore::from_config(config, db).map(Arc::new)
}

// =========================================================================
// Main API Object
// =========================================================================

/// Blocking facade over the async orchestrator, for mobile hosts.
#[derive(uniffi::Object)]
pub struct MedLinkCore {
    runtime: tokio::runtime::Runtime,
    orchestrator: Orchestrator,
    db: Arc<Mutex<Database>>,
    history_limit: usize,
}

impl MedLinkCore {
    fn from_config(config: OrchestratorConfig, db: Database) -> Result<Self, MedLinkError> {
        logging::init();
        let services = Collaborators::from_config(&config)?;
        Self::from_parts(&config, services, db)
    }

    /// Build with explicit collaborators (e.g. in-process fakes).
    pub fn from_parts(
        config: &OrchestratorConfig,
        services: Collaborators,
        db: Database,
    ) -> Result<Self, MedLinkError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;
        let db = Arc::new(Mutex::new(db));
        Ok(Self {
            runtime,
            orchestrator: Orchestrator::new(config, services, db.clone()),
            db,
            history_limit: config.history_limit,
        })
    }

    fn request(&self, kind: CapabilityKind, request: FfiCapabilityRequest) -> CapabilityRequest {
        let mut builder = CapabilityRequest::builder(kind)
            .query(request.query)
            .history(request.history.into_iter().map(HistoryTurn::from))
            .history_limit(self.history_limit)
            .caller(CallerContext::new(request.user_id, request.shop_id));
        if let Some(id) = request.request_id {
            builder = builder.request_id(id);
        }
        if let Some(image) = request.image {
            builder = builder.image(MediaPayload::new(
                image,
                request.image_mime_type.unwrap_or_else(|| "image/jpeg".to_string()),
            ));
        }
        if let Some(audio) = request.audio {
            builder = builder.audio(MediaPayload::new(
                audio,
                request.audio_mime_type.unwrap_or_else(|| "audio/wav".to_string()),
            ));
        }
        builder.build()
    }
}

#[uniffi::export]
impl MedLinkCore {
    // =========================================================================
    // Capabilities
    // =========================================================================

    /// Answer a question, optionally about an attached image.
    pub fn chat(&self, request: FfiCapabilityRequest) -> Result<FfiCapabilityResponse, MedLinkError> {
        let request = self.request(CapabilityKind::Chat, request);
        let response = self.runtime.block_on(self.orchestrator.chat(&request))?;
        response.try_into()
    }

    /// Extract a prescription, lab report or stock list from the attached image.
    pub fn analyze_document(
        &self,
        request: FfiCapabilityRequest,
        document_type: FfiDocumentType,
    ) -> Result<FfiCapabilityResponse, MedLinkError> {
        let request = self.request(CapabilityKind::AnalyzeDocument, request);
        let response = self
            .runtime
            .block_on(self.orchestrator.analyze_document(&request, document_type.into()))?;
        response.try_into()
    }

    /// Turn a spoken (or typed) order into bill items.
    pub fn process_voice_bill(
        &self,
        request: FfiCapabilityRequest,
    ) -> Result<FfiCapabilityResponse, MedLinkError> {
        let request = self.request(CapabilityKind::VoiceBill, request);
        let response = self.runtime.block_on(self.orchestrator.process_voice_bill(&request))?;
        response.try_into()
    }

    /// Duplicate therapy and interactions across a medicine list.
    pub fn check_interactions(&self, drug_names: Vec<String>) -> Result<FfiCapabilityResponse, MedLinkError> {
        let response = self.runtime.block_on(self.orchestrator.check_interactions(&drug_names))?;
        response.try_into()
    }

    /// Prices and better-margin substitutes for a medicine.
    pub fn get_market_data(
        &self,
        user_id: String,
        shop_id: String,
        drug_name: String,
    ) -> Result<FfiCapabilityResponse, MedLinkError> {
        let caller = CallerContext::new(user_id, shop_id);
        let response = self
            .runtime
            .block_on(self.orchestrator.get_market_data(&caller, &drug_name))?;
        response.try_into()
    }

    /// Banned / Schedule H1 status of a medicine.
    pub fn check_compliance(&self, drug_name: String) -> Result<FfiCapabilityResponse, MedLinkError> {
        let response = self.runtime.block_on(self.orchestrator.check_compliance(&drug_name))?;
        response.try_into()
    }

    /// 30-day demand forecast from a supplied sales history.
    pub fn get_inventory_forecast(
        &self,
        user_id: String,
        shop_id: String,
        sales: Vec<FfiSaleRecord>,
    ) -> Result<FfiCapabilityResponse, MedLinkError> {
        let caller = CallerContext::new(user_id, shop_id);
        let sales: Vec<SaleRecord> = sales.into_iter().map(Into::into).collect();
        let response = self
            .runtime
            .block_on(self.orchestrator.get_inventory_forecast(&caller, &sales))?;
        response.try_into()
    }

    /// Forecast from the sales recorded locally over the last `days` days.
    pub fn forecast_from_recorded_sales(
        &self,
        user_id: String,
        shop_id: String,
        days: u32,
    ) -> Result<FfiCapabilityResponse, MedLinkError> {
        let since = (chrono::Utc::now() - chrono::Duration::days(i64::from(days))).to_rfc3339();
        let sales = {
            let db = self.db.lock()?;
            db.list_sales_since(&shop_id, &since)?
        };
        let caller = CallerContext::new(user_id, shop_id);
        let response = self
            .runtime
            .block_on(self.orchestrator.get_inventory_forecast(&caller, &sales))?;
        response.try_into()
    }

    // =========================================================================
    // Inventory & Sales
    // =========================================================================

    /// Add or update an inventory row.
    pub fn upsert_stock_item(&self, shop_id: String, item: FfiStockItem) -> Result<(), MedLinkError> {
        let db = self.db.lock()?;
        db.upsert_stock_item(&shop_id, &item.into())?;
        Ok(())
    }

    pub fn list_inventory(&self, shop_id: String) -> Result<Vec<FfiStockItem>, MedLinkError> {
        let db = self.db.lock()?;
        let items = db.list_inventory(&shop_id)?;
        Ok(items.into_iter().map(|i| i.into()).collect())
    }

    pub fn record_sale(&self, shop_id: String, sale: FfiSaleRecord) -> Result<(), MedLinkError> {
        let db = self.db.lock()?;
        db.insert_sale(&shop_id, &sale.into())?;
        Ok(())
    }

    /// Stock drafts written by document analysis and the add-stock tool.
    pub fn list_pending_stock_drafts(&self, shop_id: String) -> Result<Vec<FfiStockDraft>, MedLinkError> {
        let db = self.db.lock()?;
        let drafts = db.list_pending_stock_drafts(&shop_id)?;
        Ok(drafts.into_iter().map(|d| d.into()).collect())
    }

    pub fn list_reorder_list(&self, shop_id: String) -> Result<Vec<FfiReorderEntry>, MedLinkError> {
        let db = self.db.lock()?;
        let entries = db.list_reorder_list(&shop_id)?;
        Ok(entries.into_iter().map(|e| e.into()).collect())
    }
}

// =========================================================================
// FFI Types
// =========================================================================

#[derive(Debug, Clone, Copy, uniffi::Enum)]
pub enum FfiDocumentType {
    Prescription,
    LabReport,
    InventoryList,
}

impl From<FfiDocumentType> for DocumentType {
    fn from(kind: FfiDocumentType) -> Self {
        match kind {
            FfiDocumentType::Prescription => DocumentType::Prescription,
            FfiDocumentType::LabReport => DocumentType::LabReport,
            FfiDocumentType::InventoryList => DocumentType::InventoryList,
        }
    }
}

/// FFI-safe conversation turn. `role` is "user" or "assistant".
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiHistoryTurn {
    pub role: String,
    pub text: String,
}

impl From<FfiHistoryTurn> for HistoryTurn {
    fn from(turn: FfiHistoryTurn) -> Self {
        let role = match turn.role.trim().to_lowercase().as_str() {
            "assistant" | "model" | "bot" => Role::Assistant,
            _ => Role::User,
        };
        HistoryTurn { role, text: turn.text }
    }
}

/// FFI-safe capability request.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCapabilityRequest {
    pub query: String,
    pub image: Option<Vec<u8>>,
    pub image_mime_type: Option<String>,
    pub audio: Option<Vec<u8>>,
    pub audio_mime_type: Option<String>,
    pub history: Vec<FfiHistoryTurn>,
    pub user_id: String,
    pub shop_id: String,
    /// Set when retrying, so side effects are not repeated.
    pub request_id: Option<String>,
}

/// FFI-safe tier failure.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiTierFailure {
    pub tier: String,
    pub error: String,
}

/// FFI-safe capability response. Structured payload and directive are JSON.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCapabilityResponse {
    pub reply: String,
    pub provenance: String,
    pub payload_json: Option<String>,
    pub directive_json: Option<String>,
    pub failures: Vec<FfiTierFailure>,
}

impl TryFrom<CapabilityResponse> for FfiCapabilityResponse {
    type Error = MedLinkError;

    fn try_from(response: CapabilityResponse) -> Result<Self, Self::Error> {
        let payload_json = response.payload.as_ref().map(serde_json::to_string).transpose()?;
        let directive_json = response.directive.as_ref().map(serde_json::to_string).transpose()?;
        Ok(Self {
            reply: response.reply,
            provenance: response.provenance.to_string(),
            payload_json,
            directive_json,
            failures: response
                .failures
                .into_iter()
                .map(|f| FfiTierFailure {
                    tier: f.provenance.to_string(),
                    error: f.error,
                })
                .collect(),
        })
    }
}

/// FFI-safe inventory row.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiStockItem {
    pub id: String,
    pub name: String,
    pub generic_name: Option<String>,
    pub composition: Option<String>,
    pub quantity: i64,
    pub cost_price: f64,
    pub sale_price: f64,
    pub batch: Option<String>,
    pub expiry: Option<String>,
}

impl From<StockItem> for FfiStockItem {
    fn from(item: StockItem) -> Self {
        Self {
            id: item.id,
            name: item.name,
            generic_name: item.generic_name,
            composition: item.composition,
            quantity: item.quantity,
            cost_price: item.cost_price,
            sale_price: item.sale_price,
            batch: item.batch,
            expiry: item.expiry,
        }
    }
}

impl From<FfiStockItem> for StockItem {
    fn from(item: FfiStockItem) -> Self {
        StockItem {
            id: if item.id.trim().is_empty() {
                uuid::Uuid::new_v4().to_string()
            } else {
                item.id
            },
            name: item.name,
            generic_name: item.generic_name,
            composition: item.composition,
            quantity: item.quantity,
            cost_price: item.cost_price,
            sale_price: item.sale_price,
            batch: item.batch,
            expiry: item.expiry,
        }
    }
}

/// FFI-safe sale. `sold_at` is RFC 3339.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSaleRecord {
    pub item: String,
    pub quantity: u32,
    pub amount: f64,
    pub sold_at: String,
}

impl From<FfiSaleRecord> for SaleRecord {
    fn from(sale: FfiSaleRecord) -> Self {
        SaleRecord::new(sale.item, sale.quantity, sale.amount, sale.sold_at)
    }
}

/// FFI-safe stock draft.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiStockDraft {
    pub id: String,
    pub item_name: String,
    pub quantity: u32,
    pub batch: Option<String>,
    pub expiry: Option<String>,
    pub price: Option<f64>,
    pub created_at: String,
}

impl From<models::StockDraft> for FfiStockDraft {
    fn from(draft: models::StockDraft) -> Self {
        Self {
            id: draft.id,
            item_name: draft.item_name,
            quantity: draft.quantity,
            batch: draft.batch,
            expiry: draft.expiry,
            price: draft.price,
            created_at: draft.created_at,
        }
    }
}

/// FFI-safe reorder-list entry.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiReorderEntry {
    pub item_name: String,
    pub quantity: u32,
    pub created_at: String,
}

impl From<models::ReorderEntry> for FfiReorderEntry {
    fn from(entry: models::ReorderEntry) -> Self {
        Self {
            item_name: entry.item_name,
            quantity: entry.quantity,
            created_at: entry.created_at,
        }
    }
}
