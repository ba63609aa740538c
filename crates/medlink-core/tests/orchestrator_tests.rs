//! End-to-end tests for the fallback orchestrator with in-process fakes.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use medlink_core::models::{ActionDirective, Severity, StructuredPayload};
use medlink_core::orchestrator::{CHAT_REPLY, INTERACTION_REPLY};
use medlink_core::ratelimit::{ManualClock, DEFAULT_WINDOW};
use medlink_core::{
    CallerContext, CapabilityKind, CapabilityRequest, Collaborators, Database, DocumentType,
    MediaPayload, Orchestrator, OrchestratorConfig, Provenance, RateLimiter, SaleRecord, StockItem,
};
use medlink_llm::{
    CompletionApi, CompletionRequest, LlmError, LlmResult, SpeechApi, VisionApi, WorkflowApi,
};
use serde_json::{json, Value};

const SHOP: &str = "shop-1";

// =========================================================================
// Fakes
// =========================================================================

fn offline() -> LlmError {
    LlmError::NetworkUnavailable("offline".into())
}

#[derive(Default)]
struct FakeCompletion {
    replies: Mutex<VecDeque<String>>,
}

impl FakeCompletion {
    fn replying(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
        }
    }
}

#[async_trait]
impl CompletionApi for FakeCompletion {
    async fn complete(&self, _request: CompletionRequest) -> LlmResult<String> {
        self.replies.lock().unwrap().pop_front().ok_or_else(offline)
    }
}

#[derive(Default)]
struct FakeWorkflow {
    responses: HashMap<String, Value>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl FakeWorkflow {
    fn with(mut self, endpoint: &str, response: Value) -> Self {
        self.responses.insert(endpoint.to_string(), response);
        self
    }

    fn endpoints(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(e, _)| e.clone()).collect()
    }
}

#[async_trait]
impl WorkflowApi for FakeWorkflow {
    async fn invoke(&self, endpoint: &str, payload: Value) -> LlmResult<Value> {
        self.calls.lock().unwrap().push((endpoint.to_string(), payload));
        self.responses.get(endpoint).cloned().ok_or_else(offline)
    }
}

struct FakeVision(Option<&'static str>);

#[async_trait]
impl VisionApi for FakeVision {
    async fn generate(&self, _prompt: &str, _image: &MediaPayload) -> LlmResult<String> {
        self.0.map(str::to_string).ok_or_else(offline)
    }
}

struct FakeSpeech(Option<&'static str>);

#[async_trait]
impl SpeechApi for FakeSpeech {
    async fn transcribe(&self, _audio: &MediaPayload) -> LlmResult<String> {
        self.0.map(str::to_string).ok_or_else(offline)
    }
}

// =========================================================================
// Harness
// =========================================================================

struct Harness {
    orchestrator: Orchestrator,
    db: Arc<Mutex<Database>>,
    workflow: Option<Arc<FakeWorkflow>>,
    clock: ManualClock,
}

struct HarnessBuilder {
    workflow: Option<FakeWorkflow>,
    completion: FakeCompletion,
    vision: Option<&'static str>,
    speech: Option<&'static str>,
    stock: Vec<StockItem>,
}

impl HarnessBuilder {
    fn new() -> Self {
        Self {
            workflow: None,
            completion: FakeCompletion::default(),
            vision: None,
            speech: None,
            stock: Vec::new(),
        }
    }

    fn workflow(mut self, workflow: FakeWorkflow) -> Self {
        self.workflow = Some(workflow);
        self
    }

    fn completion(mut self, replies: &[&str]) -> Self {
        self.completion = FakeCompletion::replying(replies);
        self
    }

    fn vision(mut self, output: &'static str) -> Self {
        self.vision = Some(output);
        self
    }

    fn speech(mut self, transcript: &'static str) -> Self {
        self.speech = Some(transcript);
        self
    }

    fn stock(mut self, item: StockItem) -> Self {
        self.stock.push(item);
        self
    }

    fn build(self) -> Harness {
        let db = Database::open_in_memory().unwrap();
        for item in &self.stock {
            db.upsert_stock_item(SHOP, item).unwrap();
        }
        let db = Arc::new(Mutex::new(db));

        let workflow = self.workflow.map(Arc::new);
        let services = Collaborators {
            workflow: workflow.clone().map(|w| w as Arc<dyn WorkflowApi>),
            completion: Arc::new(self.completion),
            vision: Arc::new(FakeVision(self.vision)),
            speech: Arc::new(FakeSpeech(self.speech)),
            reference: None,
        };
        let clock = ManualClock::new();
        let orchestrator = Orchestrator::new(&OrchestratorConfig::default(), services, db.clone())
            .with_limiter(RateLimiter::with_clock(DEFAULT_WINDOW, Arc::new(clock.clone())));

        Harness {
            orchestrator,
            db,
            workflow,
            clock,
        }
    }
}

fn caller() -> CallerContext {
    CallerContext::new("user-1", SHOP)
}

fn request(kind: CapabilityKind, query: &str) -> CapabilityRequest {
    CapabilityRequest::builder(kind).query(query).caller(caller()).build()
}

fn with_image(kind: CapabilityKind, query: &str, bytes: &[u8]) -> CapabilityRequest {
    CapabilityRequest::builder(kind)
        .query(query)
        .image(MediaPayload::new(bytes.to_vec(), "image/jpeg"))
        .caller(caller())
        .build()
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn paracetamol(name: &str, quantity: i64, cost: f64, sale: f64) -> StockItem {
    StockItem::new(name, quantity, cost, sale).with_generic("paracetamol")
}

// =========================================================================
// Total failure
// =========================================================================

#[tokio::test]
async fn test_every_capability_replies_when_everything_is_down() {
    let h = HarnessBuilder::new().workflow(FakeWorkflow::default()).build();
    let o = &h.orchestrator;

    let chat = o.chat(&request(CapabilityKind::Chat, "hello there")).await.unwrap();
    assert_eq!(chat.reply, CHAT_REPLY);

    let doc_request = with_image(CapabilityKind::AnalyzeDocument, "", b"rx");
    let document = o.analyze_document(&doc_request, DocumentType::Prescription).await.unwrap();

    let voice_request = CapabilityRequest::builder(CapabilityKind::VoiceBill)
        .audio(MediaPayload::new(vec![1, 2, 3], "audio/wav"))
        .caller(caller())
        .build();
    let voice = o.process_voice_bill(&voice_request).await.unwrap();

    let interactions = o.check_interactions(&names(&["Crocin", "Azithral"])).await.unwrap();
    assert_eq!(interactions.reply, INTERACTION_REPLY);
    let report = interactions.interactions().unwrap();
    assert!(report.findings.is_empty());
    assert!(!report.verified);

    let market = o.get_market_data(&caller(), "Dolo").await.unwrap();

    let compliance = o.check_compliance("Crocin").await.unwrap();
    let verdict = compliance.compliance().unwrap();
    assert!(!verdict.is_banned);
    assert!(!verdict.verified);

    let forecast = o.get_inventory_forecast(&caller(), &[]).await.unwrap();

    for response in [&chat, &document, &voice, &interactions, &market, &compliance, &forecast] {
        assert!(!response.reply.trim().is_empty());
        assert_eq!(response.provenance, Provenance::SafeDefault);
        assert!(response.directive.is_none());
    }
    assert!(chat.failures.iter().any(|f| f.provenance == Provenance::Workflow));
    assert_eq!(interactions.failures.len(), 2);
}

// =========================================================================
// Interactions
// =========================================================================

#[tokio::test]
async fn test_duplicate_therapy_short_circuits() {
    let h = HarnessBuilder::new()
        .workflow(FakeWorkflow::default().with("interactions", json!({"interactions": []})))
        .build();

    let response = h
        .orchestrator
        .check_interactions(&names(&["Dolo 650", "Paracetamol 500"]))
        .await
        .unwrap();

    assert_eq!(response.provenance, Provenance::Rules);
    let report = response.interactions().unwrap();
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].severity, Severity::Major);
    assert!(h.workflow.unwrap().endpoints().is_empty());
}

#[tokio::test]
async fn test_aspirin_warfarin_from_local_table_when_offline() {
    let h = HarnessBuilder::new().build();

    let response = h
        .orchestrator
        .check_interactions(&names(&["Aspirin", "Warfarin"]))
        .await
        .unwrap();

    assert_eq!(response.provenance, Provenance::Offline);
    let report = response.interactions().unwrap();
    assert!(!report.verified);
    assert!(report.highest_severity().unwrap() >= Severity::Major);
    assert!(response.reply.contains("Verify"));
}

#[tokio::test]
async fn test_known_findings_merged_and_deduplicated() {
    let workflow = FakeWorkflow::default().with(
        "interactions",
        json!({"interactions": [
            {"drugs": ["Ecosprin", "Warf"], "severity": "moderate", "description": "bleeding"},
            {"drug1": "warfarin", "drug2": "aspirin", "severity": "major", "description": "bleeding"},
            {"drugs": ["aspirin", "warfarin"], "severity": "minor", "description": "noise"}
        ]}),
    );
    let h = HarnessBuilder::new().workflow(workflow).build();

    let response = h
        .orchestrator
        .check_interactions(&names(&["Ecosprin 75", "Warfarin 5mg"]))
        .await
        .unwrap();

    assert_eq!(response.provenance, Provenance::Workflow);
    let report = response.interactions().unwrap();
    assert!(report.verified);
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].severity, Severity::Severe);
    assert_eq!(report.findings[0].pair.to_string(), "aspirin + warfarin");
}

#[tokio::test]
async fn test_completion_minor_findings_dropped() {
    let h = HarnessBuilder::new()
        .completion(&[
            "```json\n{\"interactions\": [{\"drugs\": [\"fexofenadine\", \"montelukast\"], \"severity\": \"minor\", \"description\": \"none\"}]}\n```",
        ])
        .build();

    let response = h
        .orchestrator
        .check_interactions(&names(&["Allegra", "Montair"]))
        .await
        .unwrap();

    assert_eq!(response.provenance, Provenance::Completion);
    let report = response.interactions().unwrap();
    assert!(!report.verified);
    assert!(report.findings.is_empty());
}

#[tokio::test]
async fn test_empty_model_answer_is_not_verified_safe() {
    let h = HarnessBuilder::new().completion(&[r#"{"interactions": []}"#]).build();

    let response = h
        .orchestrator
        .check_interactions(&names(&["Allegra", "Montair"]))
        .await
        .unwrap();

    assert_eq!(response.provenance, Provenance::Completion);
    assert!(!response.interactions().unwrap().verified);
    assert!(response.reply.starts_with("No clinically significant interactions found."));
    assert!(response.reply.contains("Verify before dispensing"));
}

#[tokio::test]
async fn test_workflow_single_finding_array() {
    let workflow = FakeWorkflow::default().with(
        "interactions",
        json!([{"drugs": ["Clopidogrel", "Omeprazole"], "severity": "major", "description": "Reduced antiplatelet effect"}]),
    );
    let h = HarnessBuilder::new().workflow(workflow).build();

    let response = h
        .orchestrator
        .check_interactions(&names(&["Plavix", "Omez"]))
        .await
        .unwrap();

    assert_eq!(response.provenance, Provenance::Workflow);
    assert!(response.failures.is_empty());
    let report = response.interactions().unwrap();
    assert!(report.verified);
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].severity, Severity::Major);
}

#[tokio::test]
async fn test_workflow_object_wrapped_in_array() {
    let workflow = FakeWorkflow::default()
        .with("compliance-check", json!([{"is_banned": false, "is_h1": false, "reason": "Not scheduled"}]));
    let h = HarnessBuilder::new().workflow(workflow).build();

    let response = h.orchestrator.check_compliance("Allegra 120").await.unwrap();
    assert_eq!(response.provenance, Provenance::Workflow);
    assert_eq!(response.compliance().unwrap().reason, "Not scheduled");
}

#[tokio::test]
async fn test_malformed_interaction_answer_is_not_safe() {
    let workflow = FakeWorkflow::default().with("interactions", json!({"status": "ok"}));
    let h = HarnessBuilder::new().workflow(workflow).completion(&["no idea"]).build();

    let response = h
        .orchestrator
        .check_interactions(&names(&["Allegra", "Montair"]))
        .await
        .unwrap();

    assert!(response.is_safe_default());
    assert!(!response.interactions().unwrap().verified);
}

#[tokio::test]
async fn test_single_drug_needs_no_backend() {
    let workflow = FakeWorkflow::default().with("interactions", json!({"interactions": []}));
    let h = HarnessBuilder::new().workflow(workflow).build();

    let response = h.orchestrator.check_interactions(&names(&["Dolo 650", "  "])).await.unwrap();
    assert_eq!(response.provenance, Provenance::Rules);
    assert!(response.interactions().unwrap().verified);
    assert!(h.workflow.unwrap().endpoints().is_empty());
}

// =========================================================================
// Compliance
// =========================================================================

#[tokio::test]
async fn test_banned_name_is_always_banned() {
    let workflow = FakeWorkflow::default()
        .with("compliance-check", json!({"is_banned": false, "reason": "fine"}));
    let h = HarnessBuilder::new()
        .workflow(workflow)
        .completion(&[r#"{"is_banned": false, "is_h1": false, "reason": "fine"}"#])
        .build();

    for name in ["Corex", "Nimesulide + Paracetamol"] {
        let response = h.orchestrator.check_compliance(name).await.unwrap();
        let verdict = response.compliance().unwrap();
        assert!(verdict.is_banned, "{name} should be banned");
        assert!(!verdict.reason.trim().is_empty());
        h.clock.advance(DEFAULT_WINDOW);
    }
    assert!(h.workflow.unwrap().endpoints().is_empty());
}

#[tokio::test]
async fn test_schedule_h1_short_circuits() {
    let h = HarnessBuilder::new().build();
    let response = h.orchestrator.check_compliance("Alprax 0.25").await.unwrap();
    assert_eq!(response.provenance, Provenance::Rules);
    let verdict = response.compliance().unwrap();
    assert!(verdict.is_restricted);
    assert!(!verdict.is_banned);
}

#[tokio::test]
async fn test_completion_verdict_is_unverified() {
    let h = HarnessBuilder::new()
        .completion(&[r#"{"is_banned": false, "is_h1": false, "reason": "Not restricted in India."}"#])
        .build();

    let response = h.orchestrator.check_compliance("Allegra 120").await.unwrap();
    assert_eq!(response.provenance, Provenance::Completion);
    let verdict = response.compliance().unwrap();
    assert!(!verdict.verified);
    assert_eq!(verdict.reason, "Not restricted in India.");
}

#[tokio::test]
async fn test_workflow_verdict_is_verified() {
    let workflow = FakeWorkflow::default()
        .with("compliance-check", json!({"is_banned": "no", "is_h1": true, "reason": "H1 listed"}));
    let h = HarnessBuilder::new().workflow(workflow).build();

    let response = h.orchestrator.check_compliance("Montair LC").await.unwrap();
    assert_eq!(response.provenance, Provenance::Workflow);
    let verdict = response.compliance().unwrap();
    assert!(verdict.verified);
    assert!(verdict.is_restricted);
}

// =========================================================================
// Voice bill
// =========================================================================

#[tokio::test]
async fn test_voice_bill_offline_parser() {
    let h = HarnessBuilder::new().build();

    let response = h
        .orchestrator
        .process_voice_bill(&request(CapabilityKind::VoiceBill, "2 patta dolo"))
        .await
        .unwrap();

    assert_eq!(response.provenance, Provenance::Offline);
    let bill = response.voice_bill().unwrap();
    assert_eq!(bill.items.len(), 1);
    assert_eq!(bill.items[0].name, "Dolo");
    assert_eq!(bill.items[0].quantity, 30);
    assert!(matches!(
        &response.directive,
        Some(ActionDirective::NavigateToBilling { items }) if items.len() == 1
    ));
}

#[tokio::test]
async fn test_voice_transcript_reaches_offline_parser() {
    // Transcription works but intent classification is unavailable.
    let h = HarnessBuilder::new().speech("teen patta crocin").build();

    let voice_request = CapabilityRequest::builder(CapabilityKind::VoiceBill)
        .audio(MediaPayload::new(vec![9; 16], "audio/m4a"))
        .caller(caller())
        .build();
    let response = h.orchestrator.process_voice_bill(&voice_request).await.unwrap();

    assert_eq!(response.provenance, Provenance::Offline);
    let bill = response.voice_bill().unwrap();
    assert_eq!(bill.transcription, "teen patta crocin");
    assert_eq!(bill.items[0].quantity, 45);
    assert_eq!(response.failures[0].provenance, Provenance::Speech);
}

#[tokio::test]
async fn test_voice_search_reports_local_stock() {
    let h = HarnessBuilder::new()
        .speech("dolo 650 hai kya")
        .completion(&[r#"{"intent": "search_stock", "items": [{"name": "Dolo 650"}]}"#])
        .stock(paracetamol("Dolo 650", 40, 20.0, 30.0))
        .build();

    let voice_request = CapabilityRequest::builder(CapabilityKind::VoiceBill)
        .audio(MediaPayload::new(vec![1; 8], "audio/wav"))
        .caller(caller())
        .build();
    let response = h.orchestrator.process_voice_bill(&voice_request).await.unwrap();

    assert_eq!(response.provenance, Provenance::Speech);
    assert!(response.reply.contains("40 in stock"));
    assert!(response.directive.is_none());
}

// =========================================================================
// Chat
// =========================================================================

#[tokio::test]
async fn test_rate_limiter_rejects_then_recovers() {
    let h = HarnessBuilder::new().completion(&["Hello!", "Hello again!"]).build();
    let chat = request(CapabilityKind::Chat, "hi");

    assert!(h.orchestrator.chat(&chat).await.is_ok());
    let err = h.orchestrator.chat(&chat).await.unwrap_err();
    assert_eq!(err.endpoint, "chat");
    assert!(err.retry_after <= DEFAULT_WINDOW);

    // Other endpoints are throttled independently.
    assert!(h.orchestrator.check_compliance("Crocin").await.is_ok());

    h.clock.advance(DEFAULT_WINDOW);
    assert!(h.orchestrator.chat(&chat).await.is_ok());
}

#[tokio::test]
async fn test_chat_routes_to_stock_tool() {
    let h = HarnessBuilder::new()
        .completion(&[
            r#"{"tool": "check_stock", "args": {"item": "Dolo"}}"#,
            "You have 40 units of Dolo 650 at ₹30.",
        ])
        .stock(paracetamol("Dolo 650", 40, 20.0, 30.0))
        .build();

    let response = h
        .orchestrator
        .chat(&request(CapabilityKind::Chat, "Do we have Dolo?"))
        .await
        .unwrap();

    assert_eq!(response.provenance, Provenance::ToolRouter);
    assert_eq!(response.reply, "You have 40 units of Dolo 650 at ₹30.");
}

#[tokio::test]
async fn test_replayed_reorder_written_once() {
    let invocation = r#"{"tool": "add_to_reorder_list", "args": {"item": "Azithral 500", "quantity": 2}}"#;
    let h = HarnessBuilder::new().completion(&[invocation, invocation]).build();
    let chat = request(CapabilityKind::Chat, "Azithral khatam, shortbook mein daal do");

    let first = h.orchestrator.chat(&chat).await.unwrap();
    h.clock.advance(DEFAULT_WINDOW);
    let second = h.orchestrator.chat(&chat).await.unwrap();

    for response in [&first, &second] {
        assert_eq!(response.provenance, Provenance::ToolRouter);
        assert!(matches!(
            &response.directive,
            Some(ActionDirective::AddToReorderList { quantity: 2, .. })
        ));
    }
    let entries = h.db.lock().unwrap().list_reorder_list(SHOP).unwrap();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn test_separate_deliveries_both_drafted() {
    let invocation = r#"{"tool": "add_stock_draft", "args": {"items": [{"name": "Dolo 650", "quantity": 30}]}}"#;
    let h = HarnessBuilder::new()
        .completion(&[invocation, "Drafted.", invocation, "Drafted again.", invocation])
        .build();
    let delivery = || request(CapabilityKind::Chat, "Dolo 650 ke 30 aaye hain, stock mein daalo");

    let monday = delivery();
    h.orchestrator.chat(&monday).await.unwrap();
    h.clock.advance(DEFAULT_WINDOW);
    h.orchestrator.chat(&delivery()).await.unwrap();
    assert_eq!(h.db.lock().unwrap().list_pending_stock_drafts(SHOP).unwrap().len(), 2);

    // A retry of the first request carries its id and writes nothing.
    h.clock.advance(DEFAULT_WINDOW);
    let retry = CapabilityRequest::builder(CapabilityKind::Chat)
        .request_id(monday.request_id())
        .query(monday.query())
        .caller(caller())
        .build();
    let replayed = h.orchestrator.chat(&retry).await.unwrap();
    assert!(replayed.reply.starts_with("Already drafted"));
    assert_eq!(h.db.lock().unwrap().list_pending_stock_drafts(SHOP).unwrap().len(), 2);
}

#[tokio::test]
async fn test_chat_image_goes_to_vision() {
    let h = HarnessBuilder::new().vision("This strip is Dolo 650 (paracetamol).").build();

    let response = h
        .orchestrator
        .chat(&with_image(CapabilityKind::Chat, "What is this?", b"jpeg"))
        .await
        .unwrap();

    assert_eq!(response.provenance, Provenance::Vision);
    assert!(response.reply.contains("paracetamol"));
}

#[tokio::test]
async fn test_chat_offline_stock_lookup() {
    let h = HarnessBuilder::new()
        .workflow(FakeWorkflow::default())
        .stock(paracetamol("Dolo 650", 12, 20.0, 30.0))
        .build();

    let response = h
        .orchestrator
        .chat(&request(CapabilityKind::Chat, "dolo kitna hai"))
        .await
        .unwrap();

    assert_eq!(response.provenance, Provenance::Offline);
    assert!(response.reply.contains("Dolo 650: 12 in stock"));
    assert_eq!(response.failures.len(), 2);
}

#[tokio::test]
async fn test_chat_workflow_reply() {
    let workflow = FakeWorkflow::default().with("chat", json!({"output": "Namaste! How can I help?"}));
    let h = HarnessBuilder::new().workflow(workflow).build();

    let response = h.orchestrator.chat(&request(CapabilityKind::Chat, "namaste")).await.unwrap();
    assert_eq!(response.provenance, Provenance::Workflow);
    assert_eq!(response.reply, "Namaste! How can I help?");

    let calls = h.workflow.unwrap().calls.lock().unwrap().clone();
    assert_eq!(calls[0].1["shopId"], SHOP);
    assert_eq!(calls[0].1["image"], Value::Null);
}

// =========================================================================
// Documents
// =========================================================================

#[tokio::test]
async fn test_prescription_from_workflow() {
    let workflow = FakeWorkflow::default().with(
        "analyze-prescription",
        json!({"data": {"medicines": [{"name": "Dolo 650", "quantity": 10}], "patient_name": "R. Sharma"}}),
    );
    let h = HarnessBuilder::new().workflow(workflow).build();

    let response = h
        .orchestrator
        .analyze_document(&with_image(CapabilityKind::AnalyzeDocument, "", b"rx"), DocumentType::Prescription)
        .await
        .unwrap();

    assert_eq!(response.provenance, Provenance::Workflow);
    let analysis = response.document().unwrap();
    assert_eq!(analysis.extraction.items[0].quantity, 10);
    assert_eq!(analysis.extraction.patient_name.as_deref(), Some("R. Sharma"));
}

#[tokio::test]
async fn test_inventory_list_staged_once() {
    let h = HarnessBuilder::new()
        .vision(r#"{"items": [{"name": "Crocin", "quantity": 3, "batch": "B12", "mrp": "30.5"}, {"name": "Pan 40", "quantity": 5}]}"#)
        .build();
    let invoice = with_image(CapabilityKind::AnalyzeDocument, "", b"invoice-bytes");

    let first = h
        .orchestrator
        .analyze_document(&invoice, DocumentType::InventoryList)
        .await
        .unwrap();
    h.clock.advance(DEFAULT_WINDOW);
    let second = h
        .orchestrator
        .analyze_document(&invoice, DocumentType::InventoryList)
        .await
        .unwrap();

    assert_eq!(first.provenance, Provenance::Vision);
    assert!(first.reply.contains("stock drafts"));
    assert!(!second.reply.contains("stock drafts"));

    let drafts = h.db.lock().unwrap().list_pending_stock_drafts(SHOP).unwrap();
    assert_eq!(drafts.len(), 2);
    assert!(drafts.iter().any(|d| d.item_name == "Crocin" && d.price == Some(30.5)));

    h.clock.advance(DEFAULT_WINDOW);
    let next_delivery = with_image(CapabilityKind::AnalyzeDocument, "", b"invoice-bytes");
    let third = h
        .orchestrator
        .analyze_document(&next_delivery, DocumentType::InventoryList)
        .await
        .unwrap();
    assert!(third.reply.contains("stock drafts"));
    assert_eq!(h.db.lock().unwrap().list_pending_stock_drafts(SHOP).unwrap().len(), 4);
}

#[tokio::test]
async fn test_document_without_image_is_canned() {
    let h = HarnessBuilder::new().vision(r#"{"summary": "never used"}"#).build();
    let response = h
        .orchestrator
        .analyze_document(&request(CapabilityKind::AnalyzeDocument, "read this"), DocumentType::LabReport)
        .await
        .unwrap();
    assert!(response.is_safe_default());
    assert!(response.failures.is_empty());
}

// =========================================================================
// Market & forecast
// =========================================================================

#[tokio::test]
async fn test_market_from_local_inventory() {
    let h = HarnessBuilder::new()
        .stock(paracetamol("Dolo 650", 10, 20.0, 30.0))
        .stock(paracetamol("Calpol 650", 10, 10.0, 32.0))
        .stock(paracetamol("Pacimol 650", 10, 25.0, 28.0))
        .build();

    let response = h.orchestrator.get_market_data(&caller(), "Dolo").await.unwrap();

    assert_eq!(response.provenance, Provenance::LocalData);
    let report = response.market().unwrap();
    assert_eq!(report.drug, "Dolo 650");
    let subs: Vec<&str> = report.substitutes.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(subs, vec!["Calpol 650"]);
    assert!(response.reply.contains("Calpol 650"));
}

#[tokio::test]
async fn test_market_from_workflow() {
    let workflow = FakeWorkflow::default().with(
        "market-intel",
        json!({"drug": "Augmentin 625", "average_price": 201.5, "substitutes": [{"name": "Moxikind-CV 625", "price": 160}]}),
    );
    let h = HarnessBuilder::new().workflow(workflow).build();

    let response = h.orchestrator.get_market_data(&caller(), "Augmentin 625").await.unwrap();
    assert_eq!(response.provenance, Provenance::Workflow);
    let report = response.market().unwrap();
    assert_eq!(report.substitutes[0].savings, 41.5);
}

#[tokio::test]
async fn test_forecast_moving_average_offline() {
    let h = HarnessBuilder::new().stock(paracetamol("Dolo 650", 10, 20.0, 30.0)).build();
    let sales = vec![
        SaleRecord::new("Dolo 650", 10, 300.0, "2026-10-01T10:00:00Z"),
        SaleRecord::new("Dolo 650", 5, 150.0, "2026-10-10T10:00:00Z"),
    ];

    let response = h.orchestrator.get_inventory_forecast(&caller(), &sales).await.unwrap();

    assert_eq!(response.provenance, Provenance::Offline);
    let entries = response.forecast().unwrap();
    assert_eq!(entries[0].predicted_demand, 45);
    assert_eq!(entries[0].current_stock, Some(10));
    assert_eq!(entries[0].suggested_reorder, 35);
}

#[tokio::test]
async fn test_forecast_from_workflow() {
    let workflow = FakeWorkflow::default().with(
        "forecast",
        json!({"forecast": [{"item": "Dolo 650", "predicted_demand": 40, "suggested_reorder": 30}]}),
    );
    let h = HarnessBuilder::new().workflow(workflow).build();
    let sales = vec![SaleRecord::new("Dolo 650", 4, 120.0, "2026-10-10T10:00:00Z")];

    let response = h.orchestrator.get_inventory_forecast(&caller(), &sales).await.unwrap();

    assert_eq!(response.provenance, Provenance::Workflow);
    assert!(matches!(&response.payload, Some(StructuredPayload::Forecast(e)) if e[0].suggested_reorder == 30));
    let calls = h.workflow.unwrap().calls.lock().unwrap().clone();
    assert_eq!(calls[0].1["salesHistory"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_forecast_workflow_single_entry_array() {
    let workflow = FakeWorkflow::default().with(
        "forecast",
        json!([{"item": "Pan 40", "predicted_demand": 12, "suggested_reorder": 8}]),
    );
    let h = HarnessBuilder::new().workflow(workflow).build();
    let sales = vec![SaleRecord::new("Pan 40", 3, 360.0, "2026-10-10T10:00:00Z")];

    let response = h.orchestrator.get_inventory_forecast(&caller(), &sales).await.unwrap();

    assert_eq!(response.provenance, Provenance::Workflow);
    let entries = response.forecast().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].item, "Pan 40");
    assert_eq!(entries[0].suggested_reorder, 8);
}

#[tokio::test]
async fn test_limiter_window_is_configurable() {
    let limiter = RateLimiter::new(Duration::from_millis(0));
    assert!(limiter.allow("chat"));
    assert!(limiter.allow("chat"));
}
