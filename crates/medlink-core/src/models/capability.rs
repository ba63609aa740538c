//! Capability requests and responses.

use std::fmt;

use medlink_llm::{ChatMessage, DocumentExtraction, DocumentType, MediaPayload, Role, VoiceIntentKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ComplianceVerdict, ForecastEntry, InteractionReport, MarketReport};

/// Number of conversation turns kept on a request unless overridden.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// One top-level operation exposed by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Chat,
    AnalyzeDocument,
    VoiceBill,
    InteractionCheck,
    MarketLookup,
    ComplianceCheck,
    Forecast,
}

impl CapabilityKind {
    /// Rate-limit key; also the workflow endpoint for all but document analysis.
    pub fn endpoint(&self) -> &'static str {
        match self {
            CapabilityKind::Chat => "chat",
            CapabilityKind::AnalyzeDocument => "analyze-document",
            CapabilityKind::VoiceBill => "voice-bill",
            CapabilityKind::InteractionCheck => "interactions",
            CapabilityKind::MarketLookup => "market-intel",
            CapabilityKind::ComplianceCheck => "compliance-check",
            CapabilityKind::Forecast => "forecast",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint())
    }
}

/// Who is asking, and for which shop.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CallerContext {
    pub user_id: String,
    pub shop_id: String,
}

impl CallerContext {
    pub fn new(user_id: impl Into<String>, shop_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            shop_id: shop_id.into(),
        }
    }
}

/// A previous conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub text: String,
}

impl HistoryTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, text: text.into() }
    }
}

impl From<&HistoryTurn> for ChatMessage {
    fn from(turn: &HistoryTurn) -> Self {
        ChatMessage {
            role: turn.role,
            content: turn.text.clone(),
        }
    }
}

/// Immutable request for one capability call. Build with
/// [`CapabilityRequest::builder`].
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityRequest {
    kind: CapabilityKind,
    request_id: String,
    query: String,
    image: Option<MediaPayload>,
    audio: Option<MediaPayload>,
    history: Vec<HistoryTurn>,
    caller: CallerContext,
}

impl CapabilityRequest {
    pub fn builder(kind: CapabilityKind) -> CapabilityRequestBuilder {
        CapabilityRequestBuilder {
            kind,
            request_id: None,
            query: String::new(),
            image: None,
            audio: None,
            history: Vec::new(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            caller: CallerContext::default(),
        }
    }

    pub fn kind(&self) -> CapabilityKind {
        self.kind
    }

    /// Identifies one user request. Replaying a request with the same id
    /// repeats no side effects.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn image(&self) -> Option<&MediaPayload> {
        self.image.as_ref()
    }

    pub fn audio(&self) -> Option<&MediaPayload> {
        self.audio.as_ref()
    }

    /// Oldest first, at most the builder's history limit.
    pub fn history(&self) -> &[HistoryTurn] {
        &self.history
    }

    pub fn caller(&self) -> &CallerContext {
        &self.caller
    }
}

pub struct CapabilityRequestBuilder {
    kind: CapabilityKind,
    request_id: Option<String>,
    query: String,
    image: Option<MediaPayload>,
    audio: Option<MediaPayload>,
    history: Vec<HistoryTurn>,
    history_limit: usize,
    caller: CallerContext,
}

impl CapabilityRequestBuilder {
    /// Reuse an id when retrying a request; otherwise a fresh one is assigned.
    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        self.request_id = (!id.trim().is_empty()).then(|| id.trim().to_string());
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    /// Empty payloads are dropped.
    pub fn image(mut self, image: MediaPayload) -> Self {
        self.image = (!image.is_empty()).then_some(image);
        self
    }

    pub fn audio(mut self, audio: MediaPayload) -> Self {
        self.audio = (!audio.is_empty()).then_some(audio);
        self
    }

    pub fn history(mut self, turns: impl IntoIterator<Item = HistoryTurn>) -> Self {
        self.history.extend(turns);
        self
    }

    pub fn history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn caller(mut self, caller: CallerContext) -> Self {
        self.caller = caller;
        self
    }

    pub fn build(mut self) -> CapabilityRequest {
        if self.history.len() > self.history_limit {
            let excess = self.history.len() - self.history_limit;
            self.history.drain(..excess);
        }
        CapabilityRequest {
            kind: self.kind,
            request_id: self
                .request_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            query: self.query.trim().to_string(),
            image: self.image,
            audio: self.audio,
            history: self.history,
            caller: self.caller,
        }
    }
}

/// Which tier produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Primary workflow backend.
    Workflow,
    ToolRouter,
    Completion,
    Vision,
    Speech,
    /// Local inventory data.
    LocalData,
    /// Offline heuristics.
    Offline,
    /// Deterministic safety rules short-circuited the tiers.
    Rules,
    /// Every tier failed; canned reply.
    SafeDefault,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Workflow => "workflow",
            Provenance::ToolRouter => "tool_router",
            Provenance::Completion => "completion",
            Provenance::Vision => "vision",
            Provenance::Speech => "speech",
            Provenance::LocalData => "local_data",
            Provenance::Offline => "offline",
            Provenance::Rules => "rules",
            Provenance::SafeDefault => "safe_default",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A line on a bill or stock list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillItem {
    pub name: String,
    pub quantity: u32,
}

impl BillItem {
    pub fn new(name: impl Into<String>, quantity: u32) -> Self {
        Self {
            name: name.into(),
            quantity,
        }
    }
}

/// UI action requested alongside a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionDirective {
    NavigateToBilling { items: Vec<BillItem> },
    OpenMessaging { message: String, recipient: Option<String> },
    AddToReorderList { item: String, quantity: u32 },
}

/// Document extraction tagged with its document type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    pub document_type: DocumentType,
    #[serde(flatten)]
    pub extraction: DocumentExtraction,
}

/// Result of a voice-bill call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceBill {
    pub transcription: String,
    pub intent: VoiceIntentKind,
    pub items: Vec<BillItem>,
}

/// Structured payload attached to a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StructuredPayload {
    Document(DocumentAnalysis),
    VoiceBill(VoiceBill),
    Interactions(InteractionReport),
    Market(MarketReport),
    Compliance(ComplianceVerdict),
    Forecast(Vec<ForecastEntry>),
}

/// A tier that was tried and skipped past.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierFailure {
    pub provenance: Provenance,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityResponse {
    /// Never empty.
    pub reply: String,
    pub provenance: Provenance,
    pub payload: Option<StructuredPayload>,
    pub directive: Option<ActionDirective>,
    pub failures: Vec<TierFailure>,
}

impl CapabilityResponse {
    pub fn is_safe_default(&self) -> bool {
        self.provenance == Provenance::SafeDefault
    }

    pub fn interactions(&self) -> Option<&InteractionReport> {
        match &self.payload {
            Some(StructuredPayload::Interactions(report)) => Some(report),
            _ => None,
        }
    }

    pub fn compliance(&self) -> Option<&ComplianceVerdict> {
        match &self.payload {
            Some(StructuredPayload::Compliance(verdict)) => Some(verdict),
            _ => None,
        }
    }

    pub fn voice_bill(&self) -> Option<&VoiceBill> {
        match &self.payload {
            Some(StructuredPayload::VoiceBill(bill)) => Some(bill),
            _ => None,
        }
    }

    pub fn document(&self) -> Option<&DocumentAnalysis> {
        match &self.payload {
            Some(StructuredPayload::Document(doc)) => Some(doc),
            _ => None,
        }
    }

    pub fn market(&self) -> Option<&MarketReport> {
        match &self.payload {
            Some(StructuredPayload::Market(report)) => Some(report),
            _ => None,
        }
    }

    pub fn forecast(&self) -> Option<&[ForecastEntry]> {
        match &self.payload {
            Some(StructuredPayload::Forecast(entries)) => Some(entries),
            _ => None,
        }
    }
}
