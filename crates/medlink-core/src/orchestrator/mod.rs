//! Fallback orchestrator.
//!
//! Each capability runs an ordered tier plan:
//!
//! ```text
//! rate limiter ─► safety rules ─► workflow ─► tools / completion ─► vision | speech ─► offline
//!                      │               (first usable answer wins)                       │
//!                      └──────────────────────► response ◄──── safe default ◄───────────┘
//! ```
//!
//! Only [`RateLimited`] reaches the caller; every other failure is recorded on
//! the response as a [`TierFailure`](crate::models::TierFailure).

mod canned;
mod chat;
mod document;
mod forecast;
mod market;
mod plan;
mod safety;
mod voice;

pub use canned::{CHAT_REPLY, INTERACTION_REPLY};
pub use plan::TierAnswer;

use std::sync::{Arc, Mutex};

use medlink_llm::http::{build_http_client, GeminiClient, OpenAiCompatClient, WorkflowClient};
use medlink_llm::{
    CompletionApi, SpeechAdapter, SpeechApi, VisionAdapter, VisionApi, WorkflowApi,
};
use serde_json::Value;

use crate::config::OrchestratorConfig;
use crate::db::Database;
use crate::drugs::{ChainedReference, DrugEngine, DrugReference, OpenFdaReference, RxNavReference};
use crate::error::{CapabilityError, CapabilityResult, RateLimited};
use crate::models::{CallerContext, CapabilityKind};
use crate::offline::OfflineParser;
use crate::ratelimit::RateLimiter;
use crate::tools::{ToolExecutor, ToolRouter};

/// External services the orchestrator depends on.
pub struct Collaborators {
    /// `None` skips every workflow tier.
    pub workflow: Option<Arc<dyn WorkflowApi>>,
    pub completion: Arc<dyn CompletionApi>,
    pub vision: Arc<dyn VisionApi>,
    pub speech: Arc<dyn SpeechApi>,
    pub reference: Option<Arc<dyn DrugReference>>,
}

impl Collaborators {
    /// HTTP clients for every service named in `config`.
    pub fn from_config(config: &OrchestratorConfig) -> CapabilityResult<Self> {
        let client = build_http_client(config.request_timeout())?;

        let workflow = config
            .workflow_url
            .as_deref()
            .map(|url| Arc::new(WorkflowClient::new(client.clone(), url)) as Arc<dyn WorkflowApi>);
        let openai = Arc::new(OpenAiCompatClient::new(
            client.clone(),
            &config.completion.base_url,
            config.completion.api_key.clone(),
            &config.completion.model,
            &config.completion.transcription_model,
        ));
        let vision = Arc::new(GeminiClient::new(
            client.clone(),
            &config.vision.base_url,
            config.vision.api_key.clone(),
            &config.vision.model,
        ));
        let reference = config.reference.enabled.then(|| {
            Arc::new(ChainedReference::new(vec![
                Arc::new(RxNavReference::new(client.clone(), &config.reference.rxnav_url)),
                Arc::new(OpenFdaReference::new(client.clone(), &config.reference.openfda_url)),
            ])) as Arc<dyn DrugReference>
        });

        Ok(Self {
            workflow,
            completion: openai.clone(),
            vision,
            speech: openai,
            reference,
        })
    }
}

pub struct Orchestrator {
    limiter: RateLimiter,
    workflow: Option<Arc<dyn WorkflowApi>>,
    completion: Arc<dyn CompletionApi>,
    vision: VisionAdapter,
    speech: SpeechAdapter,
    router: ToolRouter,
    executor: ToolExecutor,
    drugs: Arc<DrugEngine>,
    offline: OfflineParser,
    db: Arc<Mutex<Database>>,
}

impl Orchestrator {
    pub fn new(config: &OrchestratorConfig, services: Collaborators, db: Arc<Mutex<Database>>) -> Self {
        let mut engine = DrugEngine::new();
        if let Some(reference) = services.reference {
            engine = engine.with_reference(reference);
        }
        let drugs = Arc::new(engine);

        Self {
            limiter: RateLimiter::new(config.rate_limit_window()),
            workflow: services.workflow,
            completion: services.completion.clone(),
            vision: VisionAdapter::new(services.vision),
            speech: SpeechAdapter::new(services.speech, services.completion.clone()),
            router: ToolRouter::new(services.completion.clone(), config.router_history_window),
            executor: ToolExecutor::new(
                db.clone(),
                services.completion,
                drugs.clone(),
                config.margin.clone(),
            ),
            drugs,
            offline: OfflineParser::new(),
            db,
        }
    }

    /// Replace the rate limiter (e.g. one driven by a manual clock).
    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn drugs(&self) -> &DrugEngine {
        &self.drugs
    }

    fn admit(&self, capability: CapabilityKind) -> Result<(), RateLimited> {
        self.limiter.check(capability.endpoint())
    }

    async fn invoke_workflow(&self, endpoint: &str, payload: Value) -> CapabilityResult<Value> {
        let Some(workflow) = &self.workflow else {
            return Err(CapabilityError::NetworkUnavailable(
                "workflow backend not configured".into(),
            ));
        };
        Ok(workflow.invoke(endpoint, payload).await?)
    }

    /// For endpoints that answer with one object, which some workflows wrap
    /// in a one-element array.
    async fn invoke_workflow_object(&self, endpoint: &str, payload: Value) -> CapabilityResult<Value> {
        Ok(match self.invoke_workflow(endpoint, payload).await? {
            Value::Array(mut items) if items.len() == 1 && items[0].is_object() => items.remove(0),
            other => other,
        })
    }

    fn has_workflow(&self) -> bool {
        self.workflow.is_some()
    }
}

/// `userId` / `shopId` fields sent with every workflow call.
fn caller_fields(caller: &CallerContext) -> serde_json::Map<String, Value> {
    let mut map = serde_json::Map::new();
    map.insert("userId".into(), Value::String(caller.user_id.clone()));
    map.insert("shopId".into(), Value::String(caller.shop_id.clone()));
    map
}

/// First non-empty string among `keys`, or the value itself if it is a string.
fn text_field(value: &Value, keys: &[&str]) -> Option<String> {
    if let Value::String(s) = value {
        return Some(s.trim().to_string()).filter(|s| !s.is_empty());
    }
    keys.iter()
        .filter_map(|k| value.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}
