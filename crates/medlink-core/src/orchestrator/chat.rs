use serde_json::{json, Value};

use super::plan::{TierAnswer, TierPlan};
use super::{caller_fields, canned, text_field, Orchestrator};
use crate::error::{CapabilityError, CapabilityResult, RateLimited};
use crate::models::{CapabilityKind, CapabilityRequest, CapabilityResponse, Provenance};
use crate::tools::with_db;

const OFFLINE_MATCHES: usize = 3;

impl Orchestrator {
    /// Answer a question. Tiers: workflow, tool router (text only), vision
    /// (image attached), offline stock lookup.
    pub async fn chat(&self, request: &CapabilityRequest) -> Result<CapabilityResponse, RateLimited> {
        self.admit(CapabilityKind::Chat)?;
        let has_image = request.image().is_some();

        let plan = TierPlan::new(CapabilityKind::Chat)
            .tier_if(self.has_workflow(), Provenance::Workflow, self.chat_workflow(request))
            .tier_if(!has_image, Provenance::ToolRouter, self.chat_tools(request))
            .tier_if(has_image, Provenance::Vision, self.chat_vision(request))
            .tier(Provenance::Offline, self.chat_offline(request));
        Ok(plan.run(canned::chat()).await)
    }

    async fn chat_workflow(&self, request: &CapabilityRequest) -> CapabilityResult<TierAnswer> {
        let mut payload = caller_fields(request.caller());
        payload.insert("query".into(), Value::String(request.query().to_string()));
        payload.insert(
            "image".into(),
            request.image().map_or(Value::Null, |img| Value::String(img.to_base64())),
        );
        payload.insert(
            "mimeType".into(),
            request.image().map_or(Value::Null, |img| Value::String(img.mime_type.clone())),
        );
        payload.insert(
            "history".into(),
            json!(request
                .history()
                .iter()
                .map(|turn| json!({"role": turn.role, "text": turn.text}))
                .collect::<Vec<_>>()),
        );

        let value = self.invoke_workflow_object("chat", Value::Object(payload)).await?;
        let reply = text_field(&value, &["reply", "response", "output", "answer", "text"])
            .ok_or_else(|| CapabilityError::Validation("workflow chat reply missing".into()))?;
        Ok(TierAnswer::reply(reply))
    }

    async fn chat_tools(&self, request: &CapabilityRequest) -> CapabilityResult<TierAnswer> {
        if request.query().is_empty() {
            return Err(CapabilityError::Validation("empty query".into()));
        }
        let invocation = self.router.route(request.query(), request.history()).await?;
        let outcome = self
            .executor
            .execute(&invocation, request.caller(), request.request_id(), request.query())
            .await?;
        let mut answer = TierAnswer::reply(outcome.reply).with_directive(outcome.directive);
        answer.payload = outcome.payload;
        Ok(answer)
    }

    async fn chat_vision(&self, request: &CapabilityRequest) -> CapabilityResult<TierAnswer> {
        let image = request
            .image()
            .ok_or_else(|| CapabilityError::Validation("no image attached".into()))?;
        let reply = self.vision.answer_question(request.query(), image).await?;
        Ok(TierAnswer::reply(reply))
    }

    /// Answer stock questions from local inventory.
    async fn chat_offline(&self, request: &CapabilityRequest) -> CapabilityResult<TierAnswer> {
        let names: Vec<String> = self
            .offline
            .parse(request.query())
            .into_iter()
            .map(|item| item.name)
            .collect();
        if names.is_empty() {
            return Err(CapabilityError::Validation("nothing to look up offline".into()));
        }

        let shop = &request.caller().shop_id;
        let mut lines = with_db(&self.db, |db| {
            let mut lines = Vec::new();
            for name in &names {
                // Try the whole phrase, then each word.
                let mut found = db.find_stock(shop, name, OFFLINE_MATCHES)?;
                if found.is_empty() {
                    for word in name.split_whitespace().filter(|w| w.len() >= 3) {
                        found = db.find_stock(shop, word, OFFLINE_MATCHES)?;
                        if !found.is_empty() {
                            break;
                        }
                    }
                }
                lines.extend(
                    found
                        .into_iter()
                        .map(|s| format!("{}: {} in stock at ₹{:.2}", s.name, s.quantity, s.sale_price)),
                );
            }
            Ok(lines)
        })?;

        if lines.is_empty() {
            return Err(CapabilityError::Validation("no matching local stock".into()));
        }
        lines.dedup();
        Ok(TierAnswer::reply(format!(
            "Offline mode, showing local stock only:\n{}",
            lines.join("\n")
        )))
    }
}
