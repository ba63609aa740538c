use std::sync::{Mutex, PoisonError};

use medlink_llm::{VoiceIntent, VoiceIntentKind};
use serde_json::Value;

use super::plan::{TierAnswer, TierPlan};
use super::{caller_fields, canned, text_field, Orchestrator};
use crate::error::{CapabilityError, CapabilityResult, RateLimited};
use crate::models::{
    ActionDirective, BillItem, CapabilityKind, CapabilityRequest, CapabilityResponse, Provenance,
    StructuredPayload, VoiceBill,
};
use crate::tools::with_db;

impl Orchestrator {
    /// Turn a spoken (or typed) order into bill items. Tiers: workflow,
    /// speech transcription + intent, offline parser over the transcript or
    /// the typed query.
    pub async fn process_voice_bill(
        &self,
        request: &CapabilityRequest,
    ) -> Result<CapabilityResponse, RateLimited> {
        self.admit(CapabilityKind::VoiceBill)?;
        // Transcript from the speech tier, reused by the offline tier.
        let transcript: Mutex<Option<String>> = Mutex::new(None);

        let plan = TierPlan::new(CapabilityKind::VoiceBill)
            .tier_if(self.has_workflow(), Provenance::Workflow, self.voice_workflow(request))
            .tier_if(
                request.audio().is_some(),
                Provenance::Speech,
                self.voice_speech(request, &transcript),
            )
            .tier(Provenance::Offline, self.voice_offline(request, &transcript));
        Ok(plan.run(canned::voice_bill()).await)
    }

    async fn voice_workflow(&self, request: &CapabilityRequest) -> CapabilityResult<TierAnswer> {
        let mut payload = caller_fields(request.caller());
        if let Some(audio) = request.audio() {
            payload.insert("audio".into(), Value::String(audio.to_base64()));
            payload.insert("mimeType".into(), Value::String(audio.mime_type.clone()));
        }
        payload.insert("text".into(), Value::String(request.query().to_string()));

        let value = self.invoke_workflow_object("voice-bill", Value::Object(payload)).await?;
        let intent: VoiceIntent = serde_json::from_value(value.clone())
            .map_err(|e| CapabilityError::Validation(e.to_string()))?;
        let items: Vec<BillItem> = intent
            .items
            .into_iter()
            .map(|item| BillItem::new(item.name.trim(), item.quantity.max(1)))
            .filter(|item| !item.name.is_empty())
            .collect();
        if items.is_empty() {
            return Err(CapabilityError::Validation("workflow returned no items".into()));
        }
        let transcription = text_field(&value, &["transcription", "transcript", "text"])
            .unwrap_or_else(|| request.query().to_string());
        self.voice_answer(request, transcription, intent.intent, items)
    }

    async fn voice_speech(
        &self,
        request: &CapabilityRequest,
        transcript: &Mutex<Option<String>>,
    ) -> CapabilityResult<TierAnswer> {
        let audio = request
            .audio()
            .ok_or_else(|| CapabilityError::Validation("no audio attached".into()))?;
        let text = self.speech.transcribe(audio).await?;
        *transcript.lock().unwrap_or_else(PoisonError::into_inner) = Some(text.clone());

        let intent = self.speech.classify(&text).await?;
        let items = intent
            .items
            .into_iter()
            .map(|item| BillItem::new(item.name, item.quantity))
            .collect();
        self.voice_answer(request, text, intent.intent, items)
    }

    async fn voice_offline(
        &self,
        request: &CapabilityRequest,
        transcript: &Mutex<Option<String>>,
    ) -> CapabilityResult<TierAnswer> {
        let heard = transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let text = heard.unwrap_or_else(|| request.query().to_string());
        if text.trim().is_empty() {
            return Err(CapabilityError::Validation("no transcript or text to parse".into()));
        }
        let items = self.offline.parse(&text);
        if items.is_empty() {
            return Err(CapabilityError::Validation("no items recognised offline".into()));
        }
        self.voice_answer(request, text, VoiceIntentKind::AddStock, items)
    }

    /// Add-stock orders open billing; searches reply with local stock.
    fn voice_answer(
        &self,
        request: &CapabilityRequest,
        transcription: String,
        intent: VoiceIntentKind,
        items: Vec<BillItem>,
    ) -> CapabilityResult<TierAnswer> {
        let listed: Vec<String> = items.iter().map(|i| format!("{} x{}", i.name, i.quantity)).collect();

        let (reply, directive) = match intent {
            VoiceIntentKind::AddStock => (
                format!("Adding to bill: {}.", listed.join(", ")),
                Some(ActionDirective::NavigateToBilling { items: items.clone() }),
            ),
            VoiceIntentKind::SearchStock => {
                let shop = &request.caller().shop_id;
                let lines = with_db(&self.db, |db| {
                    let mut lines = Vec::new();
                    for item in &items {
                        match db.find_stock(shop, &item.name, 1)?.into_iter().next() {
                            Some(stock) => lines.push(format!("{}: {} in stock", stock.name, stock.quantity)),
                            None => lines.push(format!("{}: not in stock", item.name)),
                        }
                    }
                    Ok(lines)
                })?;
                (lines.join("\n"), None)
            }
        };

        Ok(TierAnswer::reply(reply)
            .with_payload(StructuredPayload::VoiceBill(VoiceBill {
                transcription,
                intent,
                items,
            }))
            .with_directive(directive))
    }
}
