use medlink_llm::{parse_document, DocumentExtraction, DocumentType, MediaPayload};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use super::plan::{TierAnswer, TierPlan};
use super::{caller_fields, canned, Orchestrator};
use crate::db::{idempotency_key, DraftLine};
use crate::error::{CapabilityError, CapabilityResult, RateLimited};
use crate::models::{
    CapabilityKind, CapabilityRequest, CapabilityResponse, DocumentAnalysis, Provenance,
    StructuredPayload,
};
use crate::tools::with_db;

impl Orchestrator {
    /// Read a prescription, lab report or stock list. Tiers: workflow, vision.
    /// Inventory lists are staged as stock drafts once per request and image.
    pub async fn analyze_document(
        &self,
        request: &CapabilityRequest,
        document_type: DocumentType,
    ) -> Result<CapabilityResponse, RateLimited> {
        self.admit(CapabilityKind::AnalyzeDocument)?;
        let image = request.image();

        let plan = TierPlan::new(CapabilityKind::AnalyzeDocument)
            .tier_if(
                self.has_workflow() && image.is_some(),
                Provenance::Workflow,
                self.document_workflow(request, document_type),
            )
            .tier_if(
                image.is_some(),
                Provenance::Vision,
                self.document_vision(request, document_type),
            );
        let mut response = plan.run(canned::document()).await;

        if document_type == DocumentType::InventoryList {
            if let (Some(image), Some(analysis)) = (image, response.document()) {
                match self.stage_drafts(request, image, analysis) {
                    Ok(true) => response.reply.push_str(" Items saved as stock drafts for review."),
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "could not stage stock drafts"),
                }
            }
        }
        Ok(response)
    }

    async fn document_workflow(
        &self,
        request: &CapabilityRequest,
        document_type: DocumentType,
    ) -> CapabilityResult<TierAnswer> {
        let image = request
            .image()
            .ok_or_else(|| CapabilityError::Validation("no document image".into()))?;
        let mut payload = caller_fields(request.caller());
        payload.insert("image".into(), Value::String(image.to_base64()));
        payload.insert("mimeType".into(), Value::String(image.mime_type.clone()));

        let value = self
            .invoke_workflow_object(document_type.workflow_endpoint(), Value::Object(payload))
            .await?;
        let extraction = match value {
            Value::String(text) => parse_document(&text)?,
            other => {
                let body = other.get("data").cloned().unwrap_or(other);
                serde_json::from_value::<DocumentExtraction>(body)
                    .map_err(|e| CapabilityError::Validation(e.to_string()))?
            }
        };
        if !extraction.is_usable() {
            return Err(CapabilityError::Validation("workflow extraction was empty".into()));
        }
        Ok(document_answer(document_type, extraction))
    }

    async fn document_vision(
        &self,
        request: &CapabilityRequest,
        document_type: DocumentType,
    ) -> CapabilityResult<TierAnswer> {
        let image = request
            .image()
            .ok_or_else(|| CapabilityError::Validation("no document image".into()))?;
        let extraction = self.vision.extract_document(document_type, image).await?;
        Ok(document_answer(document_type, extraction))
    }

    /// Returns `false` when this request already staged this image.
    fn stage_drafts(
        &self,
        request: &CapabilityRequest,
        image: &MediaPayload,
        analysis: &DocumentAnalysis,
    ) -> CapabilityResult<bool> {
        let lines: Vec<DraftLine> = analysis
            .extraction
            .items
            .iter()
            .map(|item| DraftLine {
                item_name: item.name.trim().to_string(),
                quantity: item.quantity,
                batch: item.batch.clone(),
                expiry: item.expiry.clone(),
                price: item.price,
            })
            .filter(|line| !line.item_name.is_empty())
            .collect();
        if lines.is_empty() {
            return Ok(false);
        }

        let digest = hex::encode(Sha256::digest(&image.bytes));
        let caller = request.caller();
        let key = idempotency_key(&[
            &caller.user_id,
            &caller.shop_id,
            request.request_id(),
            "analyze-inventory",
            &digest,
        ]);
        let written = with_db(&self.db, |db| db.insert_stock_drafts(&caller.shop_id, &key, &lines))?;
        info!(lines = lines.len(), written, "staged inventory drafts");
        Ok(written)
    }
}

fn document_answer(document_type: DocumentType, extraction: DocumentExtraction) -> TierAnswer {
    let reply = match (&extraction.summary, document_type) {
        (Some(summary), _) if !summary.trim().is_empty() => summary.trim().to_string(),
        (_, DocumentType::Prescription) => {
            format!("Read {} medicines from the prescription.", extraction.items.len())
        }
        (_, DocumentType::LabReport) => {
            format!("Read {} test results from the report.", extraction.results.len())
        }
        (_, DocumentType::InventoryList) => {
            format!("Read {} items from the stock list.", extraction.items.len())
        }
    };
    TierAnswer::reply(reply).with_payload(StructuredPayload::Document(DocumentAnalysis {
        document_type,
        extraction,
    }))
}
