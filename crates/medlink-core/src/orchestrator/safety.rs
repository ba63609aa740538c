//! Interaction and compliance checks. Local rules run first and are merged
//! into whichever tier answers; missing information is never reported as
//! safe.

use medlink_llm::prompts::{make_compliance_messages, make_interaction_messages};
use medlink_llm::{normalize_value, CompletionRequest};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::plan::{TierAnswer, TierPlan};
use super::{canned, Orchestrator};
use crate::drugs::{dedup_findings, verdict_from_value};
use crate::error::{CapabilityError, CapabilityResult, RateLimited};
use crate::models::{
    CapabilityKind, CapabilityResponse, ComplianceVerdict, DrugEntity, InteractionFinding,
    InteractionReport, Provenance, StructuredPayload, TierFailure,
};

impl Orchestrator {
    // =====================================================================
    // Interactions
    // =====================================================================

    /// Check a medicine list for duplicate therapy and interactions.
    pub async fn check_interactions(&self, names: &[String]) -> Result<CapabilityResponse, RateLimited> {
        self.admit(CapabilityKind::InteractionCheck)?;

        let names: Vec<String> = names
            .iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        if names.len() < 2 {
            return Ok(rules_interactions(Vec::new()));
        }

        let entities = self.drugs.resolve_all(&names).await;
        let known = self.drugs.known_interactions(&entities);
        let duplicates = self.drugs.duplicate_therapy(&entities);
        if !duplicates.is_empty() {
            info!(
                capability = %CapabilityKind::InteractionCheck,
                findings = duplicates.len(),
                "duplicate therapy short-circuit"
            );
            let mut findings = duplicates;
            findings.extend(known);
            return Ok(rules_interactions(dedup_findings(findings)));
        }

        let generics: Vec<String> = entities.iter().map(|e| e.generic.clone()).collect();
        let plan = TierPlan::new(CapabilityKind::InteractionCheck)
            .tier_if(
                self.has_workflow(),
                Provenance::Workflow,
                self.interactions_workflow(&names, &known),
            )
            .tier(Provenance::Completion, self.interactions_completion(&generics, &known))
            .tier_if(!known.is_empty(), Provenance::Offline, async {
                Ok(interaction_answer(InteractionReport {
                    findings: known.clone(),
                    verified: false,
                }))
            });
        Ok(plan.run(canned::interactions()).await)
    }

    async fn interactions_workflow(
        &self,
        names: &[String],
        known: &[InteractionFinding],
    ) -> CapabilityResult<TierAnswer> {
        let value = self.invoke_workflow("interactions", json!({ "drugs": names })).await?;
        self.merged_interactions(&value, known, true)
    }

    async fn interactions_completion(
        &self,
        generics: &[String],
        known: &[InteractionFinding],
    ) -> CapabilityResult<TierAnswer> {
        let request = CompletionRequest::new(make_interaction_messages(generics)).json();
        let raw = self.completion.complete(request).await?;
        let value = normalize_value(&raw)?;
        // Model opinions are never treated as verified.
        self.merged_interactions(&value, known, false)
    }

    /// Parse a tier's findings and merge the local known findings into them.
    fn merged_interactions(
        &self,
        value: &Value,
        known: &[InteractionFinding],
        verified: bool,
    ) -> CapabilityResult<TierAnswer> {
        let well_formed = value.is_array() || value.get("interactions").is_some_and(Value::is_array);
        if !well_formed {
            return Err(CapabilityError::Validation("interaction list missing".into()));
        }
        let mut findings = self.drugs.parse_findings(value);
        findings.extend(known.iter().cloned());
        Ok(interaction_answer(InteractionReport {
            findings: dedup_findings(findings),
            verified,
        }))
    }

    // =====================================================================
    // Compliance
    // =====================================================================

    /// Regulatory status (banned / Schedule H1) of one medicine.
    pub async fn check_compliance(&self, drug_name: &str) -> Result<CapabilityResponse, RateLimited> {
        self.admit(CapabilityKind::ComplianceCheck)?;

        let entity = match self.drugs.resolve(drug_name).await {
            Ok(entity) => entity,
            Err(e) => {
                warn!(capability = %CapabilityKind::ComplianceCheck, error = %e, "cannot check compliance");
                let failure = TierFailure {
                    provenance: Provenance::Rules,
                    error: CapabilityError::from(e).to_string(),
                };
                return Ok(canned::compliance().into_response(
                    CapabilityKind::ComplianceCheck,
                    Provenance::SafeDefault,
                    vec![failure],
                ));
            }
        };

        if let Some(verdict) = self.drugs.local_compliance(&entity) {
            info!(
                capability = %CapabilityKind::ComplianceCheck,
                generic = %entity.generic,
                banned = verdict.is_banned,
                "compliance table short-circuit"
            );
            return Ok(compliance_answer(&entity, verdict).into_response(
                CapabilityKind::ComplianceCheck,
                Provenance::Rules,
                Vec::new(),
            ));
        }

        let plan = TierPlan::new(CapabilityKind::ComplianceCheck)
            .tier_if(self.has_workflow(), Provenance::Workflow, self.compliance_workflow(&entity))
            .tier(Provenance::Completion, self.compliance_completion(&entity));
        Ok(plan.run(canned::compliance()).await)
    }

    async fn compliance_workflow(&self, entity: &DrugEntity) -> CapabilityResult<TierAnswer> {
        let payload = json!({ "drugName": entity.surface, "genericName": entity.generic });
        let value = self.invoke_workflow_object("compliance-check", payload).await?;
        let verdict = verdict_from_value(&value, true)
            .ok_or_else(|| CapabilityError::Validation("compliance verdict missing".into()))?;
        Ok(compliance_answer(entity, self.drugs.overlay_compliance(entity, verdict)))
    }

    async fn compliance_completion(&self, entity: &DrugEntity) -> CapabilityResult<TierAnswer> {
        let request = CompletionRequest::new(make_compliance_messages(&entity.generic)).json();
        let raw = self.completion.complete(request).await?;
        let value = normalize_value(&raw)?;
        // Model opinions are never treated as verified.
        let verdict = verdict_from_value(&value, false)
            .ok_or_else(|| CapabilityError::Validation("compliance verdict missing".into()))?;
        Ok(compliance_answer(entity, self.drugs.overlay_compliance(entity, verdict)))
    }
}

fn rules_interactions(findings: Vec<InteractionFinding>) -> CapabilityResponse {
    interaction_answer(InteractionReport {
        findings,
        verified: true,
    })
    .into_response(CapabilityKind::InteractionCheck, Provenance::Rules, Vec::new())
}

fn interaction_answer(report: InteractionReport) -> TierAnswer {
    let reply = if report.findings.is_empty() {
        "No clinically significant interactions found.".to_string()
    } else {
        let lines: Vec<String> = report
            .findings
            .iter()
            .map(|f| match &f.recommendation {
                Some(rec) => format!("{} ({}): {} {}", f.pair, f.severity, f.description, rec),
                None => format!("{} ({}): {}", f.pair, f.severity, f.description),
            })
            .collect();
        lines.join("\n")
    };
    let reply = if report.verified {
        reply
    } else {
        format!("{reply}\nNot confirmed by a verified source. Verify before dispensing.")
    };
    TierAnswer::reply(reply).with_payload(StructuredPayload::Interactions(report))
}

fn compliance_answer(entity: &DrugEntity, verdict: ComplianceVerdict) -> TierAnswer {
    let reply = format!("{}: {}", entity.surface, verdict.reason);
    TierAnswer::reply(reply).with_payload(StructuredPayload::Compliance(verdict))
}
