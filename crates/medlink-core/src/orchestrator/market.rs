use medlink_llm::prompts::make_market_messages;
use medlink_llm::{normalize_value, CompletionRequest};
use serde_json::Value;

use super::plan::{TierAnswer, TierPlan};
use super::{caller_fields, canned, Orchestrator};
use crate::error::{CapabilityError, CapabilityResult, RateLimited};
use crate::models::{
    CallerContext, CapabilityKind, CapabilityResponse, MarketReport, Provenance,
    StructuredPayload, SubstituteCandidate, TierFailure,
};
use crate::tools::describe_market;

impl Orchestrator {
    /// Prices and substitutes for a medicine. Tiers: workflow, the shop's
    /// own inventory, completion.
    pub async fn get_market_data(
        &self,
        caller: &CallerContext,
        drug_name: &str,
    ) -> Result<CapabilityResponse, RateLimited> {
        self.admit(CapabilityKind::MarketLookup)?;
        let drug = drug_name.trim();
        if drug.is_empty() {
            let failure = TierFailure {
                provenance: Provenance::Rules,
                error: CapabilityError::Validation("empty drug name".into()).to_string(),
            };
            return Ok(canned::market().into_response(
                CapabilityKind::MarketLookup,
                Provenance::SafeDefault,
                vec![failure],
            ));
        }

        let plan = TierPlan::new(CapabilityKind::MarketLookup)
            .tier_if(self.has_workflow(), Provenance::Workflow, self.market_workflow(caller, drug))
            .tier(Provenance::LocalData, async { self.market_local(caller, drug) })
            .tier(Provenance::Completion, self.market_completion(drug));
        Ok(plan.run(canned::market()).await)
    }

    async fn market_workflow(&self, caller: &CallerContext, drug: &str) -> CapabilityResult<TierAnswer> {
        let mut payload = caller_fields(caller);
        payload.insert("drugName".into(), Value::String(drug.to_string()));
        let value = self.invoke_workflow_object("market-intel", Value::Object(payload)).await?;
        let report = market_from_value(&value, drug)
            .ok_or_else(|| CapabilityError::Validation("market data missing".into()))?;
        Ok(market_answer(report))
    }

    fn market_local(&self, caller: &CallerContext, drug: &str) -> CapabilityResult<TierAnswer> {
        let report = self
            .executor
            .local_market_report(&caller.shop_id, drug)?
            .ok_or_else(|| CapabilityError::Validation(format!("'{drug}' is not stocked locally")))?;
        Ok(market_answer(report))
    }

    async fn market_completion(&self, drug: &str) -> CapabilityResult<TierAnswer> {
        let request = CompletionRequest::new(make_market_messages(drug)).json();
        let raw = self.completion.complete(request).await?;
        let value = normalize_value(&raw)?;
        let report = market_from_value(&value, drug)
            .ok_or_else(|| CapabilityError::Validation("market data missing".into()))?;
        Ok(market_answer(report))
    }
}

fn market_answer(report: MarketReport) -> TierAnswer {
    TierAnswer::reply(describe_market(&report)).with_payload(StructuredPayload::Market(report))
}

fn number(value: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| match &value[*k] {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_start_matches('₹').trim().parse().ok(),
        _ => None,
    })
}

fn string(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| value[*k].as_str())
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Market report from workflow or model output. Remote substitutes carry no
/// cost, so profit and margin are zero. `None` unless the report has a price,
/// a substitute or notes.
fn market_from_value(value: &Value, drug: &str) -> Option<MarketReport> {
    if !value.is_object() {
        return None;
    }
    let average_price = number(value, &["average_price", "averagePrice", "avg_price", "price"])
        .filter(|p| *p > 0.0);
    let substitutes: Vec<SubstituteCandidate> = value["substitutes"]
        .as_array()
        .or_else(|| value["alternatives"].as_array())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let name = string(entry, &["name", "brand"])?;
                    let price = number(entry, &["price", "mrp"]).unwrap_or(0.0);
                    let savings = match average_price {
                        Some(avg) if price > 0.0 => (avg - price).max(0.0),
                        _ => 0.0,
                    };
                    Some(SubstituteCandidate {
                        name,
                        generic: string(entry, &["generic", "generic_name"]).unwrap_or_default(),
                        price,
                        margin_pct: 0.0,
                        profit: 0.0,
                        savings,
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    let notes = string(value, &["notes", "insight", "summary"]);

    if average_price.is_none() && substitutes.is_empty() && notes.is_none() {
        return None;
    }
    Some(MarketReport {
        drug: string(value, &["drug", "drugName", "name"]).unwrap_or_else(|| drug.to_string()),
        generic: string(value, &["generic", "generic_name", "genericName"]),
        average_price,
        substitutes,
        notes,
    })
}
