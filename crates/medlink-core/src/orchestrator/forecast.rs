use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate};
use medlink_llm::prompts::make_forecast_messages;
use medlink_llm::{normalize_value, CompletionRequest};
use serde_json::Value;

use super::plan::{TierAnswer, TierPlan};
use super::{caller_fields, canned, Orchestrator};
use crate::error::{CapabilityError, CapabilityResult, RateLimited};
use crate::models::{
    CallerContext, CapabilityKind, CapabilityResponse, ForecastEntry, Provenance, SaleRecord,
    StructuredPayload,
};
use crate::tools::with_db;

/// Days ahead being forecast, and the most history averaged over.
pub const FORECAST_HORIZON_DAYS: i64 = 30;

impl Orchestrator {
    /// 30-day demand forecast. Tiers: workflow, completion, moving average
    /// over the supplied history.
    pub async fn get_inventory_forecast(
        &self,
        caller: &CallerContext,
        sales: &[SaleRecord],
    ) -> Result<CapabilityResponse, RateLimited> {
        self.admit(CapabilityKind::Forecast)?;
        let has_sales = !sales.is_empty();

        let plan = TierPlan::new(CapabilityKind::Forecast)
            .tier_if(
                has_sales && self.has_workflow(),
                Provenance::Workflow,
                self.forecast_workflow(caller, sales),
            )
            .tier_if(has_sales, Provenance::Completion, self.forecast_completion(sales))
            .tier(Provenance::Offline, async { self.forecast_offline(caller, sales) });
        Ok(plan.run(canned::forecast()).await)
    }

    async fn forecast_workflow(&self, caller: &CallerContext, sales: &[SaleRecord]) -> CapabilityResult<TierAnswer> {
        let history = serde_json::to_value(sales).map_err(|e| CapabilityError::Validation(e.to_string()))?;
        let mut payload = caller_fields(caller);
        payload.insert("salesHistory".into(), history);
        let value = self.invoke_workflow("forecast", Value::Object(payload)).await?;
        forecast_answer(forecast_from_value(&value)?, false)
    }

    async fn forecast_completion(&self, sales: &[SaleRecord]) -> CapabilityResult<TierAnswer> {
        let history = serde_json::to_string(sales).map_err(|e| CapabilityError::Validation(e.to_string()))?;
        let request = CompletionRequest::new(make_forecast_messages(&history)).json();
        let raw = self.completion.complete(request).await?;
        let value = normalize_value(&raw)?;
        forecast_answer(forecast_from_value(&value)?, false)
    }

    fn forecast_offline(&self, caller: &CallerContext, sales: &[SaleRecord]) -> CapabilityResult<TierAnswer> {
        let mut entries = moving_average(sales);
        if entries.is_empty() {
            return Err(CapabilityError::Validation("no dated sales to average".into()));
        }
        with_db(&self.db, |db| {
            for entry in &mut entries {
                let stock = db
                    .find_stock(&caller.shop_id, &entry.item, 1)?
                    .first()
                    .map_or(0, |s| s.quantity.max(0));
                entry.current_stock = Some(stock);
                entry.suggested_reorder = reorder_for(entry.predicted_demand, stock);
            }
            Ok(())
        })?;
        forecast_answer(entries, true)
    }
}

fn reorder_for(predicted: u32, stock: i64) -> u32 {
    u32::try_from((i64::from(predicted) - stock).max(0)).unwrap_or(u32::MAX)
}

fn forecast_answer(entries: Vec<ForecastEntry>, offline: bool) -> CapabilityResult<TierAnswer> {
    if entries.is_empty() {
        return Err(CapabilityError::Validation("forecast contained no items".into()));
    }
    let mut lines: Vec<String> = entries
        .iter()
        .map(|e| {
            format!(
                "{}: expect {} in {FORECAST_HORIZON_DAYS} days, reorder {}",
                e.item, e.predicted_demand, e.suggested_reorder
            )
        })
        .collect();
    if offline {
        lines.insert(0, "Offline estimate from recent sales:".to_string());
    }
    Ok(TierAnswer::reply(lines.join("\n")).with_payload(StructuredPayload::Forecast(entries)))
}

fn sale_date(sold_at: &str) -> Option<NaiveDate> {
    let s = sold_at.trim();
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.date_naive())
        .ok()
        .or_else(|| NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok())
}

/// Units per day over at most the last 30 days of history (measured back
/// from the latest sale), projected over the next 30 days. Sales without a
/// readable date are ignored.
pub fn moving_average(sales: &[SaleRecord]) -> Vec<ForecastEntry> {
    let dated: Vec<(NaiveDate, &SaleRecord)> = sales
        .iter()
        .filter(|s| !s.item.trim().is_empty())
        .filter_map(|s| sale_date(&s.sold_at).map(|d| (d, s)))
        .collect();
    let Some(latest) = dated.iter().map(|(d, _)| *d).max() else {
        return Vec::new();
    };
    let window_start = latest - chrono::Duration::days(FORECAST_HORIZON_DAYS - 1);
    let in_window: Vec<&(NaiveDate, &SaleRecord)> =
        dated.iter().filter(|(d, _)| *d >= window_start).collect();

    let earliest = in_window.iter().map(|(d, _)| *d).min().unwrap_or(latest);
    let days = ((latest - earliest).num_days() + 1).clamp(1, FORECAST_HORIZON_DAYS);

    // Keyed case-insensitively; the first spelling seen is kept.
    let mut totals: BTreeMap<String, (String, u64)> = BTreeMap::new();
    for (_, sale) in in_window {
        let name = sale.item.trim();
        let slot = totals
            .entry(name.to_lowercase())
            .or_insert_with(|| (name.to_string(), 0));
        slot.1 += u64::from(sale.quantity);
    }

    let mut entries: Vec<ForecastEntry> = totals
        .into_values()
        .map(|(item, units)| {
            let predicted = (units as f64 * FORECAST_HORIZON_DAYS as f64 / days as f64).ceil();
            let predicted_demand = if predicted >= f64::from(u32::MAX) { u32::MAX } else { predicted as u32 };
            ForecastEntry {
                item,
                predicted_demand,
                current_stock: None,
                suggested_reorder: predicted_demand,
                rationale: Some(format!("{units} units sold over {days} days")),
            }
        })
        .collect();
    entries.sort_by(|a, b| b.predicted_demand.cmp(&a.predicted_demand).then_with(|| a.item.cmp(&b.item)));
    entries
}

fn whole(value: &Value) -> Option<u32> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (n.is_finite() && n >= 0.0).then(|| n.round().min(f64::from(u32::MAX)) as u32)
}

/// Entries from `{"forecast": [...]}` or a bare array. Entries without an
/// item or a predicted demand are dropped.
fn forecast_from_value(value: &Value) -> CapabilityResult<Vec<ForecastEntry>> {
    let entries = match value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("forecast").or_else(|| map.get("predictions")) {
            Some(Value::Array(items)) => items,
            _ => return Err(CapabilityError::Validation("forecast list missing".into())),
        },
        _ => return Err(CapabilityError::Validation("forecast list missing".into())),
    };

    Ok(entries
        .iter()
        .filter_map(|entry| {
            let item = ["item", "name", "drug"]
                .iter()
                .filter_map(|k| entry[*k].as_str())
                .map(str::trim)
                .find(|s| !s.is_empty())?
                .to_string();
            let predicted_demand = ["predicted_demand", "predicted", "demand"]
                .iter()
                .find_map(|k| whole(&entry[*k]))?;
            let current_stock = whole(&entry["current_stock"]).map(i64::from);
            let suggested_reorder = ["suggested_reorder", "reorder", "reorder_quantity"]
                .iter()
                .find_map(|k| whole(&entry[*k]))
                .unwrap_or_else(|| reorder_for(predicted_demand, current_stock.unwrap_or(0)));
            Some(ForecastEntry {
                item,
                predicted_demand,
                current_stock,
                suggested_reorder,
                rationale: entry["rationale"].as_str().map(str::to_string),
            })
        })
        .collect())
}
