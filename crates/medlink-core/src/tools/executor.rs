use std::sync::{Arc, Mutex};

use medlink_llm::prompts::make_synthesis_messages;
use medlink_llm::{CompletionApi, CompletionRequest};
use tracing::{info, warn};

use super::{ToolInvocation, ToolName};
use crate::db::{Database, DbError, DbResult, DraftLine};
use crate::drugs::{find_better_margin_substitutes, DrugEngine, MarginPolicy};
use crate::error::{CapabilityError, CapabilityResult};
use crate::models::{ActionDirective, CallerContext, MarketReport, StockItem, StructuredPayload};

const DEFAULT_REPORT_DAYS: u32 = 7;
const STOCK_MATCHES: usize = 5;

/// What a tool produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub reply: String,
    pub directive: Option<ActionDirective>,
    pub payload: Option<StructuredPayload>,
}

impl ToolOutcome {
    fn directive(reply: String, directive: ActionDirective) -> Self {
        Self {
            reply,
            directive: Some(directive),
            payload: None,
        }
    }
}

/// Raw tool output before synthesis.
struct ToolResult {
    text: String,
    payload: Option<StructuredPayload>,
}

impl From<String> for ToolResult {
    fn from(text: String) -> Self {
        Self { text, payload: None }
    }
}

fn missing(arg: &str) -> CapabilityError {
    CapabilityError::ToolExecution(format!("missing argument '{arg}'"))
}

/// Run `f` with the store locked. The guard never outlives the call.
pub(crate) fn with_db<T>(
    db: &Mutex<Database>,
    f: impl FnOnce(&mut Database) -> DbResult<T>,
) -> CapabilityResult<T> {
    let mut guard = db.lock().map_err(DbError::from)?;
    Ok(f(&mut *guard)?)
}

/// Runs tool invocations against the local store.
pub struct ToolExecutor {
    db: Arc<Mutex<Database>>,
    completion: Arc<dyn CompletionApi>,
    drugs: Arc<DrugEngine>,
    policy: MarginPolicy,
}

impl ToolExecutor {
    pub fn new(
        db: Arc<Mutex<Database>>,
        completion: Arc<dyn CompletionApi>,
        drugs: Arc<DrugEngine>,
        policy: MarginPolicy,
    ) -> Self {
        Self {
            db,
            completion,
            drugs,
            policy,
        }
    }

    /// Execute one invocation. Side effects run once per `request_id` and are
    /// never retried; directive-only tools skip synthesis.
    pub async fn execute(
        &self,
        invocation: &ToolInvocation,
        caller: &CallerContext,
        request_id: &str,
        query: &str,
    ) -> CapabilityResult<ToolOutcome> {
        let tool = invocation.tool();
        info!(%tool, shop = %caller.shop_id, "executing tool");

        let result = match tool {
            ToolName::CheckStock => self.check_stock(invocation, caller)?,
            ToolName::AddStockDraft => self.add_stock_draft(invocation, caller, request_id)?,
            ToolName::SalesReport => self.sales_report(invocation, caller)?,
            ToolName::MarketLookup => self.market_lookup(invocation, caller)?,
            ToolName::SavePatientNote => self.save_patient_note(invocation, caller, request_id)?,
            ToolName::RedirectToBilling => return self.redirect_to_billing(invocation),
            ToolName::AddToReorderList => return self.add_to_reorder_list(invocation, caller, request_id),
            ToolName::ShareMessage => return self.share_message(invocation),
            ToolName::DirectReply => return self.direct_reply(invocation),
        };

        Ok(ToolOutcome {
            reply: self.synthesize(query, tool, &result.text).await,
            directive: None,
            payload: result.payload,
        })
    }

    /// Ground a reply in the tool result; falls back to the raw result text.
    async fn synthesize(&self, query: &str, tool: ToolName, text: &str) -> String {
        let request = CompletionRequest::new(make_synthesis_messages(query, tool.as_str(), text));
        match self.completion.complete(request).await {
            Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
            Ok(_) => text.to_string(),
            Err(e) => {
                warn!(%tool, error = %e, "synthesis failed, returning raw tool result");
                text.to_string()
            }
        }
    }

    // =====================================================================
    // Read-only tools
    // =====================================================================

    fn check_stock(&self, inv: &ToolInvocation, caller: &CallerContext) -> CapabilityResult<ToolResult> {
        let item = inv.str_arg(&["item", "name", "drug", "query"]).ok_or_else(|| missing("item"))?;
        let generic = self.drugs.canonicalize(item).ok().map(|e| e.generic);

        let found = with_db(&self.db, |db| {
            let mut found = db.find_stock(&caller.shop_id, item, STOCK_MATCHES)?;
            if found.is_empty() {
                if let Some(generic) = &generic {
                    found = db.find_stock(&caller.shop_id, generic, STOCK_MATCHES)?;
                }
            }
            Ok(found)
        })?;

        if found.is_empty() {
            return Ok(format!("No stock found for '{item}'.").into());
        }
        let lines: Vec<String> = found
            .iter()
            .map(|s| format!("{}: {} units at ₹{:.2}", s.name, s.quantity, s.sale_price))
            .collect();
        Ok(format!("Stock matching '{item}':\n{}", lines.join("\n")).into())
    }

    fn sales_report(&self, inv: &ToolInvocation, caller: &CallerContext) -> CapabilityResult<ToolResult> {
        let days = inv
            .u32_arg(&["days", "period"])
            .unwrap_or(DEFAULT_REPORT_DAYS)
            .min(365);
        let summary = with_db(&self.db, |db| db.sales_summary(&caller.shop_id, days))?;

        let mut text = format!(
            "Last {} days: {} bills, {} units, revenue ₹{:.2}.",
            summary.days, summary.bills, summary.units, summary.revenue
        );
        if !summary.top_items.is_empty() {
            let top: Vec<String> = summary
                .top_items
                .iter()
                .map(|(name, units)| format!("{name} ({units})"))
                .collect();
            text.push_str(&format!(" Top sellers: {}.", top.join(", ")));
        }
        Ok(text.into())
    }

    fn market_lookup(&self, inv: &ToolInvocation, caller: &CallerContext) -> CapabilityResult<ToolResult> {
        let drug = inv.str_arg(&["drug", "item", "name"]).ok_or_else(|| missing("drug"))?;
        match self.local_market_report(&caller.shop_id, drug)? {
            Some(report) => Ok(ToolResult {
                text: describe_market(&report),
                payload: Some(StructuredPayload::Market(report)),
            }),
            None => Ok(format!("'{drug}' is not in this shop's inventory.").into()),
        }
    }

    /// Price and better-margin substitutes from the shop's own inventory.
    /// `None` when the drug is not stocked.
    pub fn local_market_report(&self, shop_id: &str, drug: &str) -> CapabilityResult<Option<MarketReport>> {
        let fallback_generic = self.drugs.canonicalize(drug).ok().map(|e| e.generic);

        let found = with_db(&self.db, |db| {
            let Some(reference) = db.find_stock(shop_id, drug, 1)?.into_iter().next() else {
                return Ok(None);
            };
            let generic = reference.generic_name.clone().or(fallback_generic);
            let pool = db.related_stock(shop_id, generic.as_deref(), reference.composition.as_deref())?;
            Ok(Some((reference, generic, pool)))
        })?;
        let Some((reference, generic, pool)) = found else {
            return Ok(None);
        };

        let substitutes = find_better_margin_substitutes(&reference, &pool, &self.policy);
        let mut priced: Vec<&StockItem> = pool.iter().collect();
        if !pool.iter().any(|s| s.id == reference.id) {
            priced.push(&reference);
        }
        let prices: Vec<f64> = priced
            .iter()
            .map(|s| s.sale_price)
            .filter(|p| *p > 0.0)
            .collect();
        let average_price = (!prices.is_empty()).then(|| prices.iter().sum::<f64>() / prices.len() as f64);
        let notes = (!substitutes.is_empty()).then(|| {
            format!("{} better-margin substitutes in stock.", substitutes.len())
        });

        Ok(Some(MarketReport {
            drug: reference.name,
            generic,
            average_price,
            substitutes,
            notes,
        }))
    }

    // =====================================================================
    // Side-effecting tools
    // =====================================================================

    fn add_stock_draft(
        &self,
        inv: &ToolInvocation,
        caller: &CallerContext,
        request_id: &str,
    ) -> CapabilityResult<ToolResult> {
        let lines: Vec<DraftLine> = inv
            .items_arg()
            .into_iter()
            .map(|item| DraftLine::new(item.name, item.quantity))
            .collect();
        if lines.is_empty() {
            return Err(missing("items"));
        }
        let key = inv.idempotency_key(caller, request_id);
        let written = with_db(&self.db, |db| db.insert_stock_drafts(&caller.shop_id, &key, &lines))?;

        let listed: Vec<String> = lines
            .iter()
            .map(|l| format!("{} x{}", l.item_name, l.quantity))
            .collect();
        Ok(if written {
            format!("Drafted for review: {}.", listed.join(", "))
        } else {
            format!("Already drafted: {}.", listed.join(", "))
        }
        .into())
    }

    fn save_patient_note(
        &self,
        inv: &ToolInvocation,
        caller: &CallerContext,
        request_id: &str,
    ) -> CapabilityResult<ToolResult> {
        let patient = inv.str_arg(&["patient", "patient_name", "name"]).ok_or_else(|| missing("patient"))?;
        let note = inv.str_arg(&["note", "text"]).ok_or_else(|| missing("note"))?;
        let key = inv.idempotency_key(caller, request_id);
        let written = with_db(&self.db, |db| db.save_patient_note(&caller.shop_id, &key, patient, note))?;
        Ok(if written {
            format!("Saved note for {patient}: {note}")
        } else {
            format!("Note for {patient} was already saved.")
        }
        .into())
    }

    fn add_to_reorder_list(
        &self,
        inv: &ToolInvocation,
        caller: &CallerContext,
        request_id: &str,
    ) -> CapabilityResult<ToolOutcome> {
        let item = inv.str_arg(&["item", "name", "drug"]).ok_or_else(|| missing("item"))?;
        let quantity = inv.u32_arg(&["quantity", "qty"]).unwrap_or(1);
        let key = inv.idempotency_key(caller, request_id);
        let written = with_db(&self.db, |db| db.add_to_reorder_list(&caller.shop_id, &key, item, quantity))?;

        let reply = if written {
            format!("Added {item} x{quantity} to the reorder list.")
        } else {
            format!("{item} is already on the reorder list.")
        };
        Ok(ToolOutcome::directive(
            reply,
            ActionDirective::AddToReorderList {
                item: item.to_string(),
                quantity,
            },
        ))
    }

    // =====================================================================
    // Directive-only and direct tools
    // =====================================================================

    fn redirect_to_billing(&self, inv: &ToolInvocation) -> CapabilityResult<ToolOutcome> {
        let items = inv.items_arg();
        if items.is_empty() {
            return Err(missing("items"));
        }
        let listed: Vec<String> = items.iter().map(|i| format!("{} x{}", i.name, i.quantity)).collect();
        Ok(ToolOutcome::directive(
            format!("Opening billing with {}.", listed.join(", ")),
            ActionDirective::NavigateToBilling { items },
        ))
    }

    fn share_message(&self, inv: &ToolInvocation) -> CapabilityResult<ToolOutcome> {
        let message = inv.str_arg(&["message", "text"]).ok_or_else(|| missing("message"))?;
        let recipient = inv.str_arg(&["recipient", "to", "phone"]).map(str::to_string);
        Ok(ToolOutcome::directive(
            "Message ready to share.".to_string(),
            ActionDirective::OpenMessaging {
                message: message.to_string(),
                recipient,
            },
        ))
    }

    fn direct_reply(&self, inv: &ToolInvocation) -> CapabilityResult<ToolOutcome> {
        let reply = inv
            .str_arg(&["reply", "message", "text"])
            .ok_or_else(|| CapabilityError::ToolExecution("empty direct reply".into()))?;
        Ok(ToolOutcome {
            reply: reply.to_string(),
            directive: None,
            payload: None,
        })
    }
}

pub(crate) fn describe_market(report: &MarketReport) -> String {
    let mut text = report.drug.clone();
    if let Some(generic) = &report.generic {
        text.push_str(&format!(" ({generic})"));
    }
    if let Some(avg) = report.average_price {
        text.push_str(&format!(", average shelf price ₹{avg:.2}"));
    }
    text.push('.');
    if report.substitutes.is_empty() {
        text.push_str(" No better-margin substitute in stock.");
    } else {
        for sub in &report.substitutes {
            // Remote reports carry no cost data.
            if sub.profit == 0.0 && sub.margin_pct == 0.0 {
                text.push_str(&format!("\n- {}: ₹{:.2}", sub.name, sub.price));
                continue;
            }
            text.push_str(&format!(
                "\n- {}: ₹{:.2}, profit ₹{:.2} ({:.0}% margin), customer saves ₹{:.2}",
                sub.name, sub.price, sub.profit, sub.margin_pct, sub.savings
            ));
        }
    }
    text
}
