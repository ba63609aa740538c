//! Natural-language requests → one local tool.
//!
//! [`ToolRouter`] asks the completion model for a `{"tool", "args"}` object;
//! [`ToolExecutor`] dispatches it against the local store and drug engine.

mod executor;
mod router;

pub use executor::*;
pub use router::*;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::db::idempotency_key;
use crate::models::{BillItem, CallerContext};

/// The closed tool set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    CheckStock,
    AddStockDraft,
    SalesReport,
    MarketLookup,
    RedirectToBilling,
    AddToReorderList,
    ShareMessage,
    SavePatientNote,
    DirectReply,
}

impl ToolName {
    pub const ALL: [ToolName; 9] = [
        ToolName::CheckStock,
        ToolName::AddStockDraft,
        ToolName::SalesReport,
        ToolName::MarketLookup,
        ToolName::RedirectToBilling,
        ToolName::AddToReorderList,
        ToolName::ShareMessage,
        ToolName::SavePatientNote,
        ToolName::DirectReply,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::CheckStock => "check_stock",
            ToolName::AddStockDraft => "add_stock_draft",
            ToolName::SalesReport => "sales_report",
            ToolName::MarketLookup => "market_lookup",
            ToolName::RedirectToBilling => "redirect_to_billing",
            ToolName::AddToReorderList => "add_to_reorder_list",
            ToolName::ShareMessage => "share_message",
            ToolName::SavePatientNote => "save_patient_note",
            ToolName::DirectReply => "direct_reply",
        }
    }

    /// Accepts `check_stock`, `check-stock`, `Check Stock`, `checkStock`.
    pub fn parse(label: &str) -> Option<Self> {
        let key: String = label
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        Self::ALL
            .into_iter()
            .find(|tool| tool.as_str().replace('_', "") == key)
            .or_else(|| match key.as_str() {
                "reply" | "answer" | "respond" => Some(ToolName::DirectReply),
                "billing" | "bill" => Some(ToolName::RedirectToBilling),
                "reorder" | "shortbook" => Some(ToolName::AddToReorderList),
                _ => None,
            })
    }

    /// Writes to the local store.
    pub fn has_side_effect(&self) -> bool {
        matches!(
            self,
            ToolName::AddStockDraft | ToolName::AddToReorderList | ToolName::SavePatientNote
        )
    }

    /// Returns a UI directive without a synthesis call.
    pub fn is_directive_only(&self) -> bool {
        matches!(
            self,
            ToolName::RedirectToBilling | ToolName::ShareMessage | ToolName::AddToReorderList
        )
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A routed tool call. Only the router constructs these.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocation {
    tool: ToolName,
    args: Map<String, Value>,
}

impl ToolInvocation {
    pub(crate) fn new(tool: ToolName, args: Map<String, Value>) -> Self {
        Self { tool, args }
    }

    pub(crate) fn direct_reply(reply: impl Into<String>) -> Self {
        let mut args = Map::new();
        args.insert("reply".to_string(), Value::String(reply.into()));
        Self::new(ToolName::DirectReply, args)
    }

    pub fn tool(&self) -> ToolName {
        self.tool
    }

    pub fn args(&self) -> &Map<String, Value> {
        &self.args
    }

    /// First non-empty string among `keys`.
    pub fn str_arg(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|k| self.args.get(*k).and_then(Value::as_str))
            .map(str::trim)
            .find(|s| !s.is_empty())
    }

    /// First positive integer among `keys`; numeric strings are accepted.
    pub fn u32_arg(&self, keys: &[&str]) -> Option<u32> {
        keys.iter()
            .filter_map(|k| self.args.get(*k))
            .find_map(lenient_u32)
    }

    /// `items: [{name, quantity}]`, or a single `item`/`name` + `quantity`.
    pub fn items_arg(&self) -> Vec<BillItem> {
        if let Some(Value::Array(items)) = self.args.get("items") {
            return items
                .iter()
                .filter_map(|item| match item {
                    Value::String(name) => Some(BillItem::new(name.trim(), 1)),
                    Value::Object(obj) => {
                        let name = ["name", "item", "medicine"]
                            .iter()
                            .find_map(|k| obj.get(*k).and_then(Value::as_str))?;
                        let quantity = obj.get("quantity").and_then(lenient_u32).unwrap_or(1);
                        Some(BillItem::new(name.trim(), quantity))
                    }
                    _ => None,
                })
                .filter(|item| !item.name.is_empty())
                .collect();
        }
        match self.str_arg(&["item", "name"]) {
            Some(name) => vec![BillItem::new(name, self.u32_arg(&["quantity"]).unwrap_or(1))],
            None => Vec::new(),
        }
    }

    /// Stable per caller, request and invocation: a replayed request writes
    /// once, a new request with the same arguments writes again.
    pub fn idempotency_key(&self, caller: &CallerContext, request_id: &str) -> String {
        let sorted: BTreeMap<&String, &Value> = self.args.iter().collect();
        let args = serde_json::to_string(&sorted).unwrap_or_default();
        idempotency_key(&[
            &caller.user_id,
            &caller.shop_id,
            request_id,
            self.tool.as_str(),
            &args,
        ])
    }
}

fn lenient_u32(value: &Value) -> Option<u32> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.split_whitespace().next()?.parse::<f64>().ok()?,
        _ => return None,
    };
    let n = n.round();
    (n >= 1.0 && n <= u32::MAX as f64).then_some(n as u32)
}
