//! Structured extraction types parsed from vision and speech model output.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{LlmError, LlmResult};
use crate::normalizer::normalize;

/// Kind of document submitted for analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Prescription,
    LabReport,
    /// Supplier invoice or handwritten stock list.
    InventoryList,
}

impl DocumentType {
    /// Workflow endpoint that handles this document type.
    pub fn workflow_endpoint(&self) -> &'static str {
        match self {
            DocumentType::Prescription => "analyze-prescription",
            DocumentType::LabReport => "analyze-report",
            DocumentType::InventoryList => "analyze-inventory",
        }
    }
}

/// A line item read from a prescription or invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedItem {
    #[serde(alias = "medicine", alias = "drug", alias = "item")]
    pub name: String,
    #[serde(default = "one", deserialize_with = "lenient_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub dosage: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub batch: Option<String>,
    #[serde(default)]
    pub expiry: Option<String>,
    #[serde(default, alias = "mrp", deserialize_with = "lenient_price")]
    pub price: Option<f64>,
}

/// A single lab test value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabResult {
    #[serde(alias = "name")]
    pub test: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub value: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default, alias = "range")]
    pub reference_range: Option<String>,
    /// "high", "low" or "normal" when the model can tell.
    #[serde(default, alias = "status")]
    pub flag: Option<String>,
}

/// Structured result of document analysis.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentExtraction {
    #[serde(default, alias = "medicines", alias = "medications")]
    pub items: Vec<ExtractedItem>,
    #[serde(default, alias = "tests")]
    pub results: Vec<LabResult>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub doctor_name: Option<String>,
}

impl DocumentExtraction {
    /// A usable extraction has at least one item, lab result or summary.
    pub fn is_usable(&self) -> bool {
        !self.items.is_empty()
            || !self.results.is_empty()
            || self.summary.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

/// What the speaker wants to do with the items in a voice order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceIntentKind {
    #[default]
    AddStock,
    SearchStock,
}

/// A spoken (item, quantity) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceItem {
    #[serde(alias = "item", alias = "medicine")]
    pub name: String,
    #[serde(default = "one", deserialize_with = "lenient_quantity")]
    pub quantity: u32,
}

/// Intent classification of a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VoiceIntent {
    #[serde(default, alias = "action")]
    pub intent: VoiceIntentKind,
    #[serde(default)]
    pub items: Vec<VoiceItem>,
}

/// Parse vision output into a document extraction.
pub fn parse_document(raw: &str) -> LlmResult<DocumentExtraction> {
    let extraction = normalize(raw, DocumentExtraction::default()).into_result()?;
    if !extraction.is_usable() {
        return Err(LlmError::Validation("document extraction contained no data".into()));
    }
    Ok(extraction)
}

/// Parse intent-classification output; items without a name are dropped.
pub fn parse_voice_intent(raw: &str) -> LlmResult<VoiceIntent> {
    let mut intent = normalize(raw, VoiceIntent::default()).into_result()?;
    intent.items.retain(|item| !item.name.trim().is_empty());
    for item in &mut intent.items {
        item.name = item.name.trim().to_string();
        item.quantity = item.quantity.max(1);
    }
    Ok(intent)
}

fn one() -> u32 {
    1
}

/// Accept `2`, `2.0`, `"2"`, `"2 strips"` or `null`; anything unusable is 1.
fn lenient_quantity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let quantity = match value {
        Value::Number(n) => n.as_f64().map(|f| f.round() as i64),
        Value::String(s) => s
            .split_whitespace()
            .next()
            .and_then(|t| t.parse::<f64>().ok())
            .map(|f| f.round() as i64),
        _ => None,
    };
    Ok(quantity
        .filter(|q| *q > 0)
        .and_then(|q| u32::try_from(q).ok())
        .unwrap_or(1))
}

fn lenient_price<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .trim_start_matches(['₹', '$'])
            .trim_start_matches("Rs.")
            .trim()
            .parse::<f64>()
            .ok(),
        _ => None,
    })
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prescription() {
        let raw = r#"```json
{"patient_name":"R. Sharma","doctor_name":"Dr. Rao","medicines":[
  {"name":"Dolo 650","dosage":"650mg","frequency":"1-0-1","duration":"5 days","quantity":"10"},
  {"name":"Pan 40","quantity":null}
]}
```"#;
        let doc = parse_document(raw).unwrap();
        assert_eq!(doc.items.len(), 2);
        assert_eq!(doc.items[0].quantity, 10);
        assert_eq!(doc.items[1].quantity, 1);
        assert_eq!(doc.patient_name.as_deref(), Some("R. Sharma"));
    }

    #[test]
    fn test_parse_lab_report() {
        let raw = r#"{"summary":"Mild anaemia","results":[{"test":"Hemoglobin","value":10.9,"unit":"g/dL","flag":"low"}]}"#;
        let doc = parse_document(raw).unwrap();
        assert_eq!(doc.results[0].value, "10.9");
        assert_eq!(doc.results[0].flag.as_deref(), Some("low"));
    }

    #[test]
    fn test_parse_invoice_prices() {
        let raw = r#"{"items":[{"item":"Crocin","quantity":3,"mrp":"₹ 30.5","batch":"B12","expiry":"2026-08"}]}"#;
        let doc = parse_document(raw).unwrap();
        assert_eq!(doc.items[0].name, "Crocin");
        assert_eq!(doc.items[0].price, Some(30.5));
    }

    #[test]
    fn test_empty_extraction_rejected() {
        assert!(parse_document(r#"{"items":[]}"#).is_err());
        assert!(parse_document("I cannot read this image").is_err());
    }

    #[test]
    fn test_parse_voice_intent_defaults() {
        let raw = r#"{"intent":"add_stock","items":[{"name":" Dolo 650 "},{"name":"Crocin","quantity":2},{"name":""}]}"#;
        let intent = parse_voice_intent(raw).unwrap();
        assert_eq!(intent.intent, VoiceIntentKind::AddStock);
        assert_eq!(intent.items.len(), 2);
        assert_eq!(intent.items[0], VoiceItem { name: "Dolo 650".into(), quantity: 1 });
        assert_eq!(intent.items[1].quantity, 2);
    }

    #[test]
    fn test_parse_voice_search_intent() {
        let intent = parse_voice_intent(r#"{"action":"search_stock","items":[{"item":"azithral"}]}"#)
            .unwrap();
        assert_eq!(intent.intent, VoiceIntentKind::SearchStock);
        assert_eq!(intent.items[0].name, "azithral");
    }

    #[test]
    fn test_workflow_endpoints() {
        assert_eq!(DocumentType::Prescription.workflow_endpoint(), "analyze-prescription");
        assert_eq!(DocumentType::LabReport.workflow_endpoint(), "analyze-report");
    }
}
