//! Prompts for the pharmacy assistant.
//!
//! Every structured prompt spells out the exact JSON shape expected back; the
//! parsers in [`crate::extraction`] and the core crate accept exactly these
//! shapes (plus a few field aliases).

use crate::client::ChatMessage;
use crate::extraction::DocumentType;

/// Persona shared by chat, synthesis and the offline disclaimer.
pub const PHARMACIST_PERSONA: &str = r#"You are MedLink, a clinical pharmacist assistant for an Indian retail pharmacy.
Answer briefly and precisely. Use generic names alongside brand names.
Never diagnose; for dosing or clinical decisions advise the user to confirm with a registered medical practitioner."#;

/// Tool contract presented to the router model.
pub const TOOL_ROUTER_PROMPT: &str = r#"You route pharmacy staff requests to exactly one tool.

Tools:
- check_stock {"item": string}: look up current stock of a medicine
- add_stock_draft {"items": [{"name": string, "quantity": number}]}: draft incoming stock for review
- sales_report {"days": number}: summarise recent sales
- market_lookup {"drug": string}: prices and better-margin substitutes
- redirect_to_billing {"items": [{"name": string, "quantity": number}]}: open the billing screen with items
- add_to_reorder_list {"item": string, "quantity": number}: add an item to the shortbook
- share_message {"message": string, "recipient": string|null}: open messaging with a prepared text
- save_patient_note {"patient": string, "note": string}: store a note against a patient
- direct_reply {"reply": string}: answer directly when no tool applies

Respond with JSON only: {"tool": "<tool name>", "args": {...}}"#;

/// System prompt for turning a tool result into a reply.
pub const SYNTHESIS_PROMPT: &str = r#"You are MedLink. A tool was executed for the user's request.
Using only the tool result below, write a short, friendly answer (at most four sentences).
Do not invent stock levels, prices or sales figures."#;

pub const PRESCRIPTION_PROMPT: &str = r#"Read this prescription image. Respond with JSON only:
{"patient_name": string|null, "doctor_name": string|null,
 "items": [{"name": string, "dosage": string|null, "frequency": string|null, "duration": string|null, "quantity": number}],
 "summary": string|null}
Use the brand name exactly as written. If a quantity is not written use 1."#;

pub const LAB_REPORT_PROMPT: &str = r#"Read this laboratory report. Respond with JSON only:
{"patient_name": string|null,
 "results": [{"test": string, "value": string, "unit": string|null, "reference_range": string|null, "flag": "high"|"low"|"normal"|null}],
 "summary": string}
The summary must be plain language, at most three sentences, and must not give a diagnosis."#;

pub const INVENTORY_LIST_PROMPT: &str = r#"Read this supplier invoice or handwritten stock list. Respond with JSON only:
{"items": [{"name": string, "quantity": number, "batch": string|null, "expiry": string|null, "price": number|null}]}
Quantities are in units as written. Prices are MRP per unit in rupees."#;

pub const VOICE_INTENT_PROMPT: &str = r#"Classify this pharmacy voice command (English, Hindi or Hinglish).
Respond with JSON only: {"intent": "add_stock"|"search_stock", "items": [{"name": string, "quantity": number}]}
A strip or patta is 15 tablets, a box or dabba is 10. If no quantity is spoken use 1."#;

pub const INTERACTION_PROMPT: &str = r#"You are a drug interaction checker. For the given medicines list every clinically relevant pairwise interaction.
Respond with JSON only:
{"interactions": [{"drugs": [string, string], "severity": "minor"|"moderate"|"major"|"severe", "description": string, "recommendation": string|null}]}
Use an empty list only if you are confident there are no interactions."#;

pub const COMPLIANCE_PROMPT: &str = r#"You check Indian drug regulatory status (CDSCO banned fixed-dose combinations and Schedule H1).
Respond with JSON only: {"is_banned": boolean, "is_h1": boolean, "reason": string}
If you are not certain, set both flags to false and say so in the reason."#;

pub const MARKET_PROMPT: &str = r#"You give Indian retail pharmacy market information for a medicine.
Respond with JSON only:
{"drug": string, "generic": string|null, "average_price": number|null,
 "substitutes": [{"name": string, "generic": string|null, "price": number|null}], "notes": string|null}"#;

pub const FORECAST_PROMPT: &str = r#"You forecast pharmacy demand for the next 30 days from the sales history given.
Respond with JSON only:
{"forecast": [{"item": string, "predicted_demand": number, "current_stock": number|null, "suggested_reorder": number, "rationale": string|null}]}"#;

/// Vision prompt for a document type.
pub fn document_prompt(doc_type: DocumentType) -> &'static str {
    match doc_type {
        DocumentType::Prescription => PRESCRIPTION_PROMPT,
        DocumentType::LabReport => LAB_REPORT_PROMPT,
        DocumentType::InventoryList => INVENTORY_LIST_PROMPT,
    }
}

/// Vision prompt for a chat question with an attached image.
pub fn image_question_prompt(query: &str) -> String {
    format!(
        "{PHARMACIST_PERSONA}\n\nThe user attached an image and asks:\n\"{}\"\nAnswer from what is visible in the image.",
        query.trim()
    )
}

/// Messages for the tool router: contract, few-shot pairs, trailing history,
/// then the query.
pub fn make_router_messages(query: &str, history: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(ROUTER_FEW_SHOT.len() * 2 + history.len() + 2);
    messages.push(ChatMessage::system(TOOL_ROUTER_PROMPT));
    for (input, output) in ROUTER_FEW_SHOT {
        messages.push(ChatMessage::user(*input));
        messages.push(ChatMessage::assistant(*output));
    }
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::user(query.trim()));
    messages
}

/// Messages grounding a reply in a tool result.
pub fn make_synthesis_messages(query: &str, tool: &str, tool_result: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYNTHESIS_PROMPT),
        ChatMessage::user(format!(
            "Request: {}\nTool: {}\nTool result:\n{}",
            query.trim(),
            tool,
            tool_result
        )),
    ]
}

pub fn make_voice_intent_messages(transcript: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(VOICE_INTENT_PROMPT),
        ChatMessage::user(transcript.trim()),
    ]
}

pub fn make_interaction_messages(drugs: &[String]) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(INTERACTION_PROMPT),
        ChatMessage::user(format!("Medicines: {}", drugs.join(", "))),
    ]
}

pub fn make_compliance_messages(drug: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(COMPLIANCE_PROMPT),
        ChatMessage::user(format!("Medicine: {}", drug.trim())),
    ]
}

pub fn make_market_messages(drug: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(MARKET_PROMPT),
        ChatMessage::user(format!("Medicine: {}", drug.trim())),
    ]
}

/// `sales_json` is the serialized sales history.
pub fn make_forecast_messages(sales_json: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(FORECAST_PROMPT),
        ChatMessage::user(format!("Sales history:\n{sales_json}")),
    ]
}

/// Few-shot routing examples sent after the router contract.
pub const ROUTER_FEW_SHOT: &[(&str, &str)] = &[
    (
        "Do we have Dolo 650?",
        r#"{"tool":"check_stock","args":{"item":"Dolo 650"}}"#,
    ),
    (
        "Bill 2 strips of Pan 40",
        r#"{"tool":"redirect_to_billing","args":{"items":[{"name":"Pan 40","quantity":30}]}}"#,
    ),
    (
        "Azithral khatam ho gaya, shortbook mein daal do",
        r#"{"tool":"add_to_reorder_list","args":{"item":"Azithral","quantity":1}}"#,
    ),
    (
        "What is the dose of amoxicillin for adults?",
        r#"{"tool":"direct_reply","args":{"reply":"Usual adult dose is 500 mg every 8 hours; confirm with the prescriber."}}"#,
    ),
];
