//! Response normalizer.
//!
//! Coerces free-form model or workflow output into a typed structure. Parsing is
//! attempted in three stages:
//!
//! 1. the raw text as-is
//! 2. the text with code-fence markers and surrounding whitespace stripped
//! 3. the largest balanced `{...}` / `[...]` substring
//!
//! If every stage fails the caller-supplied fallback is returned. Normalization
//! never panics and never returns an error; explicit upstream error envelopes
//! are surfaced as [`Normalized::UpstreamError`] instead of being treated as
//! content.

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{LlmError, LlmResult};

/// An error reported inside an otherwise well-formed payload.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamFault {
    pub status: Option<u16>,
    pub message: String,
}

impl From<UpstreamFault> for LlmError {
    fn from(fault: UpstreamFault) -> Self {
        LlmError::upstream(fault.status, fault.message)
    }
}

/// Outcome of normalizing a raw response.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized<T> {
    /// The text parsed into `T`.
    Structured(T),
    /// Nothing parseable was found; carries the caller's fallback.
    Fallback(T),
    /// The payload was an explicit error envelope.
    UpstreamError { fault: UpstreamFault, fallback: T },
}

impl<T> Normalized<T> {
    pub fn is_structured(&self) -> bool {
        matches!(self, Normalized::Structured(_))
    }

    /// The parsed value, or the fallback for the non-happy paths.
    pub fn into_value(self) -> T {
        match self {
            Normalized::Structured(v) | Normalized::Fallback(v) => v,
            Normalized::UpstreamError { fallback, .. } => fallback,
        }
    }

    /// Only a successfully parsed value counts as `Ok`.
    pub fn into_result(self) -> LlmResult<T> {
        match self {
            Normalized::Structured(v) => Ok(v),
            Normalized::Fallback(_) => Err(LlmError::Validation(
                "response did not contain the expected structure".into(),
            )),
            Normalized::UpstreamError { fault, .. } => Err(fault.into()),
        }
    }
}

/// Normalize `raw` into `T`, degrading to `fallback`.
pub fn normalize<T: DeserializeOwned>(raw: &str, fallback: T) -> Normalized<T> {
    let stripped = strip_code_fences(raw);
    let stages = [Some(raw), Some(stripped.as_str()), largest_balanced(raw)];

    for text in stages.into_iter().flatten() {
        match attempt::<T>(text) {
            Attempt::Parsed(v) => return Normalized::Structured(v),
            Attempt::Fault(fault) => return Normalized::UpstreamError { fault, fallback },
            Attempt::Miss => {}
        }
    }

    Normalized::Fallback(fallback)
}

/// Normalize into an untyped JSON value; anything but a parsed value is an error.
pub fn normalize_value(raw: &str) -> LlmResult<Value> {
    normalize::<Value>(raw, Value::Null).into_result()
}

enum Attempt<T> {
    Parsed(T),
    Fault(UpstreamFault),
    Miss,
}

fn attempt<T: DeserializeOwned>(text: &str) -> Attempt<T> {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return Attempt::Miss;
    };
    if let Some(fault) = detect_error_envelope(&value) {
        return Attempt::Fault(fault);
    }
    match serde_json::from_value::<T>(value) {
        Ok(v) => Attempt::Parsed(v),
        Err(_) => Attempt::Miss,
    }
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").expect("fence pattern is valid")
    })
}

/// Remove markdown code-fence markers and surrounding whitespace.
pub fn strip_code_fences(raw: &str) -> String {
    if let Some(inner) = fence_regex().captures(raw).and_then(|c| c.get(1)) {
        return inner.as_str().trim().to_string();
    }

    // Unterminated fence (truncated output): drop the opening marker line.
    let trimmed = raw.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let body = rest
                .trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            body.trim_end_matches("```").trim().to_string()
        }
        None => trimmed.to_string(),
    }
}

/// Find the longest balanced `{...}` or `[...]` span, ignoring brackets inside
/// JSON strings. Single pass; a mismatched closer abandons every open span.
pub fn largest_balanced(text: &str) -> Option<&str> {
    let mut open: Vec<(u8, usize)> = Vec::new();
    let mut best: Option<(usize, usize)> = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in text.as_bytes().iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            // Quotes only matter inside a candidate span.
            b'"' if !open.is_empty() => in_string = true,
            b'{' => open.push((b'}', i)),
            b'[' => open.push((b']', i)),
            b'}' | b']' => match open.pop() {
                Some((expected, start)) if expected == b => {
                    let len = i + 1 - start;
                    if best.map_or(true, |(s, e)| len > e - s) {
                        best = Some((start, i + 1));
                    }
                }
                Some(_) => open.clear(),
                None => {}
            },
            _ => {}
        }
    }

    best.map(|(s, e)| &text[s..e])
}

/// Detect `{"error": ...}`, `{"errorMessage": ...}` and
/// `{"success": false, "message": ...}` envelopes.
pub fn detect_error_envelope(value: &Value) -> Option<UpstreamFault> {
    let obj = value.as_object()?;

    let status = ["status", "statusCode", "code"]
        .iter()
        .filter_map(|k| obj.get(*k))
        .find_map(Value::as_u64)
        .and_then(|s| u16::try_from(s).ok());

    let message_field = || {
        obj.get("message")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    };

    if let Some(error) = obj.get("error") {
        let message = match error {
            Value::Null | Value::Bool(false) => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Bool(true) => Some(message_field().unwrap_or_else(|| "error flag set".into())),
            Value::Object(inner) => {
                let inner_status = inner
                    .get("code")
                    .or_else(|| inner.get("status"))
                    .and_then(Value::as_u64)
                    .and_then(|s| u16::try_from(s).ok());
                let message = inner
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| error.to_string());
                return Some(UpstreamFault {
                    status: inner_status.or(status),
                    message,
                });
            }
            other => Some(other.to_string()),
        };
        if let Some(message) = message {
            return Some(UpstreamFault { status, message });
        }
    }

    if let Some(message) = obj.get("errorMessage").and_then(Value::as_str) {
        if !message.trim().is_empty() {
            return Some(UpstreamFault {
                status,
                message: message.to_string(),
            });
        }
    }

    if obj.get("success") == Some(&Value::Bool(false)) {
        return Some(UpstreamFault {
            status,
            message: message_field().unwrap_or_else(|| "upstream reported failure".into()),
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq, Default)]
    struct Reply {
        reply: String,
    }

    #[test]
    fn test_direct_parse() {
        let out = normalize(r#"{"reply":"hello"}"#, Reply::default());
        assert_eq!(out, Normalized::Structured(Reply { reply: "hello".into() }));
    }

    #[test]
    fn test_fenced_equals_unwrapped() {
        let plain = normalize::<Value>(r#"{"a":1,"b":[1,2]}"#, Value::Null);
        let fenced = normalize::<Value>("```json\n{\"a\":1,\"b\":[1,2]}\n```", Value::Null);
        let bare_fence = normalize::<Value>("```\n{\"a\":1,\"b\":[1,2]}\n```", Value::Null);
        assert!(plain.is_structured());
        assert_eq!(plain, fenced);
        assert_eq!(plain, bare_fence);
    }

    #[test]
    fn test_unterminated_fence() {
        let out = normalize::<Value>("```json\n{\"a\":1}", Value::Null);
        assert_eq!(out, Normalized::Structured(serde_json::json!({"a": 1})));
    }

    #[test]
    fn test_prose_wrapped_json() {
        let raw = "Sure! Here is the result:\n{\"reply\":\"ok {not a brace}\"}\nHope this helps.";
        let out = normalize(raw, Reply::default());
        assert_eq!(out.into_value().reply, "ok {not a brace}");
    }

    #[test]
    fn test_garbage_returns_fallback() {
        let fallback = Reply { reply: "fallback".into() };
        let out = normalize("definitely not json }{", Reply { reply: "fallback".into() });
        assert_eq!(out, Normalized::Fallback(fallback));
    }

    #[test]
    fn test_wrong_shape_returns_fallback() {
        let out = normalize(r#"{"other": 1}"#, Reply { reply: "fb".into() });
        assert!(matches!(out, Normalized::Fallback(ref r) if r.reply == "fb"));
        assert!(out.into_result().is_err());
    }

    #[test]
    fn test_error_envelope_detected() {
        let out = normalize(r#"{"error":{"code":429,"message":"quota exceeded"}}"#, Reply::default());
        match out {
            Normalized::UpstreamError { fault, .. } => {
                assert_eq!(fault.status, Some(429));
                assert_eq!(fault.message, "quota exceeded");
            }
            other => panic!("expected UpstreamError, got {other:?}"),
        }
    }

    #[test]
    fn test_error_string_and_success_false() {
        assert!(detect_error_envelope(&serde_json::json!({"error": "boom"})).is_some());
        assert!(detect_error_envelope(&serde_json::json!({"errorMessage": "Workflow failed"})).is_some());
        let fault = detect_error_envelope(&serde_json::json!({"success": false, "message": "bad"}))
            .unwrap();
        assert_eq!(fault.message, "bad");
    }

    #[test]
    fn test_null_error_is_not_envelope() {
        assert!(detect_error_envelope(&serde_json::json!({"error": null, "reply": "x"})).is_none());
        assert!(detect_error_envelope(&serde_json::json!({"success": true})).is_none());
        assert!(detect_error_envelope(&serde_json::json!([1, 2])).is_none());
    }

    #[test]
    fn test_largest_balanced_prefers_longest() {
        let text = r#"a {"x":1} b {"y":{"z":[1,2,3]}} c"#;
        assert_eq!(largest_balanced(text), Some(r#"{"y":{"z":[1,2,3]}}"#));
        assert_eq!(largest_balanced("no braces"), None);
        assert_eq!(largest_balanced("{ unclosed"), None);
    }

    #[test]
    fn test_largest_balanced_edge_cases() {
        // Truncated outer object: the complete inner array still counts.
        assert_eq!(largest_balanced(r#"{"items": [1, 2, 3]"#), Some("[1, 2, 3]"));
        assert_eq!(largest_balanced(r#"{"a": "}]"} tail"#), Some(r#"{"a": "}]"}"#));
        assert_eq!(largest_balanced(r#"[{]} then {"ok":1}"#), Some(r#"{"ok":1}"#));
        assert_eq!(largest_balanced(r#"He said "see {"k":"v"}"#), Some(r#"{"k":"v"}"#));
    }

    #[test]
    fn test_largest_balanced_deep_unclosed_input() {
        let text = "[".repeat(200_000);
        assert_eq!(largest_balanced(&text), None);
        let nested = format!("{}{}", "[".repeat(100_000), "]".repeat(100_000));
        assert_eq!(largest_balanced(&nested).map(str::len), Some(200_000));
    }

    #[test]
    fn test_into_result_upstream() {
        let out = normalize(r#"{"error":"nope","status":503}"#, Reply::default());
        match out.into_result() {
            Err(LlmError::Upstream { status, body }) => {
                assert_eq!(status, Some(503));
                assert_eq!(body, "nope");
            }
            other => panic!("expected Upstream error, got {other:?}"),
        }
    }

    proptest! {
        #[test]
        fn prop_never_panics_and_garbage_falls_back(raw in "[^{}\\[\\]]*") {
            // Without any brackets nothing but a scalar can parse; scalars are not Reply.
            let out = normalize(&raw, Reply { reply: "fb".into() });
            prop_assert_eq!(out, Normalized::Fallback(Reply { reply: "fb".into() }));
        }

        #[test]
        fn prop_fencing_is_transparent(key in "[a-z]{1,8}", n in 0i64..1000, lang in "(json|JSON|)") {
            let body = format!("{{\"{key}\":{n}}}");
            let fenced = format!("```{lang}\n{body}\n```");
            prop_assert_eq!(
                normalize::<Value>(&body, Value::Null),
                normalize::<Value>(&fenced, Value::Null)
            );
        }

        #[test]
        fn prop_arbitrary_text_never_panics(raw in ".*") {
            let _ = normalize::<Value>(&raw, Value::Null);
        }
    }
}
