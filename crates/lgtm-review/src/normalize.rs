//! Turn raw model text into a validated [`ReviewResponse`].
//!
//! Recovery runs as an ordered chain, each stage tried only when the previous
//! one failed:
//!
//! 1. trim whitespace and strip a surrounding markdown code fence
//! 2. strict JSON parse of the cleaned text ([`parse_strict`])
//! 3. parse of the span from the first `{` to the last `}` ([`extract_outer_braces`])
//!
//! Once an object is recovered every field is extracted independently with its
//! own default, so one bad field never discards the rest.

use lgtm_core::{FileComment, LgtmError, ReviewDecision, ReviewResponse};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

/// Summary used when the model leaves it out.
pub const DEFAULT_SUMMARY: &str = "No summary provided";

/// Parse raw model output into a [`ReviewResponse`].
///
/// # Errors
///
/// Returns [`LgtmError::MalformedResponse`] when no JSON object can be
/// recovered. The error carries the parse error of the strict attempt.
///
/// # Examples
///
/// ```
/// use lgtm_core::ReviewDecision;
/// use lgtm_review::normalize::normalize_response;
///
/// let raw = "```json\n{\"summary\":\"ok\",\"comments\":[],\"decision\":\"approve\"}\n```";
/// let review = normalize_response(raw).unwrap();
/// assert_eq!(review.decision(), ReviewDecision::Approve);
/// assert_eq!(review.summary(), "ok");
/// ```
pub fn normalize_response(raw: &str) -> Result<ReviewResponse, LgtmError> {
    let cleaned = strip_code_fences(raw);
    debug!(preview = %preview(cleaned), "normalizing LLM response");

    let object = parse_json_object(cleaned)?;
    let review = review_from_object(&object);

    info!(
        comments = review.comments().len(),
        decision = %review.decision(),
        "parsed review"
    );
    Ok(review)
}

/// Trim the text and remove a wrapping markdown code fence.
///
/// When the text opens with a fence, the whole opening line (including any
/// language tag) is dropped, then a closing fence is removed if present.
///
/// # Examples
///
/// ```
/// use lgtm_review::normalize::strip_code_fences;
///
/// assert_eq!(strip_code_fences("```json\n{}\n```"), "{}");
/// assert_eq!(strip_code_fences("  {}  "), "{}");
/// ```
pub fn strip_code_fences(raw: &str) -> &str {
    let mut cleaned = raw.trim();
    if cleaned.starts_with("```") {
        if let Some(newline) = cleaned.find('\n') {
            cleaned = &cleaned[newline + 1..];
        }
        if let Some(inner) = cleaned.strip_suffix("```") {
            cleaned = inner.trim();
        }
    }
    cleaned
}

/// First stage: parse the text as JSON exactly as given.
///
/// # Errors
///
/// Returns the underlying [`serde_json::Error`] on invalid JSON.
pub fn parse_strict(text: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(text)
}

/// Second stage: the span from the first `{` to the last `}`, inclusive.
///
/// # Examples
///
/// ```
/// use lgtm_review::normalize::extract_outer_braces;
///
/// assert_eq!(extract_outer_braces("noise {\"a\":{}} tail"), Some("{\"a\":{}}"));
/// assert_eq!(extract_outer_braces("} backwards {"), None);
/// assert_eq!(extract_outer_braces("no braces"), None);
/// ```
pub fn extract_outer_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Run the parse stages and require a JSON object at the top level.
fn parse_json_object(cleaned: &str) -> Result<Map<String, Value>, LgtmError> {
    let strict_error = match parse_strict(cleaned) {
        Ok(Value::Object(map)) => return Ok(map),
        Ok(other) => {
            warn!(kind = json_kind(&other), "LLM response is JSON but not an object");
            None
        }
        Err(e) => {
            warn!(error = %e, "JSON decode failed, scanning for an embedded object");
            Some(e)
        }
    };

    let Some(span) = extract_outer_braces(cleaned) else {
        warn!("no JSON object found in LLM response");
        return Err(LgtmError::malformed(
            "no JSON object found in LLM response",
            strict_error,
        ));
    };

    match parse_strict(span) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(LgtmError::malformed(
            format!("expected a JSON object, found {}", json_kind(&other)),
            strict_error,
        )),
        Err(e) => {
            warn!(error = %e, "embedded JSON object did not parse either");
            Err(LgtmError::malformed(
                "failed to parse LLM response as JSON",
                strict_error.or(Some(e)),
            ))
        }
    }
}

fn review_from_object(object: &Map<String, Value>) -> ReviewResponse {
    let summary = coerce_string(object.get("summary")).unwrap_or_else(|| {
        warn!("summary missing, using default");
        DEFAULT_SUMMARY.to_string()
    });

    let decision = match object.get("decision") {
        Some(Value::String(raw)) => ReviewDecision::parse_or_default(raw),
        None | Some(Value::Null) => {
            warn!("decision missing, defaulting to REQUEST_CHANGES");
            ReviewDecision::RequestChanges
        }
        Some(other) => {
            warn!(
                kind = json_kind(other),
                "decision is not a string, defaulting to REQUEST_CHANGES"
            );
            ReviewDecision::RequestChanges
        }
    };

    let comments = match object.get("comments") {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| comment_from_value(index, item))
            .collect(),
        None | Some(Value::Null) => Vec::new(),
        Some(other) => {
            warn!(kind = json_kind(other), "comments is not a list, ignoring");
            Vec::new()
        }
    };

    ReviewResponse::new(summary, comments, decision)
}

fn comment_from_value(index: usize, value: &Value) -> Option<FileComment> {
    let Value::Object(entry) = value else {
        warn!(index, kind = json_kind(value), "skipping comment that is not an object");
        return None;
    };

    let file = coerce_string(entry.get("file"))
        .unwrap_or_else(|| FileComment::UNKNOWN_FILE.to_string());
    let line = coerce_line(entry.get("line"));
    let issue = coerce_string(entry.get("issue")).unwrap_or_default();
    let suggestion = coerce_string(entry.get("suggestion")).unwrap_or_default();

    Some(FileComment::new(file, line, issue, suggestion))
}

/// Strings pass through, scalars are stringified, containers become compact
/// JSON. Absent and `null` yield `None` so the caller's default applies.
fn coerce_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Integers and integral strings are taken as-is, floats are truncated,
/// anything else is 1. Clamping happens in [`FileComment::new`].
fn coerce_line(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|_| i64::MAX))
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(1),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(1),
        _ => 1,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn preview(text: &str) -> String {
    text.chars().take(100).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercase_decision_is_accepted() {
        let review =
            normalize_response(r#"{"summary":"ok","comments":[],"decision":"approve"}"#).unwrap();
        assert_eq!(review.decision(), ReviewDecision::Approve);
        assert_eq!(review.summary(), "ok");
        assert!(review.comments().is_empty());
    }

    #[test]
    fn fenced_and_plain_parse_the_same() {
        let body = r#"{"summary":"s","comments":[{"file":"a.rs","line":3,"issue":"i","suggestion":"x"}],"decision":"REQUEST_CHANGES"}"#;
        let plain = normalize_response(body).unwrap();
        let fenced = normalize_response(&format!("```json\n{body}\n```")).unwrap();
        let bare_fence = normalize_response(&format!("```\n{body}\n```")).unwrap();
        assert_eq!(plain, fenced);
        assert_eq!(plain, bare_fence);
    }

    #[test]
    fn embedded_object_is_recovered_and_fields_defaulted() {
        let raw = r#"garbage {"summary":"s","comments":[{"file":"a.py","line":-5,"issue":"i","suggestion":"s"}],"decision":"X"} trailing"#;
        let review = normalize_response(raw).unwrap();
        assert_eq!(review.summary(), "s");
        assert_eq!(review.decision(), ReviewDecision::RequestChanges);
        assert_eq!(review.comments().len(), 1);
        assert_eq!(review.comments()[0].file(), "a.py");
        assert_eq!(review.comments()[0].line(), 1);
    }

    #[test]
    fn well_formed_input_round_trips() {
        let raw = r#"{
            "summary": "Two problems found.",
            "comments": [
                {"file": "src/db.rs", "line": 10, "issue": "SQL injection", "suggestion": "bind params"},
                {"file": "src/auth.rs", "line": 42, "issue": "token logged", "suggestion": "redact"},
                {"file": "src/db.rs", "line": 10, "issue": "SQL injection", "suggestion": "bind params"}
            ],
            "decision": "REQUEST_CHANGES"
        }"#;
        let review = normalize_response(raw).unwrap();
        let original: Value = serde_json::from_str(raw).unwrap();
        let rendered = serde_json::to_value(&review).unwrap();
        assert_eq!(rendered, original);
    }

    #[test]
    fn missing_fields_get_defaults() {
        let review = normalize_response(r#"{"comments":[{}]}"#).unwrap();
        assert_eq!(review.summary(), DEFAULT_SUMMARY);
        assert_eq!(review.decision(), ReviewDecision::RequestChanges);
        let c = &review.comments()[0];
        assert_eq!(c.file(), "unknown");
        assert_eq!(c.line(), 1);
        assert_eq!(c.issue(), "");
        assert_eq!(c.suggestion(), "");
    }

    #[test]
    fn wrong_types_do_not_abort_other_fields() {
        let raw = r#"{"summary": 42, "decision": ["APPROVE"], "comments": {"file": "x"}}"#;
        let review = normalize_response(raw).unwrap();
        assert_eq!(review.summary(), "42");
        assert_eq!(review.decision(), ReviewDecision::RequestChanges);
        assert!(review.comments().is_empty());
    }

    #[test]
    fn line_coercion() {
        let raw = r#"{"decision":"APPROVE","comments":[
            {"file":"a","line":0},
            {"file":"a","line":"17"},
            {"file":"a","line":"seventeen"},
            {"file":"a","line":3.9},
            {"file":"a","line":null},
            {"file":"a","line":true},
            {"file":"a","line":18446744073709551615}
        ]}"#;
        let review = normalize_response(raw).unwrap();
        let lines: Vec<u32> = review.comments().iter().map(|c| c.line()).collect();
        assert_eq!(lines, vec![1, 17, 1, 3, 1, 1, u32::MAX]);
    }

    #[test]
    fn non_object_comments_are_skipped() {
        let raw = r#"{"decision":"approve","comments":["just text", 7, {"file":"ok.rs","line":2,"issue":"i","suggestion":"s"}, null]}"#;
        let review = normalize_response(raw).unwrap();
        assert_eq!(review.comments().len(), 1);
        assert_eq!(review.comments()[0].file(), "ok.rs");
        assert_eq!(review.decision(), ReviewDecision::Approve);
    }

    #[test]
    fn scalar_fields_are_stringified() {
        let raw = r#"{"comments":[{"file":123,"line":4,"issue":false,"suggestion":{"do":"x"}}]}"#;
        let review = normalize_response(raw).unwrap();
        let c = &review.comments()[0];
        assert_eq!(c.file(), "123");
        assert_eq!(c.issue(), "false");
        assert_eq!(c.suggestion(), r#"{"do":"x"}"#);
    }

    #[test]
    fn prose_without_json_is_malformed() {
        let err = normalize_response("I think this PR looks great!").unwrap_err();
        match err {
            LgtmError::MalformedResponse { source, .. } => assert!(source.is_some()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn broken_embedded_object_is_malformed() {
        let err = normalize_response("here: {\"summary\": \"unterminated} end").unwrap_err();
        assert!(matches!(err, LgtmError::MalformedResponse { .. }));
    }

    #[test]
    fn top_level_array_is_malformed() {
        let err = normalize_response("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, LgtmError::MalformedResponse { .. }));
    }

    #[test]
    fn object_inside_prose_is_recovered_but_quoted_object_is_not() {
        let raw = r#""{\"summary\":\"wrapped\",\"decision\":\"APPROVE\"}""#;
        // A JSON string is not an object, and its escaped body does not parse.
        assert!(normalize_response(raw).is_err());

        let raw = "Sure! {\"summary\":\"wrapped\",\"decision\":\"APPROVE\"}";
        let review = normalize_response(raw).unwrap();
        assert_eq!(review.summary(), "wrapped");
        assert_eq!(review.decision(), ReviewDecision::Approve);
    }

    #[test]
    fn fence_without_newline_falls_back_to_brace_scan() {
        let review = normalize_response("```{\"summary\":\"x\",\"decision\":\"APPROVE\"}```").unwrap();
        assert_eq!(review.summary(), "x");
    }

    #[test]
    fn empty_input_is_malformed() {
        assert!(matches!(
            normalize_response("   \n "),
            Err(LgtmError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn decision_invariant_holds_for_many_shapes() {
        let shapes = [
            r#"{}"#,
            r#"{"decision": null}"#,
            r#"{"decision": 1}"#,
            r#"{"decision": "Approve"}"#,
            r#"{"decision": "request_changes"}"#,
            r#"{"decision": "MERGE"}"#,
            r#"{"decision": {"value": "APPROVE"}}"#,
        ];
        for raw in shapes {
            let review = normalize_response(raw).unwrap();
            assert!(matches!(
                review.decision(),
                ReviewDecision::Approve | ReviewDecision::RequestChanges
            ));
            assert!(review.comments().iter().all(|c| c.line() >= 1));
        }
    }
}
