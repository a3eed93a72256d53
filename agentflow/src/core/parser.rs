//! Strict parsing of model output into a [`TaskBreakdown`].
//!
//! Parsing runs in three stages: best-effort JSON recovery
//! ([`crate::core::normalize`]), JSON Schema validation of the closed task
//! variant set, then typed decoding with per-field semantic checks.

use jsonschema::Validator;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::core::normalize::extract_json_object;
use crate::core::task::TaskBreakdown;

const RESPONSE_SCHEMA: &str = include_str!("../../schemas/task_breakdown.schema.json");

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("response contains no JSON object")]
    NoJson,
    #[error("response violates the task schema: {}", .0.join("; "))]
    Schema(Vec<String>),
    #[error("invalid task breakdown: {0}")]
    Invalid(String),
}

/// JSON Schema text describing a valid planning response.
pub fn response_schema() -> &'static str {
    RESPONSE_SCHEMA
}

/// Parser holding the compiled response schema.
pub struct ResponseParser {
    validator: Validator,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseParser {
    pub fn new() -> Self {
        let schema: Value =
            serde_json::from_str(RESPONSE_SCHEMA).expect("embedded response schema is json");
        let validator =
            jsonschema::validator_for(&schema).expect("embedded response schema should compile");
        Self { validator }
    }

    /// Convert raw model output into a validated task breakdown.
    pub fn parse(&self, raw: &str) -> Result<TaskBreakdown, ParseError> {
        let object = extract_json_object(raw).ok_or(ParseError::NoJson)?;
        let value = Value::Object(object);

        let violations: Vec<String> = self
            .validator
            .iter_errors(&value)
            .map(|err| err.to_string())
            .collect();
        if !violations.is_empty() {
            debug!(count = violations.len(), "schema violations in response");
            return Err(ParseError::Schema(violations));
        }

        serde_json::from_value(value).map_err(|err| ParseError::Invalid(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::TaskType;
    use serde_json::json;

    fn parse(value: Value) -> Result<TaskBreakdown, ParseError> {
        ResponseParser::new().parse(&value.to_string())
    }

    #[test]
    fn valid_breakdown_preserves_length_and_tags() {
        let breakdown = parse(json!({
            "activity": "Directory Analysis",
            "tasks": [
                {"title": "List", "description": "List files", "task_type": "tool",
                 "tool_name": "ls", "tool_params": {"path": "."}},
                {"title": "Summarize", "description": "Summarize a file", "task_type": "agent",
                 "agent_name": "text_analyzer", "instructions": "Summarize file1.txt briefly"},
                {"title": "Finish", "description": "Report back", "task_type": "completion",
                 "result": "Three files analysed"}
            ]
        }))
        .expect("parse");

        assert_eq!(breakdown.activity(), "Directory Analysis");
        let types: Vec<TaskType> = breakdown.tasks().iter().map(|t| t.task_type()).collect();
        assert_eq!(
            types,
            vec![TaskType::Tool, TaskType::Agent, TaskType::Completion]
        );
    }

    #[test]
    fn missing_tasks_fails_schema() {
        let err = parse(json!({"activity": "Nothing"})).unwrap_err();
        assert!(matches!(err, ParseError::Schema(_)), "{err}");
    }

    #[test]
    fn empty_tasks_fails_schema() {
        let err = parse(json!({"activity": "Nothing", "tasks": []})).unwrap_err();
        assert!(matches!(err, ParseError::Schema(_)), "{err}");
    }

    #[test]
    fn unknown_task_type_fails_schema() {
        let err = parse(json!({
            "activity": "Shell",
            "tasks": [{"title": "Run", "description": "Run it", "task_type": "shell"}]
        }))
        .unwrap_err();
        assert!(matches!(err, ParseError::Schema(_)), "{err}");
    }

    #[test]
    fn missing_variant_field_fails_schema() {
        let err = parse(json!({
            "activity": "Tool",
            "tasks": [{"title": "Run", "description": "Run it", "task_type": "tool"}]
        }))
        .unwrap_err();
        assert!(matches!(err, ParseError::Schema(_)), "{err}");
    }

    #[test]
    fn short_instructions_fail_schema() {
        let err = parse(json!({
            "activity": "Delegate",
            "tasks": [{"title": "Ask", "description": "Ask helper", "task_type": "agent",
                       "agent_name": "helper", "instructions": "go"}]
        }))
        .unwrap_err();
        assert!(matches!(err, ParseError::Schema(_)), "{err}");
    }

    #[test]
    fn blank_title_fails_semantic_check() {
        let err = parse(json!({
            "activity": "Finish",
            "tasks": [{"title": "   ", "description": "Report", "task_type": "completion",
                       "result": "done"}]
        }))
        .unwrap_err();
        assert!(matches!(err, ParseError::Invalid(ref msg) if msg.contains("title")), "{err}");
    }

    #[test]
    fn prose_wrapped_response_parses() {
        let raw = "Here you go:\n{\"activity\":\"Finish\",\"tasks\":[{\"title\":\"Done\",\
                   \"description\":\"Report\",\"task_type\":\"completion\",\"result\":\"ok\"}]}";
        let breakdown = ResponseParser::new().parse(raw).expect("parse");
        assert_eq!(breakdown.tasks().len(), 1);
    }

    #[test]
    fn plain_text_has_no_json() {
        let err = ResponseParser::new().parse("I could not do that").unwrap_err();
        assert_eq!(err, ParseError::NoJson);
    }

    #[test]
    fn schema_text_is_valid_json() {
        let value: Value = serde_json::from_str(response_schema()).expect("schema json");
        assert_eq!(value["required"], json!(["activity", "tasks"]));
    }
}
