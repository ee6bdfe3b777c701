//! OpenAI API schema definitions
//!
//! This module defines the request and response types for the OpenAI Chat
//! Completions surface exposed by the gateway. Request types keep every field
//! the caller sent, so a decoded request re-serializes to the same structure.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Request Types
// ============================================================================

/// OpenAI Chat Completion Request
///
/// Kept as the caller's JSON object. Only `model` is ever rewritten; every
/// other field, `null`s and number formatting included, is forwarded as
/// decoded. Typed accessors cover the fields the gateway reads.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatCompletionRequest(Map<String, Value>);

impl ChatCompletionRequest {
    /// Requested model, if it is a string
    pub fn model(&self) -> Option<&str> {
        self.0.get("model").and_then(Value::as_str)
    }

    /// Force the model, replacing whatever the caller sent
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.0.insert("model".to_string(), Value::String(model.into()));
    }

    /// Whether the caller asked for a streamed reply
    ///
    /// Only a literal `true` counts; absent, `null` or non-boolean is false.
    pub fn wants_stream(&self) -> bool {
        matches!(self.0.get("stream"), Some(Value::Bool(true)))
    }

    /// Number of messages, zero when the field is absent or not an array
    pub fn message_count(&self) -> usize {
        self.0
            .get("messages")
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }

    /// Raw field access
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }
}

// ============================================================================
// Model Types
// ============================================================================

/// Creation timestamp reported for every listed model
pub const MODEL_CREATED_TIMESTAMP: i64 = 1686935002;

/// Models list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub object: String,
    pub data: Vec<Model>,
}

/// Model information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

impl Model {
    pub fn listed(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object: "model".to_string(),
            created: MODEL_CREATED_TIMESTAMP,
            owned_by: "openai".to_string(),
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Error type reported on every caller-facing error
pub const INVALID_REQUEST_ERROR: &str = "invalid_request_error";

/// Caller-facing error envelope: `{"error":{"message":..,"type":..}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

/// Error envelope body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,

    #[serde(rename = "type")]
    pub error_type: String,
}

impl ErrorEnvelope {
    pub fn invalid_request(message: &str) -> Self {
        Self {
            error: ErrorBody {
                message: message.to_string(),
                error_type: INVALID_REQUEST_ERROR.to_string(),
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn decode(raw: &Value) -> ChatCompletionRequest {
        serde_json::from_value(raw.clone()).unwrap()
    }

    #[test]
    fn test_request_round_trip_keeps_unknown_fields() {
        let raw = json!({
            "model": "gpt-4",
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hi", "name": "alice"}
            ],
            "top_p": 0.9,
            "stop": ["\n"]
        });

        let request = decode(&raw);
        assert_eq!(request.model(), Some("gpt-4"));
        assert_eq!(request.message_count(), 2);
        assert!(!request.wants_stream());
        assert_eq!(serde_json::to_value(&request).unwrap(), raw);
    }

    #[test]
    fn test_absent_optionals_stay_absent() {
        let raw = json!({"messages": []});
        assert_eq!(serde_json::to_value(decode(&raw)).unwrap(), raw);
    }

    #[test]
    fn test_numbers_and_nulls_are_not_normalized() {
        let raw = json!({
            "messages": [],
            "temperature": 1,
            "max_tokens": 8_000_000_000u64,
            "top_p": null,
            "seed": 1.5
        });
        let encoded = serde_json::to_string(&decode(&raw)).unwrap();

        assert!(encoded.contains(r#""temperature":1,"#));
        assert!(encoded.contains(r#""max_tokens":8000000000"#));
        assert!(encoded.contains(r#""top_p":null"#));
        assert_eq!(serde_json::from_str::<Value>(&encoded).unwrap(), raw);
    }

    #[test]
    fn test_tool_call_conversation_is_accepted() {
        let raw = json!({
            "model": "m",
            "messages": [
                {"role": "user", "content": "weather?"},
                {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "call_1", "type": "function",
                     "function": {"name": "weather", "arguments": "{}"}}
                ]},
                {"role": "tool", "tool_call_id": "call_1", "content": "sunny"}
            ]
        });

        let request = decode(&raw);
        assert_eq!(request.message_count(), 3);
        assert_eq!(serde_json::to_value(&request).unwrap(), raw);
    }

    #[test]
    fn test_stream_flag() {
        assert!(decode(&json!({"stream": true})).wants_stream());
        assert!(!decode(&json!({"stream": false})).wants_stream());
        assert!(!decode(&json!({"stream": null})).wants_stream());
        assert!(!decode(&json!({"stream": "yes"})).wants_stream());
        assert!(!decode(&json!({})).wants_stream());
    }

    #[test]
    fn test_set_model_overrides_or_inserts() {
        let mut request = decode(&json!({"model": null, "messages": []}));
        assert_eq!(request.model(), None);

        request.set_model("org/pinned");
        assert_eq!(request.model(), Some("org/pinned"));
        assert_eq!(request.get("messages"), Some(&json!([])));
    }

    #[test]
    fn test_non_object_body_is_rejected() {
        assert!(serde_json::from_value::<ChatCompletionRequest>(json!([1, 2])).is_err());
        assert!(serde_json::from_value::<ChatCompletionRequest>(json!("text")).is_err());
    }

    #[test]
    fn test_error_envelope_shape() {
        let envelope = ErrorEnvelope::invalid_request("Unauthorized");
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"error": {"message": "Unauthorized", "type": "invalid_request_error"}})
        );
    }

    #[test]
    fn test_listed_model() {
        let model = Model::listed("deepseek-ai/DeepSeek-R1");
        assert_eq!(model.object, "model");
        assert_eq!(model.created, MODEL_CREATED_TIMESTAMP);
        assert_eq!(model.owned_by, "openai");
    }
}
