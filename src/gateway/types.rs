//! Core types for the completion gateway.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

// =============================================================================
// ATTRIBUTION
// =============================================================================

/// Attribution for usage tracking and debugging.
///
/// Every request through the gateway carries attribution so we know:
/// - Which session it belongs to (session_id)
/// - Which code path triggered it (caller)
#[derive(Debug, Clone, Default)]
pub struct Attribution {
    /// Pipeline session this request is part of (if any).
    pub session_id: Option<Uuid>,
    /// Which code path made this call, for debugging.
    /// Use a static string like "feedback::rater" or "questions::assess".
    pub caller: &'static str,
}

impl Attribution {
    pub fn new(caller: &'static str) -> Self {
        Self {
            caller,
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

// =============================================================================
// CHAT TYPES
// =============================================================================

/// Chat message role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Chat model specification.
#[derive(Debug, Clone)]
pub enum ChatModel {
    /// OpenAI-compatible model, e.g. "gpt-4o-mini"
    OpenAi(String),
}

impl ChatModel {
    pub fn openai(model_id: impl Into<String>) -> Self {
        ChatModel::OpenAi(model_id.into())
    }

    pub fn model_id(&self) -> &str {
        match self {
            ChatModel::OpenAi(id) => id,
        }
    }

    pub fn provider(&self) -> &'static str {
        match self {
            ChatModel::OpenAi(_) => "openai",
        }
    }
}

// =============================================================================
// STRUCTURED OUTPUT SCHEMA
// =============================================================================

/// Type of a structured-output field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
}

impl FieldKind {
    pub fn json_type(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "number",
        }
    }
}

/// One named field in a structured-output schema. The description doubles as
/// a grading instruction for the model.
#[derive(Debug, Clone)]
pub struct SchemaField {
    pub name: String,
    pub kind: FieldKind,
    pub description: String,
}

/// Schema for forcing the model to call exactly one named function.
///
/// Rendered to JSON Schema for the tools API. Fields added via
/// [`FunctionSchema::field`] are required; the evaluator treats a missing
/// required field as malformed output.
#[derive(Debug, Clone)]
pub struct FunctionSchema {
    pub name: String,
    pub description: String,
    pub fields: Vec<SchemaField>,
    pub required: Vec<String>,
}

impl FunctionSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            fields: Vec::new(),
            required: Vec::new(),
        }
    }

    /// Add a required field.
    pub fn field(
        mut self,
        name: impl Into<String>,
        kind: FieldKind,
        description: impl Into<String>,
    ) -> Self {
        let name = name.into();
        self.required.push(name.clone());
        self.fields.push(SchemaField {
            name,
            kind,
            description: description.into(),
        });
        self
    }

    /// Render the parameters block as JSON Schema.
    pub fn parameters_json(&self) -> Value {
        let mut properties = serde_json::Map::new();
        for f in &self.fields {
            properties.insert(
                f.name.clone(),
                json!({
                    "type": f.kind.json_type(),
                    "description": f.description,
                }),
            );
        }
        json!({
            "type": "object",
            "properties": Value::Object(properties),
            "required": self.required,
        })
    }
}

// =============================================================================
// REQUEST / RESPONSE
// =============================================================================

/// Request for chat completion.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model to use.
    pub model: ChatModel,
    /// Messages in the conversation.
    pub messages: Vec<Message>,
    /// Sampling temperature (0.0 - 2.0).
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// When set, the completion is constrained to invoke exactly this
    /// function; the response carries the call arguments instead of text.
    pub function: Option<FunctionSchema>,
    /// Attribution for usage tracking.
    pub attribution: Attribution,
}

impl ChatRequest {
    pub fn new(model: ChatModel, messages: Vec<Message>, attribution: Attribution) -> Self {
        Self {
            model,
            messages,
            temperature: 0.0,
            max_tokens: None,
            function: None,
            attribution,
        }
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Constrain the completion to a forced call of the given function.
    pub fn with_function(mut self, schema: FunctionSchema) -> Self {
        self.function = Some(schema);
        self
    }
}

/// Reason the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    Unknown(String),
}

impl From<Option<String>> for FinishReason {
    fn from(s: Option<String>) -> Self {
        match s.as_deref() {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            Some("tool_calls") | Some("function_call") => FinishReason::ToolCalls,
            Some(other) => FinishReason::Unknown(other.to_string()),
            None => FinishReason::Unknown("none".to_string()),
        }
    }
}

/// Response from chat completion.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Generated free-text content (may be empty for forced function calls).
    pub content: String,
    /// Raw JSON arguments of the forced function call, if one was returned.
    pub function_arguments: Option<String>,
    /// Input tokens consumed.
    pub input_tokens: u32,
    /// Output tokens generated.
    pub output_tokens: u32,
    /// Time taken for the request.
    pub latency: Duration,
    /// Why the model stopped.
    pub finish_reason: FinishReason,
}

impl ChatResponse {
    /// The structured payload if present, otherwise the text content.
    pub fn payload(&self) -> &str {
        match &self.function_arguments {
            Some(args) if !args.trim().is_empty() => args,
            _ => &self.content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_renders_json_schema() {
        let schema = FunctionSchema::new("add_feedback", "Record feedback.")
            .field("notes", FieldKind::String, "Rough notes.")
            .field("grade", FieldKind::Integer, "Grade from 1 to 5.");

        let params = schema.parameters_json();
        assert_eq!(params["type"], "object");
        assert_eq!(params["properties"]["notes"]["type"], "string");
        assert_eq!(params["properties"]["grade"]["type"], "number");
        let required: Vec<&str> = params["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(required, vec!["notes", "grade"]);
    }

    #[test]
    fn test_chat_request_builder() {
        let req = ChatRequest::new(
            ChatModel::openai("test-model"),
            vec![Message::user("hi")],
            Attribution::new("test"),
        )
        .temperature(0.7)
        .max_tokens(512);

        assert!((req.temperature - 0.7).abs() < 1e-6);
        assert_eq!(req.max_tokens, Some(512));
        assert!(req.function.is_none());
    }

    #[test]
    fn test_payload_prefers_function_arguments() {
        let resp = ChatResponse {
            content: "ignored".into(),
            function_arguments: Some(r#"{"grade": 4}"#.into()),
            input_tokens: 0,
            output_tokens: 0,
            latency: Duration::from_millis(0),
            finish_reason: FinishReason::ToolCalls,
        };
        assert_eq!(resp.payload(), r#"{"grade": 4}"#);
    }

    #[test]
    fn test_payload_falls_back_to_content() {
        let resp = ChatResponse {
            content: "plain text".into(),
            function_arguments: Some("   ".into()),
            input_tokens: 0,
            output_tokens: 0,
            latency: Duration::from_millis(0),
            finish_reason: FinishReason::Stop,
        };
        assert_eq!(resp.payload(), "plain text");
    }
}
