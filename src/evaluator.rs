//! Structured evaluation over the completion gateway.
//!
//! An evaluation call renders a rubric prompt, forces a named function call,
//! and parses the returned arguments into a typed record. Transient backend
//! failures are already absorbed by the gateway retry loop; this layer adds a
//! separate bounded re-ask budget for malformed structured output.

use std::time::Duration;

use serde::de::{Deserializer, DeserializeOwned};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::time::sleep;
use uuid::Uuid;

use crate::gateway::{
    Attribution, ChatGateway, ChatModel, ChatRequest, FunctionSchema, Message, ProviderError,
};

/// Re-ask budget for unparseable structured output.
pub const MAX_PARSE_RETRIES: u32 = 2;

const PARSE_RETRY_DELAY: Duration = Duration::from_millis(500);

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Error)]
pub enum EvaluatorError {
    /// The completion payload could not be parsed into the requested record.
    #[error("malformed structured output: {0}")]
    MalformedOutput(String),

    /// A field the schema marks required is absent from the payload.
    #[error("required field missing: {0}")]
    FieldMissing(String),

    /// Permanent provider failure, already past the gateway retry budget.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl EvaluatorError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedOutput(message.into())
    }

    /// Whether a re-ask could plausibly fix this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::MalformedOutput(_) | Self::FieldMissing(_))
    }
}

// =============================================================================
// EVALUATOR
// =============================================================================

/// Binds a gateway, a model, and a session id for one pipeline run.
pub struct Evaluator<'a> {
    gateway: &'a dyn ChatGateway,
    model: ChatModel,
    session_id: Option<Uuid>,
}

impl<'a> Evaluator<'a> {
    pub fn new(gateway: &'a dyn ChatGateway, model: ChatModel) -> Self {
        Self {
            gateway,
            model,
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn model(&self) -> &ChatModel {
        &self.model
    }

    fn attribution(&self, caller: &'static str) -> Attribution {
        let attribution = Attribution::new(caller);
        match self.session_id {
            Some(id) => attribution.with_session(id),
            None => attribution,
        }
    }

    /// Run a completion constrained to one forced function call and parse the
    /// arguments into `T`. Malformed output is re-asked up to
    /// [`MAX_PARSE_RETRIES`] times before the error surfaces.
    pub async fn structured<T: DeserializeOwned>(
        &self,
        caller: &'static str,
        messages: &[Message],
        schema: &FunctionSchema,
        temperature: f32,
    ) -> Result<T, EvaluatorError> {
        let mut last_error: Option<EvaluatorError> = None;

        for attempt in 0..=MAX_PARSE_RETRIES {
            let req = ChatRequest::new(
                self.model.clone(),
                messages.to_vec(),
                self.attribution(caller),
            )
            .temperature(temperature)
            .with_function(schema.clone());

            let resp = self.gateway.chat(req).await?;

            match parse_structured::<T>(resp.payload(), &schema.required) {
                Ok(record) => return Ok(record),
                Err(err) if err.is_retryable() && attempt < MAX_PARSE_RETRIES => {
                    tracing::warn!(caller, error = %err, attempt, "malformed output, re-asking");
                    last_error = Some(err);
                    sleep(PARSE_RETRY_DELAY * (attempt + 1)).await;
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error.unwrap_or_else(|| EvaluatorError::malformed("exhausted re-ask budget")))
    }

    /// Run an unconstrained free-text completion.
    pub async fn free_text(
        &self,
        caller: &'static str,
        messages: &[Message],
        temperature: f32,
    ) -> Result<String, EvaluatorError> {
        let req = ChatRequest::new(
            self.model.clone(),
            messages.to_vec(),
            self.attribution(caller),
        )
        .temperature(temperature);

        let resp = self.gateway.chat(req).await?;
        let content = resp.content.trim().to_string();
        if content.is_empty() {
            return Err(EvaluatorError::malformed("empty completion"));
        }
        Ok(content)
    }
}

// =============================================================================
// PARSING
// =============================================================================

/// Parse a structured payload into `T`, checking required fields first so a
/// missing field reports its name rather than a generic serde error.
pub fn parse_structured<T: DeserializeOwned>(
    payload: &str,
    required: &[String],
) -> Result<T, EvaluatorError> {
    let raw = extract_json_object(payload)
        .ok_or_else(|| EvaluatorError::malformed("no JSON object in payload"))?;

    let value: Value = serde_json::from_str(raw)
        .map_err(|e| EvaluatorError::malformed(format!("invalid JSON: {e}")))?;

    let obj = value
        .as_object()
        .ok_or_else(|| EvaluatorError::malformed("payload is not a JSON object"))?;

    for field in required {
        if !obj.contains_key(field) {
            return Err(EvaluatorError::FieldMissing(field.clone()));
        }
    }

    serde_json::from_value(value).map_err(|e| EvaluatorError::malformed(format!("{e}")))
}

/// Extract the first balanced JSON object from text that may contain
/// surrounding prose.
pub fn extract_json_object(text: &str) -> Option<&str> {
    extract_balanced(text, '{', '}')
}

/// Extract the first balanced JSON array from text.
pub fn extract_json_array(text: &str) -> Option<&str> {
    extract_balanced(text, '[', ']')
}

fn extract_balanced(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

// =============================================================================
// GRADE HANDLING
// =============================================================================

/// Clamp a model-reported grade to the 1-5 scale.
///
/// Models occasionally return fractional or out-of-range values; we round and
/// clamp rather than discard an otherwise usable evaluation, and log when the
/// value was out of range.
pub fn clamp_grade(raw: f64) -> u8 {
    if !raw.is_finite() {
        tracing::warn!(raw, "non-finite grade, clamping to 1");
        return 1;
    }
    let rounded = raw.round();
    if !(1.0..=5.0).contains(&rounded) {
        tracing::warn!(raw, "grade outside 1-5, clamping");
    }
    rounded.clamp(1.0, 5.0) as u8
}

/// Serde deserializer for grade fields declared as JSON numbers.
pub(crate) fn de_grade<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok(clamp_grade(raw))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::gateway::{ChatResponse, FieldKind, FinishReason};

    #[derive(Debug, Deserialize)]
    struct Sample {
        notes: String,
        #[serde(deserialize_with = "de_grade")]
        grade: u8,
    }

    fn required() -> Vec<String> {
        vec!["notes".to_string(), "grade".to_string()]
    }

    /// Gateway double that answers each call with the next queued payload,
    /// repeating the last one once the queue runs out.
    struct QueuedGateway {
        calls: AtomicUsize,
        payloads: Vec<&'static str>,
    }

    impl QueuedGateway {
        fn new(payloads: Vec<&'static str>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                payloads,
            }
        }
    }

    #[async_trait::async_trait]
    impl ChatGateway for QueuedGateway {
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let payload = self.payloads[n.min(self.payloads.len() - 1)];
            Ok(ChatResponse {
                content: String::new(),
                function_arguments: Some(payload.to_string()),
                input_tokens: 1,
                output_tokens: 1,
                latency: Duration::from_millis(1),
                finish_reason: FinishReason::ToolCalls,
            })
        }
    }

    fn sample_schema() -> FunctionSchema {
        FunctionSchema::new("add_sample", "Record a sample assessment.")
            .field("notes", FieldKind::String, "Free-form notes.")
            .field("grade", FieldKind::Integer, "Grade from 1 to 5.")
    }

    #[tokio::test(start_paused = true)]
    async fn test_structured_reasks_once_after_malformed_output() {
        let gateway = QueuedGateway::new(vec![
            "sorry, I cannot produce JSON",
            r#"{"notes": "ok", "grade": 4}"#,
        ]);
        let evaluator = Evaluator::new(&gateway, ChatModel::openai("gpt-4o-mini"));

        let sample: Sample = evaluator
            .structured("test", &[Message::user("grade this")], &sample_schema(), 0.0)
            .await
            .unwrap();

        assert_eq!(sample.grade, 4);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_structured_surfaces_error_when_reask_budget_exhausted() {
        let gateway = QueuedGateway::new(vec!["still not JSON"]);
        let evaluator = Evaluator::new(&gateway, ChatModel::openai("gpt-4o-mini"));

        let err = evaluator
            .structured::<Sample>("test", &[Message::user("grade this")], &sample_schema(), 0.0)
            .await
            .unwrap_err();

        assert!(matches!(err, EvaluatorError::MalformedOutput(_)));
        assert_eq!(
            gateway.calls.load(Ordering::SeqCst),
            1 + MAX_PARSE_RETRIES as usize
        );
    }

    #[test]
    fn test_parse_structured_ok() {
        let payload = r#"{"notes": "solid evidence use", "grade": 4}"#;
        let sample: Sample = parse_structured(payload, &required()).unwrap();
        assert_eq!(sample.notes, "solid evidence use");
        assert_eq!(sample.grade, 4);
    }

    #[test]
    fn test_parse_structured_with_surrounding_prose() {
        let payload = "Here is my assessment:\n{\"notes\": \"ok\", \"grade\": 3}\nDone.";
        let sample: Sample = parse_structured(payload, &required()).unwrap();
        assert_eq!(sample.grade, 3);
    }

    #[test]
    fn test_parse_structured_missing_field() {
        let payload = r#"{"notes": "ok"}"#;
        let err = parse_structured::<Sample>(payload, &required()).unwrap_err();
        match err {
            EvaluatorError::FieldMissing(name) => assert_eq!(name, "grade"),
            other => panic!("expected FieldMissing, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_structured_not_json() {
        let err = parse_structured::<Sample>("no json here", &required()).unwrap_err();
        assert!(matches!(err, EvaluatorError::MalformedOutput(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_extract_json_object_ignores_braces_in_strings() {
        let text = r#"prefix {"a": "close } brace", "b": 1} suffix"#;
        let extracted = extract_json_object(text).unwrap();
        assert_eq!(extracted, r#"{"a": "close } brace", "b": 1}"#);
    }

    #[test]
    fn test_extract_json_array() {
        let text = "sure, here you go: [\"q1\", \"q2\"] hope that helps";
        assert_eq!(extract_json_array(text).unwrap(), r#"["q1", "q2"]"#);
    }

    #[test]
    fn test_extract_json_object_unbalanced() {
        assert!(extract_json_object("{\"a\": 1").is_none());
    }

    #[test]
    fn test_clamp_grade() {
        assert_eq!(clamp_grade(3.0), 3);
        assert_eq!(clamp_grade(4.6), 5);
        assert_eq!(clamp_grade(0.0), 1);
        assert_eq!(clamp_grade(9.0), 5);
        assert_eq!(clamp_grade(f64::NAN), 1);
    }

    #[test]
    fn test_grade_deserializer_clamps() {
        let payload = r#"{"notes": "x", "grade": 6.2}"#;
        let sample: Sample = parse_structured(payload, &required()).unwrap();
        assert_eq!(sample.grade, 5);
    }
}
