//! End-to-end tests over a scripted gateway: the full feedback ensemble and
//! a complete pipeline run, with every completion call answered locally.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use frq_mentor::evaluator::Evaluator;
use frq_mentor::feedback;
use frq_mentor::gateway::{
    ChatGateway, ChatModel, ChatRequest, ChatResponse, FinishReason, ProviderError,
};
use frq_mentor::pipeline::{AnswerSource, MentorPipeline, PipelineConfig};
use frq_mentor::retrieval::{RetrievalError, Section, SectionSource};
use frq_mentor::rubric::{RATERS_PER_PARAMETER, RUBRIC_PARAMETERS};
use frq_mentor::student::AnswerQuality;

// =============================================================================
// Scripted gateway
// =============================================================================

/// Answers every completion locally, keyed on the forced function name or,
/// for free-text calls, on distinctive system prompt phrases.
struct ScriptedGateway {
    rater_calls: AtomicUsize,
    synthesis_calls: AtomicUsize,
    synthesis_prompts: Mutex<Vec<String>>,
    /// When set, every rater call fails with a permanent provider error.
    fail_raters: bool,
}

impl ScriptedGateway {
    fn new() -> Self {
        Self {
            rater_calls: AtomicUsize::new(0),
            synthesis_calls: AtomicUsize::new(0),
            synthesis_prompts: Mutex::new(Vec::new()),
            fail_raters: false,
        }
    }

    fn failing_raters() -> Self {
        Self {
            fail_raters: true,
            ..Self::new()
        }
    }

    fn respond(args: String) -> ChatResponse {
        ChatResponse {
            content: String::new(),
            function_arguments: Some(args),
            input_tokens: 10,
            output_tokens: 10,
            latency: Duration::from_millis(1),
            finish_reason: FinishReason::ToolCalls,
        }
    }

    fn respond_text(content: String) -> ChatResponse {
        ChatResponse {
            content,
            function_arguments: None,
            input_tokens: 10,
            output_tokens: 10,
            latency: Duration::from_millis(1),
            finish_reason: FinishReason::Stop,
        }
    }

    fn rater_response(&self) -> String {
        let n = self.rater_calls.fetch_add(1, Ordering::SeqCst);
        json!({
            "notes": format!("notes-{n}"),
            "summary": format!("summary-{n}"),
            "grade": (n % 5) + 1,
            "feedback": format!("feedback-{n}"),
            "self_criticism": format!("criticism-{n}"),
        })
        .to_string()
    }

    fn synthesis_response(&self, user_prompt: &str) -> String {
        self.synthesis_calls.fetch_add(1, Ordering::SeqCst);
        self.synthesis_prompts
            .lock()
            .unwrap()
            .push(user_prompt.to_string());
        json!({
            "aggregated_notes": "merged notes",
            "aggregated_summary": "merged summary",
            "aggregated_grade": 4,
            "aggregated_feedback": "merged feedback",
        })
        .to_string()
    }

    /// Text assessment scores keyed on markers in the section body. "BANNED"
    /// gets top scores everywhere except age-appropriateness; "BEST" beats
    /// "PLAIN" on every criterion.
    fn assessment_response(user_prompt: &str) -> String {
        let (age, rest) = if user_prompt.contains("BANNED") {
            (2, 5)
        } else if user_prompt.contains("BEST") {
            (5, 4)
        } else {
            (4, 3)
        };
        let mut fields = serde_json::Map::new();
        for criterion in [
            "relevance",
            "age_appropriateness",
            "complexity_fit",
            "potential_for_assessment",
            "overall_educational_value",
        ] {
            let score = if criterion == "age_appropriateness" {
                age
            } else {
                rest
            };
            fields.insert(format!("{criterion}_reasoning"), json!("reasoning"));
            fields.insert(format!("{criterion}_score"), json!(score));
        }
        serde_json::Value::Object(fields).to_string()
    }

    /// Question assessment scores keyed on the question text: the one
    /// mentioning "evidence" wins.
    fn question_assessment_response(user_prompt: &str) -> String {
        let score = if user_prompt.contains("QUESTION: Use evidence") {
            5
        } else {
            3
        };
        let mut fields = serde_json::Map::new();
        for criterion in [
            "clarity",
            "alignment",
            "age_appropriateness",
            "analytical_depth",
            "open_endedness",
            "textual_scope",
            "language_complexity",
            "bias_free",
            "action_verbs",
            "feasibility_of_answer",
        ] {
            fields.insert(format!("{criterion}_reasoning"), json!("reasoning"));
            fields.insert(format!("{criterion}_score"), json!(score));
        }
        serde_json::Value::Object(fields).to_string()
    }
}

#[async_trait]
impl ChatGateway for ScriptedGateway {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let system = req
            .messages
            .first()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let user = req
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        if let Some(schema) = &req.function {
            return match schema.name.as_str() {
                "add_feedback" => {
                    if self.fail_raters {
                        return Err(ProviderError::invalid_request("rater rejected"));
                    }
                    Ok(Self::respond(self.rater_response()))
                }
                "add_aggregated_feedback" => Ok(Self::respond(self.synthesis_response(&user))),
                "add_assessment" => Ok(Self::respond(Self::assessment_response(&user))),
                "add_question_assessment" => {
                    Ok(Self::respond(Self::question_assessment_response(&user)))
                }
                other => Err(ProviderError::invalid_request(format!(
                    "unexpected function: {other}"
                ))),
            };
        }

        if system.contains("candidate FRQs") {
            return Ok(Self::respond_text(
                json!(["What color is the sky?", "Use evidence to explain the water cycle."])
                    .to_string(),
            ));
        }
        if system.contains("make it accessible to a 4th grader") {
            return Ok(Self::respond_text("cleaned text BEST".to_string()));
        }
        if system.contains("as a fourth-grader would write it") {
            return Ok(Self::respond_text("the water cycle is wen water goes up".to_string()));
        }
        if system.contains("rewriting a student's answer") {
            return Ok(Self::respond_text("The water cycle begins when...".to_string()));
        }

        Err(ProviderError::invalid_request("unexpected free-text call"))
    }
}

// =============================================================================
// Scripted section source
// =============================================================================

struct StaticSource {
    sections: Vec<Section>,
}

#[async_trait]
impl SectionSource for StaticSource {
    async fn search(&self, _topic: &str) -> Result<Vec<String>, RetrievalError> {
        Ok(vec!["Article".to_string()])
    }

    async fn extract_sections(&self, _article: &str) -> Result<Vec<Section>, RetrievalError> {
        Ok(self.sections.clone())
    }
}

fn model() -> ChatModel {
    ChatModel::openai("gpt-4o-mini")
}

// =============================================================================
// Feedback ensemble
// =============================================================================

#[tokio::test]
async fn compute_feedback_runs_all_raters_and_syntheses() {
    let gateway = ScriptedGateway::new();
    let evaluator = Evaluator::new(&gateway, model());

    let set = feedback::compute_feedback(&evaluator, "an answer", "a question", "a text")
        .await
        .unwrap();

    // One entry per rubric parameter, in canonical order.
    let expected: Vec<&str> = RUBRIC_PARAMETERS.iter().map(|p| p.name).collect();
    assert_eq!(set.parameter_names(), expected);

    // Exactly 3 raters per parameter and one synthesis each.
    assert_eq!(
        gateway.rater_calls.load(Ordering::SeqCst),
        RATERS_PER_PARAMETER * RUBRIC_PARAMETERS.len()
    );
    assert_eq!(
        gateway.synthesis_calls.load(Ordering::SeqCst),
        RUBRIC_PARAMETERS.len()
    );

    for (_, aggregated) in set.iter() {
        assert!((1..=5).contains(&aggregated.aggregated_grade));
        assert!(!aggregated.aggregated_feedback.is_empty());
    }
}

#[tokio::test]
async fn synthesis_prompts_embed_every_rater_record_verbatim() {
    let gateway = ScriptedGateway::new();
    let evaluator = Evaluator::new(&gateway, model());

    feedback::compute_feedback(&evaluator, "an answer", "a question", "a text")
        .await
        .unwrap();

    let prompts = gateway.synthesis_prompts.lock().unwrap().join("\n");
    let total_raters = RATERS_PER_PARAMETER * RUBRIC_PARAMETERS.len();
    for n in 0..total_raters {
        assert!(prompts.contains(&format!("summary-{n}")), "missing summary-{n}");
        assert!(prompts.contains(&format!("criticism-{n}")));
        assert!(prompts.contains(&format!("notes-{n}")));
        assert!(prompts.contains(&format!("feedback-{n}")));
    }
    // The answer under evaluation is also embedded.
    assert!(prompts.contains("an answer"));
}

#[tokio::test]
async fn rater_failure_fails_the_whole_feedback_run() {
    let gateway = ScriptedGateway::failing_raters();
    let evaluator = Evaluator::new(&gateway, model());

    let err = feedback::compute_feedback(&evaluator, "an answer", "a question", "a text")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("rater rejected"));
    // No synthesis may run over a partial rater set.
    assert_eq!(gateway.synthesis_calls.load(Ordering::SeqCst), 0);
}

// =============================================================================
// Full pipeline run
// =============================================================================

fn filler(words: usize, marker: &str) -> String {
    let mut text = String::from(marker);
    for i in 0..words {
        text.push_str(&format!(" word{i}"));
    }
    text
}

#[tokio::test]
async fn pipeline_runs_end_to_end_and_filters_inappropriate_text() {
    let gateway = Arc::new(ScriptedGateway::new());
    let pipeline = MentorPipeline::new(
        gateway.clone(),
        PipelineConfig {
            model: model(),
            question_count: 2,
            clean_text: true,
        },
    );

    // BANNED outscores BEST everywhere except age-appropriateness, which
    // must disqualify it from selection entirely.
    let source = StaticSource {
        sections: vec![
            Section::new("Plain", filler(300, "PLAIN")),
            Section::new("Banned", filler(300, "BANNED")),
            Section::new("Best", filler(300, "BEST")),
        ],
    };

    let session = pipeline
        .run(
            &source,
            "the water cycle",
            AnswerSource::Synthesize(AnswerQuality::Mediocre),
        )
        .await
        .unwrap();

    assert_eq!(session.selected_text.item.title, "Best");
    assert_eq!(session.cleaned_text.as_deref(), Some("cleaned text BEST"));
    assert_eq!(
        session.question.item,
        "Use evidence to explain the water cycle."
    );
    assert_eq!(session.answer, "the water cycle is wen water goes up");
    assert_eq!(session.answer_quality, "mediocre");
    assert_eq!(session.feedback.len(), RUBRIC_PARAMETERS.len());
    assert_eq!(session.exemplar, "The water cycle begins when...");
    assert_eq!(session.topic, "the water cycle");
}

#[tokio::test]
async fn pipeline_uses_provided_answer_without_synthesis() {
    let gateway = Arc::new(ScriptedGateway::new());
    let pipeline = MentorPipeline::new(
        gateway.clone(),
        PipelineConfig {
            model: model(),
            question_count: 2,
            clean_text: false,
        },
    );

    let source = StaticSource {
        sections: vec![Section::new("Best", filler(300, "BEST"))],
    };

    let session = pipeline
        .run(
            &source,
            "the water cycle",
            AnswerSource::Provided("my own answer".to_string()),
        )
        .await
        .unwrap();

    assert_eq!(session.answer, "my own answer");
    assert_eq!(session.answer_quality, "provided");
    assert!(session.cleaned_text.is_none());
}
