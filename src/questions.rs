//! FRQ generation, assessment, and selection.
//!
//! One free-text call yields a batch of candidate questions as a JSON array;
//! each candidate then gets a structured assessment against the ten question
//! criteria, and selection takes the weighted-average winner. No eligibility
//! filter applies to questions.

use serde::{Deserialize, Serialize};

use crate::ensemble::{self, EvaluatedCandidate, EvaluationCriterion, SelectionError};
use crate::evaluator::{de_grade, extract_json_array, Evaluator, EvaluatorError};
use crate::gateway::{FieldKind, FunctionSchema};
use crate::prompts;
use crate::rubric::{QUESTION_CRITERIA, QUESTION_CRITERION_WEIGHTS};

/// How many candidate FRQs to generate per text.
pub const DEFAULT_QUESTION_COUNT: usize = 5;

/// Structured result of one question assessment call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionAssessment {
    pub clarity_reasoning: String,
    #[serde(deserialize_with = "de_grade")]
    pub clarity_score: u8,
    pub alignment_reasoning: String,
    #[serde(deserialize_with = "de_grade")]
    pub alignment_score: u8,
    pub age_appropriateness_reasoning: String,
    #[serde(deserialize_with = "de_grade")]
    pub age_appropriateness_score: u8,
    pub analytical_depth_reasoning: String,
    #[serde(deserialize_with = "de_grade")]
    pub analytical_depth_score: u8,
    pub open_endedness_reasoning: String,
    #[serde(deserialize_with = "de_grade")]
    pub open_endedness_score: u8,
    pub textual_scope_reasoning: String,
    #[serde(deserialize_with = "de_grade")]
    pub textual_scope_score: u8,
    pub language_complexity_reasoning: String,
    #[serde(deserialize_with = "de_grade")]
    pub language_complexity_score: u8,
    pub bias_free_reasoning: String,
    #[serde(deserialize_with = "de_grade")]
    pub bias_free_score: u8,
    pub action_verbs_reasoning: String,
    #[serde(deserialize_with = "de_grade")]
    pub action_verbs_score: u8,
    pub feasibility_of_answer_reasoning: String,
    #[serde(deserialize_with = "de_grade")]
    pub feasibility_of_answer_score: u8,
}

impl QuestionAssessment {
    /// (criterion name, score) pairs in canonical order.
    fn scores(&self) -> [(&'static str, u8); 10] {
        [
            ("clarity", self.clarity_score),
            ("alignment", self.alignment_score),
            ("age_appropriateness", self.age_appropriateness_score),
            ("analytical_depth", self.analytical_depth_score),
            ("open_endedness", self.open_endedness_score),
            ("textual_scope", self.textual_scope_score),
            ("language_complexity", self.language_complexity_score),
            ("bias_free", self.bias_free_score),
            ("action_verbs", self.action_verbs_score),
            ("feasibility_of_answer", self.feasibility_of_answer_score),
        ]
    }

    /// Criteria in canonical order.
    pub fn criteria(&self) -> Vec<EvaluationCriterion> {
        let reasonings = [
            &self.clarity_reasoning,
            &self.alignment_reasoning,
            &self.age_appropriateness_reasoning,
            &self.analytical_depth_reasoning,
            &self.open_endedness_reasoning,
            &self.textual_scope_reasoning,
            &self.language_complexity_reasoning,
            &self.bias_free_reasoning,
            &self.action_verbs_reasoning,
            &self.feasibility_of_answer_reasoning,
        ];
        self.scores()
            .iter()
            .zip(reasonings)
            .map(|((name, score), reasoning)| EvaluationCriterion::new(*name, *score, reasoning))
            .collect()
    }

    /// Weighted average over [`QUESTION_CRITERION_WEIGHTS`].
    pub fn weighted_score(&self) -> f64 {
        let scores = self.scores();
        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for (name, weight) in QUESTION_CRITERION_WEIGHTS {
            if let Some((_, score)) = scores.iter().find(|(n, _)| *n == name) {
                numerator += weight * *score as f64;
                denominator += weight;
            }
        }
        numerator / denominator
    }
}

fn assessment_schema() -> FunctionSchema {
    let mut schema = FunctionSchema::new(
        "add_question_assessment",
        "Add an assessment for the given question and text.",
    );
    for criterion in QUESTION_CRITERIA {
        let label = criterion.replace('_', " ");
        schema = schema
            .field(
                format!("{criterion}_reasoning"),
                FieldKind::String,
                format!(
                    "Your reasoning for the {label} score. Includes at least one positive and one negative point."
                ),
            )
            .field(
                format!("{criterion}_score"),
                FieldKind::Integer,
                format!("Your {label} score."),
            );
    }
    schema
}

/// Generate a batch of candidate FRQs for the given text.
pub async fn generate_questions(
    evaluator: &Evaluator<'_>,
    text: &str,
    count: usize,
) -> Result<Vec<String>, EvaluatorError> {
    let count_str = count.to_string();
    let prompt =
        prompts::QUESTION_GENERATION.render(&[("question_count", count_str.as_str()), ("text", text)]);
    let content = evaluator
        .free_text("questions::generate", &prompt.to_messages(), 0.7)
        .await?;
    parse_question_list(&content)
}

/// Parse a generation payload into a non-empty list of questions.
pub fn parse_question_list(content: &str) -> Result<Vec<String>, EvaluatorError> {
    let raw = extract_json_array(content)
        .ok_or_else(|| EvaluatorError::malformed("no JSON array in generation output"))?;
    let questions: Vec<String> = serde_json::from_str(raw)
        .map_err(|e| EvaluatorError::malformed(format!("invalid question array: {e}")))?;

    let questions: Vec<String> = questions
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect();

    if questions.is_empty() {
        return Err(EvaluatorError::malformed("generation produced no questions"));
    }
    Ok(questions)
}

/// Evaluate one candidate question against the question criteria.
pub async fn assess_question(
    evaluator: &Evaluator<'_>,
    question: &str,
    text: &str,
) -> Result<QuestionAssessment, EvaluatorError> {
    let prompt = prompts::QUESTION_ASSESSMENT.render(&[("text", text), ("question", question)]);
    evaluator
        .structured(
            "questions::assess",
            &prompt.to_messages(),
            &assessment_schema(),
            0.0,
        )
        .await
}

/// Generate candidates, assess them concurrently, and pick the winner.
pub async fn generate_and_select_question(
    evaluator: &Evaluator<'_>,
    text: &str,
    count: usize,
) -> Result<Result<EvaluatedCandidate<String>, SelectionError>, EvaluatorError> {
    let questions = generate_questions(evaluator, text, count).await?;

    let evaluated = ensemble::evaluate_all(questions, |index, question| async move {
        let assessment = assess_question(evaluator, &question, text).await?;
        Ok::<_, EvaluatorError>(EvaluatedCandidate {
            aggregate_score: assessment.weighted_score(),
            criteria: assessment.criteria(),
            index,
            item: question,
        })
    })
    .await?;

    Ok(ensemble::select_best(evaluated, |_| true))
}
