//! Multi-rater feedback engine.
//!
//! For each rubric parameter, [`RATERS_PER_PARAMETER`] independent rater
//! calls run concurrently; their records are then embedded verbatim in one
//! synthesis call that must produce a genuinely new aggregated feedback. The
//! five parameter workflows themselves also run concurrently, so a full
//! feedback pass issues 5 x (3 + 1) completion calls.
//!
//! Partial aggregation is forbidden: any rater failure fails its parameter,
//! and any parameter failure fails the run. The joins are fail-fast, so
//! sibling futures are dropped as soon as one errors.

use std::fmt::Write as _;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::ensemble;
use crate::evaluator::{de_grade, Evaluator, EvaluatorError};
use crate::gateway::{FieldKind, FunctionSchema};
use crate::prompts;
use crate::rubric::{RubricParameter, RATERS_PER_PARAMETER, RUBRIC_PARAMETERS};

// =============================================================================
// TYPES
// =============================================================================

/// One rater's opinion on one rubric parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndividualFeedback {
    pub notes: String,
    pub summary: String,
    #[serde(deserialize_with = "de_grade")]
    pub grade: u8,
    pub feedback: String,
    pub self_criticism: String,
}

/// The synthesis of all rater records for one rubric parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedFeedback {
    pub aggregated_notes: String,
    pub aggregated_summary: String,
    #[serde(deserialize_with = "de_grade")]
    pub aggregated_grade: u8,
    pub aggregated_feedback: String,
}

/// Complete feedback for one answer: one [`AggregatedFeedback`] per rubric
/// parameter, in canonical parameter order.
#[derive(Debug, Clone)]
pub struct FinalFeedbackSet {
    entries: Vec<(String, AggregatedFeedback)>,
}

impl FinalFeedbackSet {
    pub fn get(&self, parameter: &str) -> Option<&AggregatedFeedback> {
        self.entries
            .iter()
            .find(|(name, _)| name == parameter)
            .map(|(_, feedback)| feedback)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AggregatedFeedback)> {
        self.entries.iter().map(|(name, f)| (name.as_str(), f))
    }

    pub fn parameter_names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the whole set as plain text for the answer-rewrite prompt.
    pub fn render_for_rewrite(&self) -> String {
        let mut out = String::new();
        for (name, feedback) in &self.entries {
            let _ = writeln!(out, "### {name} (grade: {}/5)", feedback.aggregated_grade);
            let _ = writeln!(out, "{}\n", feedback.aggregated_feedback);
        }
        out.trim_end().to_string()
    }
}

// Serializes as an ordered JSON map keyed by parameter name.
impl Serialize for FinalFeedbackSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, feedback) in &self.entries {
            map.serialize_entry(name, feedback)?;
        }
        map.end()
    }
}

// =============================================================================
// SCHEMAS AND PROMPTS
// =============================================================================

fn rater_schema() -> FunctionSchema {
    FunctionSchema::new("add_feedback", "Add feedback for the given answer.")
        .field(
            "notes",
            FieldKind::String,
            "Your private notes on the student's performance on the parameter.",
        )
        .field(
            "summary",
            FieldKind::String,
            "A short, one-sentence high-level summary of the student's performance on the parameter.",
        )
        .field(
            "grade",
            FieldKind::Integer,
            "A grade on a scale from 1 to 5, where 1 is the worst and 5 is the best.",
        )
        .field(
            "feedback",
            FieldKind::String,
            "A longer feedback for the student. This should be at least a couple of paragraphs long and give detailed feedback on the student's performance. It should contain actionable feedback that the student can use to improve their performance as well as concrete examples of mistakes that the student made and how he or she could have answered better.",
        )
        .field(
            "self_criticism",
            FieldKind::String,
            "A short paragraph of self-criticism on the provided long-form feedback. How well does the feedback meet the criteria listed above? What could you improve to increase the quality of your feedback?",
        )
}

fn synthesis_schema() -> FunctionSchema {
    FunctionSchema::new(
        "add_aggregated_feedback",
        "Add aggregated feedback for the given answer.",
    )
    .field(
        "aggregated_notes",
        FieldKind::String,
        "A bullet-point summary of the notes from the individual feedbacks.",
    )
    .field(
        "aggregated_feedback",
        FieldKind::String,
        "Detailed feedback reprising the important aspects of the various individual feedbacks while incorporating the comments on the individual feedbacks.",
    )
    .field(
        "aggregated_summary",
        FieldKind::String,
        "A short, one-sentence high-level summary of the student's performance on the parameter, which summarizes the aggregated feedback.",
    )
    .field(
        "aggregated_grade",
        FieldKind::Integer,
        "A grade on a scale from 1 to 5, where 1 is the worst and 5 is the best. This should reflect the aggregated feedback, not necessarily the average of the individual grades.",
    )
}

/// Render the rater records verbatim for the synthesis prompt. Public so
/// tests can assert string containment of every rater's fields.
pub fn render_feedback_blocks(feedbacks: &[IndividualFeedback]) -> String {
    let mut out = String::new();
    for (i, feedback) in feedbacks.iter().enumerate() {
        let _ = writeln!(out, "====================");
        let _ = writeln!(out, "FEEDBACK {}:", i + 1);
        let _ = writeln!(out, "    - Notes: {}", feedback.notes);
        let _ = writeln!(out, "    - Summary: {}", feedback.summary);
        let _ = writeln!(out, "    - Grade: {}", feedback.grade);
        let _ = writeln!(out, "    - Feedback: {}", feedback.feedback);
        let _ = writeln!(out, "    - Criticism: {}", feedback.self_criticism);
        let _ = writeln!(out);
    }
    out.trim_end().to_string()
}

// =============================================================================
// ENGINE
// =============================================================================

/// One rater call for one parameter.
async fn rate_once(
    evaluator: &Evaluator<'_>,
    answer: &str,
    question: &str,
    text: &str,
    parameter: &RubricParameter,
) -> Result<IndividualFeedback, EvaluatorError> {
    let prompt = prompts::RATER.render(&[
        ("parameter", parameter.name),
        ("description", parameter.description),
        ("text", text),
        ("question", question),
        ("answer", answer),
    ]);
    evaluator
        .structured("feedback::rater", &prompt.to_messages(), &rater_schema(), 0.7)
        .await
}

/// Full workflow for one rubric parameter: 3 concurrent raters, then one
/// synthesis call over their verbatim records.
pub async fn feedback_on_parameter(
    evaluator: &Evaluator<'_>,
    answer: &str,
    question: &str,
    text: &str,
    parameter: &RubricParameter,
) -> Result<AggregatedFeedback, EvaluatorError> {
    tracing::info!(parameter = parameter.name, "generating rater feedbacks");
    let raters: Vec<usize> = (0..RATERS_PER_PARAMETER).collect();
    let feedbacks = ensemble::evaluate_all(raters, |_, _| async move {
        rate_once(evaluator, answer, question, text, parameter).await
    })
    .await?;

    tracing::info!(parameter = parameter.name, "synthesizing rater feedbacks");
    let prompt = prompts::FEEDBACK_SYNTHESIS.render(&[
        ("answer", answer),
        ("feedback_blocks", &render_feedback_blocks(&feedbacks)),
    ]);
    evaluator
        .structured(
            "feedback::synthesize",
            &prompt.to_messages(),
            &synthesis_schema(),
            0.3,
        )
        .await
}

/// Compute aggregated feedback for every rubric parameter, concurrently.
///
/// The returned set always carries exactly the [`RUBRIC_PARAMETERS`] names,
/// in their canonical order.
pub async fn compute_feedback(
    evaluator: &Evaluator<'_>,
    answer: &str,
    question: &str,
    text: &str,
) -> Result<FinalFeedbackSet, EvaluatorError> {
    let parameters: Vec<&RubricParameter> = RUBRIC_PARAMETERS.iter().collect();
    let aggregated = ensemble::evaluate_all(parameters, |_, parameter| async move {
        let feedback = feedback_on_parameter(evaluator, answer, question, text, parameter).await?;
        Ok::<_, EvaluatorError>((parameter.name.to_string(), feedback))
    })
    .await?;

    Ok(FinalFeedbackSet {
        entries: aggregated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_feedback(i: usize) -> IndividualFeedback {
        IndividualFeedback {
            notes: format!("notes-{i}"),
            summary: format!("summary-{i}"),
            grade: (i % 5 + 1) as u8,
            feedback: format!("feedback-{i}"),
            self_criticism: format!("criticism-{i}"),
        }
    }

    #[test]
    fn test_render_feedback_blocks_contains_all_fields_verbatim() {
        let feedbacks: Vec<IndividualFeedback> = (0..3).map(sample_feedback).collect();
        let rendered = render_feedback_blocks(&feedbacks);
        for feedback in &feedbacks {
            assert!(rendered.contains(&feedback.summary));
            assert!(rendered.contains(&format!("Grade: {}", feedback.grade)));
            assert!(rendered.contains(&feedback.self_criticism));
            assert!(rendered.contains(&feedback.notes));
            assert!(rendered.contains(&feedback.feedback));
        }
        assert!(rendered.contains("FEEDBACK 1:"));
        assert!(rendered.contains("FEEDBACK 3:"));
    }

    #[test]
    fn test_rater_schema_fields() {
        let schema = rater_schema();
        assert_eq!(schema.name, "add_feedback");
        assert_eq!(
            schema.required,
            vec!["notes", "summary", "grade", "feedback", "self_criticism"]
        );
    }

    #[test]
    fn test_synthesis_schema_fields() {
        let schema = synthesis_schema();
        assert_eq!(schema.name, "add_aggregated_feedback");
        assert_eq!(
            schema.required,
            vec![
                "aggregated_notes",
                "aggregated_feedback",
                "aggregated_summary",
                "aggregated_grade"
            ]
        );
    }

    #[test]
    fn test_final_feedback_set_ordered_lookup() {
        let set = FinalFeedbackSet {
            entries: vec![
                (
                    "Evidence Support".to_string(),
                    AggregatedFeedback {
                        aggregated_notes: "n".into(),
                        aggregated_summary: "s".into(),
                        aggregated_grade: 4,
                        aggregated_feedback: "f".into(),
                    },
                ),
                (
                    "Completeness".to_string(),
                    AggregatedFeedback {
                        aggregated_notes: "n2".into(),
                        aggregated_summary: "s2".into(),
                        aggregated_grade: 2,
                        aggregated_feedback: "f2".into(),
                    },
                ),
            ],
        };
        assert_eq!(set.parameter_names(), vec!["Evidence Support", "Completeness"]);
        assert_eq!(set.get("Completeness").unwrap().aggregated_grade, 2);
        assert!(set.get("Clarity of Response").is_none());
    }

    #[test]
    fn test_final_feedback_set_serializes_as_map() {
        let set = FinalFeedbackSet {
            entries: vec![(
                "Evidence Support".to_string(),
                AggregatedFeedback {
                    aggregated_notes: "n".into(),
                    aggregated_summary: "s".into(),
                    aggregated_grade: 5,
                    aggregated_feedback: "f".into(),
                },
            )],
        };
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["Evidence Support"]["aggregated_grade"], 5);
    }

    #[test]
    fn test_render_for_rewrite_mentions_each_parameter() {
        let set = FinalFeedbackSet {
            entries: vec![(
                "Mechanical Accuracy".to_string(),
                AggregatedFeedback {
                    aggregated_notes: "n".into(),
                    aggregated_summary: "s".into(),
                    aggregated_grade: 3,
                    aggregated_feedback: "watch your spelling".into(),
                },
            )],
        };
        let rendered = set.render_for_rewrite();
        assert!(rendered.contains("Mechanical Accuracy"));
        assert!(rendered.contains("grade: 3/5"));
        assert!(rendered.contains("watch your spelling"));
    }
}
