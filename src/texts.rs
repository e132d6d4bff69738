//! Reference-text assessment and selection.
//!
//! Each candidate section gets one structured evaluation against the five
//! text criteria; selection filters out sections that are not age-appropriate
//! and takes the highest unweighted mean.

use serde::{Deserialize, Serialize};

use crate::ensemble::{self, EvaluatedCandidate, EvaluationCriterion, SelectionError};
use crate::evaluator::{de_grade, Evaluator, EvaluatorError};
use crate::gateway::{FieldKind, FunctionSchema};
use crate::prompts;
use crate::retrieval::Section;
use crate::rubric::TEXT_CRITERIA;

/// Sections scoring at or below this on age-appropriateness are ineligible.
pub const AGE_APPROPRIATENESS_FLOOR: u8 = 3;

/// Structured result of one text assessment call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextAssessment {
    pub relevance_reasoning: String,
    #[serde(deserialize_with = "de_grade")]
    pub relevance_score: u8,
    pub age_appropriateness_reasoning: String,
    #[serde(deserialize_with = "de_grade")]
    pub age_appropriateness_score: u8,
    pub complexity_fit_reasoning: String,
    #[serde(deserialize_with = "de_grade")]
    pub complexity_fit_score: u8,
    pub potential_for_assessment_reasoning: String,
    #[serde(deserialize_with = "de_grade")]
    pub potential_for_assessment_score: u8,
    pub overall_educational_value_reasoning: String,
    #[serde(deserialize_with = "de_grade")]
    pub overall_educational_value_score: u8,
}

impl TextAssessment {
    /// Criteria in canonical order.
    pub fn criteria(&self) -> Vec<EvaluationCriterion> {
        vec![
            EvaluationCriterion::new("relevance", self.relevance_score, &self.relevance_reasoning),
            EvaluationCriterion::new(
                "age_appropriateness",
                self.age_appropriateness_score,
                &self.age_appropriateness_reasoning,
            ),
            EvaluationCriterion::new(
                "complexity_fit",
                self.complexity_fit_score,
                &self.complexity_fit_reasoning,
            ),
            EvaluationCriterion::new(
                "potential_for_assessment",
                self.potential_for_assessment_score,
                &self.potential_for_assessment_reasoning,
            ),
            EvaluationCriterion::new(
                "overall_educational_value",
                self.overall_educational_value_score,
                &self.overall_educational_value_reasoning,
            ),
        ]
    }

    /// Unweighted mean of the five scores.
    pub fn mean_score(&self) -> f64 {
        let total = self.relevance_score as f64
            + self.age_appropriateness_score as f64
            + self.complexity_fit_score as f64
            + self.potential_for_assessment_score as f64
            + self.overall_educational_value_score as f64;
        total / TEXT_CRITERIA.len() as f64
    }
}

fn assessment_schema() -> FunctionSchema {
    let mut schema = FunctionSchema::new(
        "add_assessment",
        "Add an assessment for the given text and topic.",
    );
    for criterion in TEXT_CRITERIA {
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

/// Evaluate one candidate section against the text criteria.
pub async fn assess_section(
    evaluator: &Evaluator<'_>,
    section: &Section,
    topic: &str,
) -> Result<TextAssessment, EvaluatorError> {
    let prompt = prompts::TEXT_ASSESSMENT.render(&[
        ("topic", topic),
        ("title", &section.title),
        ("section", &section.text),
    ]);
    evaluator
        .structured(
            "texts::assess",
            &prompt.to_messages(),
            &assessment_schema(),
            0.0,
        )
        .await
}

fn eligible(candidate: &EvaluatedCandidate<Section>) -> bool {
    candidate
        .criteria
        .iter()
        .find(|c| c.name == "age_appropriateness")
        .map(|c| c.score > AGE_APPROPRIATENESS_FLOOR)
        .unwrap_or(false)
}

/// Concurrently assess all candidate sections and pick the winner.
pub async fn rank_and_select_text(
    evaluator: &Evaluator<'_>,
    sections: Vec<Section>,
    topic: &str,
) -> Result<Result<EvaluatedCandidate<Section>, SelectionError>, EvaluatorError> {
    let evaluated = ensemble::evaluate_all(sections, |index, section| async move {
        let assessment = assess_section(evaluator, &section, topic).await?;
        Ok::<_, EvaluatorError>(EvaluatedCandidate {
            aggregate_score: assessment.mean_score(),
            criteria: assessment.criteria(),
            index,
            item: section,
        })
    })
    .await?;

    Ok(ensemble::select_best(evaluated, eligible))
}

/// Rewrite the winning section for the target grade level.
pub async fn clean_text(
    evaluator: &Evaluator<'_>,
    text: &str,
) -> Result<String, EvaluatorError> {
    let prompt = prompts::TEXT_CLEANUP.render(&[("text", text)]);
    evaluator
        .free_text("texts::clean", &prompt.to_messages(), 0.3)
        .await
}
