//! Canonical rubric constants for the feedback and ranking workflows.
//!
//! The ensemble widths and criterion sets are first-class constants here so
//! tests can reference them and nothing downstream hides a magic number.

use serde::Serialize;

/// Independent rater calls issued per rubric parameter before synthesis.
pub const RATERS_PER_PARAMETER: usize = 3;

/// One named grading dimension for student-answer feedback. The description
/// is embedded verbatim in rater prompts.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RubricParameter {
    pub name: &'static str,
    pub description: &'static str,
}

/// The fixed grading rubric for FRQ answers, in canonical order.
pub const RUBRIC_PARAMETERS: [RubricParameter; 5] = [
    RubricParameter {
        name: "Evidence Support",
        description: "Measures the student's ability to appropriately cite textual evidence to back their claims.",
    },
    RubricParameter {
        name: "Analytical Quality",
        description: "Evaluates how deeply and coherently the student has analyzed the text.",
    },
    RubricParameter {
        name: "Clarity of Response",
        description: "Looks at the organization and language clarity in the student's answer. A well-structured response shows mastery of the skill.",
    },
    RubricParameter {
        name: "Completeness",
        description: "Checks if the student has fully answered the question and explored all its facets, demonstrating comprehensive understanding.",
    },
    RubricParameter {
        name: "Mechanical Accuracy",
        description: "Evaluates the grammar, syntax, and spelling in the student's answer. Errors can impede understanding and detract from the analysis.",
    },
];

/// Text-assessment criteria, in schema order.
pub const TEXT_CRITERIA: [&str; 5] = [
    "relevance",
    "age_appropriateness",
    "complexity_fit",
    "potential_for_assessment",
    "overall_educational_value",
];

/// Question-assessment criteria, in schema order.
pub const QUESTION_CRITERIA: [&str; 10] = [
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
];

/// Weights for the question-selection scalar score.
///
/// Standards alignment and analytical depth carry the most weight since they
/// are what the FRQ exists to exercise; surface properties of the question
/// wording count for less. The scalar is sum(weight * score) / sum(weight).
pub const QUESTION_CRITERION_WEIGHTS: [(&str, f64); 10] = [
    ("clarity", 1.25),
    ("alignment", 2.0),
    ("age_appropriateness", 1.25),
    ("analytical_depth", 1.5),
    ("open_endedness", 1.0),
    ("textual_scope", 1.0),
    ("language_complexity", 0.75),
    ("bias_free", 0.75),
    ("action_verbs", 0.5),
    ("feasibility_of_answer", 1.0),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rubric_parameter_names_unique() {
        let mut names: Vec<&str> = RUBRIC_PARAMETERS.iter().map(|p| p.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), RUBRIC_PARAMETERS.len());
    }

    #[test]
    fn test_weight_table_covers_all_question_criteria() {
        for criterion in QUESTION_CRITERIA {
            assert!(
                QUESTION_CRITERION_WEIGHTS.iter().any(|(n, _)| *n == criterion),
                "missing weight for {criterion}"
            );
        }
        assert_eq!(QUESTION_CRITERION_WEIGHTS.len(), QUESTION_CRITERIA.len());
    }

    #[test]
    fn test_weights_positive() {
        for (name, weight) in QUESTION_CRITERION_WEIGHTS {
            assert!(weight > 0.0, "non-positive weight for {name}");
        }
    }
}
