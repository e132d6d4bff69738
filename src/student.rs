//! Synthetic student answers of a chosen quality.

use serde::Serialize;

use crate::evaluator::{Evaluator, EvaluatorError};
use crate::prompts;

/// Target quality for a synthesized answer. The description is embedded
/// verbatim in the prompt.
#[derive(Debug, Clone, Serialize)]
pub enum AnswerQuality {
    Good,
    Mediocre,
    Poor,
    Custom(String),
}

impl AnswerQuality {
    pub fn description(&self) -> &str {
        match self {
            AnswerQuality::Good => {
                "Excellent answer, the best that can possibly be expected from a fourth-grader. All of the relevant information is included, and the answer is well-structured and easy to follow. The answer is also free of grammatical errors and typos."
            }
            AnswerQuality::Mediocre => {
                "A mediocre answer. The answer is somewhat relevant, but it is not well-structured and it is hard to follow. There are a few grammatical errors and typos, but the answer is still readable."
            }
            AnswerQuality::Poor => {
                "A terrible answer. The answer does not answer the question, and is completely unstructured and full of non-sequiturs. It's also FULL of grammatical errors and typos, badly formatted, and hard to read."
            }
            AnswerQuality::Custom(description) => description,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AnswerQuality::Good => "good",
            AnswerQuality::Mediocre => "mediocre",
            AnswerQuality::Poor => "poor",
            AnswerQuality::Custom(_) => "custom",
        }
    }
}

/// Write an answer to the question in a fourth grader's voice at the
/// requested quality level.
pub async fn synthesize_answer(
    evaluator: &Evaluator<'_>,
    question: &str,
    text: &str,
    quality: &AnswerQuality,
) -> Result<String, EvaluatorError> {
    let prompt = prompts::STUDENT_ANSWER.render(&[
        ("answer_description", quality.description()),
        ("text", text),
        ("question", question),
    ]);
    evaluator
        .free_text("student::answer", &prompt.to_messages(), 0.9)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_descriptions_distinct() {
        let good = AnswerQuality::Good.description();
        let mediocre = AnswerQuality::Mediocre.description();
        let poor = AnswerQuality::Poor.description();
        assert_ne!(good, mediocre);
        assert_ne!(mediocre, poor);
        assert!(good.contains("Excellent"));
        assert!(poor.contains("terrible"));
    }

    #[test]
    fn test_custom_description_passes_through() {
        let quality = AnswerQuality::Custom("exactly average".to_string());
        assert_eq!(quality.description(), "exactly average");
        assert_eq!(quality.label(), "custom");
    }
}
