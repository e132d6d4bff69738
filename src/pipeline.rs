//! Topic → text → question → answer → feedback → exemplar pipeline.
//!
//! Orchestrates the full mentoring flow: retrieve candidate texts for a
//! topic, rank and select the best one, generate and select a free-response
//! question, obtain a student answer (synthesized or supplied), run the
//! multi-rater feedback ensemble, and rewrite the answer into an exemplar.
//! Each stage emits a `tracing` event so a run can be followed from outside.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::ensemble::{EvaluatedCandidate, SelectionError};
use crate::evaluator::{Evaluator, EvaluatorError};
use crate::feedback::{self, FinalFeedbackSet};
use crate::gateway::{ChatGateway, ChatModel};
use crate::prompts;
use crate::questions::{self, DEFAULT_QUESTION_COUNT};
use crate::retrieval::{RetrievalError, Section, SectionSource, MAX_SEARCH_RESULTS};
use crate::student::{self, AnswerQuality};
use crate::texts;

// =============================================================================
// Configuration
// =============================================================================

/// Default model when none is configured.
pub const DEFAULT_MODEL_ID: &str = "gpt-4o-mini";

/// Knobs for a pipeline run. Built once and handed to the pipeline
/// constructor; never mutated mid-run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Model used for every evaluator call.
    pub model: ChatModel,
    /// How many candidate questions to generate before ranking them.
    pub question_count: usize,
    /// Run the selected text through a cleanup pass before questioning it.
    pub clean_text: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: ChatModel::openai(DEFAULT_MODEL_ID),
            question_count: DEFAULT_QUESTION_COUNT,
            clean_text: true,
        }
    }
}

/// Where the student answer comes from.
#[derive(Debug, Clone)]
pub enum AnswerSource {
    /// Synthesize an answer of the given quality.
    Synthesize(AnswerQuality),
    /// Use an answer supplied by the caller verbatim.
    Provided(String),
}

// =============================================================================
// Errors
// =============================================================================

/// Pipeline stage labels, for error attribution and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    TextSelection,
    TextCleanup,
    QuestionSelection,
    StudentAnswer,
    Feedback,
    Rewrite,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::TextSelection => "text_selection",
            Stage::TextCleanup => "text_cleanup",
            Stage::QuestionSelection => "question_selection",
            Stage::StudentAnswer => "student_answer",
            Stage::Feedback => "feedback",
            Stage::Rewrite => "rewrite",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum MentorError {
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    /// Search returned articles but none yielded a section in the word band.
    #[error("no candidate sections found for topic '{topic}'")]
    NoSections { topic: String },

    /// Every candidate was removed by an eligibility filter.
    #[error("no eligible candidate at stage {stage}")]
    NoEligibleCandidate { stage: Stage },

    /// Question generation produced an empty list.
    #[error("question generation returned no questions")]
    EmptyQuestionSet,

    #[error("stage {stage} failed: {source}")]
    Evaluator {
        stage: Stage,
        #[source]
        source: EvaluatorError,
    },
}

impl MentorError {
    fn at(stage: Stage) -> impl FnOnce(EvaluatorError) -> MentorError {
        move |source| MentorError::Evaluator { stage, source }
    }
}

// =============================================================================
// Session record
// =============================================================================

/// Everything a completed run produced.
#[derive(Debug, Serialize)]
pub struct MentorSession {
    pub id: Uuid,
    pub created_at: String,
    pub topic: String,
    pub model: String,
    /// The winning text with its per-criterion scores.
    pub selected_text: EvaluatedCandidate<Section>,
    /// Cleaned body of the selected text, when cleanup ran.
    pub cleaned_text: Option<String>,
    /// The winning question with its per-criterion scores.
    pub question: EvaluatedCandidate<String>,
    pub answer: String,
    /// Label of the requested answer quality, or "provided".
    pub answer_quality: String,
    pub feedback: FinalFeedbackSet,
    pub exemplar: String,
}

// =============================================================================
// Pipeline
// =============================================================================

/// Drives a full mentoring run against a chat gateway.
pub struct MentorPipeline {
    gateway: Arc<dyn ChatGateway>,
    config: PipelineConfig,
}

impl MentorPipeline {
    pub fn new(gateway: Arc<dyn ChatGateway>, config: PipelineConfig) -> Self {
        Self { gateway, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn evaluator(&self, session_id: Uuid) -> Evaluator<'_> {
        Evaluator::new(self.gateway.as_ref(), self.config.model.clone()).with_session(session_id)
    }

    /// Retrieve candidate sections for a topic from the given source.
    ///
    /// Searches for up to [`MAX_SEARCH_RESULTS`] articles and pools the
    /// in-band sections from all of them. An article that fails to extract
    /// is skipped with a warning rather than aborting the run.
    pub async fn retrieve_sections(
        &self,
        source: &dyn SectionSource,
        topic: &str,
    ) -> Result<Vec<Section>, MentorError> {
        let titles = source.search(topic).await?;
        tracing::info!(topic, articles = titles.len(), "search complete");

        let mut sections = Vec::new();
        for title in titles.iter().take(MAX_SEARCH_RESULTS) {
            match source.extract_sections(title).await {
                Ok(mut found) => sections.append(&mut found),
                Err(err) => {
                    tracing::warn!(article = %title, error = %err, "section extraction failed");
                }
            }
        }

        if sections.is_empty() {
            return Err(MentorError::NoSections {
                topic: topic.to_string(),
            });
        }
        tracing::info!(candidates = sections.len(), "candidate sections pooled");
        Ok(sections)
    }

    /// Rank the candidate sections and return the winner.
    pub async fn select_text(
        &self,
        session_id: Uuid,
        sections: Vec<Section>,
        topic: &str,
    ) -> Result<EvaluatedCandidate<Section>, MentorError> {
        let evaluator = self.evaluator(session_id);
        let selection = texts::rank_and_select_text(&evaluator, sections, topic)
            .await
            .map_err(MentorError::at(Stage::TextSelection))?;
        match selection {
            Ok(winner) => {
                tracing::info!(
                    title = %winner.item.title,
                    score = winner.aggregate_score,
                    "text selected"
                );
                Ok(winner)
            }
            Err(SelectionError::NoEligibleCandidate) => Err(MentorError::NoEligibleCandidate {
                stage: Stage::TextSelection,
            }),
        }
    }

    /// Generate candidate questions about the text and return the winner.
    pub async fn select_question(
        &self,
        session_id: Uuid,
        text: &str,
    ) -> Result<EvaluatedCandidate<String>, MentorError> {
        let evaluator = self.evaluator(session_id);
        let selection =
            questions::generate_and_select_question(&evaluator, text, self.config.question_count)
                .await
                .map_err(MentorError::at(Stage::QuestionSelection))?;
        match selection {
            Ok(winner) => {
                tracing::info!(score = winner.aggregate_score, "question selected");
                Ok(winner)
            }
            Err(SelectionError::NoEligibleCandidate) => Err(MentorError::NoEligibleCandidate {
                stage: Stage::QuestionSelection,
            }),
        }
    }

    /// Synthesize a student answer of the requested quality.
    pub async fn synthesize_answer(
        &self,
        session_id: Uuid,
        question: &str,
        text: &str,
        quality: &AnswerQuality,
    ) -> Result<String, MentorError> {
        let evaluator = self.evaluator(session_id);
        student::synthesize_answer(&evaluator, question, text, quality)
            .await
            .map_err(MentorError::at(Stage::StudentAnswer))
    }

    /// Run the full multi-rater feedback stage.
    pub async fn compute_feedback(
        &self,
        session_id: Uuid,
        answer: &str,
        question: &str,
        text: &str,
    ) -> Result<FinalFeedbackSet, MentorError> {
        let evaluator = self.evaluator(session_id);
        feedback::compute_feedback(&evaluator, answer, question, text)
            .await
            .map_err(MentorError::at(Stage::Feedback))
    }

    /// Rewrite the answer into an exemplar that incorporates the feedback.
    pub async fn rewrite_answer(
        &self,
        session_id: Uuid,
        answer: &str,
        question: &str,
        text: &str,
        feedback: &FinalFeedbackSet,
    ) -> Result<String, MentorError> {
        let evaluator = self.evaluator(session_id);
        let rendered_feedback = feedback.render_for_rewrite();
        let prompt = prompts::ANSWER_REWRITE.render(&[
            ("text", text),
            ("question", question),
            ("answer", answer),
            ("feedback", rendered_feedback.as_str()),
        ]);
        evaluator
            .free_text("pipeline::rewrite", &prompt.to_messages(), 0.3)
            .await
            .map_err(MentorError::at(Stage::Rewrite))
    }

    /// Execute the whole pipeline for a topic and return the session record.
    pub async fn run(
        &self,
        source: &dyn SectionSource,
        topic: &str,
        answer_source: AnswerSource,
    ) -> Result<MentorSession, MentorError> {
        let session_id = Uuid::new_v4();
        tracing::info!(%session_id, topic, "pipeline started");

        let sections = self.retrieve_sections(source, topic).await?;
        let selected_text = self.select_text(session_id, sections, topic).await?;

        let cleaned_text = if self.config.clean_text {
            let evaluator = self.evaluator(session_id);
            let cleaned = texts::clean_text(&evaluator, &selected_text.item.text)
                .await
                .map_err(MentorError::at(Stage::TextCleanup))?;
            tracing::info!("text cleanup complete");
            Some(cleaned)
        } else {
            None
        };
        let working_text = cleaned_text
            .as_deref()
            .unwrap_or(&selected_text.item.text)
            .to_string();

        let question = self.select_question(session_id, &working_text).await?;

        let (answer, answer_quality) = match answer_source {
            AnswerSource::Synthesize(quality) => {
                let answer = self
                    .synthesize_answer(session_id, &question.item, &working_text, &quality)
                    .await?;
                tracing::info!(quality = quality.label(), "student answer synthesized");
                (answer, quality.label().to_string())
            }
            AnswerSource::Provided(answer) => (answer, "provided".to_string()),
        };

        let feedback = self
            .compute_feedback(session_id, &answer, &question.item, &working_text)
            .await?;

        let exemplar = self
            .rewrite_answer(session_id, &answer, &question.item, &working_text, &feedback)
            .await?;
        tracing::info!(%session_id, "pipeline complete");

        Ok(MentorSession {
            id: session_id,
            created_at: Utc::now().to_rfc3339(),
            topic: topic.to_string(),
            model: self.config.model.model_id().to_string(),
            selected_text,
            cleaned_text,
            question,
            answer,
            answer_quality,
            feedback,
            exemplar,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.question_count, DEFAULT_QUESTION_COUNT);
        assert!(config.clean_text);
        assert_eq!(config.model.model_id(), DEFAULT_MODEL_ID);
    }

    #[test]
    fn test_stage_names_stable() {
        assert_eq!(Stage::TextSelection.as_str(), "text_selection");
        assert_eq!(Stage::Feedback.to_string(), "feedback");
    }

    #[test]
    fn test_no_eligible_candidate_names_stage() {
        let err = MentorError::NoEligibleCandidate {
            stage: Stage::TextSelection,
        };
        assert!(err.to_string().contains("text_selection"));
    }
}
