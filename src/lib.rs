#![forbid(unsafe_code)]

//! # frq-mentor
//!
//! Automated mentoring around free-response questions (FRQs).
//!
//! Given a topic, frq-mentor retrieves candidate reference texts, ranks them
//! with an LLM ensemble and keeps the best age-appropriate one, generates and
//! ranks free-response questions about it, optionally writes a student answer
//! of a chosen quality, grades that answer with a multi-rater rubric ensemble
//! (three independent raters per rubric parameter, then a synthesis pass),
//! and finally rewrites the answer into an exemplar that incorporates the
//! feedback. Every model call goes through a retrying gateway with structured
//! output enforcement, so transient backend failures and malformed responses
//! are absorbed below the pipeline.

pub mod ensemble;
pub mod evaluator;
pub mod feedback;
pub mod gateway;
pub mod pipeline;
pub mod prompts;
pub mod questions;
pub mod retrieval;
pub mod rubric;
pub mod student;
pub mod texts;

pub use ensemble::{EvaluatedCandidate, EvaluationCriterion, SelectionError};
pub use evaluator::{Evaluator, EvaluatorError};
pub use feedback::FinalFeedbackSet;
pub use gateway::{Attribution, ChatGateway, ChatModel, ProviderGateway, UsageSink};
pub use pipeline::{AnswerSource, MentorError, MentorPipeline, MentorSession, PipelineConfig};
pub use retrieval::{Section, SectionSource, WikipediaSource};
pub use rubric::{RATERS_PER_PARAMETER, RUBRIC_PARAMETERS};
pub use student::AnswerQuality;
