//! Solution evaluation: the `SolutionEvaluator` seam and its OpenAI vision implementation.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;
use tracing::instrument;

use crate::config::{Prompts, SessionSettings};
use crate::domain::{Drawing, Problem};
use crate::openai::{OpenAI, OpenAiError};
use crate::util::fill_template;

/// What an evaluator hands back for one submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvaluatorReply {
  /// Tutoring feedback, plain text with optional LaTeX.
  pub text: String,
  /// Structured verdict, for evaluators that can report one directly.
  /// `None` means the verdict has to be read from `text`.
  pub verdict: Option<bool>,
}

impl EvaluatorReply {
  pub fn free_text(text: impl Into<String>) -> Self {
    Self { text: text.into(), verdict: None }
  }
}

/// Every way an evaluation can fail to produce feedback.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EvaluationError {
  #[error("evaluation service is not configured")]
  NotConfigured,
  #[error("evaluation timed out after {0:?}")]
  Timeout(Duration),
  #[error("evaluation service unavailable: {0}")]
  Unavailable(#[from] OpenAiError),
}

#[async_trait]
pub trait SolutionEvaluator: Send + Sync {
  async fn evaluate(&self, problem: &Problem, drawing: &Drawing) -> Result<EvaluatorReply, EvaluationError>;
}

/// Used when no model is configured: every submission reports the service as unavailable.
pub struct UnconfiguredEvaluator;

#[async_trait]
impl SolutionEvaluator for UnconfiguredEvaluator {
  async fn evaluate(&self, _problem: &Problem, _drawing: &Drawing) -> Result<EvaluatorReply, EvaluationError> {
    Err(EvaluationError::NotConfigured)
  }
}

pub struct OpenAiSolutionEvaluator {
  openai: OpenAI,
  prompts: Prompts,
  temperature: f32,
}

impl OpenAiSolutionEvaluator {
  pub fn new(openai: OpenAI, prompts: Prompts, settings: &SessionSettings) -> Self {
    Self { openai, prompts, temperature: settings.evaluation_temperature }
  }
}

#[async_trait]
impl SolutionEvaluator for OpenAiSolutionEvaluator {
  #[instrument(level = "info", skip(self, problem, drawing), fields(problem_id = %problem.id, png_len = drawing.png.len(), model = %self.openai.evaluation_model))]
  async fn evaluate(&self, problem: &Problem, drawing: &Drawing) -> Result<EvaluatorReply, EvaluationError> {
    let user = evaluation_prompt(&self.prompts, problem);
    let text = self
      .openai
      .chat_with_image(
        &self.openai.evaluation_model,
        &self.prompts.evaluation_system,
        &user,
        &png_data_url(&drawing.png),
        Some(self.temperature),
      )
      .await?;
    Ok(EvaluatorReply::free_text(text))
  }
}

pub fn evaluation_prompt(prompts: &Prompts, problem: &Problem) -> String {
  fill_template(
    &prompts.evaluation_user_template,
    &[
      ("question", problem.question.as_str()),
      ("options", problem.options_line().as_str()),
      ("correct_answer", problem.correct_answer.as_str()),
      ("method1", problem.method1.as_str()),
      ("method2", problem.method2.as_str()),
    ],
  )
}

pub fn png_data_url(png: &[u8]) -> String {
  format!("data:image/png;base64,{}", STANDARD.encode(png))
}
