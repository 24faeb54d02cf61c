//! Problem generation: the `ProblemGenerator` seam, the OpenAI-backed
//! generator, and the offline fallback generator.
//!
//! Generation never fails from the caller's point of view. Malformed model
//! output, upstream errors and timeouts are logged and replaced by the fixed
//! fallback problem.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::{Prompts, SessionSettings};
use crate::domain::{fallback_problem, Choice, Difficulty, Problem, CHOICE_LABELS, MAX_CHOICES, MIN_CHOICES};
use crate::openai::{OpenAI, OpenAiError};
use crate::util::{fill_template, json_object_slice, trunc_for_log};

#[async_trait]
pub trait ProblemGenerator: Send + Sync {
  /// Always yields a usable problem (the fallback when generation fails).
  async fn generate(&self, difficulty: Difficulty) -> Problem;
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GenerationError {
  #[error("generated problem is malformed: {0}")]
  Malformed(String),
  #[error("problem generation timed out after {0:?}")]
  Timeout(Duration),
  #[error(transparent)]
  Upstream(#[from] OpenAiError),
}

/// Serves the fixed fallback problem. Used when no model is configured.
pub struct FallbackGenerator;

#[async_trait]
impl ProblemGenerator for FallbackGenerator {
  async fn generate(&self, difficulty: Difficulty) -> Problem {
    warn!(target: "tutor", %difficulty, "No generation model configured; serving fallback problem");
    fallback_problem(difficulty)
  }
}

pub struct OpenAiProblemGenerator {
  openai: OpenAI,
  prompts: Prompts,
  temperature: f32,
  timeout: Duration,
}

impl OpenAiProblemGenerator {
  pub fn new(openai: OpenAI, prompts: Prompts, settings: &SessionSettings) -> Self {
    Self {
      openai,
      prompts,
      temperature: settings.generation_temperature,
      timeout: settings.generation_timeout(),
    }
  }

  async fn try_generate(&self, difficulty: Difficulty) -> Result<Problem, GenerationError> {
    let system = fill_template(&self.prompts.problem_system, &[("difficulty", difficulty.as_str())]);
    let call = self.openai.chat_plain(
      &self.openai.generation_model,
      &system,
      &self.prompts.problem_user,
      Some(self.temperature),
    );
    let reply = tokio::time::timeout(self.timeout, call)
      .await
      .map_err(|_| GenerationError::Timeout(self.timeout))??;
    parse_problem(&reply, difficulty)
  }
}

#[async_trait]
impl ProblemGenerator for OpenAiProblemGenerator {
  #[instrument(level = "info", skip(self), fields(%difficulty, model = %self.openai.generation_model))]
  async fn generate(&self, difficulty: Difficulty) -> Problem {
    match self.try_generate(difficulty).await {
      Ok(p) => {
        info!(
          target: "tutor",
          problem_id = %p.id,
          choices = p.choices.len(),
          question_preview = %trunc_for_log(&p.question, 40),
          "Problem generated"
        );
        p
      }
      Err(e) => {
        error!(target: "tutor", %difficulty, error = %e, "Problem generation failed; using fallback problem");
        fallback_problem(difficulty)
      }
    }
  }
}

// -------- Parsing & validation of model output --------

#[derive(Deserialize)]
struct RawProblem {
  #[serde(default)] question: String,
  #[serde(default)] choices: Vec<RawChoice>,
  #[serde(default)] solution_method1: String,
  #[serde(default)] solution_method2: String,
  #[serde(default)] correct_answer: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawChoice {
  Text(String),
  Labelled { #[serde(default)] label: String, text: String },
}

/// Parse a model reply into a validated problem. The whole reply is tried as
/// JSON first, then the outermost `{...}` slice.
pub fn parse_problem(reply: &str, difficulty: Difficulty) -> Result<Problem, GenerationError> {
  let raw: RawProblem = match serde_json::from_str(reply.trim()) {
    Ok(raw) => raw,
    Err(first) => {
      let slice = json_object_slice(reply)
        .ok_or_else(|| GenerationError::Malformed(format!("no JSON object in reply ({first})")))?;
      serde_json::from_str(slice).map_err(|e| GenerationError::Malformed(format!("invalid JSON: {e}")))?
    }
  };
  validate(raw, difficulty)
}

fn validate(raw: RawProblem, difficulty: Difficulty) -> Result<Problem, GenerationError> {
  let question = raw.question.trim().to_string();
  if question.is_empty() {
    return Err(GenerationError::Malformed("empty question".into()));
  }
  let n = raw.choices.len();
  if !(MIN_CHOICES..=MAX_CHOICES).contains(&n) {
    return Err(GenerationError::Malformed(format!("expected {MIN_CHOICES}-{MAX_CHOICES} choices, got {n}")));
  }

  let mut choices = Vec::with_capacity(n);
  let mut raw_texts = Vec::with_capacity(n);
  for (label, rc) in CHOICE_LABELS.iter().zip(raw.choices) {
    let raw_text = match rc {
      RawChoice::Text(t) => t,
      RawChoice::Labelled { label: given, text } => {
        if !given.is_empty() && !given.trim().eq_ignore_ascii_case(label) {
          warn!(target: "tutor", expected = %label, %given, "Choice label out of order; relabelling by position");
        }
        text
      }
    };
    let text = strip_label(raw_text.trim(), label).to_string();
    if text.is_empty() {
      return Err(GenerationError::Malformed(format!("choice {label} is empty")));
    }
    raw_texts.push(raw_text.trim().to_string());
    choices.push(Choice { label: (*label).to_string(), text });
  }

  let method1 = raw.solution_method1.trim().to_string();
  let method2 = raw.solution_method2.trim().to_string();
  if method1.is_empty() || method2.is_empty() {
    return Err(GenerationError::Malformed("missing solution method".into()));
  }
  if method1 == method2 {
    return Err(GenerationError::Malformed("solution methods are not distinct".into()));
  }

  let correct_answer = resolve_designator(raw.correct_answer.trim(), &choices, &raw_texts)?;

  Ok(Problem {
    id: Uuid::new_v4().to_string(),
    difficulty,
    question,
    choices,
    method1,
    method2,
    correct_answer,
  })
}

/// "B. 4", "B) 4", "(B) 4", "B: 4" -> "4" when `label` is "B".
fn strip_label<'a>(text: &'a str, label: &str) -> &'a str {
  let rest = text.strip_prefix('(').unwrap_or(text);
  let Some(head) = rest.get(..label.len()) else { return text };
  if !head.eq_ignore_ascii_case(label) {
    return text;
  }
  let after = &rest[label.len()..];
  match after.chars().next() {
    Some('.' | ')' | ':' | '-') => after[1..].trim_start(),
    _ => text,
  }
}

/// Resolve the correct-answer designator to exactly one choice label.
fn resolve_designator(designator: &str, choices: &[Choice], raw_texts: &[String]) -> Result<String, GenerationError> {
  if designator.is_empty() {
    return Err(GenerationError::Malformed("missing correct answer".into()));
  }

  // Bare label ("B", "b", "(B)").
  let bare = designator.trim_matches(|c: char| c == '(' || c == ')' || c == '.');
  if let Some(c) = choices.iter().find(|c| c.label.eq_ignore_ascii_case(bare)) {
    return Ok(c.label.clone());
  }

  // Labelled text ("B. 4") or choice text ("4").
  let matches: Vec<&Choice> = choices
    .iter()
    .zip(raw_texts)
    .filter(|(c, raw)| {
      designator.eq_ignore_ascii_case(raw)
        || designator.eq_ignore_ascii_case(&c.text)
        || strip_label(designator, &c.label) != designator
    })
    .map(|(c, _)| c)
    .collect();

  match matches.as_slice() {
    [one] => Ok(one.label.clone()),
    [] => Err(GenerationError::Malformed(format!("correct answer '{designator}' matches no choice"))),
    _ => Err(GenerationError::Malformed(format!("correct answer '{designator}' is ambiguous"))),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::openai::stub_openai;

  const WELL_FORMED: &str = r#"{
    "question": "A jacket costs $80 and is 25% off. What is the sale price?",
    "choices": ["A. $55", "B. $60", "C. $65", "D. $70"],
    "solution_method1": "Compute 25% of 80 and subtract it.",
    "solution_method2": "Multiply 80 by 0.75.",
    "correct_answer": "B"
  }"#;

  #[test]
  fn well_formed_reply_is_parsed_and_relabelled() {
    let p = parse_problem(WELL_FORMED, Difficulty::Medium).unwrap();
    assert_eq!(p.choices.len(), 4);
    assert_eq!(p.choices[1], Choice { label: "B".into(), text: "$60".into() });
    assert_eq!(p.correct_answer, "B");
    assert_eq!(p.difficulty, Difficulty::Medium);
    assert!(!p.id.is_empty());
  }

  #[test]
  fn json_wrapped_in_prose_is_recovered() {
    let reply = format!("Here is your problem:\n```json\n{WELL_FORMED}\n```\nEnjoy!");
    let p = parse_problem(&reply, Difficulty::Easy).unwrap();
    assert_eq!(p.correct_answer, "B");
  }

  #[test]
  fn malformed_json_is_rejected() {
    let err = parse_problem("{ \"question\": \"oops\", ", Difficulty::Easy).unwrap_err();
    assert!(matches!(err, GenerationError::Malformed(_)));
    assert!(parse_problem("I cannot help with that.", Difficulty::Easy).is_err());
  }

  #[test]
  fn choice_count_is_bounded() {
    let two = r#"{"question":"q","choices":["1","2"],"solution_method1":"a","solution_method2":"b","correct_answer":"A"}"#;
    assert!(parse_problem(two, Difficulty::Easy).is_err());
    let six = r#"{"question":"q","choices":["1","2","3","4","5","6"],"solution_method1":"a","solution_method2":"b","correct_answer":"A"}"#;
    assert!(parse_problem(six, Difficulty::Easy).is_err());
  }

  #[test]
  fn missing_or_identical_methods_are_rejected() {
    let missing = r#"{"question":"q","choices":["1","2","3"],"solution_method1":"a","correct_answer":"A"}"#;
    assert!(parse_problem(missing, Difficulty::Easy).is_err());
    let same = r#"{"question":"q","choices":["1","2","3"],"solution_method1":"a","solution_method2":"a","correct_answer":"A"}"#;
    assert!(parse_problem(same, Difficulty::Easy).is_err());
  }

  #[test]
  fn designator_forms_resolve_to_a_label() {
    let base = |answer: &str| {
      format!(r#"{{"question":"q","choices":["A. 10%","B. 20%","C. 30%"],"solution_method1":"a","solution_method2":"b","correct_answer":"{answer}"}}"#)
    };
    for (answer, want) in [("C", "C"), ("c", "C"), ("(B)", "B"), ("B. 20%", "B"), ("30%", "C"), ("A) 10%", "A")] {
      let p = parse_problem(&base(answer), Difficulty::Hard).unwrap();
      assert_eq!(p.correct_answer, want, "designator {answer}");
    }
    assert!(parse_problem(&base("F"), Difficulty::Hard).is_err());
    assert!(parse_problem(&base("50%"), Difficulty::Hard).is_err());
  }

  #[test]
  fn ambiguous_text_designator_is_rejected() {
    let dup = r#"{"question":"q","choices":["5","5","6"],"solution_method1":"a","solution_method2":"b","correct_answer":"5"}"#;
    assert!(parse_problem(dup, Difficulty::Easy).is_err());
  }

  #[test]
  fn labelled_choice_objects_are_accepted() {
    let reply = r#"{"question":"q","choices":[{"label":"A","text":"1"},{"label":"B","text":"2"},{"text":"3"}],"solution_method1":"a","solution_method2":"b","correct_answer":"3"}"#;
    let p = parse_problem(reply, Difficulty::Easy).unwrap();
    assert_eq!(p.choices[2].label, "C");
    assert_eq!(p.correct_answer, "C");
  }

  #[test]
  fn strip_label_leaves_unlabelled_text() {
    assert_eq!(strip_label("B. 4", "B"), "4");
    assert_eq!(strip_label("(b) four", "B"), "four");
    assert_eq!(strip_label("Bananas", "B"), "Bananas");
    assert_eq!(strip_label("4", "B"), "4");
  }

  fn openai_generator(openai: OpenAI, timeout_secs: u64) -> OpenAiProblemGenerator {
    let settings = SessionSettings { generation_timeout_secs: timeout_secs, ..Default::default() };
    OpenAiProblemGenerator::new(openai, Prompts::default(), &settings)
  }

  #[tokio::test]
  async fn model_reply_becomes_the_problem() {
    let generator = openai_generator(stub_openai(WELL_FORMED, Duration::ZERO).await, 5);
    let p = generator.generate(Difficulty::Medium).await;
    assert_eq!(p.question, "A jacket costs $80 and is 25% off. What is the sale price?");
    assert_eq!(p.correct_answer, "B");
  }

  #[tokio::test]
  async fn truncated_model_reply_falls_back_to_two_plus_two() {
    let generator = openai_generator(stub_openai("{\"question\": \"broken\"", Duration::ZERO).await, 5);
    let p = generator.generate(Difficulty::Hard).await;
    assert_eq!(p.question, "What is 2 + 2?");
    assert_eq!(p.correct_answer, "B");
    assert_eq!(p.difficulty, Difficulty::Hard);
    let labels: Vec<_> = p.choices.iter().map(|c| c.label.as_str()).collect();
    assert_eq!(labels, ["A", "B", "C", "D"]);
  }

  #[tokio::test]
  async fn slow_model_falls_back_after_generation_timeout() {
    let generator = openai_generator(stub_openai(WELL_FORMED, Duration::from_secs(5)).await, 1);
    let started = std::time::Instant::now();
    let p = generator.generate(Difficulty::Easy).await;
    assert_eq!(p.question, "What is 2 + 2?");
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(matches!(
      generator.try_generate(Difficulty::Easy).await,
      Err(GenerationError::Timeout(_))
    ));
  }

  #[tokio::test]
  async fn unreachable_model_falls_back() {
    let mut openai = stub_openai(WELL_FORMED, Duration::ZERO).await;
    openai.base_url = "http://127.0.0.1:9".into();
    let p = openai_generator(openai, 5).generate(Difficulty::Medium).await;
    assert_eq!(p.question, "What is 2 + 2?");
  }

  #[tokio::test]
  async fn fallback_generator_serves_fixed_problem() {
    let p = FallbackGenerator.generate(Difficulty::Hard).await;
    assert_eq!(p.question, "What is 2 + 2?");
    assert_eq!(p.correct_answer, "B");
  }
}
