//! Loading agent configuration (prompts + session policy) from TOML.
//!
//! See `AgentConfig`, `Prompts` and `SessionSettings` for expected schema.

use std::time::Duration;

use serde::Deserialize;
use tracing::{info, error};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub session: SessionSettings,
}

/// Prompts used by the OpenAI collaborators. Defaults reproduce the Ulysses tutor.
/// Override them in TOML to tune tone/structure.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  // Problem generation ({difficulty})
  pub problem_system: String,
  pub problem_user: String,
  // Solution evaluation ({question} {options} {correct_answer} {method1} {method2})
  pub evaluation_system: String,
  pub evaluation_user_template: String,
  /// Phrase the evaluation prompt asks for only when the answer is correct.
  pub correct_marker: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      problem_system: r#"
You are Ulysses — a wise and thoughtful tutor in the tradition of the Oxford Tutorial and Harvard Case Method.

Generate a creative, {difficulty}-difficulty math problem suitable for middle school students.

Important: Every problem must use real-world or simulated scenarios that give meaning and context to the problem. Situate the math within relatable cases like shopping, sports, travel, environment, school life, technology, or any real-world situation relevant to young learners.

The problem must come from one of these domains only:
- Percentages
- Data Tables
- Statistical Graphs

Your task:
- Generate one problem based on a real-world or simulated scenario.
- Include 4–5 multiple choice answer options.
- Provide two distinct solution strategies that demonstrate different ways of thinking.

Rules:
- Never generate problems outside of percentages, data tables, or statistical graphs.
- Avoid purely abstract or context-free problems.
"#.into(),
      problem_user: "Return as JSON with keys: question, choices (list), solution_method1, solution_method2, correct_answer.".into(),
      evaluation_system: r#"
You are Ulysses — a wise Oxford tutor using the Socratic method.

Your role is to guide students to discover their own mistakes and improve their reasoning. Never directly give away answers. Use thoughtful and challenging questions to guide them step-by-step.

Always respond with:
- Clarifying questions
- Thoughtful hints
- Encouragement to try alternative methods
- Praise for effort and insight
- Gentle challenge for deeper reflection

Maintain a tone of intellectual curiosity, patience, and respect. Your goal is to develop independent thinkers who reason clearly, not students who depend on answers.
"#.into(),
      evaluation_user_template: "You are a math tutor reviewing a student's handwritten solution.\n\n\
Question: {question}\n\
Options: {options}\n\
Correct Answer: {correct_answer}\n\n\
Method 1: {method1}\n\
Method 2: {method2}\n\n\
Your task:\n\
- Speak directly to the student as 'you'.\n\
- If their answer is correct: praise them, explain why it works, and suggest trying another method (don't show answer).\n\
- If wrong: DO NOT show the correct answer. Instead, identify their error and offer helpful hints to retry.\n\
- Format with LaTeX where appropriate.".into(),
      correct_marker: "another method".into(),
    }
  }
}

/// Session policy knobs.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
  /// Keep the learner's drawing when they retry after an incorrect answer.
  pub retain_drawing_on_retry: bool,
  pub generation_timeout_secs: u64,
  pub evaluation_timeout_secs: u64,
  pub generation_temperature: f32,
  pub evaluation_temperature: f32,
  /// Registered sessions untouched for this long are dropped. 0 keeps them forever.
  pub session_idle_ttl_secs: u64,
}

impl Default for SessionSettings {
  fn default() -> Self {
    Self {
      retain_drawing_on_retry: true,
      generation_timeout_secs: 45,
      evaluation_timeout_secs: 60,
      generation_temperature: 0.9,
      evaluation_temperature: 0.3,
      session_idle_ttl_secs: 1800,
    }
  }
}

impl SessionSettings {
  pub fn generation_timeout(&self) -> Duration {
    Duration::from_secs(self.generation_timeout_secs)
  }

  pub fn evaluation_timeout(&self) -> Duration {
    Duration::from_secs(self.evaluation_timeout_secs)
  }

  pub fn session_idle_ttl(&self) -> Option<Duration> {
    (self.session_idle_ttl_secs > 0).then(|| Duration::from_secs(self.session_idle_ttl_secs))
  }
}

pub fn parse_agent_config(s: &str) -> Result<AgentConfig, toml::de::Error> {
  toml::from_str::<AgentConfig>(s)
}

/// Attempt to load `AgentConfig` from AGENT_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("AGENT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_agent_config(&s) {
      Ok(cfg) => {
        info!(target: "ulysses_backend", %path, "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "ulysses_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "ulysses_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_file_gives_defaults() {
    let cfg = parse_agent_config("").unwrap();
    assert!(cfg.session.retain_drawing_on_retry);
    assert_eq!(cfg.session.evaluation_timeout(), Duration::from_secs(60));
    assert_eq!(cfg.prompts.correct_marker, "another method");
    assert!(cfg.prompts.problem_system.contains("{difficulty}"));
  }

  #[test]
  fn partial_overrides_keep_other_defaults() {
    let cfg = parse_agent_config(
      r#"
[prompts]
correct_marker = "well done"

[session]
retain_drawing_on_retry = false
evaluation_timeout_secs = 5
"#,
    )
    .unwrap();
    assert_eq!(cfg.prompts.correct_marker, "well done");
    assert!(cfg.prompts.evaluation_user_template.contains("{correct_answer}"));
    assert!(!cfg.session.retain_drawing_on_retry);
    assert_eq!(cfg.session.evaluation_timeout_secs, 5);
    assert_eq!(cfg.session.generation_timeout_secs, 45);
  }

  #[test]
  fn idle_ttl_defaults_to_half_an_hour_and_zero_disables_it() {
    assert_eq!(SessionSettings::default().session_idle_ttl(), Some(Duration::from_secs(1800)));
    let cfg = parse_agent_config("[session]\nsession_idle_ttl_secs = 0").unwrap();
    assert_eq!(cfg.session.session_idle_ttl(), None);
  }

  #[test]
  fn wrong_types_are_rejected() {
    assert!(parse_agent_config("[session]\nretain_drawing_on_retry = \"yes\"").is_err());
  }
}
