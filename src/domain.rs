//! Domain models: difficulty levels, problems with labelled choices, and drawings.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Difficulty the learner picks in the selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
  Easy,
  #[default]
  Medium,
  Hard,
}

impl Difficulty {
  /// Wire/prompt form ("easy", "medium", "hard").
  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Easy => "easy",
      Difficulty::Medium => "medium",
      Difficulty::Hard => "hard",
    }
  }

  /// Label shown in the selector.
  pub fn label(&self) -> &'static str {
    match self {
      Difficulty::Easy => "Easy 🟢",
      Difficulty::Medium => "Medium 🟡",
      Difficulty::Hard => "Hard 🔴",
    }
  }
}

impl fmt::Display for Difficulty {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Positional labels for answer choices.
pub const CHOICE_LABELS: [&str; 5] = ["A", "B", "C", "D", "E"];

pub const MIN_CHOICES: usize = 3;
pub const MAX_CHOICES: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
  pub label: String,
  pub text: String,
}

/// A generated practice problem. Never mutated after construction; a new
/// problem always replaces the old one wholesale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
  pub id: String,
  pub difficulty: Difficulty,
  pub question: String,
  pub choices: Vec<Choice>,
  pub method1: String,
  pub method2: String,
  /// Label of the correct choice (e.g. "B").
  pub correct_answer: String,
}

impl Problem {
  /// Choices rendered the way the tutor prompt lists them ("A. 3, B. 4, ...").
  pub fn options_line(&self) -> String {
    self.choices
      .iter()
      .map(|c| format!("{}. {}", c.label, c.text))
      .collect::<Vec<_>>()
      .join(", ")
  }
}

/// Fixed problem served whenever generation output cannot be used.
pub fn fallback_problem(difficulty: Difficulty) -> Problem {
  let choices = [("A", "3"), ("B", "4"), ("C", "5"), ("D", "6")]
    .iter()
    .map(|(label, text)| Choice { label: (*label).into(), text: (*text).into() })
    .collect();
  Problem {
    id: Uuid::new_v4().to_string(),
    difficulty,
    question: "What is 2 + 2?".into(),
    choices,
    method1: "Add the numbers directly.".into(),
    method2: "Use a number line.".into(),
    correct_answer: "B".into(),
  }
}

/// A freehand drawing as delivered by the renderer: encoded PNG bytes plus the
/// number of strokes the learner drew on it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Drawing {
  pub png: Vec<u8>,
  pub strokes: u32,
}

impl Drawing {
  pub fn new(png: Vec<u8>, strokes: u32) -> Self {
    Self { png, strokes }
  }

  /// No strokes drawn (or no image data at all).
  pub fn is_empty(&self) -> bool {
    self.strokes == 0 || self.png.is_empty()
  }
}
