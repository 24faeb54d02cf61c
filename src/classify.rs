//! Reduces an evaluator reply to the session's binary correct/incorrect outcome.
//!
//! Free-text replies are scanned for a marker phrase that the evaluation prompt
//! only asks for on correct answers. This is a heuristic: a wrong-answer reply
//! that happens to contain the phrase ("don't try another method yet") is read
//! as correct. Evaluators that report a structured verdict bypass the scan.

use crate::evaluator::EvaluatorReply;
use crate::util::clean_latex;

#[derive(Clone, Debug)]
pub struct Classifier {
  marker: String,
}

impl Classifier {
  pub fn new(marker: &str) -> Self {
    Self { marker: marker.trim().to_lowercase() }
  }

  /// True iff the marker phrase occurs anywhere in `text`, ignoring case.
  pub fn classify(&self, text: &str) -> bool {
    !self.marker.is_empty() && text.to_lowercase().contains(&self.marker)
  }

  pub fn reduce(&self, reply: EvaluatorReply) -> SubmissionEvaluation {
    let correct = reply.verdict.unwrap_or_else(|| self.classify(&reply.text));
    SubmissionEvaluation { feedback: clean_latex(&reply.text), correct }
  }
}

/// Display-ready feedback plus the derived verdict; consumed by the next transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionEvaluation {
  pub feedback: String,
  pub correct: bool,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn classifier() -> Classifier {
    Classifier::new("another method")
  }

  #[test]
  fn marker_is_found_case_insensitively() {
    let c = classifier();
    assert!(c.classify("Great work! Now try Another Method to check it."));
    assert!(c.classify("TRY ANOTHER METHOD"));
  }

  #[test]
  fn reply_without_marker_is_incorrect() {
    let c = classifier();
    assert!(!c.classify("Check your percentage step again. What is 25% of 80?"));
    assert!(!c.classify("You could try a different approach."));
    assert!(!c.classify(""));
  }

  #[test]
  fn quoted_hint_containing_marker_is_misread_as_correct() {
    // Known weakness of marker classification.
    let c = classifier();
    assert!(c.classify("Not quite. Don't \"try another method\" yet; fix step two first."));
  }

  #[test]
  fn structured_verdict_wins_over_text() {
    let c = classifier();
    let reply = EvaluatorReply { text: "Try another method!".into(), verdict: Some(false) };
    assert!(!c.reduce(reply).correct);
    let reply = EvaluatorReply { text: "Correct.".into(), verdict: Some(true) };
    assert!(c.reduce(reply).correct);
  }

  #[test]
  fn reduce_cleans_latex_but_classifies_raw_text() {
    let c = classifier();
    let eval = c.reduce(EvaluatorReply::free_text(r"Yes, \(0.75 \times 80 = 60\). Try another method."));
    assert!(eval.correct);
    assert_eq!(eval.feedback, "Yes, $0.75 \\times 80 = 60$. Try another method.");
  }

  #[test]
  fn blank_marker_never_matches() {
    assert!(!Classifier::new("  ").classify("anything"));
  }
}
