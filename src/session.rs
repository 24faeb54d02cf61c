//! The practice-session state machine.
//!
//! Every user interaction is one *pass*: the renderer sends the selector value,
//! the current drawing (if any) and at most one action; the machine computes the
//! next `SessionState`, and the pass ends by rendering a `Frame` from it.
//!
//! `SessionState` is a value. Transitions take it by value and hand back a
//! replacement; nothing is mutated in place outside `Session::pass`.
//!
//! Resting phases are derived from the state. `Evaluating` only exists while a
//! pass is awaiting the evaluator and is never stored; a concurrent pass on a
//! registered session is turned away by the transport instead.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::canvas::{CanvasImage, CanvasStore};
use crate::classify::Classifier;
use crate::domain::{Difficulty, Drawing, Problem};
use crate::evaluator::{EvaluationError, SolutionEvaluator};
use crate::generator::ProblemGenerator;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
  NoProblem,
  AwaitingSubmission,
  Evaluating,
  FeedbackCorrect,
  FeedbackIncorrect,
}

/// Buttons the renderer can forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
  Submit,
  TryAnotherMethod,
  NextQuestion,
  Retry,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionState {
  pub current_difficulty: Difficulty,
  pub problem: Option<Problem>,
  pub feedback: Option<String>,
  /// Only meaningful while `feedback` is present.
  pub correct: bool,
  pub clear_canvas: bool,
}

impl SessionState {
  pub fn new(difficulty: Difficulty) -> Self {
    Self { current_difficulty: difficulty, problem: None, feedback: None, correct: false, clear_canvas: false }
  }

  pub fn phase(&self) -> Phase {
    match (&self.problem, &self.feedback) {
      (None, _) => Phase::NoProblem,
      (Some(_), None) => Phase::AwaitingSubmission,
      (Some(_), Some(_)) if self.correct => Phase::FeedbackCorrect,
      (Some(_), Some(_)) => Phase::FeedbackIncorrect,
    }
  }

  /// A problem must be (re)generated for `selected`.
  pub fn needs_problem(&self, selected: Difficulty) -> bool {
    self.problem.is_none() || self.current_difficulty != selected
  }
}

/// One pass worth of input from the renderer.
#[derive(Clone, Debug, Default)]
pub struct PassInput {
  pub difficulty: Difficulty,
  pub drawing: Option<Drawing>,
  pub action: Option<Action>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
  EmptySubmission,
  EvaluationUnavailable,
}

/// Transient, user-visible message attached to the pass that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notice {
  pub kind: NoticeKind,
  pub message: String,
}

impl Notice {
  fn empty_submission() -> Self {
    Self { kind: NoticeKind::EmptySubmission, message: "Draw your working on the canvas before submitting.".into() }
  }

  fn evaluation_unavailable(e: &EvaluationError) -> Self {
    Self {
      kind: NoticeKind::EvaluationUnavailable,
      message: format!("Your solution could not be reviewed right now ({e}). Please submit again."),
    }
  }
}

/// Result of a single transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
  pub state: SessionState,
  pub notice: Option<Notice>,
}

impl Transition {
  fn to(state: SessionState) -> Self {
    Self { state, notice: None }
  }
}

/// Everything the renderer needs to draw one pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
  pub phase: Phase,
  pub state: SessionState,
  pub canvas: CanvasImage,
  pub notice: Option<Notice>,
}

/// Stateless transition logic plus the collaborators it calls.
pub struct SessionMachine {
  generator: Arc<dyn ProblemGenerator>,
  evaluator: Arc<dyn SolutionEvaluator>,
  classifier: Classifier,
  retain_drawing_on_retry: bool,
  evaluation_timeout: Duration,
}

impl SessionMachine {
  pub fn new(
    generator: Arc<dyn ProblemGenerator>,
    evaluator: Arc<dyn SolutionEvaluator>,
    classifier: Classifier,
  ) -> Self {
    Self {
      generator,
      evaluator,
      classifier,
      retain_drawing_on_retry: true,
      evaluation_timeout: Duration::from_secs(60),
    }
  }

  pub fn with_retain_drawing_on_retry(mut self, retain: bool) -> Self {
    self.retain_drawing_on_retry = retain;
    self
  }

  pub fn with_evaluation_timeout(mut self, timeout: Duration) -> Self {
    self.evaluation_timeout = timeout;
    self
  }

  /// Session start / difficulty change: generate a problem for `difficulty`
  /// and drop any feedback. A replaced problem also asks for a fresh canvas.
  #[instrument(level = "info", skip(self, state), fields(%difficulty, previous = %state.current_difficulty))]
  pub async fn start_problem(&self, state: SessionState, difficulty: Difficulty) -> SessionState {
    let problem = self.generator.generate(difficulty).await;
    info!(target: "session", problem_id = %problem.id, from = ?state.phase(), "New problem for selected difficulty");
    SessionState {
      current_difficulty: difficulty,
      clear_canvas: state.problem.is_some(),
      problem: Some(problem),
      feedback: None,
      correct: false,
    }
  }

  /// Apply one user action. Actions that make no sense in the current phase
  /// leave the state untouched.
  #[instrument(level = "info", skip(self, state, canvas), fields(?action, phase = ?state.phase()))]
  pub async fn transition(&self, state: SessionState, action: Action, canvas: &CanvasStore) -> Transition {
    match (state.phase(), action) {
      (Phase::AwaitingSubmission, Action::Submit) => self.submit(state, canvas).await,

      (Phase::FeedbackCorrect, Action::TryAnotherMethod) => {
        info!(target: "session", "Trying another method on the same problem");
        Transition::to(SessionState { feedback: None, correct: false, clear_canvas: true, ..state })
      }

      (Phase::FeedbackCorrect, Action::NextQuestion) => {
        let problem = self.generator.generate(state.current_difficulty).await;
        info!(target: "session", problem_id = %problem.id, "Moving to next question");
        Transition::to(SessionState {
          problem: Some(problem),
          feedback: None,
          correct: false,
          clear_canvas: true,
          ..state
        })
      }

      (Phase::FeedbackIncorrect, Action::Retry) => {
        info!(target: "session", keep_drawing = self.retain_drawing_on_retry, "Retrying after incorrect answer");
        Transition::to(SessionState {
          feedback: None,
          correct: false,
          clear_canvas: !self.retain_drawing_on_retry,
          ..state
        })
      }

      (phase, action) => {
        warn!(target: "session", ?phase, ?action, "Action not available in this phase; ignored");
        Transition::to(state)
      }
    }
  }

  async fn submit(&self, state: SessionState, canvas: &CanvasStore) -> Transition {
    let Some(drawing) = canvas.submittable() else {
      debug!(target: "session", has_snapshot = canvas.snapshot().is_some(), "Submit without new strokes on the canvas");
      return Transition { state, notice: Some(Notice::empty_submission()) };
    };
    let Some(problem) = state.problem.clone() else {
      return Transition::to(state);
    };

    debug!(target: "session", problem_id = %problem.id, png_len = drawing.png.len(), to = ?Phase::Evaluating, "Submission accepted");
    let call = self.evaluator.evaluate(&problem, drawing);
    let outcome = match tokio::time::timeout(self.evaluation_timeout, call).await {
      Ok(result) => result,
      Err(_) => Err(EvaluationError::Timeout(self.evaluation_timeout)),
    };

    match outcome {
      Ok(reply) => {
        let evaluation = self.classifier.reduce(reply);
        info!(target: "session", problem_id = %problem.id, correct = evaluation.correct, feedback_len = evaluation.feedback.len(), "Submission evaluated");
        Transition::to(SessionState {
          feedback: Some(evaluation.feedback),
          correct: evaluation.correct,
          ..state
        })
      }
      Err(e) => {
        warn!(target: "session", problem_id = %problem.id, error = %e, "Evaluation unavailable; back to awaiting submission");
        let notice = Notice::evaluation_unavailable(&e);
        Transition { state, notice: Some(notice) }
      }
    }
  }
}

/// One learner's session: the state value plus the retained drawing.
#[derive(Clone, Debug)]
pub struct Session {
  state: SessionState,
  canvas: CanvasStore,
}

impl Session {
  pub fn new(difficulty: Difficulty) -> Self {
    Self { state: SessionState::new(difficulty), canvas: CanvasStore::new() }
  }

  pub fn state(&self) -> &SessionState {
    &self.state
  }

  pub fn canvas(&self) -> &CanvasStore {
    &self.canvas
  }

  /// Run one full pass: reconcile difficulty, retain the drawing, apply the
  /// action, then render.
  #[instrument(level = "debug", skip(self, machine, input), fields(difficulty = %input.difficulty, action = ?input.action, has_drawing = input.drawing.is_some()))]
  pub async fn pass(&mut self, machine: &SessionMachine, input: PassInput) -> Frame {
    let PassInput { difficulty, drawing, action } = input;

    let mut state = self.state.clone();
    let mut action = action;
    if state.needs_problem(difficulty) {
      if let Some(a) = action.take() {
        warn!(target: "session", action = ?a, "Action dropped: it targeted the problem being replaced");
      }
      state = machine.start_problem(state, difficulty).await;
    }

    if let Some(d) = drawing {
      self.canvas.retain(d);
    }

    let mut notice = None;
    if let Some(a) = action {
      let t = machine.transition(state, a, &self.canvas).await;
      state = t.state;
      notice = t.notice;
    }

    self.state = state;
    self.render(notice)
  }

  fn render(&mut self, notice: Option<Notice>) -> Frame {
    let canvas = self.canvas.image_for_display(self.state.clear_canvas);
    let shown = self.state.clone();
    if CanvasStore::consume_clear_flag(&mut self.state.clear_canvas) {
      self.canvas.mark_cleared();
    }
    Frame { phase: shown.phase(), state: shown, canvas, notice }
  }
}
