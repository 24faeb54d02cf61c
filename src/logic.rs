//! Core behaviors shared by both HTTP and WebSocket handlers:
//! decoding a pass request, running it against a session, and shaping the view.

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::protocol::{to_view, PassIn, ViewOut};
use crate::session::{Session, SessionMachine};
use crate::state::AppState;

/// Why a pass request could not be run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PassError {
  #[error("unknown session: {0}")]
  UnknownSession(String),
  #[error("another pass for this session is still in flight; retry once it completes")]
  Busy,
  #[error("drawing is not valid base64: {0}")]
  BadDrawing(#[from] base64::DecodeError),
}

/// Run one pass on a session the caller already holds exclusively.
#[instrument(level = "info", skip(machine, session, body), fields(difficulty = %body.difficulty, action = ?body.action))]
pub async fn run_pass(machine: &SessionMachine, session: &mut Session, body: PassIn) -> Result<ViewOut, PassError> {
  let input = body.into_input()?;
  let frame = session.pass(machine, input).await;
  info!(
    target: "session",
    phase = ?frame.phase,
    problem_id = ?session.state().problem.as_ref().map(|p| p.id.as_str()),
    has_snapshot = session.canvas().snapshot().is_some(),
    notice = ?frame.notice.as_ref().map(|n| n.kind),
    "Pass rendered"
  );
  Ok(to_view(&frame))
}

/// Run one pass on a registered session. A second pass arriving while the
/// first is still awaiting a collaborator (generation or evaluation) is turned
/// away rather than queued.
#[instrument(level = "info", skip(state, body), fields(%session_id))]
pub async fn run_registered_pass(state: &AppState, session_id: &str, body: PassIn) -> Result<ViewOut, PassError> {
  let handle = state
    .get_session(session_id)
    .await
    .ok_or_else(|| PassError::UnknownSession(session_id.to_string()))?;
  let Ok(mut session) = handle.try_lock() else {
    warn!(target: "session", %session_id, "Pass rejected: another pass is in flight");
    return Err(PassError::Busy);
  };
  run_pass(&state.machine, &mut session, body).await
}
