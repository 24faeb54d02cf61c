//! WebSocket upgrade + message loop. A connection is one practice session:
//! every `pass` message runs one pass and gets exactly one `view` back.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{info, error, instrument, debug};
use uuid::Uuid;

use crate::logic::run_pass;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::session::{Session, SessionMachine};
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "ulysses_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state), fields(session_id = %Uuid::new_v4()))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "ulysses_backend", "WebSocket connected");
  // Passes are read and answered in order, so the session needs no lock here.
  let mut session: Option<Session> = None;

  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "ulysses_backend", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state.machine, &mut session).await
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "ulysses_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "ulysses_backend", "WebSocket disconnected; session dropped");
}

async fn handle_client_ws(msg: ClientWsMessage, machine: &SessionMachine, session: &mut Option<Session>) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::Pass(body) => {
      let session = session.get_or_insert_with(|| Session::new(body.difficulty));
      match run_pass(machine, session, body).await {
        Ok(view) => ServerWsMessage::View { view },
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use async_trait::async_trait;

  use super::*;
  use crate::classify::Classifier;
  use crate::domain::{Difficulty, Drawing, Problem};
  use crate::evaluator::{EvaluationError, EvaluatorReply, SolutionEvaluator};
  use crate::generator::FallbackGenerator;
  use crate::session::Phase;

  struct PraisingEvaluator;

  #[async_trait]
  impl SolutionEvaluator for PraisingEvaluator {
    async fn evaluate(&self, _problem: &Problem, _drawing: &Drawing) -> Result<EvaluatorReply, EvaluationError> {
      Ok(EvaluatorReply::free_text("Correct! Now try another method."))
    }
  }

  fn machine() -> SessionMachine {
    SessionMachine::new(Arc::new(FallbackGenerator), Arc::new(PraisingEvaluator), Classifier::new("another method"))
  }

  fn client(json: serde_json::Value) -> ClientWsMessage {
    serde_json::from_value(json).unwrap()
  }

  #[tokio::test]
  async fn ping_is_answered_without_a_session() {
    let mut session = None;
    let reply = handle_client_ws(client(serde_json::json!({ "type": "ping" })), &machine(), &mut session).await;
    assert!(matches!(reply, ServerWsMessage::Pong));
    assert!(session.is_none());
  }

  #[tokio::test]
  async fn passes_drive_one_session_per_connection() {
    let m = machine();
    let mut session = None;

    let reply = handle_client_ws(client(serde_json::json!({ "type": "pass", "difficulty": "hard" })), &m, &mut session).await;
    let ServerWsMessage::View { view } = reply else { panic!("expected a view") };
    assert_eq!(view.phase, Phase::AwaitingSubmission);
    assert_eq!(view.difficulty, Difficulty::Hard);
    assert_eq!(view.problem.as_ref().map(|p| p.question.as_str()), Some("What is 2 + 2?"));

    let submit = serde_json::json!({
      "type": "pass",
      "difficulty": "hard",
      "drawing": { "imageBase64": "iVBORw==", "strokes": 2 },
      "action": "submit"
    });
    let reply = handle_client_ws(client(submit), &m, &mut session).await;
    let ServerWsMessage::View { view } = reply else { panic!("expected a view") };
    assert_eq!(view.phase, Phase::FeedbackCorrect);
    assert!(view.correct);
    assert_eq!(view.canvas_image.as_deref(), Some("iVBORw=="));
    assert_eq!(session.as_ref().map(|s| s.state().phase()), Some(Phase::FeedbackCorrect));
  }

  #[tokio::test]
  async fn undecodable_drawing_is_reported_and_session_kept() {
    let m = machine();
    let mut session = None;
    handle_client_ws(client(serde_json::json!({ "type": "pass" })), &m, &mut session).await;

    let bad = serde_json::json!({ "type": "pass", "drawing": { "imageBase64": "%%%", "strokes": 1 }, "action": "submit" });
    let reply = handle_client_ws(client(bad), &m, &mut session).await;

    let ServerWsMessage::Error { message } = reply else { panic!("expected an error") };
    assert!(message.contains("base64"));
    assert_eq!(session.as_ref().map(|s| s.state().phase()), Some(Phase::AwaitingSubmission));
  }
}
