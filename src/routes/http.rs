//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;
use axum::{
  extract::{Path, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument};

use crate::logic::{run_registered_pass, PassError};
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state, body))]
pub async fn http_open_session(
  State(state): State<Arc<AppState>>,
  body: Option<Json<OpenSessionIn>>,
) -> impl IntoResponse {
  let Json(body) = body.unwrap_or_default();
  let (session_id, frame) = state.open_session(body.difficulty).await;
  info!(target: "session", %session_id, phase = ?frame.phase, "HTTP session opened");
  (StatusCode::CREATED, Json(SessionOut { session_id, view: to_view(&frame) }))
}

#[instrument(level = "info", skip(state, body), fields(%id, action = ?body.action))]
pub async fn http_post_pass(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<PassIn>,
) -> Response {
  match run_registered_pass(&state, &id, body).await {
    Ok(view) => Json(view).into_response(),
    Err(e) => pass_error_response(e),
  }
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_delete_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Response {
  if state.close_session(&id).await {
    StatusCode::NO_CONTENT.into_response()
  } else {
    (StatusCode::NOT_FOUND, Json(ErrorOut::new(format!("unknown session: {id}")))).into_response()
  }
}

fn pass_error_response(e: PassError) -> Response {
  let status = match &e {
    PassError::UnknownSession(_) => StatusCode::NOT_FOUND,
    PassError::Busy => StatusCode::CONFLICT,
    PassError::BadDrawing(_) => StatusCode::BAD_REQUEST,
  };
  (status, Json(ErrorOut::new(e.to_string()))).into_response()
}
