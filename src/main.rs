//! Ulysses · Adaptive Practice Backend
//!
//! - Axum HTTP + WebSocket API driving one practice session per client
//! - Problem generation and handwritten-solution review via OpenAI (optional)
//! - Static renderer fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                    : u16 (default 3000)
//!   OPENAI_API_KEY          : enables OpenAI integration if present
//!   OPENAI_BASE_URL         : default "https://api.openai.com/v1"
//!   OPENAI_GENERATION_MODEL : default "gpt-4o"
//!   OPENAI_EVALUATION_MODEL : default "gpt-4o" (must accept image input)
//!   AGENT_CONFIG_PATH       : path to TOML config (prompts + session policy)
//!   LOG_LEVEL               : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT              : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod openai;
mod generator;
mod evaluator;
mod classify;
mod canvas;
mod session;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared application state (session registry, collaborators, prompts).
  let state = Arc::new(AppState::new());

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "ulysses_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "ulysses_backend", "Server stopped; all sessions dropped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "ulysses_backend", error = %e, "Failed to listen for shutdown signal");
  }
}
