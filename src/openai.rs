//! Minimal OpenAI client for our use-cases.
//!
//! We only call chat.completions: a plain text exchange for problem generation
//! and a text + image exchange for reviewing the learner's handwritten work.
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key or the drawing payload.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{instrument, info};

/// Errors emitted by the chat completions client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OpenAiError {
  #[error("OpenAI HTTP {status}: {message}")]
  HttpStatus { status: reqwest::StatusCode, message: String },
  #[error("OpenAI returned an empty response")]
  EmptyResponse,
  #[error(transparent)]
  Http(#[from] reqwest::Error),
}

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub generation_model: String,
  pub evaluation_model: String,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let generation_model =
      std::env::var("OPENAI_GENERATION_MODEL").unwrap_or_else(|_| "gpt-4o".into());
    let evaluation_model =
      std::env::var("OPENAI_EVALUATION_MODEL").unwrap_or_else(|_| "gpt-4o".into());

    // Transport ceiling; the session applies its own tighter per-call timeouts.
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(120))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, generation_model, evaluation_model })
  }

  /// Plain-text chat completion: system prompt + user text.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model))]
  pub async fn chat_plain(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: Option<f32>,
  ) -> Result<String, OpenAiError> {
    let messages = vec![
      ChatMessageReq { role: "system".into(), content: MessageContent::Text(system.into()) },
      ChatMessageReq { role: "user".into(), content: MessageContent::Text(user.into()) },
    ];
    self.complete(model, messages, temperature).await
  }

  /// Vision chat completion: system prompt + user text + one image (data URL).
  #[instrument(level = "info", skip(self, system, user, image_url), fields(model = %model, image_len = image_url.len()))]
  pub async fn chat_with_image(
    &self,
    model: &str,
    system: &str,
    user: &str,
    image_url: &str,
    temperature: Option<f32>,
  ) -> Result<String, OpenAiError> {
    let messages = vec![
      ChatMessageReq { role: "system".into(), content: MessageContent::Text(system.into()) },
      ChatMessageReq {
        role: "user".into(),
        content: MessageContent::Parts(vec![
          ContentPart::Text { text: user.into() },
          ContentPart::ImageUrl { image_url: ImageUrl { url: image_url.into() } },
        ]),
      },
    ];
    self.complete(model, messages, temperature).await
  }

  async fn complete(
    &self,
    model: &str,
    messages: Vec<ChatMessageReq>,
    temperature: Option<f32>,
  ) -> Result<String, OpenAiError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest { model: model.to_string(), messages, temperature };

    let start = std::time::Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "ulysses-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let message = extract_openai_error(&body).unwrap_or(body);
      return Err(OpenAiError::HttpStatus { status, message });
    }

    let body: ChatCompletionResponse = res.json().await?;
    let elapsed = start.elapsed();
    if let Some(usage) = &body.usage {
      info!(target: "tutor", ?elapsed, prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.into_iter().next()
      .and_then(|c| c.message.content)
      .unwrap_or_default().trim().to_string();

    if text.is_empty() {
      return Err(OpenAiError::EmptyResponse);
    }
    info!(target: "tutor", ?elapsed, reply_len = text.len(), "Model response received");
    Ok(text)
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  #[serde(skip_serializing_if = "Option::is_none")]
  temperature: Option<f32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: MessageContent }

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent {
  Text(String),
  Parts(Vec<ContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
  Text { text: String },
  ImageUrl { image_url: ImageUrl },
}
#[derive(Serialize)]
struct ImageUrl { url: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}

/// Local chat.completions endpoint answering every request with `content`
/// after `delay`, and a client pointed at it.
#[cfg(test)]
pub(crate) async fn stub_openai(content: &str, delay: Duration) -> OpenAI {
  use axum::{routing::post, Json, Router};

  let reply = serde_json::json!({ "choices": [{ "message": { "content": content } }] });
  let app = Router::new().route(
    "/chat/completions",
    post(move || {
      let reply = reply.clone();
      async move {
        tokio::time::sleep(delay).await;
        Json(reply)
      }
    }),
  );
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
  let addr = listener.local_addr().expect("stub addr");
  tokio::spawn(async move {
    let _ = axum::serve(listener, app).await;
  });

  OpenAI {
    client: reqwest::Client::new(),
    api_key: "test-key".into(),
    base_url: format!("http://{addr}"),
    generation_model: "gen-model".into(),
    evaluation_model: "eval-model".into(),
  }
}
