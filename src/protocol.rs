//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and renderer independently.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::canvas::CanvasImage;
use crate::domain::{Choice, Difficulty, Drawing, Problem};
use crate::session::{Action, Frame, Notice, PassInput, Phase};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Pass(PassIn),
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    View { view: ViewOut },
    Error { message: String },
}

/// Drawing as the renderer uploads it: PNG as base64 (a `data:` URL is fine too)
/// and the number of strokes on the canvas.
///
/// `strokes` is required. A drawing reported with 0 strokes counts as an empty
/// canvas, whatever the image holds.
#[derive(Debug, Deserialize)]
pub struct DrawingIn {
    #[serde(rename = "imageBase64")]
    pub image_base64: String,
    pub strokes: u32,
}

impl DrawingIn {
    pub fn decode(&self) -> Result<Drawing, base64::DecodeError> {
        let raw = self.image_base64.trim();
        let payload = match raw.split_once(";base64,") {
            Some((prefix, data)) if prefix.starts_with("data:") => data,
            _ => raw,
        };
        let png = STANDARD.decode(payload)?;
        Ok(Drawing::new(png, self.strokes))
    }
}

/// One rerun of the renderer.
#[derive(Debug, Deserialize)]
pub struct PassIn {
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub drawing: Option<DrawingIn>,
    #[serde(default)]
    pub action: Option<Action>,
}

impl PassIn {
    pub fn into_input(self) -> Result<PassInput, base64::DecodeError> {
        let drawing = self.drawing.as_ref().map(DrawingIn::decode).transpose()?;
        Ok(PassInput { difficulty: self.difficulty, drawing, action: self.action })
    }
}

/// Problem as shown to the learner. The answer key stays on the server.
#[derive(Debug, Serialize)]
pub struct ProblemOut {
    pub id: String,
    pub question: String,
    pub choices: Vec<Choice>,
    pub method1: String,
    pub method2: String,
}

fn problem_out(p: &Problem) -> ProblemOut {
    ProblemOut {
        id: p.id.clone(),
        question: p.question.clone(),
        choices: p.choices.clone(),
        method1: p.method1.clone(),
        method2: p.method2.clone(),
    }
}

/// Everything the renderer needs to draw one pass.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewOut {
    pub phase: Phase,
    pub difficulty: Difficulty,
    pub difficulty_label: &'static str,
    pub problem: Option<ProblemOut>,
    pub feedback: Option<String>,
    pub correct: bool,
    pub clear_canvas: bool,
    /// Base64 PNG to restore on the canvas; null means start blank.
    pub canvas_image: Option<String>,
    pub notice: Option<Notice>,
}

/// Convert a rendered `Frame` (internal) to the public DTO.
pub fn to_view(frame: &Frame) -> ViewOut {
    let s = &frame.state;
    let canvas_image = match &frame.canvas {
        CanvasImage::Snapshot(d) if !d.png.is_empty() => Some(STANDARD.encode(&d.png)),
        _ => None,
    };
    ViewOut {
        phase: frame.phase,
        difficulty: s.current_difficulty,
        difficulty_label: s.current_difficulty.label(),
        problem: s.problem.as_ref().map(problem_out),
        feedback: s.feedback.clone(),
        correct: s.feedback.is_some() && s.correct,
        clear_canvas: s.clear_canvas,
        canvas_image,
        notice: frame.notice.clone(),
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize, Default)]
pub struct OpenSessionIn {
    #[serde(default)]
    pub difficulty: Difficulty,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOut {
    pub session_id: String,
    pub view: ViewOut,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub error: String,
}

impl ErrorOut {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
