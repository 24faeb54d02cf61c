//! Application state: the session machine, its collaborators, and live sessions.
//!
//! This module owns:
//!   - the prompts/session settings (from TOML or defaults)
//!   - the problem generator and solution evaluator (OpenAI or offline stand-ins)
//!   - the in-memory session registry (dropped with the process; no persistence)
//!
//! Registered sessions expire after `session.session_idle_ttl_secs` without a
//! pass. Expiry is checked lazily whenever a session is opened or looked up.

use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::classify::Classifier;
use crate::config::{load_agent_config_from_env, AgentConfig, SessionSettings};
use crate::domain::Difficulty;
use crate::evaluator::{OpenAiSolutionEvaluator, SolutionEvaluator, UnconfiguredEvaluator};
use crate::generator::{FallbackGenerator, OpenAiProblemGenerator, ProblemGenerator};
use crate::openai::OpenAI;
use crate::session::{Frame, PassInput, Session, SessionMachine};

pub type SessionHandle = Arc<Mutex<Session>>;

pub struct SessionEntry {
    handle: SessionHandle,
    last_touched: Instant,
}

#[derive(Clone)]
pub struct AppState {
    pub machine: Arc<SessionMachine>,
    pub sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
    /// `None` keeps sessions until they are deleted.
    idle_ttl: Option<Duration>,
}

impl AppState {
    /// Build state from env: load config, init OpenAI, wire the collaborators.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_agent_config_from_env().unwrap_or_default();
        let openai = OpenAI::from_env();
        Self::from_parts(cfg, openai)
    }

    pub fn from_parts(cfg: AgentConfig, openai: Option<OpenAI>) -> Self {
        let AgentConfig { prompts, session } = cfg;

        let (generator, evaluator): (Arc<dyn ProblemGenerator>, Arc<dyn SolutionEvaluator>) = match openai {
            Some(oa) => {
                info!(target: "ulysses_backend", base_url = %oa.base_url, generation_model = %oa.generation_model, evaluation_model = %oa.evaluation_model, "OpenAI enabled.");
                (
                    Arc::new(OpenAiProblemGenerator::new(oa.clone(), prompts.clone(), &session)),
                    Arc::new(OpenAiSolutionEvaluator::new(oa, prompts.clone(), &session)),
                )
            }
            None => {
                warn!(target: "ulysses_backend", "OpenAI disabled (no OPENAI_API_KEY). Serving the fallback problem; submissions cannot be evaluated.");
                (Arc::new(FallbackGenerator), Arc::new(UnconfiguredEvaluator))
            }
        };

        info!(
            target: "ulysses_backend",
            retain_drawing_on_retry = session.retain_drawing_on_retry,
            evaluation_timeout_secs = session.evaluation_timeout_secs,
            generation_timeout_secs = session.generation_timeout_secs,
            session_idle_ttl_secs = session.session_idle_ttl_secs,
            "Session policy"
        );

        let machine = SessionMachine::new(generator, evaluator, Classifier::new(&prompts.correct_marker))
            .with_retain_drawing_on_retry(session.retain_drawing_on_retry)
            .with_evaluation_timeout(session.evaluation_timeout());

        Self::with_machine(machine).with_idle_ttl(session.session_idle_ttl())
    }

    pub fn with_machine(machine: SessionMachine) -> Self {
        Self {
            machine: Arc::new(machine),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_ttl: SessionSettings::default().session_idle_ttl(),
        }
    }

    pub fn with_idle_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.idle_ttl = ttl;
        self
    }

    /// Register a new session and run its first pass.
    #[instrument(level = "info", skip(self), fields(%difficulty))]
    pub async fn open_session(&self, difficulty: Difficulty) -> (String, Frame) {
        let id = Uuid::new_v4().to_string();
        let mut session = Session::new(difficulty);
        let frame = session
            .pass(&self.machine, PassInput { difficulty, ..Default::default() })
            .await;
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        self.expire_idle(&mut sessions, now);
        sessions.insert(id.clone(), SessionEntry { handle: Arc::new(Mutex::new(session)), last_touched: now });
        info!(target: "session", session_id = %id, live_sessions = sessions.len(), "Session opened");
        (id, frame)
    }

    /// Look up a session and mark it as used now.
    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn get_session(&self, id: &str) -> Option<SessionHandle> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        self.expire_idle(&mut sessions, now);
        let entry = sessions.get_mut(id)?;
        entry.last_touched = now;
        Some(entry.handle.clone())
    }

    /// Drop sessions idle for longer than the TTL. A session whose handle is
    /// still held elsewhere (a pass in flight) is kept.
    fn expire_idle(&self, sessions: &mut HashMap<String, SessionEntry>, now: Instant) {
        let Some(ttl) = self.idle_ttl else { return };
        let before = sessions.len();
        sessions.retain(|id, entry| {
            let keep = Arc::strong_count(&entry.handle) > 1 || now.duration_since(entry.last_touched) < ttl;
            if !keep {
                debug!(target: "session", session_id = %id, "Session expired after idling");
            }
            keep
        });
        let expired = before - sessions.len();
        if expired > 0 {
            info!(target: "session", expired, live_sessions = sessions.len(), "Idle sessions dropped");
        }
    }

    /// Drop a session. Returns false if it was not registered.
    #[instrument(level = "info", skip(self), fields(%id))]
    pub async fn close_session(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            info!(target: "session", session_id = %id, "Session closed");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::UnconfiguredEvaluator;
    use crate::generator::FallbackGenerator;

    fn offline_state(ttl: Option<Duration>) -> AppState {
        let machine = SessionMachine::new(
            Arc::new(FallbackGenerator),
            Arc::new(UnconfiguredEvaluator),
            Classifier::new("another method"),
        );
        AppState::with_machine(machine).with_idle_ttl(ttl)
    }

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_expire_and_used_ones_stay() {
        let state = offline_state(Some(30 * MINUTE));
        let (a, _) = state.open_session(Difficulty::Easy).await;

        tokio::time::advance(20 * MINUTE).await;
        assert!(state.get_session(&a).await.is_some());
        tokio::time::advance(20 * MINUTE).await;
        let (b, _) = state.open_session(Difficulty::Hard).await;
        assert_eq!(state.sessions.read().await.len(), 2);

        tokio::time::advance(31 * MINUTE).await;
        let (c, _) = state.open_session(Difficulty::Medium).await;

        let sessions = state.sessions.read().await;
        assert!(!sessions.contains_key(&a));
        assert!(!sessions.contains_key(&b));
        assert!(sessions.contains_key(&c));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_session_is_unknown_on_lookup() {
        let state = offline_state(Some(MINUTE));
        let (a, _) = state.open_session(Difficulty::Easy).await;
        tokio::time::advance(2 * MINUTE).await;
        assert!(state.get_session(&a).await.is_none());
        assert!(state.sessions.read().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn session_in_use_survives_expiry() {
        let state = offline_state(Some(MINUTE));
        let (a, _) = state.open_session(Difficulty::Easy).await;
        let held = state.get_session(&a).await;
        tokio::time::advance(10 * MINUTE).await;
        state.open_session(Difficulty::Easy).await;
        assert!(state.sessions.read().await.contains_key(&a));

        drop(held);
        tokio::time::advance(10 * MINUTE).await;
        state.open_session(Difficulty::Easy).await;
        assert!(!state.sessions.read().await.contains_key(&a));
    }

    #[tokio::test(start_paused = true)]
    async fn without_ttl_sessions_live_until_closed() {
        let state = offline_state(None);
        let (a, _) = state.open_session(Difficulty::Easy).await;
        tokio::time::advance(24 * 60 * MINUTE).await;
        assert!(state.get_session(&a).await.is_some());
        assert!(state.close_session(&a).await);
        assert!(state.get_session(&a).await.is_none());
    }
}
