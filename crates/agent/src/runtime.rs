use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use itemdesk_core::config::SessionConfig;
use itemdesk_core::conversation::{PollResult, Session, SessionId, SessionStatus, Turn};
use itemdesk_core::errors::{ApplicationError, ConversationError};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::conversation::{ConversationLoop, LoopSettings};
use crate::llm::LlmClient;
use crate::prompt::SYSTEM_PROMPT;
use crate::tools::ToolRegistry;

struct CurrentSession {
    session: Arc<Session>,
    task: Option<JoinHandle<()>>,
}

/// Owns the single current session and the loop that drives it.
pub struct SessionController {
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    settings: SessionConfig,
    system_prompt: String,
    current: Mutex<Option<CurrentSession>>,
    starting: tokio::sync::Mutex<()>,
}

impl SessionController {
    pub fn new(llm: Arc<dyn LlmClient>, tools: Arc<ToolRegistry>, settings: SessionConfig) -> Self {
        Self {
            llm,
            tools,
            settings,
            system_prompt: SYSTEM_PROMPT.to_string(),
            current: Mutex::new(None),
            starting: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    /// Starts a fresh session and launches its loop. A blank message falls
    /// back to the configured initial message.
    ///
    /// The previous loop must have exited before the new session is created:
    /// it gets `restart_grace_ms` to finish its current step and is aborted
    /// after that.
    pub async fn start_session(&self, initial_message: &str) -> Result<SessionId, ApplicationError> {
        let initial_message = match initial_message.trim() {
            "" => self.settings.initial_message.clone(),
            trimmed => trimmed.to_string(),
        };

        let _starting = self.starting.lock().await;

        let previous_task = {
            let mut current = self.lock_current();
            match current.as_mut() {
                Some(previous) => {
                    let previous_status = previous.session.status();
                    if previous_status.is_active() {
                        return Err(ConversationError::AlreadyActive.into());
                    }
                    if previous_status == SessionStatus::Errored {
                        previous.session.transition(SessionStatus::Ended)?;
                    }
                    previous.task.take()
                }
                None => None,
            }
        };

        if let Some(task) = previous_task {
            self.retire(task).await;
        }

        let mut current = self.lock_current();
        if let Some(previous) = current.as_ref() {
            let discarded = previous.session.discard_pending();
            info!(
                event_name = "session.lifecycle.superseded",
                session_id = %previous.session.id(),
                discarded,
                "previous session replaced"
            );
        }

        let session = Arc::new(Session::new());
        session.seed(&self.system_prompt, &initial_message)?;

        let conversation = ConversationLoop::new(
            session.clone(),
            self.llm.clone(),
            self.tools.clone(),
            LoopSettings::from(&self.settings),
        );
        let task = tokio::spawn(conversation.run());
        let session_id = session.id();
        *current = Some(CurrentSession { session, task: Some(task) });

        info!(event_name = "session.lifecycle.started", %session_id, "chat session started");
        Ok(session_id)
    }

    pub fn submit_message(&self, text: &str) -> Result<(), ConversationError> {
        let current = self.lock_current();
        let session = current.as_ref().ok_or(ConversationError::NoActiveSession)?;
        session.session.submit(text)
    }

    /// Never blocks on the loop. Reports `idle` before the first session.
    pub fn poll_outbound(&self) -> PollResult {
        match self.lock_current().as_ref() {
            Some(current) => current.session.poll(),
            None => PollResult { message: None, session_status: SessionStatus::Idle },
        }
    }

    /// Flips the active session to ended; its loop stops after finishing the
    /// step in hand.
    pub fn end_session(&self) -> Result<SessionId, ApplicationError> {
        let current = self.lock_current();
        let session = match current.as_ref() {
            Some(current) if current.session.status().is_active() => &current.session,
            _ => return Err(ConversationError::NoActiveSession.into()),
        };
        session.transition(SessionStatus::Ended)?;
        info!(event_name = "session.lifecycle.ended", session_id = %session.id(), "chat session ended");
        Ok(session.id())
    }

    pub fn status(&self) -> SessionStatus {
        self.lock_current()
            .as_ref()
            .map(|current| current.session.status())
            .unwrap_or(SessionStatus::Idle)
    }

    pub fn current_session_id(&self) -> Option<SessionId> {
        self.lock_current().as_ref().map(|current| current.session.id())
    }

    /// Copy of the current transcript, empty when no session exists.
    pub fn transcript(&self) -> (Option<SessionId>, Vec<Turn>) {
        match self.lock_current().as_ref() {
            Some(current) => (Some(current.session.id()), current.session.transcript_snapshot()),
            None => (None, Vec::new()),
        }
    }

    /// Ends any active session and waits up to `grace` for its loop to exit.
    pub async fn shutdown(&self, grace: Duration) {
        let task = {
            let mut current = self.lock_current();
            let Some(current) = current.as_mut() else {
                return;
            };
            if current.session.status().is_active() {
                let _ = current.session.transition(SessionStatus::Ended);
            }
            current.task.take()
        };

        if let Some(task) = task {
            if tokio::time::timeout(grace, task).await.is_err() {
                warn!(
                    event_name = "session.lifecycle.shutdown_timeout",
                    grace_secs = grace.as_secs(),
                    "conversation loop still busy at shutdown"
                );
            }
        }
    }

    /// Waits for a stopped session's loop to exit, aborting it once the
    /// restart grace runs out.
    async fn retire(&self, mut task: JoinHandle<()>) {
        let grace = Duration::from_millis(self.settings.restart_grace_ms);
        match tokio::time::timeout(grace, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => warn!(
                event_name = "session.lifecycle.loop_panicked",
                error = %error,
                "previous conversation loop did not exit cleanly"
            ),
            Err(_) => {
                warn!(
                    event_name = "session.lifecycle.loop_aborted",
                    grace_ms = self.settings.restart_grace_ms,
                    "previous conversation loop still busy, aborting it"
                );
                task.abort();
                let _ = task.await;
            }
        }
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<CurrentSession>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
