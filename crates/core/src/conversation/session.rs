use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::conversation::queue::DeliveryQueue;
use crate::conversation::reply::{InboundEntry, OutboundEntry};
use crate::conversation::status::SessionStatus;
use crate::conversation::transcript::{Transcript, Turn};
use crate::errors::{ConversationError, DomainError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Answer to a poll: the next outbound entry, if any, and the status at the
/// time of the poll.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PollResult {
    pub message: Option<OutboundEntry>,
    pub session_status: SessionStatus,
}

/// One conversation: its transcript, both delivery queues and its status.
///
/// The conversation loop is the only writer of the transcript; the polling
/// boundary only touches the queues and reads the status.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    started_at: DateTime<Utc>,
    transcript: Mutex<Transcript>,
    inbound: DeliveryQueue<InboundEntry>,
    outbound: DeliveryQueue<OutboundEntry>,
    status: watch::Sender<SessionStatus>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let (status, _) = watch::channel(SessionStatus::Idle);
        Self {
            id: SessionId::new(),
            started_at: Utc::now(),
            transcript: Mutex::new(Transcript::new()),
            inbound: DeliveryQueue::new(),
            outbound: DeliveryQueue::new(),
            status,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Moves to `next` if the lifecycle allows it and returns the prior status.
    pub fn transition(&self, next: SessionStatus) -> Result<SessionStatus, DomainError> {
        let mut outcome = Err(DomainError::InvalidStatusTransition { from: next, to: next });
        self.status.send_if_modified(|current| {
            if current.can_transition_to(next) {
                outcome = Ok(*current);
                *current = next;
                true
            } else {
                outcome = Err(DomainError::InvalidStatusTransition { from: *current, to: next });
                false
            }
        });
        outcome
    }

    /// Records the system prompt and the initiating message, activates the
    /// session and queues the initiating message for the loop.
    pub fn seed(
        &self,
        system_prompt: &str,
        initial_message: &str,
    ) -> Result<(), DomainError> {
        {
            let mut transcript = self.lock_transcript();
            if !transcript.is_empty() {
                return Err(DomainError::InvariantViolation(
                    "a session can only be seeded once".to_string(),
                ));
            }
            transcript.append(Turn::system(system_prompt));
            transcript.append(Turn::user(initial_message));
        }
        self.transition(SessionStatus::Active)?;
        self.inbound.push(InboundEntry::seed(initial_message));
        Ok(())
    }

    /// Queues operator text; rejected unless the session is active.
    pub fn submit(&self, text: impl Into<String>) -> Result<(), ConversationError> {
        if !self.status().is_active() {
            return Err(ConversationError::NoActiveSession);
        }
        self.inbound.push(InboundEntry::operator(text));
        Ok(())
    }

    /// Never waits on the loop.
    pub fn poll(&self) -> PollResult {
        PollResult { message: self.outbound.try_pop(), session_status: self.status() }
    }

    pub fn append_turn(&self, turn: Turn) {
        self.lock_transcript().append(turn);
    }

    pub fn transcript_snapshot(&self) -> Vec<Turn> {
        self.lock_transcript().snapshot()
    }

    pub fn inbound(&self) -> &DeliveryQueue<InboundEntry> {
        &self.inbound
    }

    pub fn outbound(&self) -> &DeliveryQueue<OutboundEntry> {
        &self.outbound
    }

    /// Drops anything still queued in either direction.
    pub fn discard_pending(&self) -> usize {
        self.inbound.clear() + self.outbound.clear()
    }

    fn lock_transcript(&self) -> MutexGuard<'_, Transcript> {
        self.transcript.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::Session;
    use crate::conversation::reply::OutboundEntry;
    use crate::conversation::status::SessionStatus;
    use crate::conversation::transcript::Role;
    use crate::errors::{ConversationError, DomainError};

    #[test]
    fn seed_records_system_and_user_turns_and_activates() {
        let session = Session::new();
        session.seed("You manage items.", "I want to add a new item.").expect("seed session");

        let turns = session.transcript_snapshot();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::System);
        assert_eq!(turns[1].role, Role::User);
        assert_eq!(turns[1].content, "I want to add a new item.");
        assert_eq!(session.status(), SessionStatus::Active);

        let queued = session.inbound().try_pop().expect("seed message should be queued");
        assert!(queued.recorded);
    }

    #[test]
    fn seeding_twice_is_rejected() {
        let session = Session::new();
        session.seed("prompt", "hello").expect("first seed");
        assert!(matches!(session.seed("prompt", "again"), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn submit_requires_active_status_and_leaves_inbound_untouched() {
        let session = Session::new();
        session.seed("prompt", "hello").expect("seed");
        session.inbound().clear();
        session.transition(SessionStatus::Ended).expect("end session");

        assert_eq!(session.submit("late"), Err(ConversationError::NoActiveSession));
        assert!(session.inbound().is_empty());
    }

    #[test]
    fn poll_on_empty_outbound_is_idempotent() {
        let session = Session::new();
        session.seed("prompt", "hello").expect("seed");

        for _ in 0..3 {
            let poll = session.poll();
            assert_eq!(poll.message, None);
            assert_eq!(poll.session_status, SessionStatus::Active);
        }
    }

    #[test]
    fn poll_returns_outbound_in_production_order() {
        let session = Session::new();
        session.outbound().push(OutboundEntry::system("first"));
        session.outbound().push(OutboundEntry::text("assistant", "second"));

        assert_eq!(session.poll().message.map(|entry| entry.message), Some("first".to_string()));
        assert_eq!(session.poll().message.map(|entry| entry.message), Some("second".to_string()));
        assert_eq!(session.poll().message, None);
    }

    #[test]
    fn invalid_transition_reports_current_status() {
        let session = Session::new();
        let error = session.transition(SessionStatus::Ended).expect_err("idle cannot end");
        assert_eq!(
            error,
            DomainError::InvalidStatusTransition {
                from: SessionStatus::Idle,
                to: SessionStatus::Ended
            }
        );
    }

    #[tokio::test]
    async fn status_watchers_observe_transitions() {
        let session = Session::new();
        let mut watcher = session.subscribe_status();
        session.seed("prompt", "hello").expect("seed");

        watcher.changed().await.expect("status sender alive");
        assert_eq!(*watcher.borrow_and_update(), SessionStatus::Active);
    }
}
