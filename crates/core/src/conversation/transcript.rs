use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    SystemEvent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::SystemEvent => "system_event",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system_event(content: impl Into<String>) -> Self {
        Self::new(Role::SystemEvent, content)
    }
}

/// Append-only, ordered record of one conversation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Owned copy of every turn; later appends do not show through it.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }
}

#[cfg(test)]
mod tests {
    use super::{Role, Transcript, Turn};

    #[test]
    fn append_preserves_order() {
        let mut transcript = Transcript::new();
        transcript.append(Turn::system("prompt"));
        transcript.append(Turn::user("hello"));
        transcript.append(Turn::assistant("hi"));

        let roles = transcript.snapshot().iter().map(|turn| turn.role).collect::<Vec<_>>();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
    }

    #[test]
    fn snapshot_is_detached_from_live_transcript() {
        let mut transcript = Transcript::new();
        transcript.append(Turn::user("first"));

        let mut snapshot = transcript.snapshot();
        snapshot.push(Turn::user("injected"));
        transcript.append(Turn::system_event("second"));

        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.last().map(|turn| turn.content.as_str()), Some("second"));
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[1].content, "injected");
    }
}
