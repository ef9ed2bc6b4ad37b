use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const SYSTEM_SPEAKER: &str = "System";

/// An agent reply, classified once at the collaborator boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    PlainText(String),
    ToolCalls(Vec<ToolCallRequest>),
    /// A reply that is neither text nor a usable tool call list.
    Malformed(String),
}

impl Reply {
    pub fn tool_calls(requests: Vec<ToolCallRequest>) -> Self {
        if requests.is_empty() {
            Self::Malformed("reply requested tools but the call list was empty".to_string())
        } else {
            Self::ToolCalls(requests)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub tool_name: String,
    pub arguments: Map<String, Value>,
}

impl ToolCallRequest {
    pub fn new(tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self { tool_name: tool_name.into(), arguments }
    }

    /// Builds a request from a JSON value; non-object arguments yield `None`.
    pub fn from_value(tool_name: impl Into<String>, arguments: Value) -> Option<Self> {
        match arguments {
            Value::Object(map) => Some(Self::new(tool_name, map)),
            Value::Null => Some(Self::new(tool_name, Map::new())),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolFailureKind {
    UnknownTool,
    InvalidArguments,
    Execution,
}

impl ToolFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownTool => "unknown_tool",
            Self::InvalidArguments => "invalid_arguments",
            Self::Execution => "execution",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { data: Value },
    Failure { kind: ToolFailureKind, reason: String },
}

/// Exactly one of these is produced for every dispatched [`ToolCallRequest`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub tool_name: String,
    pub outcome: ToolOutcome,
}

impl ToolCallResult {
    pub fn success(tool_name: impl Into<String>, data: Value) -> Self {
        Self { tool_name: tool_name.into(), outcome: ToolOutcome::Success { data } }
    }

    pub fn failure(
        tool_name: impl Into<String>,
        kind: ToolFailureKind,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            outcome: ToolOutcome::Failure { kind, reason: reason.into() },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<ToolFailureKind> {
        match &self.outcome {
            ToolOutcome::Success { .. } => None,
            ToolOutcome::Failure { kind, .. } => Some(*kind),
        }
    }

    /// Human-readable line used for the system-event turn and the outbound entry.
    pub fn summary(&self) -> String {
        match &self.outcome {
            ToolOutcome::Success { data } => {
                format!("Tool {} executed. Result: {}", self.tool_name, render_data(data))
            }
            ToolOutcome::Failure { kind, reason } => format!(
                "Error executing tool {} ({}): {}",
                self.tool_name,
                kind.as_str(),
                reason
            ),
        }
    }
}

fn render_data(data: &Value) -> String {
    match data {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Operator text waiting for the loop. `recorded` marks the seed message that
/// is already on the transcript.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundEntry {
    pub text: String,
    pub recorded: bool,
}

impl InboundEntry {
    pub fn operator(text: impl Into<String>) -> Self {
        Self { text: text.into(), recorded: false }
    }

    pub fn seed(text: impl Into<String>) -> Self {
        Self { text: text.into(), recorded: true }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboundEntry {
    pub speaker: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolCallResult>,
}

impl OutboundEntry {
    pub fn text(speaker: impl Into<String>, message: impl Into<String>) -> Self {
        Self { speaker: speaker.into(), message: message.into(), result: None }
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::text(SYSTEM_SPEAKER, message)
    }

    pub fn tool_result(result: ToolCallResult) -> Self {
        Self { speaker: SYSTEM_SPEAKER.to_string(), message: result.summary(), result: Some(result) }
    }
}
