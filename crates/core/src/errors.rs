use thiserror::Error;

use crate::conversation::status::SessionStatus;

/// Failures raised by the conversation engine and its lifecycle operations.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConversationError {
    #[error("a tool named `{0}` is already registered")]
    DuplicateToolName(String),
    #[error("unknown tool `{0}`")]
    UnknownTool(String),
    #[error("agent reply failed: {0}")]
    InferenceFailure(String),
    #[error("tool `{tool}` failed: {reason}")]
    ToolExecutionFailure { tool: String, reason: String },
    #[error("malformed agent reply: {0}")]
    MalformedReply(String),
    #[error("no active session")]
    NoActiveSession,
    #[error("a session is already active")]
    AlreadyActive,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid session transition from {from:?} to {to:?}")]
    InvalidStatusTransition { from: SessionStatus, to: SessionStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Conversation(#[from] ConversationError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Conflict { .. } => {
                "The request conflicts with the current chat session state."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::Conflict { message, .. }
            | Self::ServiceUnavailable { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Conversation(
                error @ (ConversationError::NoActiveSession | ConversationError::AlreadyActive),
            ) => Self::Conflict { message: error.to_string(), correlation_id: unassigned() },
            ApplicationError::Conversation(
                error @ (ConversationError::DuplicateToolName(_)
                | ConversationError::UnknownTool(_)
                | ConversationError::MalformedReply(_)),
            ) => Self::BadRequest { message: error.to_string(), correlation_id: unassigned() },
            ApplicationError::Conversation(
                error @ (ConversationError::InferenceFailure(_)
                | ConversationError::ToolExecutionFailure { .. }),
            ) => Self::ServiceUnavailable {
                message: error.to_string(),
                correlation_id: unassigned(),
            },
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned() }
            }
        }
    }
}
