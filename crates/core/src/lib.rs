pub mod config;
pub mod conversation;
pub mod domain;
pub mod errors;

pub use conversation::{
    DeliveryQueue, InboundEntry, OutboundEntry, PollResult, Reply, Role, Session, SessionId,
    SessionStatus, ToolCallRequest, ToolCallResult, ToolFailureKind, ToolOutcome, Transcript,
    Turn, SYSTEM_SPEAKER,
};
pub use domain::item::{Item, ItemChanges, ItemId, NewItem};
pub use errors::{ApplicationError, ConversationError, DomainError, InterfaceError};
