//! Conversation state shared by the orchestration loop and the polling boundary.
//!
//! A [`session::Session`] owns one ordered [`transcript::Transcript`], two
//! [`queue::DeliveryQueue`]s (inbound operator text, outbound display entries)
//! and a [`status::SessionStatus`] published through a `watch` channel so readers
//! never block on the loop.

pub mod queue;
pub mod reply;
pub mod session;
pub mod status;
pub mod transcript;

pub use queue::DeliveryQueue;
pub use reply::{
    InboundEntry, OutboundEntry, Reply, ToolCallRequest, ToolCallResult, ToolFailureKind,
    ToolOutcome, SYSTEM_SPEAKER,
};
pub use session::{PollResult, Session, SessionId};
pub use status::SessionStatus;
pub use transcript::{Role, Transcript, Turn};
