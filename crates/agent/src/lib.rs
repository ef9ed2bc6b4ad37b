//! Agent runtime: drives one conversation between an operator and an
//! inference backend, dispatching the tool calls the backend asks for.
//!
//! # Architecture
//!
//! 1. **Lifecycle** (`runtime`) - `SessionController` starts, ends and polls
//!    the single current session.
//! 2. **Loop** (`conversation`) - `ConversationLoop` pops operator text,
//!    asks the backend for a reply and interprets it.
//! 3. **Backend** (`llm`) - `LlmClient` trait plus an OpenAI-compatible client.
//! 4. **Tools** (`tools`, `item_tools`) - `ToolRegistry` and the item master
//!    operations it exposes.
//!
//! The backend never touches storage directly. Every side effect goes through
//! a registered tool and its outcome is written back into the transcript.

pub mod conversation;
pub mod item_tools;
pub mod llm;
pub mod prompt;
pub mod runtime;
pub mod tools;

pub use conversation::{ConversationLoop, LoopSettings};
pub use llm::{LlmClient, OpenAiClient};
pub use runtime::SessionController;
pub use tools::{Tool, ToolDescriptor, ToolError, ToolRegistry};
