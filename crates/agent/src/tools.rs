use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use itemdesk_core::conversation::{
    ToolCallRequest, ToolCallResult, ToolFailureKind, ToolOutcome,
};
use itemdesk_core::errors::ConversationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

/// What the inference backend is told about a tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON schema of the argument object.
    pub parameters: Value,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Execution(String),
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;
    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value, ToolError>;
}

#[derive(Default)]
pub struct ToolRegistry {
    order: Vec<String>,
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T>(&mut self, tool: T) -> Result<(), ConversationError>
    where
        T: Tool + 'static,
    {
        self.register_shared(Arc::new(tool))
    }

    pub fn register_shared(&mut self, tool: Arc<dyn Tool>) -> Result<(), ConversationError> {
        let name = tool.descriptor().name;
        if self.tools.contains_key(&name) {
            return Err(ConversationError::DuplicateToolName(name));
        }
        self.order.push(name.clone());
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Descriptors in registration order.
    pub fn describe(&self) -> Vec<ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.descriptor())
            .collect()
    }

    /// Runs the named tool. Always yields a result: unknown names, argument
    /// errors, backend errors and panics all come back as failures.
    pub async fn dispatch(&self, request: &ToolCallRequest) -> ToolCallResult {
        let name = request.tool_name.as_str();
        let Some(tool) = self.tools.get(name).cloned() else {
            let error = ConversationError::UnknownTool(name.to_string());
            warn!(
                event_name = "conversation.tool.unknown",
                tool_name = name,
                error = %error,
                "agent requested an unregistered tool"
            );
            return ToolCallResult::failure(name, ToolFailureKind::UnknownTool, error.to_string());
        };

        let arguments = request.arguments.clone();
        let joined = tokio::spawn(async move { tool.execute(arguments).await }).await;

        let result = match joined {
            Ok(Ok(data)) => ToolCallResult::success(name, data),
            Ok(Err(ToolError::InvalidArguments(reason))) => {
                ToolCallResult::failure(name, ToolFailureKind::InvalidArguments, reason)
            }
            Ok(Err(ToolError::Execution(reason))) => {
                ToolCallResult::failure(name, ToolFailureKind::Execution, reason)
            }
            Err(join_error) => ToolCallResult::failure(
                name,
                ToolFailureKind::Execution,
                format!("tool aborted: {join_error}"),
            ),
        };

        match &result.outcome {
            ToolOutcome::Success { .. } => info!(
                event_name = "conversation.tool.dispatched",
                tool_name = name,
                "tool call succeeded"
            ),
            ToolOutcome::Failure { reason, .. } => {
                let error = ConversationError::ToolExecutionFailure {
                    tool: name.to_string(),
                    reason: reason.clone(),
                };
                warn!(
                    event_name = "conversation.tool.failed",
                    tool_name = name,
                    error = %error,
                    "tool call failed"
                );
            }
        }

        result
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
