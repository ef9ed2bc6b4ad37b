use std::time::Duration;

use async_trait::async_trait;
use itemdesk_core::config::{LlmConfig, LlmProvider};
use itemdesk_core::conversation::{Reply, Role, ToolCallRequest, Turn};
use itemdesk_core::errors::{ApplicationError, ConversationError};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;

use crate::tools::ToolDescriptor;

/// Produces the agent's next reply from the full transcript.
///
/// Failures are reported as [`ConversationError::InferenceFailure`]; replies
/// that arrive but cannot be used are returned as [`Reply::Malformed`].
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate_reply(
        &self,
        transcript: &[Turn],
        tools: &[ToolDescriptor],
    ) -> Result<Reply, ConversationError>;
}

/// Client for any backend that speaks the OpenAI chat completions API
/// (OpenAI itself, Ollama, OpenRouter and similar).
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
}

impl OpenAiClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, ApplicationError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| ApplicationError::Integration(error.to_string()))?;
        let api_key = match config.provider {
            LlmProvider::OpenAi => config.api_key.clone(),
            LlmProvider::Ollama => None,
        };

        Ok(Self {
            http,
            endpoint: format!("{}/v1/chat/completions", config.endpoint_base()),
            model: config.model.clone(),
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(&self, transcript: &[Turn], tools: &[ToolDescriptor]) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": build_messages(transcript),
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(build_tools(tools));
        }
        body
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate_reply(
        &self,
        transcript: &[Turn],
        tools: &[ToolDescriptor],
    ) -> Result<Reply, ConversationError> {
        let mut request = self.http.post(&self.endpoint).json(&self.request_body(transcript, tools));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|error| ConversationError::InferenceFailure(error.to_string()))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|error| ConversationError::InferenceFailure(error.to_string()))?;

        if !status.is_success() {
            return Err(ConversationError::InferenceFailure(format!(
                "chat completion returned {status}: {body}"
            )));
        }

        debug!(
            event_name = "llm.reply.received",
            model = %self.model,
            turns = transcript.len(),
            "chat completion returned"
        );
        Ok(parse_chat_completion(&body))
    }
}

/// System-event turns go out with the `system` role; the API has no
/// equivalent of its own.
pub fn build_messages(transcript: &[Turn]) -> Vec<Value> {
    transcript
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::System | Role::SystemEvent => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            json!({ "role": role, "content": turn.content })
        })
        .collect()
}

pub fn build_tools(tools: &[ToolDescriptor]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                }
            })
        })
        .collect()
}

/// Classifies a chat completion body into a [`Reply`].
pub fn parse_chat_completion(body: &Value) -> Reply {
    let message = &body["choices"][0]["message"];
    if !message.is_object() {
        return Reply::Malformed("completion carried no message".to_string());
    }

    if let Some(calls) = message["tool_calls"].as_array().filter(|calls| !calls.is_empty()) {
        let mut requests = Vec::with_capacity(calls.len());
        for call in calls {
            let Some(name) = call["function"]["name"].as_str() else {
                return Reply::Malformed("tool call without a function name".to_string());
            };
            let arguments = match &call["function"]["arguments"] {
                Value::String(raw) if raw.trim().is_empty() => Value::Null,
                Value::String(raw) => match serde_json::from_str(raw) {
                    Ok(value) => value,
                    Err(error) => {
                        return Reply::Malformed(format!(
                            "arguments for `{name}` are not valid JSON: {error}"
                        ))
                    }
                },
                other => other.clone(),
            };
            let Some(request) = ToolCallRequest::from_value(name, arguments) else {
                return Reply::Malformed(format!("arguments for `{name}` are not an object"));
            };
            requests.push(request);
        }
        return Reply::tool_calls(requests);
    }

    match message["content"].as_str() {
        Some(text) if !text.trim().is_empty() => Reply::PlainText(text.to_string()),
        _ => Reply::Malformed("reply carried neither text nor tool calls".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use itemdesk_core::config::{LlmConfig, LlmProvider};
    use itemdesk_core::conversation::{Reply, Turn};
    use serde_json::json;

    use super::{build_messages, parse_chat_completion, OpenAiClient};

    #[test]
    fn text_reply_is_plain_text() {
        let body = json!({
            "choices": [{ "message": { "role": "assistant", "content": "What is the item code?" } }]
        });
        assert_eq!(parse_chat_completion(&body), Reply::PlainText("What is the item code?".into()));
    }

    #[test]
    fn tool_calls_are_decoded_in_order() {
        let body = json!({
            "choices": [{ "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [
                    { "id": "1", "type": "function", "function": {
                        "name": "create_item",
                        "arguments": "{\"code\":\"ABC123\",\"unitId\":4}"
                    }},
                    { "id": "2", "type": "function", "function": {
                        "name": "get_items", "arguments": ""
                    }}
                ]
            }}]
        });

        let Reply::ToolCalls(requests) = parse_chat_completion(&body) else {
            panic!("expected tool calls");
        };
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tool_name, "create_item");
        assert_eq!(requests[0].arguments["code"], json!("ABC123"));
        assert_eq!(requests[1].tool_name, "get_items");
        assert!(requests[1].arguments.is_empty());
    }

    #[test]
    fn undecodable_arguments_are_malformed() {
        let body = json!({
            "choices": [{ "message": { "tool_calls": [
                { "function": { "name": "create_item", "arguments": "{not json" } }
            ]}}]
        });
        assert!(matches!(parse_chat_completion(&body), Reply::Malformed(_)));
    }

    #[test]
    fn empty_message_is_malformed() {
        let empty = json!({ "choices": [{ "message": { "content": "   " } }] });
        let missing = json!({ "error": "overloaded" });
        assert!(matches!(parse_chat_completion(&empty), Reply::Malformed(_)));
        assert!(matches!(parse_chat_completion(&missing), Reply::Malformed(_)));
    }

    #[test]
    fn system_events_are_sent_with_system_role() {
        let messages = build_messages(&[
            Turn::system("prompt"),
            Turn::user("hi"),
            Turn::system_event("Tool get_items executed."),
            Turn::assistant("done"),
        ]);
        let roles: Vec<&str> =
            messages.iter().filter_map(|message| message["role"].as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "system", "assistant"]);
    }

    #[test]
    fn endpoint_uses_configured_base_url() {
        let config = LlmConfig {
            provider: LlmProvider::Ollama,
            api_key: None,
            base_url: Some("http://localhost:11434/".to_string()),
            model: "llama3.1".to_string(),
            timeout_secs: 5,
        };
        let client = OpenAiClient::from_config(&config).expect("client");
        assert_eq!(client.endpoint(), "http://localhost:11434/v1/chat/completions");
    }
}
