use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use itemdesk_agent::item_tools::register_item_tools;
use itemdesk_agent::tools::{ToolDescriptor, ToolRegistry};
use itemdesk_agent::{LlmClient, SessionController};
use itemdesk_core::config::SessionConfig;
use itemdesk_core::conversation::{
    OutboundEntry, Reply, Role, SessionStatus, ToolCallRequest, ToolFailureKind, Turn,
    SYSTEM_SPEAKER,
};
use itemdesk_core::errors::{ApplicationError, ConversationError};
use itemdesk_db::repositories::{InMemoryItemRepository, ItemRepository};
use serde_json::json;
use tokio::sync::Semaphore;

/// Hands out canned replies in order; once the script runs dry the call
/// never completes, which freezes the session where the test left it.
#[derive(Default)]
struct ScriptedLlm {
    script: Mutex<VecDeque<Result<Reply, ConversationError>>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedLlm {
    fn new(script: Vec<Result<Reply, ConversationError>>) -> Arc<Self> {
        Arc::new(Self { script: Mutex::new(script.into()), ..Self::default() })
    }

    fn push(&self, reply: Result<Reply, ConversationError>) {
        self.script.lock().expect("script lock").push_back(reply);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Transcripts handed to each call, in call order.
    fn seen(&self) -> Vec<Vec<Turn>> {
        self.seen.lock().expect("seen lock").clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn generate_reply(
        &self,
        transcript: &[Turn],
        _tools: &[ToolDescriptor],
    ) -> Result<Reply, ConversationError> {
        self.seen.lock().expect("seen lock").push(transcript.to_vec());
        let next = self.script.lock().expect("script lock").pop_front();
        match next {
            Some(reply) => {
                self.calls.fetch_add(1, Ordering::SeqCst);
                reply
            }
            None => std::future::pending().await,
        }
    }
}

fn settings() -> SessionConfig {
    SessionConfig {
        initial_message: "I want to add a new item.".to_string(),
        agent_name: "assistant".to_string(),
        max_recovery_attempts: 2,
        max_tool_rounds: 2,
        restart_grace_ms: 500,
    }
}

fn controller_with(
    llm: Arc<dyn LlmClient>,
    settings: SessionConfig,
) -> (SessionController, Arc<InMemoryItemRepository>) {
    let repository = Arc::new(InMemoryItemRepository::new());
    let mut registry = ToolRegistry::new();
    register_item_tools(&mut registry, repository.clone()).expect("register tools");
    let controller = SessionController::new(llm, Arc::new(registry), settings)
        .with_system_prompt("You manage the item master.");
    (controller, repository)
}

fn text(message: &str) -> Result<Reply, ConversationError> {
    Ok(Reply::PlainText(message.to_string()))
}

fn tool_call(name: &str, arguments: serde_json::Value) -> Result<Reply, ConversationError> {
    tool_calls(vec![(name, arguments)])
}

fn tool_calls(calls: Vec<(&str, serde_json::Value)>) -> Result<Reply, ConversationError> {
    let requests = calls
        .into_iter()
        .map(|(name, arguments)| {
            ToolCallRequest::from_value(name, arguments).expect("object arguments")
        })
        .collect();
    Ok(Reply::ToolCalls(requests))
}

fn new_item(code: &str) -> serde_json::Value {
    json!({
        "code": code,
        "description": "Gated item",
        "unitId": 1,
        "costPrice": 1.00,
        "sellingPrice": 2.00
    })
}

fn inference_failure(reason: &str) -> Result<Reply, ConversationError> {
    Err(ConversationError::InferenceFailure(reason.to_string()))
}

/// Polls until `count` outbound entries arrived or a second has passed.
async fn drain(controller: &SessionController, count: usize) -> Vec<OutboundEntry> {
    let mut received = Vec::new();
    for _ in 0..200 {
        while let Some(entry) = controller.poll_outbound().message {
            received.push(entry);
        }
        if received.len() >= count {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    received
}

async fn wait_for_status(controller: &SessionController, expected: SessionStatus) {
    for _ in 0..200 {
        if controller.status() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("session never reached {expected}, still {}", controller.status());
}

#[tokio::test]
async fn poll_before_any_session_reports_idle() {
    let (controller, _) = controller_with(ScriptedLlm::new(Vec::new()), settings());

    let poll = controller.poll_outbound();
    assert_eq!(poll.message, None);
    assert_eq!(poll.session_status, SessionStatus::Idle);
    assert_eq!(controller.submit_message("hello"), Err(ConversationError::NoActiveSession));
}

#[tokio::test]
async fn create_item_tool_call_lands_in_transcript_and_outbound() {
    let llm = ScriptedLlm::new(vec![
        tool_call(
            "create_item",
            json!({
                "code": "ABC123",
                "description": "Sample Item",
                "unitId": 4,
                "costPrice": 45.50,
                "sellingPrice": 65.75
            }),
        ),
        text("ABC123 is saved. Anything else?"),
    ]);
    let (controller, repository) = controller_with(llm.clone(), settings());

    controller.start_session("I want to add a new item.").await.expect("start");
    let entries = drain(&controller, 2).await;

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].speaker, SYSTEM_SPEAKER);
    assert!(entries[0].message.contains("item created"));
    assert!(entries[0].result.as_ref().is_some_and(|result| result.is_success()));
    assert_eq!(entries[1].speaker, "assistant");
    assert_eq!(controller.status(), SessionStatus::Active);

    let (_, turns) = controller.transcript();
    let roles: Vec<Role> = turns.iter().map(|turn| turn.role).collect();
    assert_eq!(roles, vec![Role::System, Role::User, Role::SystemEvent, Role::Assistant]);
    assert_eq!(turns[1].content, "I want to add a new item.");
    assert!(turns[2].content.contains("item created"));

    let stored = repository.list().await.expect("list items");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].code, "ABC123");
}

#[tokio::test]
async fn unknown_tool_is_reported_and_loop_keeps_waiting() {
    let llm = ScriptedLlm::new(vec![
        tool_call("delete_item", json!({ "itemId": 1 })),
        text("I cannot delete items."),
    ]);
    let (controller, _) = controller_with(llm.clone(), settings());

    controller.start_session("Delete item 1").await.expect("start");
    let entries = drain(&controller, 2).await;

    let failure = entries[0].result.as_ref().expect("tool result attached");
    assert_eq!(failure.failure_kind(), Some(ToolFailureKind::UnknownTool));
    assert_eq!(entries[1].message, "I cannot delete items.");

    llm.push(text("Sure, what is the item code?"));
    controller.submit_message("Add one instead").expect("submit");
    let follow_up = drain(&controller, 1).await;
    assert_eq!(follow_up[0].message, "Sure, what is the item code?");
    assert_eq!(controller.status(), SessionStatus::Active);
}

#[tokio::test]
async fn every_request_in_a_reply_is_dispatched_in_order() {
    let llm = ScriptedLlm::new(vec![
        tool_calls(vec![
            ("create_item", new_item("ABC123")),
            ("get_items", json!({})),
            ("delete_item", json!({ "itemId": 1 })),
        ]),
        text("Created ABC123. Deleting is not supported."),
    ]);
    let (controller, _) = controller_with(llm.clone(), settings());

    controller.start_session("Add ABC123, list, then delete it").await.expect("start");
    let entries = drain(&controller, 4).await;

    assert_eq!(entries.len(), 4);
    let tools: Vec<&str> = entries[..3]
        .iter()
        .map(|entry| entry.result.as_ref().expect("tool result attached").tool_name.as_str())
        .collect();
    assert_eq!(tools, vec!["create_item", "get_items", "delete_item"]);
    assert!(entries[0].result.as_ref().is_some_and(|result| result.is_success()));
    assert!(entries[1].message.contains("ABC123"));
    assert_eq!(
        entries[2].result.as_ref().and_then(|result| result.failure_kind()),
        Some(ToolFailureKind::UnknownTool)
    );
    assert_eq!(entries[3].message, "Created ABC123. Deleting is not supported.");

    let (_, turns) = controller.transcript();
    let roles: Vec<Role> = turns.iter().map(|turn| turn.role).collect();
    assert_eq!(
        roles,
        vec![
            Role::System,
            Role::User,
            Role::SystemEvent,
            Role::SystemEvent,
            Role::SystemEvent,
            Role::Assistant
        ]
    );
    assert!(turns[2].content.starts_with("Tool create_item executed"));
    assert!(turns[3].content.starts_with("Tool get_items executed"));
    assert!(turns[4].content.starts_with("Error executing tool delete_item"));

    let seen = llm.seen();
    assert_eq!(llm.calls(), 2);
    assert_eq!(seen[0].len(), 2);
    assert_eq!(seen[1], turns[..5].to_vec());
}

#[tokio::test]
async fn two_inference_failures_mark_the_session_errored() {
    let llm = ScriptedLlm::new(vec![inference_failure("timeout"), inference_failure("timeout")]);
    let (controller, _) = controller_with(llm.clone(), settings());

    controller.start_session("hello").await.expect("start");
    wait_for_status(&controller, SessionStatus::Errored).await;

    let entries = drain(&controller, 2).await;
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|entry| entry.speaker == SYSTEM_SPEAKER));
    assert!(entries[0].message.contains("timeout"));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(llm.calls(), 2);
    assert_eq!(controller.submit_message("anyone?"), Err(ConversationError::NoActiveSession));
}

#[tokio::test]
async fn single_inference_failure_recovers() {
    let llm = ScriptedLlm::new(vec![inference_failure("connection reset"), text("Hi there.")]);
    let (controller, _) = controller_with(llm, settings());

    controller.start_session("hello").await.expect("start");
    let entries = drain(&controller, 2).await;

    assert!(entries[0].message.starts_with("Error generating reply"));
    assert_eq!(entries[1].message, "Hi there.");
    assert_eq!(controller.status(), SessionStatus::Active);
}

#[tokio::test]
async fn malformed_replies_are_retried_then_escalated() {
    let llm = ScriptedLlm::new(vec![
        Ok(Reply::Malformed("empty".to_string())),
        Ok(Reply::Malformed("empty".to_string())),
        Ok(Reply::Malformed("empty".to_string())),
    ]);
    let (controller, _) = controller_with(llm.clone(), settings());

    controller.start_session("hello").await.expect("start");
    wait_for_status(&controller, SessionStatus::Errored).await;

    let (_, turns) = controller.transcript();
    let anomalies =
        turns.iter().filter(|turn| turn.content.starts_with("Unexpected reply")).count();
    assert_eq!(anomalies, 3);
    assert_eq!(llm.calls(), 3);
}

#[tokio::test]
async fn malformed_reply_can_self_correct() {
    let llm =
        ScriptedLlm::new(vec![Ok(Reply::Malformed("no content".to_string())), text("Fixed.")]);
    let (controller, _) = controller_with(llm, settings());

    controller.start_session("hello").await.expect("start");
    let entries = drain(&controller, 2).await;

    assert!(entries[0].message.starts_with("Unexpected reply"));
    assert_eq!(entries[1].message, "Fixed.");
    assert_eq!(controller.status(), SessionStatus::Active);
}

#[tokio::test]
async fn chained_tool_rounds_are_capped() {
    let llm = ScriptedLlm::new(vec![
        tool_call("get_items", json!({})),
        tool_call("get_items", json!({})),
        tool_call("get_items", json!({})),
    ]);
    let (controller, _) = controller_with(llm, settings());

    controller.start_session("list everything").await.expect("start");
    let entries = drain(&controller, 3).await;

    assert_eq!(entries.len(), 3);
    assert!(entries[2].message.starts_with("Stopped after 2 rounds"));
    assert_eq!(controller.status(), SessionStatus::Active);
}

#[tokio::test]
async fn operator_messages_are_processed_in_submission_order() {
    let llm = ScriptedLlm::new(vec![text("first"), text("second"), text("third")]);
    let (controller, _) = controller_with(llm, settings());

    controller.start_session("one").await.expect("start");
    controller.submit_message("two").expect("submit two");
    controller.submit_message("three").expect("submit three");
    let entries = drain(&controller, 3).await;

    let replies: Vec<&str> = entries.iter().map(|entry| entry.message.as_str()).collect();
    assert_eq!(replies, vec!["first", "second", "third"]);

    let (_, turns) = controller.transcript();
    let contents: Vec<&str> = turns.iter().skip(1).map(|turn| turn.content.as_str()).collect();
    assert_eq!(contents, vec!["one", "first", "two", "second", "three", "third"]);
}

#[tokio::test]
async fn submit_after_end_is_rejected() {
    let (controller, _) = controller_with(ScriptedLlm::new(Vec::new()), settings());

    controller.start_session("hello").await.expect("start");
    controller.end_session().expect("end");

    assert_eq!(controller.status(), SessionStatus::Ended);
    assert_eq!(controller.submit_message("late"), Err(ConversationError::NoActiveSession));
    assert!(matches!(
        controller.end_session(),
        Err(ApplicationError::Conversation(ConversationError::NoActiveSession))
    ));
}

#[tokio::test]
async fn restart_requires_the_previous_session_to_stop() {
    let llm = ScriptedLlm::new(vec![text("old reply"), text("unread")]);
    let (controller, _) = controller_with(llm.clone(), settings());

    let first = controller.start_session("old conversation").await.expect("start");
    drain(&controller, 1).await;
    controller.submit_message("more old text").expect("submit");
    wait_until_calls(&llm, 2).await;

    assert!(matches!(
        controller.start_session("new conversation").await,
        Err(ApplicationError::Conversation(ConversationError::AlreadyActive))
    ));

    controller.end_session().expect("end");
    let second = controller.start_session("new conversation").await.expect("restart");
    assert_ne!(first, second);

    let poll = controller.poll_outbound();
    assert_eq!(poll.message, None);
    assert_eq!(poll.session_status, SessionStatus::Active);

    let (session_id, turns) = controller.transcript();
    assert_eq!(session_id, Some(second));
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].content, "You manage the item master.");
    assert_eq!(turns[1].content, "new conversation");
}

#[tokio::test]
async fn blank_start_message_uses_configured_default() {
    let (controller, _) = controller_with(ScriptedLlm::new(Vec::new()), settings());

    controller.start_session("   ").await.expect("start");

    let (_, turns) = controller.transcript();
    assert_eq!(turns[1].content, "I want to add a new item.");
}

#[tokio::test]
async fn errored_session_can_be_restarted() {
    let llm = ScriptedLlm::new(vec![inference_failure("down"), inference_failure("down")]);
    let (controller, _) = controller_with(llm, settings());

    controller.start_session("hello").await.expect("start");
    wait_for_status(&controller, SessionStatus::Errored).await;

    controller.start_session("again").await.expect("restart after error");
    assert_eq!(controller.status(), SessionStatus::Active);
    assert_eq!(controller.poll_outbound().message, None);
}

#[tokio::test]
async fn shutdown_ends_the_active_session() {
    let llm = ScriptedLlm::new(vec![text("hi")]);
    let (controller, _) = controller_with(llm, settings());

    controller.start_session("hello").await.expect("start");
    drain(&controller, 1).await;
    controller.shutdown(Duration::from_secs(1)).await;

    assert_eq!(controller.status(), SessionStatus::Ended);
}

async fn wait_until_calls(llm: &ScriptedLlm, expected: usize) {
    for _ in 0..200 {
        if llm.calls() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {expected} agent calls, saw {}", llm.calls());
}

/// Holds every call from the first session until the gate opens, then plays
/// the script. Calls made for the "new session" seed never complete.
struct GatedLlm {
    gate: Semaphore,
    script: Mutex<VecDeque<Result<Reply, ConversationError>>>,
    first_session_calls: AtomicUsize,
}

impl GatedLlm {
    fn new(script: Vec<Result<Reply, ConversationError>>) -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            script: Mutex::new(script.into()),
            first_session_calls: AtomicUsize::new(0),
        })
    }

    fn open(&self) {
        self.gate.add_permits(64);
    }

    fn first_session_calls(&self) -> usize {
        self.first_session_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for GatedLlm {
    async fn generate_reply(
        &self,
        transcript: &[Turn],
        _tools: &[ToolDescriptor],
    ) -> Result<Reply, ConversationError> {
        if transcript.iter().any(|turn| turn.role == Role::User && turn.content == "new session") {
            return std::future::pending().await;
        }
        self.first_session_calls.fetch_add(1, Ordering::SeqCst);
        let _permit = self.gate.acquire().await.expect("gate semaphore open");
        let next = self.script.lock().expect("script lock").pop_front();
        match next {
            Some(reply) => reply,
            None => std::future::pending().await,
        }
    }
}

fn chained_creates() -> Vec<Result<Reply, ConversationError>> {
    vec![
        tool_call("create_item", new_item("A1")),
        tool_call("create_item", new_item("A2")),
        tool_call("create_item", new_item("A3")),
        text("All three saved."),
    ]
}

async fn wait_for_first_call(llm: &GatedLlm) {
    for _ in 0..200 {
        if llm.first_session_calls() >= 1 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("agent was never called");
}

async fn stored_codes(repository: &InMemoryItemRepository) -> Vec<String> {
    repository.list().await.expect("list items").into_iter().map(|item| item.code).collect()
}

#[tokio::test]
async fn ended_session_finishes_its_step_before_restart_completes() {
    let llm = GatedLlm::new(chained_creates());
    let (controller, repository) = controller_with(llm.clone(), settings());

    controller.start_session("add three items").await.expect("start");
    wait_for_first_call(&llm).await;
    controller.end_session().expect("end");

    let (restarted, ()) = tokio::join!(controller.start_session("new session"), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        llm.open();
    });
    restarted.expect("restart after end");

    assert_eq!(llm.first_session_calls(), 1);
    assert_eq!(stored_codes(&repository).await, vec!["A1".to_string()]);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(llm.first_session_calls(), 1);
    assert_eq!(stored_codes(&repository).await, vec!["A1".to_string()]);

    let (_, turns) = controller.transcript();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1].content, "new session");
    assert_eq!(controller.poll_outbound().message, None);
    assert_eq!(controller.status(), SessionStatus::Active);
}

#[tokio::test]
async fn restart_aborts_a_loop_stuck_past_the_grace_period() {
    let llm = GatedLlm::new(chained_creates());
    let config = SessionConfig { restart_grace_ms: 30, ..settings() };
    let (controller, repository) = controller_with(llm.clone(), config);

    controller.start_session("add three items").await.expect("start");
    wait_for_first_call(&llm).await;
    controller.end_session().expect("end");
    controller.start_session("new session").await.expect("restart after end");

    llm.open();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(llm.first_session_calls(), 1);
    assert!(stored_codes(&repository).await.is_empty());
    assert_eq!(controller.status(), SessionStatus::Active);
}
