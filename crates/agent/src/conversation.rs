use std::sync::Arc;

use itemdesk_core::config::SessionConfig;
use itemdesk_core::conversation::{
    InboundEntry, OutboundEntry, Reply, Session, SessionStatus, Turn,
};
use itemdesk_core::errors::ConversationError;
use tracing::{debug, info, warn};

use crate::llm::LlmClient;
use crate::tools::{ToolDescriptor, ToolRegistry};

/// Inference failures in a row that end the session.
const FATAL_INFERENCE_FAILURES: u32 = 2;

#[derive(Clone, Debug)]
pub struct LoopSettings {
    pub agent_name: String,
    pub max_recovery_attempts: u32,
    pub max_tool_rounds: u32,
}

impl From<&SessionConfig> for LoopSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            agent_name: config.agent_name.clone(),
            max_recovery_attempts: config.max_recovery_attempts,
            max_tool_rounds: config.max_tool_rounds,
        }
    }
}

/// Drives one session: waits for operator text, asks the agent for a reply
/// and acts on it until the session stops being active.
pub struct ConversationLoop {
    session: Arc<Session>,
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    descriptors: Vec<ToolDescriptor>,
    settings: LoopSettings,
}

impl ConversationLoop {
    pub fn new(
        session: Arc<Session>,
        llm: Arc<dyn LlmClient>,
        tools: Arc<ToolRegistry>,
        settings: LoopSettings,
    ) -> Self {
        let descriptors = tools.describe();
        Self { session, llm, tools, descriptors, settings }
    }

    pub async fn run(self) {
        let session_id = self.session.id();
        let mut status = self.session.subscribe_status();
        info!(event_name = "conversation.loop.started", %session_id, "conversation loop started");

        while self.session.status().is_active() {
            let entry = tokio::select! {
                biased;
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                entry = self.session.inbound().recv() => entry,
            };
            self.handle_entry(entry).await;
        }

        info!(
            event_name = "conversation.loop.stopped",
            %session_id,
            status = %self.session.status(),
            "conversation loop stopped"
        );
    }

    /// Processes one inbound entry through to the point where the loop waits
    /// for operator input again.
    async fn handle_entry(&self, entry: InboundEntry) {
        if !entry.recorded {
            self.session.append_turn(Turn::user(&entry.text));
        }
        info!(
            event_name = "conversation.turn.received",
            session_id = %self.session.id(),
            chars = entry.text.len(),
            "processing operator message"
        );

        let mut tool_rounds = 0;
        let mut malformed_in_a_row = 0;
        let mut follow_up = false;

        loop {
            // An ended session finishes the step in hand but asks for nothing more.
            if follow_up && self.stopped("follow-up reply") {
                return;
            }
            follow_up = true;

            let Some(reply) = self.generate_with_recovery().await else {
                return;
            };

            match reply {
                Reply::PlainText(text) => {
                    self.session.append_turn(Turn::assistant(&text));
                    self.session.outbound().push(OutboundEntry::text(&self.settings.agent_name, text));
                    debug!(
                        event_name = "conversation.reply.delivered",
                        session_id = %self.session.id(),
                        "agent reply queued for the operator"
                    );
                    return;
                }
                Reply::ToolCalls(requests) => {
                    malformed_in_a_row = 0;
                    tool_rounds += 1;
                    if tool_rounds > self.settings.max_tool_rounds {
                        warn!(
                            event_name = "conversation.tool.round_limit",
                            session_id = %self.session.id(),
                            max_tool_rounds = self.settings.max_tool_rounds,
                            "tool round limit reached"
                        );
                        self.record_system_event(format!(
                            "Stopped after {} rounds of tool calls. Waiting for operator input.",
                            self.settings.max_tool_rounds
                        ));
                        return;
                    }
                    for request in &requests {
                        let result = self.tools.dispatch(request).await;
                        self.session.append_turn(Turn::system_event(result.summary()));
                        self.session.outbound().push(OutboundEntry::tool_result(result));
                    }
                }
                Reply::Malformed(reason) => {
                    malformed_in_a_row += 1;
                    let error = ConversationError::MalformedReply(reason);
                    warn!(
                        event_name = "conversation.reply.malformed",
                        session_id = %self.session.id(),
                        attempt = malformed_in_a_row,
                        error = %error,
                        "agent reply could not be interpreted"
                    );
                    self.record_system_event(format!("Unexpected reply from the agent: {error}"));
                    if malformed_in_a_row > self.settings.max_recovery_attempts {
                        self.fail("agent kept producing unusable replies");
                        return;
                    }
                }
            }
        }
    }

    /// Asks for a reply, retrying once after an inference failure. Returns
    /// `None` once the session has been marked errored.
    async fn generate_with_recovery(&self) -> Option<Reply> {
        let mut failures = 0;
        loop {
            let transcript = self.session.transcript_snapshot();
            match self.llm.generate_reply(&transcript, &self.descriptors).await {
                Ok(reply) => return Some(reply),
                Err(error) => {
                    failures += 1;
                    warn!(
                        event_name = "conversation.inference.failed",
                        session_id = %self.session.id(),
                        attempt = failures,
                        error = %error,
                        "agent reply call failed"
                    );
                    self.record_system_event(format!("Error generating reply: {error}"));
                    if failures >= FATAL_INFERENCE_FAILURES {
                        self.fail("agent reply failed twice in a row");
                        return None;
                    }
                    if self.stopped("recovery reply") {
                        return None;
                    }
                }
            }
        }
    }

    /// True once the session left the active state; `skipped` names the
    /// agent call that will not be made.
    fn stopped(&self, skipped: &str) -> bool {
        let status = self.session.status();
        if status.is_active() {
            return false;
        }
        debug!(
            event_name = "conversation.loop.step_cut",
            session_id = %self.session.id(),
            %status,
            skipped,
            "session no longer active, skipping agent call"
        );
        true
    }

    fn record_system_event(&self, text: String) {
        self.session.append_turn(Turn::system_event(&text));
        self.session.outbound().push(OutboundEntry::system(text));
    }

    fn fail(&self, reason: &str) {
        match self.session.transition(SessionStatus::Errored) {
            Ok(_) => warn!(
                event_name = "session.lifecycle.errored",
                session_id = %self.session.id(),
                reason,
                "session marked errored"
            ),
            // Ended by the operator while the step was in flight.
            Err(error) => debug!(
                event_name = "session.lifecycle.errored_skipped",
                session_id = %self.session.id(),
                error = %error,
                "session already left the active state"
            ),
        }
    }
}
