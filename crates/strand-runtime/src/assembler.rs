use std::collections::HashMap;
use strand_contract::{
    gen_message_id, now_millis, ChunkKind, Message, MessageChunk, MessageStatus, Role,
    RuntimeEvent, StreamItem,
};
use tracing::warn;

enum OpenKind {
    Text {
        role: Role,
        parent_message_id: Option<String>,
    },
    Action {
        name: String,
        parent_message_id: Option<String>,
    },
}

struct OpenMessage {
    kind: OpenKind,
    created_at: u64,
    buffer: String,
    /// Set when the message is already known to be bad (e.g. content
    /// arrived before its start event).
    failed_reason: Option<String>,
}

/// Reduces the low-level event stream into typed messages.
///
/// Start events open an entry and emit nothing; content/args events emit
/// incremental [`MessageChunk`]s; end events emit the finalized
/// [`Message`]. Single-shot events (action results, agent state, meta)
/// pass through immediately. Content for an unknown message id opens an
/// implicit entry flagged failed instead of being dropped, so downstream
/// consumers still see the data and the final status tells the truth.
pub struct MessageAssembler {
    open: HashMap<String, OpenMessage>,
    /// Insertion order of `open`, so `finish` is deterministic.
    order: Vec<String>,
}

impl Default for MessageAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageAssembler {
    pub fn new() -> Self {
        Self {
            open: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Whether any started message has not yet seen its end event.
    pub fn has_open_messages(&self) -> bool {
        !self.open.is_empty()
    }

    /// Process one event, returning the stream items it produces.
    pub fn handle(&mut self, event: RuntimeEvent) -> Vec<StreamItem> {
        match event {
            RuntimeEvent::TextMessageStart {
                message_id,
                role,
                parent_message_id,
            } => {
                self.open_entry(
                    message_id,
                    OpenKind::Text {
                        role,
                        parent_message_id,
                    },
                    None,
                );
                Vec::new()
            }
            RuntimeEvent::TextMessageContent {
                message_id,
                content,
            } => {
                if !self.open.contains_key(&message_id) {
                    warn!(message_id = %message_id, "text content before start");
                    self.open_entry(
                        message_id.clone(),
                        OpenKind::Text {
                            role: Role::Assistant,
                            parent_message_id: None,
                        },
                        Some("content received before the message started".to_string()),
                    );
                }
                self.append(&message_id, &content);
                vec![StreamItem::Chunk(MessageChunk {
                    message_id,
                    kind: ChunkKind::TextContent,
                    delta: content,
                })]
            }
            RuntimeEvent::TextMessageEnd { message_id } => self.close(&message_id),
            RuntimeEvent::ActionExecutionStart {
                action_execution_id,
                action_name,
                parent_message_id,
            } => {
                self.open_entry(
                    action_execution_id,
                    OpenKind::Action {
                        name: action_name,
                        parent_message_id,
                    },
                    None,
                );
                Vec::new()
            }
            RuntimeEvent::ActionExecutionArgs {
                action_execution_id,
                args,
            } => {
                if !self.open.contains_key(&action_execution_id) {
                    warn!(action_execution_id = %action_execution_id, "action args before start");
                    self.open_entry(
                        action_execution_id.clone(),
                        OpenKind::Action {
                            name: String::new(),
                            parent_message_id: None,
                        },
                        Some("arguments received before the action started".to_string()),
                    );
                }
                self.append(&action_execution_id, &args);
                vec![StreamItem::Chunk(MessageChunk {
                    message_id: action_execution_id,
                    kind: ChunkKind::ActionArgs,
                    delta: args,
                })]
            }
            RuntimeEvent::ActionExecutionEnd {
                action_execution_id,
            } => self.close(&action_execution_id),
            RuntimeEvent::ActionExecutionResult {
                action_execution_id,
                action_name,
                result,
            } => vec![StreamItem::Message(Message::action_result(
                gen_message_id(),
                action_execution_id,
                action_name,
                result,
            ))],
            RuntimeEvent::AgentStateMessage {
                thread_id,
                agent_name,
                node_name,
                run_id,
                active,
                running,
                state,
            } => vec![StreamItem::Message(Message::AgentState {
                id: gen_message_id(),
                created_at: now_millis(),
                status: MessageStatus::Success,
                thread_id,
                agent_name,
                node_name,
                run_id,
                active,
                running,
                state,
            })],
            RuntimeEvent::MetaEvent { name, value } => {
                vec![StreamItem::MetaEvent { name, value }]
            }
        }
    }

    /// Finalize every still-open message as failed with `reason`.
    pub fn finish(&mut self, reason: &str) -> Vec<StreamItem> {
        let ids: Vec<String> = self.order.drain(..).collect();
        let mut items = Vec::new();
        for id in ids {
            if let Some(mut entry) = self.open.remove(&id) {
                warn!(message_id = %id, reason, "failing unterminated message");
                entry.failed_reason.get_or_insert_with(|| reason.to_string());
                items.push(StreamItem::Message(finalize(id, entry)));
            }
        }
        items
    }

    fn open_entry(&mut self, id: String, kind: OpenKind, failed_reason: Option<String>) {
        if self.open.contains_key(&id) {
            warn!(message_id = %id, "duplicate start event ignored");
            return;
        }
        self.order.push(id.clone());
        self.open.insert(
            id,
            OpenMessage {
                kind,
                created_at: now_millis(),
                buffer: String::new(),
                failed_reason,
            },
        );
    }

    fn append(&mut self, id: &str, delta: &str) {
        if let Some(entry) = self.open.get_mut(id) {
            entry.buffer.push_str(delta);
        }
    }

    fn close(&mut self, id: &str) -> Vec<StreamItem> {
        match self.open.remove(id) {
            Some(entry) => {
                self.order.retain(|open_id| open_id != id);
                vec![StreamItem::Message(finalize(id.to_string(), entry))]
            }
            None => {
                warn!(message_id = %id, "end event for unknown message ignored");
                Vec::new()
            }
        }
    }
}

/// Open messages are pending; closing one advances it to its terminal
/// status through the monotonic transition rule.
fn finalize(id: String, entry: OpenMessage) -> Message {
    let status = match entry.failed_reason {
        Some(reason) => MessageStatus::failed(reason),
        None => MessageStatus::Success,
    };
    let mut message = match entry.kind {
        OpenKind::Text {
            role,
            parent_message_id,
        } => Message::Text {
            id,
            created_at: entry.created_at,
            status: MessageStatus::Pending,
            parent_message_id,
            role,
            content: entry.buffer,
        },
        OpenKind::Action {
            name,
            parent_message_id,
        } => Message::ActionExecution {
            id,
            created_at: entry.created_at,
            status: MessageStatus::Pending,
            parent_message_id,
            name,
            arguments: entry.buffer,
        },
    };
    message.advance_status(status);
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(items: &[StreamItem]) -> Vec<&Message> {
        items.iter().filter_map(StreamItem::as_message).collect()
    }

    #[test]
    fn assembles_streamed_text() {
        let mut assembler = MessageAssembler::new();
        assert!(assembler.handle(RuntimeEvent::text_start("m1")).is_empty());

        let chunks = assembler.handle(RuntimeEvent::text_content("m1", "Hello "));
        assert_eq!(chunks[0].as_chunk().unwrap().delta, "Hello ");
        assembler.handle(RuntimeEvent::text_content("m1", "there"));

        let done = assembler.handle(RuntimeEvent::text_end("m1"));
        let message = done[0].as_message().unwrap();
        assert_eq!(message.text_content(), Some("Hello there"));
        assert_eq!(message.status(), &MessageStatus::Success);
        assert!(!assembler.has_open_messages());
    }

    #[test]
    fn interleaved_messages_accumulate_independently() {
        let mut assembler = MessageAssembler::new();
        assembler.handle(RuntimeEvent::text_start("m1"));
        assembler.handle(RuntimeEvent::action_start("a1", "lookup"));
        assembler.handle(RuntimeEvent::text_content("m1", "thinking"));
        assembler.handle(RuntimeEvent::action_args("a1", r#"{"q":"#));
        assembler.handle(RuntimeEvent::action_args("a1", r#""rust"}"#));

        let action = assembler.handle(RuntimeEvent::action_end("a1"));
        match action[0].as_message().unwrap() {
            Message::ActionExecution {
                name, arguments, ..
            } => {
                assert_eq!(name, "lookup");
                assert_eq!(arguments, r#"{"q":"rust"}"#);
            }
            other => panic!("expected action execution, got {other:?}"),
        }

        let text = assembler.handle(RuntimeEvent::text_end("m1"));
        assert_eq!(text[0].as_message().unwrap().text_content(), Some("thinking"));
    }

    #[test]
    fn orphan_content_yields_failed_message() {
        let mut assembler = MessageAssembler::new();
        let chunks = assembler.handle(RuntimeEvent::text_content("ghost", "data"));
        assert_eq!(chunks.len(), 1);
        assert!(assembler.has_open_messages());

        let done = assembler.handle(RuntimeEvent::text_end("ghost"));
        let message = done[0].as_message().unwrap();
        assert_eq!(message.text_content(), Some("data"));
        assert!(matches!(message.status(), MessageStatus::Failed { .. }));
    }

    #[test]
    fn end_without_start_is_ignored() {
        let mut assembler = MessageAssembler::new();
        assert!(assembler.handle(RuntimeEvent::text_end("ghost")).is_empty());
    }

    #[test]
    fn finish_fails_open_messages_in_order() {
        let mut assembler = MessageAssembler::new();
        assembler.handle(RuntimeEvent::text_start("m1"));
        assembler.handle(RuntimeEvent::text_content("m1", "partial"));
        assembler.handle(RuntimeEvent::action_start("a1", "lookup"));

        let items = assembler.finish("stream interrupted");
        let failed = messages(&items);
        assert_eq!(failed.len(), 2);
        assert_eq!(failed[0].id(), "m1");
        assert_eq!(failed[1].id(), "a1");
        for message in failed {
            assert!(matches!(message.status(), MessageStatus::Failed { .. }));
        }
        assert!(!assembler.has_open_messages());
    }

    #[test]
    fn single_shot_events_pass_through() {
        let mut assembler = MessageAssembler::new();
        let result = assembler.handle(RuntimeEvent::action_result("a1", "lookup", "42"));
        match result[0].as_message().unwrap() {
            Message::Result {
                action_execution_id,
                result,
                ..
            } => {
                assert_eq!(action_execution_id, "a1");
                assert_eq!(result, "42");
            }
            other => panic!("expected result message, got {other:?}"),
        }

        let meta = assembler.handle(RuntimeEvent::meta("interrupt", serde_json::json!(1)));
        assert!(matches!(meta[0], StreamItem::MetaEvent { .. }));
    }
}
