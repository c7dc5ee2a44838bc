/// Shared data model: conversations, chat events, screenshots, pages
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Who produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorType {
    User,
    Agent,
}

/// Event kind. `Thinking` is client-local (the transient "agent is
/// working" indicator) and never arrives over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    Tool,
    Reasoning,
    Thinking,
    Error,
}

/// Tool execution status: started -> in_progress -> {completed | error}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Started,
    InProgress,
    Completed,
    Error,
}

/// One tool execution within a tool trajectory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecution {
    pub tool_name: String,
    #[serde(default)]
    pub input_payload: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_payload: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Tool payload: the full trajectory is re-delivered on every update and
/// replaces the previous payload wholesale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPayload {
    pub status: ToolStatus,
    pub tool_calls: Vec<ToolExecution>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningStatus {
    Thinking,
    Complete,
}

/// Reasoning payload: ordered trajectory of steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningPayload {
    pub trajectory: Vec<String>,
    pub status: ReasoningStatus,
}

/// Kind-dependent event payload. Untagged: the two shapes are disjoint
/// (`tool_calls` vs `trajectory` are both mandatory on their side).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPayload {
    Tool(ToolPayload),
    Reasoning(ReasoningPayload),
}

/// Unified event record for messages, tool invocations and reasoning steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
    #[serde(rename = "_id")]
    pub id: String,
    pub chat_id: String,
    pub author: AuthorType,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<EventPayload>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One conversation, with denormalized latest-message fields for list display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub latest_message_content: Option<String>,
    #[serde(default)]
    pub latest_message_timestamp: Option<DateTime<Utc>>,
}

/// One captured screenshot plus the agent's observations at that step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub chat_id: String,
    pub created_at: DateTime<Utc>,
    /// Opaque data URI; never inspected by the engine
    pub image_data: String,
    #[serde(default)]
    pub page_summary: Option<String>,
    #[serde(default)]
    pub evaluation_previous_goal: Option<String>,
    #[serde(default)]
    pub memory: Option<String>,
    #[serde(default)]
    pub next_goal: Option<String>,
}

/// Generic page shape shared by all three paginated resources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageOf<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub next_cursor_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub total_items: Option<u64>,
}

impl<T> Default for PageOf<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            next_cursor_timestamp: None,
            has_more: false,
            total_items: None,
        }
    }
}

/// Standard REST response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_payload_untagged_disambiguation() {
        let tool: EventPayload = serde_json::from_str(
            r#"{"status":"started","tool_calls":[{"tool_name":"sql","input_payload":{"query":"SELECT 1"},"status":"started"}]}"#,
        )
        .unwrap();
        assert!(matches!(tool, EventPayload::Tool(_)));

        let reasoning: EventPayload =
            serde_json::from_str(r#"{"trajectory":["step one"],"status":"thinking"}"#).unwrap();
        assert!(matches!(reasoning, EventPayload::Reasoning(_)));
    }

    #[test]
    fn test_chat_event_wire_aliases() {
        let raw = r#"{
            "_id": "60d5ec49abf8a7b6a0f3e8f1",
            "chat_id": "60d5ec49abf8a7b6a0f3e8f2",
            "author": "agent",
            "type": "message",
            "content": "done",
            "created_at": "2023-01-01T12:00:00Z",
            "updated_at": "2023-01-01T12:00:00Z"
        }"#;
        let event: ChatEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.id, "60d5ec49abf8a7b6a0f3e8f1");
        assert_eq!(event.kind, EventKind::Message);
        assert!(event.payload.is_none());

        let round = serde_json::to_value(&event).unwrap();
        assert_eq!(round["_id"], "60d5ec49abf8a7b6a0f3e8f1");
        assert_eq!(round["type"], "message");
    }

    #[test]
    fn test_page_defaults() {
        let page: PageOf<Conversation> = serde_json::from_str(r#"{"items":[]}"#).unwrap();
        assert!(!page.has_more);
        assert!(page.next_cursor_timestamp.is_none());
        assert!(page.total_items.is_none());
    }
}
