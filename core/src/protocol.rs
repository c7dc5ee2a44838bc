/// Live-channel protocol definitions
///
/// One WebSocket per selected conversation. The server streams ChatEvent
/// frames discriminated by `type`, plus two side-channel kinds that never
/// enter the event log (title updates and screenshot captures).
use crate::error::Result;
use crate::types::{AuthorType, ChatEvent, EventKind, EventPayload, ScreenshotRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A ChatEvent as it appears on the wire, minus the `type` discriminator
/// (consumed by the enum tag; restored when converting to a ChatEvent)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    #[serde(rename = "_id")]
    pub id: String,
    pub chat_id: String,
    pub author: AuthorType,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<EventPayload>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EventFrame {
    fn into_event(self, kind: EventKind) -> ChatEvent {
        ChatEvent {
            id: self.id,
            chat_id: self.chat_id,
            author: self.author,
            kind,
            content: self.content,
            payload: self.payload,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleUpdate {
    pub chat_id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotCapture {
    pub screenshot: ScreenshotRecord,
    #[serde(default)]
    pub step_index: Option<u64>,
}

/// Server -> client payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Message(EventFrame),
    Tool(EventFrame),
    Reasoning(EventFrame),
    Error(EventFrame),
    ChatTitleUpdated { data: TitleUpdate },
    ScreenshotCaptured { data: ScreenshotCapture },
}

impl ServerMessage {
    /// Parse a raw text frame; malformed payloads surface as ParseError
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// The ChatEvent carried by this message, if it is event-shaped
    pub fn into_event(self) -> Option<ChatEvent> {
        match self {
            ServerMessage::Message(frame) => Some(frame.into_event(EventKind::Message)),
            ServerMessage::Tool(frame) => Some(frame.into_event(EventKind::Tool)),
            ServerMessage::Reasoning(frame) => Some(frame.into_event(EventKind::Reasoning)),
            ServerMessage::Error(frame) => Some(frame.into_event(EventKind::Error)),
            _ => None,
        }
    }

    /// Message type as string, for logging
    pub fn message_type(&self) -> &'static str {
        match self {
            ServerMessage::Message(_) => "message",
            ServerMessage::Tool(_) => "tool",
            ServerMessage::Reasoning(_) => "reasoning",
            ServerMessage::Error(_) => "error",
            ServerMessage::ChatTitleUpdated { .. } => "chat_title_updated",
            ServerMessage::ScreenshotCaptured { .. } => "screenshot_captured",
        }
    }
}

/// Client -> server payload: the only thing a client ever sends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageCreate {
    pub content: String,
    pub sender_type: AuthorType,
}

impl MessageCreate {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            sender_type: AuthorType::User,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ReasoningStatus, ToolStatus};

    #[test]
    fn test_event_frame_parsing() {
        let raw = r#"{
            "type": "tool",
            "_id": "abc123",
            "chat_id": "chat1",
            "author": "agent",
            "content": "Running query",
            "payload": {"status": "in_progress", "tool_calls": [
                {"tool_name": "sql", "input_payload": {"query": "SELECT 1"}, "status": "in_progress"}
            ]},
            "created_at": "2023-01-01T12:00:00Z",
            "updated_at": "2023-01-01T12:00:01Z"
        }"#;
        let msg = ServerMessage::parse(raw).unwrap();
        assert_eq!(msg.message_type(), "tool");

        let event = msg.into_event().unwrap();
        assert_eq!(event.kind, EventKind::Tool);
        match event.payload {
            Some(EventPayload::Tool(ref tool)) => {
                assert_eq!(tool.status, ToolStatus::InProgress);
                assert_eq!(tool.tool_calls.len(), 1);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_reasoning_frame_parsing() {
        let raw = r#"{
            "type": "reasoning",
            "_id": "r1",
            "chat_id": "chat1",
            "author": "agent",
            "content": "",
            "payload": {"trajectory": ["a", "b", "c"], "status": "complete"},
            "created_at": "2023-01-01T12:00:00Z",
            "updated_at": "2023-01-01T12:00:05Z"
        }"#;
        let event = ServerMessage::parse(raw).unwrap().into_event().unwrap();
        match event.payload {
            Some(EventPayload::Reasoning(ref r)) => {
                assert_eq!(r.trajectory.len(), 3);
                assert_eq!(r.status, ReasoningStatus::Complete);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_side_channel_parsing() {
        let raw = r#"{
            "type": "chat_title_updated",
            "data": {"chat_id": "chat1", "title": "Trip planning", "updated_at": "2023-01-01T12:00:00Z"}
        }"#;
        let msg = ServerMessage::parse(raw).unwrap();
        assert!(msg.clone().into_event().is_none());
        match msg {
            ServerMessage::ChatTitleUpdated { data } => {
                assert_eq!(data.title.as_deref(), Some("Trip planning"));
            }
            other => panic!("unexpected message: {:?}", other),
        }

        let raw = r#"{
            "type": "screenshot_captured",
            "data": {"screenshot": {
                "_id": "s1", "chat_id": "chat1",
                "created_at": "2023-01-01T12:00:00Z",
                "image_data": "data:image/png;base64,AAAA"
            }, "step_index": 4}
        }"#;
        match ServerMessage::parse(raw).unwrap() {
            ServerMessage::ScreenshotCaptured { data } => {
                assert_eq!(data.screenshot.id, "s1");
                assert_eq!(data.step_index, Some(4));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_payload_is_parse_error() {
        assert!(ServerMessage::parse("not json").is_err());
        assert!(ServerMessage::parse(r#"{"type": "unknown_kind"}"#).is_err());
    }

    #[test]
    fn test_message_create_serialization() {
        let json = MessageCreate::user("hello").to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["content"], "hello");
        assert_eq!(value["sender_type"], "user");
    }
}
