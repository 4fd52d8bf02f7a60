use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::rooms::RoomSummary;

/// The `{id, username}` pair attached to authored messages and presence
/// events. For the synthetic assistant the id is a fixed string rather
/// than a UUID, so ids stay plain strings throughout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
    pub username: String,
}

/// A room history entry. `user` is absent for system notices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserRef>,
    #[serde(default)]
    pub is_system: bool,
    pub room_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn from_user(user: UserRef, room_id: &str, text: impl Into<String>) -> Self {
        ChatMessage {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            user: Some(user),
            is_system: false,
            room_id: room_id.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn system(room_id: &str, text: impl Into<String>) -> Self {
        ChatMessage {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            user: None,
            is_system: true,
            room_id: room_id.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// A private message between two users. Delivered to both ends of the
/// conversation and then forgotten; whispers never touch room history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Whisper {
    pub id: String,
    pub text: String,
    pub from_user: UserRef,
    pub to_user: UserRef,
    pub timestamp: DateTime<Utc>,
}

impl Whisper {
    pub fn new(from_user: UserRef, to_user: UserRef, text: impl Into<String>) -> Self {
        Whisper {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            from_user,
            to_user,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPresence {
    pub room_id: String,
    pub user: UserRef,
    pub timestamp: DateTime<Utc>,
}

impl RoomPresence {
    pub fn now(room_id: &str, user: UserRef) -> Self {
        RoomPresence {
            room_id: room_id.to_string(),
            user,
            timestamp: Utc::now(),
        }
    }
}

/// Frames the client sends over the socket, as a `{type, data}` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: String },
    #[serde(rename_all = "camelCase")]
    LeaveRoom { room_id: String },
    #[serde(rename_all = "camelCase")]
    ChatMessage { room_id: String, text: String },
    #[serde(rename_all = "camelCase")]
    WhisperMessage { text: String, to_user: UserRef },
    #[serde(rename_all = "camelCase")]
    TypingIndicator { room_id: String, is_typing: bool },
    Heartbeat,
}

/// Frames the server pushes to clients, mirrored envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    ChatMessage(ChatMessage),
    WhisperMessage(Whisper),
    UserJoined(RoomPresence),
    UserLeft(RoomPresence),
    #[serde(rename_all = "camelCase")]
    TypingIndicator {
        room_id: String,
        user_id: String,
        username: String,
        is_typing: bool,
    },
    RoomUpdate(RoomSummary),
    HeartbeatAck,
    ConnectionSuccess { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_room_frame_decodes() {
        let frame = r#"{"type":"join_room","data":{"roomId":"r1"}}"#;
        let event: ClientEvent = serde_json::from_str(frame).unwrap();
        match event {
            ClientEvent::JoinRoom { room_id } => assert_eq!(room_id, "r1"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn heartbeat_frame_decodes_without_data() {
        let event: ClientEvent = serde_json::from_str(r#"{"type":"heartbeat"}"#).unwrap();
        assert!(matches!(event, ClientEvent::Heartbeat));
    }

    #[test]
    fn unknown_frame_type_is_an_error() {
        let result = serde_json::from_str::<ClientEvent>(r#"{"type":"dance","data":{}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn whisper_frame_uses_camel_case_fields() {
        let frame = r#"{"type":"whisper_message","data":{"text":"psst","toUser":{"id":"u2","username":"bob"}}}"#;
        let event: ClientEvent = serde_json::from_str(frame).unwrap();
        match event {
            ClientEvent::WhisperMessage { text, to_user } => {
                assert_eq!(text, "psst");
                assert_eq!(to_user.username, "bob");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn heartbeat_ack_serializes_as_bare_type() {
        let json = serde_json::to_value(ServerEvent::HeartbeatAck).unwrap();
        assert_eq!(json["type"], "heartbeat_ack");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn system_message_has_no_author() {
        let message = ChatMessage::system("r1", "bob has joined the room.");
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["isSystem"], true);
        assert!(json.get("user").is_none());
        assert_eq!(json["roomId"], "r1");
    }
}
