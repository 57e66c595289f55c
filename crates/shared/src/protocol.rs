use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{MemberId, MessageId, Role, RoomKey},
    error::ApiError,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: MemberId,
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfProfile {
    pub id: MemberId,
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
    #[serde(default)]
    pub role: Role,
}

/// A persisted message as returned by the history endpoint, the send
/// endpoint, and the live channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: MessageId,
    pub author_id: MemberId,
    #[serde(default)]
    pub author_display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_avatar_ref: Option<String>,
    pub body: String,
    pub created_at: DateTime<Utc>,
    /// Echo of the sender's client-side id, when the sender supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    /// Wire-form body, mentions already encoded as `@uid:<id>`.
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ChannelCommand {
    Join { room: RoomKey },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ChannelEvent {
    NewMessage {
        room: RoomKey,
        message: HistoryEntry,
    },
    MessageDeleted {
        room: RoomKey,
        message_id: MessageId,
    },
    /// Emitted locally by the transport after a dropped connection is restored.
    Reconnected,
    Error(ApiError),
}

impl ChannelEvent {
    pub fn room(&self) -> Option<&RoomKey> {
        match self {
            ChannelEvent::NewMessage { room, .. } | ChannelEvent::MessageDeleted { room, .. } => {
                Some(room)
            }
            ChannelEvent::Reconnected | ChannelEvent::Error(_) => None,
        }
    }
}
