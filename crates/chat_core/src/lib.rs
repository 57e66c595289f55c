//! Room-scoped classroom chat: member directory, mention codec, history,
//! autocomplete, live channel integration and deletion.

use anyhow::Result;
use async_trait::async_trait;
use shared::{
    domain::{MessageId, RoomKey},
    protocol::{ChannelEvent, HistoryEntry, RosterEntry, SelfProfile, SendMessageRequest},
};
use tokio::sync::broadcast;

pub mod client;
pub mod config;
pub mod deletion;
pub mod directory;
pub mod error;
pub mod history;
pub mod http;
pub mod live;
pub mod mention;
pub mod room;
pub mod suggestion;
pub mod timeline;
pub mod transport;

pub use client::ChatClient;
pub use config::{load_settings, ClientSettings};
pub use deletion::{can_delete, CurrentUser, DeletionController, PendingDeletion};
pub use directory::{Member, MemberDirectory};
pub use error::{ChatError, ChatResult};
pub use http::HttpChatBackend;
pub use mention::{decode_incoming, encode_outgoing, MentionBindings, Segment};
pub use room::{ChatEvent, RenderedMessage, RoomSession};
pub use suggestion::{ComposeKey, KeyOutcome, SuggestionEngine, SuggestionState};
pub use timeline::{ChatMessage, Timeline};
pub use transport::WebSocketRoomChannel;

/// REST collaborator for rosters, history, profile, send and delete.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn fetch_roster(&self, room: &RoomKey) -> Result<Vec<RosterEntry>>;
    /// Newest first.
    async fn fetch_history(&self, room: &RoomKey, limit: u32) -> Result<Vec<HistoryEntry>>;
    async fn fetch_self_profile(&self) -> Result<SelfProfile>;
    async fn send_message(
        &self,
        room: &RoomKey,
        request: SendMessageRequest,
    ) -> Result<HistoryEntry>;
    async fn delete_message(&self, message_id: &MessageId) -> Result<()>;
}

/// Bidirectional room-based publish/subscribe channel shared by every open room.
#[async_trait]
pub trait RoomChannel: Send + Sync {
    async fn join(&self, room: &RoomKey) -> Result<()>;
    fn subscribe_events(&self) -> broadcast::Receiver<ChannelEvent>;
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
