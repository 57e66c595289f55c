use std::{collections::HashMap, sync::Arc};

use shared::{domain::RoomKey, protocol::SelfProfile};
use tokio::{
    sync::{Mutex, OnceCell},
    task::JoinHandle,
};
use tracing::info;

use crate::{
    config::ClientSettings,
    deletion::CurrentUser,
    error::{ChatError, ChatResult},
    http::HttpChatBackend,
    live::LiveChannelAdapter,
    room::RoomSession,
    transport::WebSocketRoomChannel,
    ChatBackend, RoomChannel,
};

type RoomSlot = Arc<OnceCell<Arc<RoomSession>>>;

/// Entry point for a signed-in user: one live channel shared by any number
/// of concurrently open rooms.
pub struct ChatClient {
    backend: Arc<dyn ChatBackend>,
    live: Arc<LiveChannelAdapter>,
    profile: SelfProfile,
    settings: ClientSettings,
    rooms: Mutex<HashMap<RoomKey, RoomSlot>>,
    reconnect_watch: JoinHandle<()>,
}

impl ChatClient {
    pub async fn connect(
        backend: Arc<dyn ChatBackend>,
        channel: Arc<dyn RoomChannel>,
        settings: ClientSettings,
    ) -> ChatResult<Self> {
        let profile = backend
            .fetch_self_profile()
            .await
            .map_err(|source| ChatError::TransientFetch {
                what: "self profile",
                source,
            })?;
        let live = LiveChannelAdapter::new(channel);
        let reconnect_watch = live.spawn_reconnect_watch();
        info!(member_id = %profile.id, role = ?profile.role, "client: signed in");

        Ok(Self {
            backend,
            live,
            profile,
            settings,
            rooms: Mutex::new(HashMap::new()),
            reconnect_watch,
        })
    }

    /// Connects the REST backend and the websocket channel described by
    /// `settings`.
    pub async fn connect_with_settings(settings: ClientSettings) -> anyhow::Result<Self> {
        let backend = Arc::new(HttpChatBackend::from_settings(&settings));
        let channel = WebSocketRoomChannel::connect_with_settings(&settings).await?;
        Ok(Self::connect(backend, channel, settings).await?)
    }

    pub fn profile(&self) -> &SelfProfile {
        &self.profile
    }

    pub fn current_user(&self) -> CurrentUser {
        CurrentUser {
            id: self.profile.id.clone(),
            role: self.profile.role,
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Opens `room`, or returns the session that is already open for it.
    /// Concurrent callers for the same room share one session; the room map
    /// is only locked for lookups, never while a room loads.
    pub async fn open_room(&self, room: RoomKey) -> Arc<RoomSession> {
        let slot = Arc::clone(self.rooms.lock().await.entry(room.clone()).or_default());

        let session = slot
            .get_or_init(|| {
                RoomSession::open(
                    room.clone(),
                    Arc::clone(&self.backend),
                    Arc::clone(&self.live),
                    &self.profile,
                    &self.settings,
                )
            })
            .await
            .clone();

        let still_open = self
            .rooms
            .lock()
            .await
            .get(&room)
            .is_some_and(|current| Arc::ptr_eq(current, &slot));
        if !still_open {
            // Closed while loading.
            session.close().await;
        }
        session
    }

    /// The session for `room` once it has finished opening.
    pub async fn room(&self, room: &RoomKey) -> Option<Arc<RoomSession>> {
        let slot = self.rooms.lock().await.get(room).cloned()?;
        slot.get().cloned()
    }

    pub async fn open_rooms(&self) -> Vec<RoomKey> {
        self.rooms
            .lock()
            .await
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(room, _)| room.clone())
            .collect()
    }

    /// Returns false when the room was neither open nor opening. A room that
    /// is still loading is closed as soon as it finishes.
    pub async fn close_room(&self, room: &RoomKey) -> bool {
        let Some(slot) = self.rooms.lock().await.remove(room) else {
            return false;
        };
        if let Some(session) = slot.get() {
            session.close().await;
        }
        true
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.reconnect_watch.abort();
    }
}

#[cfg(test)]
#[path = "tests/client_tests.rs"]
mod tests;
