//! Routes events from the shared room channel to the rooms that asked for
//! them.

use std::{collections::HashSet, sync::Arc};

use shared::{
    domain::{MessageId, RoomKey},
    protocol::ChannelEvent,
};
use tokio::{
    sync::{broadcast::error::RecvError, broadcast::Receiver, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    directory::{Member, MemberDirectory},
    error::{ChatError, ChatResult},
    timeline::{AppendOutcome, ChatMessage, Timeline},
    RoomChannel,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    Message { message: ChatMessage, author: Member },
    Deleted(MessageId),
    /// Events may have been missed; history should be reloaded.
    Resync,
    Notice(String),
}

pub struct LiveChannelAdapter {
    channel: Arc<dyn RoomChannel>,
    joined: Mutex<HashSet<RoomKey>>,
}

impl LiveChannelAdapter {
    pub fn new(channel: Arc<dyn RoomChannel>) -> Arc<Self> {
        Arc::new(Self {
            channel,
            joined: Mutex::new(HashSet::new()),
        })
    }

    /// Joins `room` once; later calls for a joined room return immediately.
    pub async fn join(&self, room: &RoomKey) -> ChatResult<()> {
        let mut joined = self.joined.lock().await;
        if joined.contains(room) {
            return Ok(());
        }
        self.channel
            .join(room)
            .await
            .map_err(|source| ChatError::ChannelJoin {
                room: room.clone(),
                source,
            })?;
        joined.insert(room.clone());
        info!(
            classroom_id = %room.classroom_id,
            lesson_id = ?room.lesson_id,
            "live: room joined"
        );
        Ok(())
    }

    pub async fn is_joined(&self, room: &RoomKey) -> bool {
        self.joined.lock().await.contains(room)
    }

    /// Stops re-joining `room` after reconnects. The channel itself stays
    /// joined; other rooms may share it.
    pub async fn forget(&self, room: &RoomKey) {
        self.joined.lock().await.remove(room);
    }

    pub async fn rejoin_all(&self) {
        let joined = self.joined.lock().await;
        for room in joined.iter() {
            if let Err(err) = self.channel.join(room).await {
                warn!(
                    classroom_id = %room.classroom_id,
                    lesson_id = ?room.lesson_id,
                    "live: rejoin after reconnect failed: {err}"
                );
            }
        }
    }

    pub fn subscribe(&self, room: RoomKey) -> RoomEvents {
        RoomEvents {
            room,
            events: self.channel.subscribe_events(),
        }
    }

    pub fn spawn_reconnect_watch(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.channel.subscribe_events();
        let adapter = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ChannelEvent::Reconnected) => {
                        info!("live: channel reconnected; rejoining rooms");
                        adapter.rejoin_all().await;
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

/// Channel events filtered down to one room, in emission order.
pub struct RoomEvents {
    room: RoomKey,
    events: Receiver<ChannelEvent>,
}

impl RoomEvents {
    pub fn room(&self) -> &RoomKey {
        &self.room
    }

    pub async fn next(&mut self) -> Option<LiveEvent> {
        loop {
            match self.events.recv().await {
                Ok(ChannelEvent::NewMessage { room, message }) if room == self.room => {
                    return Some(LiveEvent::Message {
                        author: Member::from(&message),
                        message: ChatMessage::from_entry(&room, message),
                    });
                }
                Ok(ChannelEvent::MessageDeleted { room, message_id }) if room == self.room => {
                    return Some(LiveEvent::Deleted(message_id));
                }
                Ok(ChannelEvent::Reconnected) => return Some(LiveEvent::Resync),
                Ok(ChannelEvent::Error(err)) => {
                    if err.code.is_transient() {
                        debug!(code = ?err.code, "live: channel reported error: {}", err.message);
                    } else {
                        warn!(code = ?err.code, "live: channel reported error: {}", err.message);
                    }
                    return Some(LiveEvent::Notice(err.message));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        classroom_id = %self.room.classroom_id,
                        lesson_id = ?self.room.lesson_id,
                        skipped,
                        "live: event receiver lagged"
                    );
                    return Some(LiveEvent::Resync);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Applies a message or deletion event. Returns true when the timeline changed.
pub fn apply_live_event(
    timeline: &mut Timeline,
    directory: &mut MemberDirectory,
    event: LiveEvent,
) -> bool {
    match event {
        LiveEvent::Message { message, author } => {
            directory.upsert(author);
            let outcome = timeline.append(message);
            if outcome == AppendOutcome::Duplicate {
                debug!("live: dropped message already present in timeline");
            }
            outcome != AppendOutcome::Duplicate
        }
        LiveEvent::Deleted(message_id) => timeline.remove_persisted(&message_id).is_some(),
        LiveEvent::Resync | LiveEvent::Notice(_) => false,
    }
}

#[cfg(test)]
#[path = "tests/live_tests.rs"]
mod tests;
