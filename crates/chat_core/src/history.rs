use std::sync::Arc;

use shared::domain::RoomKey;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::{
    directory::{Member, MemberDirectory},
    timeline::ChatMessage,
    ChatBackend,
};

#[derive(Clone)]
pub struct HistoryLoader {
    backend: Arc<dyn ChatBackend>,
}

impl HistoryLoader {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    /// Most recent `limit` messages of `room`, oldest first. Every author is
    /// merged into `directory`. A failed fetch yields an empty history.
    pub async fn load_history(
        &self,
        room: &RoomKey,
        limit: u32,
        directory: &RwLock<MemberDirectory>,
    ) -> Vec<ChatMessage> {
        let entries = match self.backend.fetch_history(room, limit).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(
                    classroom_id = %room.classroom_id,
                    lesson_id = ?room.lesson_id,
                    "history: fetch failed; room continues without history: {err}"
                );
                return Vec::new();
            }
        };

        let mut newest_first: Vec<_> = entries.into_iter().take(limit as usize).collect();
        {
            let mut directory = directory.write().await;
            for entry in &newest_first {
                directory.upsert(Member::from(entry));
            }
        }
        debug!(
            classroom_id = %room.classroom_id,
            lesson_id = ?room.lesson_id,
            count = newest_first.len(),
            "history: page loaded"
        );

        newest_first.reverse();
        newest_first
            .into_iter()
            .map(|entry| ChatMessage::from_entry(room, entry))
            .collect()
    }
}

#[cfg(test)]
#[path = "tests/history_tests.rs"]
mod tests;
