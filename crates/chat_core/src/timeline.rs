use chrono::{DateTime, Utc};
use shared::{
    domain::{MemberId, MessageId, RoomKey},
    protocol::HistoryEntry,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Client-side id of a message this client sent; present before the
    /// server assigns `persisted_id`.
    pub local_id: Option<String>,
    pub persisted_id: Option<MessageId>,
    pub room: RoomKey,
    pub author_id: MemberId,
    pub author_display_name_at_send: String,
    /// Wire form, mentions as `@uid:<id>`.
    pub body_encoded: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn from_entry(room: &RoomKey, entry: HistoryEntry) -> Self {
        Self {
            local_id: entry.local_id,
            persisted_id: Some(entry.id),
            room: room.clone(),
            author_id: entry.author_id,
            author_display_name_at_send: entry.author_display_name,
            body_encoded: entry.body,
            created_at: entry.created_at,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.persisted_id.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// A pending local entry with the same `local_id` received its persisted id.
    Confirmed,
    Duplicate,
}

/// Ordered messages of one room. At most one entry per `persisted_id`.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    messages: Vec<ChatMessage>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, persisted_id: &MessageId) -> bool {
        self.position(persisted_id).is_some()
    }

    pub fn get(&self, persisted_id: &MessageId) -> Option<&ChatMessage> {
        self.position(persisted_id).map(|idx| &self.messages[idx])
    }

    fn position(&self, persisted_id: &MessageId) -> Option<usize> {
        self.messages
            .iter()
            .position(|message| message.persisted_id.as_ref() == Some(persisted_id))
    }

    /// Appends at the tail unless the message is already present.
    pub fn append(&mut self, message: ChatMessage) -> AppendOutcome {
        if let Some(persisted_id) = &message.persisted_id {
            if self.contains(persisted_id) {
                return AppendOutcome::Duplicate;
            }
            if let Some(local_id) = &message.local_id {
                if let Some(pending) = self.messages.iter_mut().find(|existing| {
                    existing.is_pending() && existing.local_id.as_ref() == Some(local_id)
                }) {
                    pending.persisted_id = Some(persisted_id.clone());
                    pending.created_at = message.created_at;
                    return AppendOutcome::Confirmed;
                }
            }
        }
        self.messages.push(message);
        AppendOutcome::Appended
    }

    /// Merges a chronological history page. Entries already on the timeline
    /// keep their position; each new history entry is slotted in before the
    /// first persisted entry created after it. Pending local entries stay at
    /// the tail.
    pub fn merge_history(&mut self, history: Vec<ChatMessage>) -> usize {
        let mut added = 0;
        let existing = std::mem::take(&mut self.messages);
        let (mut persisted, pending): (Vec<_>, Vec<_>) =
            existing.into_iter().partition(|message| !message.is_pending());

        for message in history {
            let Some(persisted_id) = &message.persisted_id else {
                continue;
            };
            if persisted
                .iter()
                .any(|known| known.persisted_id.as_ref() == Some(persisted_id))
            {
                continue;
            }
            let slot = persisted
                .iter()
                .position(|known| known.created_at > message.created_at)
                .unwrap_or(persisted.len());
            persisted.insert(slot, message);
            added += 1;
        }

        self.messages = persisted;
        for message in pending {
            let confirmed = message.local_id.as_ref().is_some_and(|local_id| {
                self.messages
                    .iter()
                    .any(|known| known.local_id.as_ref() == Some(local_id))
            });
            if !confirmed {
                self.messages.push(message);
            }
        }
        added
    }

    pub fn remove_persisted(&mut self, persisted_id: &MessageId) -> Option<ChatMessage> {
        let idx = self.position(persisted_id)?;
        Some(self.messages.remove(idx))
    }

    /// Drops the unconfirmed entry for `local_id`, leaving a confirmed one alone.
    pub fn remove_pending(&mut self, local_id: &str) -> Option<ChatMessage> {
        let idx = self.messages.iter().position(|message| {
            message.is_pending() && message.local_id.as_deref() == Some(local_id)
        })?;
        Some(self.messages.remove(idx))
    }
}

#[cfg(test)]
#[path = "tests/timeline_tests.rs"]
mod tests;
