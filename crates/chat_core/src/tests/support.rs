use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{MemberId, MessageId, Role, RoomKey},
    protocol::{ChannelEvent, HistoryEntry, RosterEntry, SelfProfile, SendMessageRequest},
};
use tokio::sync::{broadcast, Mutex};

use crate::{ChatBackend, RoomChannel};

pub const SELF_ID: &str = "65f1a2b3c4d5e6f7a8b9c000";
pub const ALICE_ID: &str = "65f1a2b3c4d5e6f7a8b9c0a1";
pub const BOB_ID: &str = "65f1a2b3c4d5e6f7a8b9c0b2";

pub fn entry(id: &str, author_id: &str, author_name: &str, body: &str, minute: u32) -> HistoryEntry {
    HistoryEntry {
        id: MessageId::from(id),
        author_id: MemberId::from(author_id),
        author_display_name: author_name.to_string(),
        author_avatar_ref: None,
        body: body.to_string(),
        created_at: format!("2024-03-01T10:{minute:02}:00Z")
            .parse()
            .expect("timestamp"),
        local_id: None,
    }
}

pub fn roster_entry(id: &str, name: &str, email: &str) -> RosterEntry {
    RosterEntry {
        id: MemberId::from(id),
        display_name: name.to_string(),
        email: email.to_string(),
        avatar_ref: None,
    }
}

pub fn self_profile(role: Role) -> SelfProfile {
    SelfProfile {
        id: MemberId::from(SELF_ID),
        display_name: "Sam Self".to_string(),
        email: "sam@school.test".to_string(),
        avatar_ref: Some("avatars/sam.png".to_string()),
        role,
    }
}

#[derive(Default)]
pub struct FakeBackend {
    pub roster: Vec<RosterEntry>,
    /// Newest first, as the server returns it.
    pub history: Vec<HistoryEntry>,
    pub profile: Option<SelfProfile>,
    pub fail_roster: bool,
    pub fail_history: bool,
    pub fail_send: bool,
    pub fail_delete: bool,
    /// Stored messages come back without the client's local id.
    pub drop_local_id: bool,
    pub history_delay: Option<Duration>,
    pub history_calls: Arc<Mutex<u32>>,
    pub sent: Arc<Mutex<Vec<(RoomKey, SendMessageRequest)>>>,
    pub deleted: Arc<Mutex<Vec<MessageId>>>,
}

impl FakeBackend {
    pub fn with_roster(mut self, roster: Vec<RosterEntry>) -> Self {
        self.roster = roster;
        self
    }

    pub fn with_history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.history = history;
        self
    }

    pub fn with_profile(mut self, profile: SelfProfile) -> Self {
        self.profile = Some(profile);
        self
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    async fn fetch_roster(&self, _room: &RoomKey) -> Result<Vec<RosterEntry>> {
        if self.fail_roster {
            return Err(anyhow!("roster unavailable"));
        }
        Ok(self.roster.clone())
    }

    async fn fetch_history(&self, _room: &RoomKey, limit: u32) -> Result<Vec<HistoryEntry>> {
        *self.history_calls.lock().await += 1;
        if let Some(delay) = self.history_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_history {
            return Err(anyhow!("history unavailable"));
        }
        Ok(self.history.iter().take(limit as usize).cloned().collect())
    }

    async fn fetch_self_profile(&self) -> Result<SelfProfile> {
        self.profile
            .clone()
            .ok_or_else(|| anyhow!("profile unavailable"))
    }

    async fn send_message(
        &self,
        room: &RoomKey,
        request: SendMessageRequest,
    ) -> Result<HistoryEntry> {
        if self.fail_send {
            return Err(anyhow!("connection refused"));
        }
        let mut sent = self.sent.lock().await;
        sent.push((room.clone(), request.clone()));
        let mut stored = entry(
            &format!("sent-{}", sent.len()),
            SELF_ID,
            "Sam Self",
            &request.body,
            30,
        );
        if !self.drop_local_id {
            stored.local_id = request.local_id;
        }
        Ok(stored)
    }

    async fn delete_message(&self, message_id: &MessageId) -> Result<()> {
        if self.fail_delete {
            return Err(anyhow!("forbidden"));
        }
        self.deleted.lock().await.push(message_id.clone());
        Ok(())
    }
}

pub struct FakeChannel {
    pub events: broadcast::Sender<ChannelEvent>,
    pub joins: Arc<Mutex<Vec<RoomKey>>>,
    pub fail_join: bool,
}

impl FakeChannel {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            events,
            joins: Arc::new(Mutex::new(Vec::new())),
            fail_join: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_join: true,
            ..Self::new()
        }
    }

    pub fn emit(&self, event: ChannelEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl RoomChannel for FakeChannel {
    async fn join(&self, room: &RoomKey) -> Result<()> {
        if self.fail_join {
            return Err(anyhow!("channel unavailable"));
        }
        self.joins.lock().await.push(room.clone());
        Ok(())
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }
}
