//! One open room: its directory, timeline, compose field and live pump.
//!
//! Entering a room seeds the directory from the roster and the current user,
//! then loads history and joins the live channel concurrently. Live events
//! that race the history fetch are deduplicated by persisted id when the page
//! is merged. Every failure along the way degrades one capability and is
//! reported as a [`ChatEvent::Notice`]; the session itself always opens.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, OnceLock, Weak,
};

use chrono::Utc;
use shared::{
    domain::{MessageId, RoomKey},
    protocol::{SelfProfile, SendMessageRequest},
};
use tokio::{
    sync::{broadcast, Mutex, RwLock},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::ClientSettings,
    deletion::{CurrentUser, DeletionController, PendingDeletion},
    directory::{Member, MemberDirectory, PLACEHOLDER_NAME},
    error::{ChatError, ChatResult},
    history::HistoryLoader,
    live::{apply_live_event, LiveChannelAdapter, LiveEvent, RoomEvents},
    mention::{decode_incoming, encode_outgoing, Segment},
    suggestion::{
        ComposeDraft, ComposeKey, DebounceTicket, Debouncer, KeyOutcome, SuggestionEngine,
        SuggestionState,
    },
    timeline::{AppendOutcome, ChatMessage, Timeline},
    ChatBackend,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    TimelineChanged,
    SuggestionsChanged,
    Notice(String),
}

/// A timeline entry ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub message: ChatMessage,
    pub author_name: String,
    pub author_avatar: Option<String>,
    pub segments: Vec<Segment>,
    pub can_delete: bool,
}

struct RoomState {
    timeline: Timeline,
    draft: ComposeDraft,
    suggestions: SuggestionEngine,
    debouncer: Debouncer,
}

pub struct RoomSession {
    room: RoomKey,
    backend: Arc<dyn ChatBackend>,
    history: HistoryLoader,
    live: Arc<LiveChannelAdapter>,
    directory: Arc<RwLock<MemberDirectory>>,
    state: Mutex<RoomState>,
    deletion: DeletionController,
    events: broadcast::Sender<ChatEvent>,
    pump: OnceLock<JoinHandle<()>>,
    closed: AtomicBool,
    history_limit: u32,
}

impl RoomSession {
    pub async fn open(
        room: RoomKey,
        backend: Arc<dyn ChatBackend>,
        live: Arc<LiveChannelAdapter>,
        profile: &SelfProfile,
        settings: &ClientSettings,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(settings.event_buffer.max(1));
        let user = CurrentUser {
            id: profile.id.clone(),
            role: profile.role,
        };
        let session = Arc::new(Self {
            history: HistoryLoader::new(Arc::clone(&backend)),
            deletion: DeletionController::new(Arc::clone(&backend), user),
            backend,
            live,
            directory: Arc::new(RwLock::new(MemberDirectory::new())),
            state: Mutex::new(RoomState {
                timeline: Timeline::new(),
                draft: ComposeDraft::default(),
                suggestions: SuggestionEngine::new(),
                debouncer: Debouncer::new(settings.suggestion_debounce()),
            }),
            events,
            pump: OnceLock::new(),
            closed: AtomicBool::new(false),
            history_limit: settings.history_limit(),
            room,
        });

        session.seed_directory(profile).await;

        let room_events = session.live.subscribe(session.room.clone());
        let pump = tokio::spawn(run_pump(Arc::downgrade(&session), room_events));
        let _ = session.pump.set(pump);

        let (history, joined) = tokio::join!(
            session
                .history
                .load_history(&session.room, session.history_limit, &session.directory),
            session.live.join(&session.room),
        );
        session.merge_history(history).await;
        if let Err(err) = joined {
            warn!(
                classroom_id = %session.room.classroom_id,
                lesson_id = ?session.room.lesson_id,
                "room: continuing in history-only mode: {err}"
            );
            session.emit(ChatEvent::Notice(
                "Live updates are unavailable for this room".into(),
            ));
        }

        info!(
            classroom_id = %session.room.classroom_id,
            lesson_id = ?session.room.lesson_id,
            "room: opened"
        );
        session
    }

    async fn seed_directory(&self, profile: &SelfProfile) {
        let roster = match self.backend.fetch_roster(&self.room).await {
            Ok(roster) => roster,
            Err(source) => {
                let err = ChatError::TransientFetch {
                    what: "roster",
                    source,
                };
                warn!(classroom_id = %self.room.classroom_id, "room: {err}");
                Vec::new()
            }
        };

        let mut directory = self.directory.write().await;
        for entry in roster {
            directory.upsert(Member::from(entry));
        }
        directory.upsert(Member::from(profile));
        directory.set_self_id(profile.id.clone());
    }

    pub fn room(&self) -> &RoomKey {
        &self.room
    }

    pub fn directory(&self) -> &Arc<RwLock<MemberDirectory>> {
        &self.directory
    }

    pub fn current_user(&self) -> &CurrentUser {
        self.deletion.user()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn emit(&self, event: ChatEvent) {
        let _ = self.events.send(event);
    }

    fn ensure_open(&self) -> ChatResult<()> {
        if self.is_closed() {
            return Err(ChatError::RoomClosed(self.room.clone()));
        }
        Ok(())
    }

    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.state.lock().await.timeline.messages().to_vec()
    }

    /// Decoded timeline with author details and delete permissions.
    pub async fn rendered(&self) -> Vec<RenderedMessage> {
        let directory = self.directory.read().await;
        let state = self.state.lock().await;
        state
            .timeline
            .messages()
            .iter()
            .map(|message| {
                let author = directory.resolve_by_id(&message.author_id);
                let author_name = match author {
                    Some(member) if !member.has_placeholder_name() => member.display_name.clone(),
                    _ if !message.author_display_name_at_send.is_empty() => {
                        message.author_display_name_at_send.clone()
                    }
                    _ => PLACEHOLDER_NAME.to_string(),
                };
                RenderedMessage {
                    author_name,
                    author_avatar: author.and_then(|member| member.avatar_ref.clone()),
                    segments: decode_incoming(&message.body_encoded, &directory),
                    can_delete: !message.is_pending() && self.deletion.can_delete(message),
                    message: message.clone(),
                }
            })
            .collect()
    }

    pub async fn draft(&self) -> ComposeDraft {
        self.state.lock().await.draft.clone()
    }

    pub async fn suggestions(&self) -> SuggestionState {
        self.state.lock().await.suggestions.state().clone()
    }

    /// Replaces the compose buffer and (re)starts the mention search timer
    /// when the caret sits in an `@` query.
    pub async fn input(self: &Arc<Self>, text: impl Into<String>, caret: usize) {
        let mut state = self.state.lock().await;
        let was_open = state.suggestions.is_open();
        let RoomState {
            draft,
            suggestions,
            debouncer,
            ..
        } = &mut *state;
        draft.set_text(text, caret);

        match suggestions.on_input(draft) {
            Some(ticket) => {
                let session = Arc::downgrade(self);
                debouncer.schedule(async move {
                    if let Some(session) = session.upgrade() {
                        session.fire_debounce(ticket).await;
                    }
                });
            }
            None => debouncer.cancel(),
        }

        if was_open {
            self.emit(ChatEvent::SuggestionsChanged);
        }
    }

    async fn fire_debounce(&self, ticket: DebounceTicket) {
        if self.is_closed() {
            return;
        }
        let directory = self.directory.read().await;
        let mut state = self.state.lock().await;
        if state.suggestions.on_debounce(ticket, &directory) {
            debug!(
                classroom_id = %self.room.classroom_id,
                candidates = state.suggestions.candidates().len(),
                "suggest: list opened"
            );
            self.emit(ChatEvent::SuggestionsChanged);
        }
    }

    pub async fn key(&self, key: ComposeKey) -> KeyOutcome {
        let mut state = self.state.lock().await;
        let RoomState {
            draft, suggestions, ..
        } = &mut *state;
        let outcome = suggestions.on_key(key, draft);
        if outcome != KeyOutcome::NotHandled {
            self.emit(ChatEvent::SuggestionsChanged);
        }
        outcome
    }

    pub async fn dismiss_suggestions(&self) {
        let mut state = self.state.lock().await;
        if state.suggestions.is_open() {
            self.emit(ChatEvent::SuggestionsChanged);
        }
        state.suggestions.dismiss();
        state.debouncer.cancel();
    }

    pub async fn discard_draft(&self) {
        let mut state = self.state.lock().await;
        state.draft.clear();
        state.suggestions.dismiss();
        state.debouncer.cancel();
        self.emit(ChatEvent::SuggestionsChanged);
    }

    /// Encodes and sends the draft. The message shows up immediately as a
    /// pending entry; on failure it is withdrawn and the draft restored.
    pub async fn send(&self) -> ChatResult<ChatMessage> {
        self.ensure_open()?;

        let (request, saved_draft) = {
            let directory = self.directory.read().await;
            let mut state = self.state.lock().await;
            if state.draft.is_blank() {
                return Err(ChatError::EmptyMessage);
            }

            let body = encode_outgoing(&state.draft.text, &state.draft.bindings, &directory);
            let local_id = Uuid::new_v4().to_string();
            let me = self.current_user().id.clone();
            let my_name = directory
                .resolve_by_id(&me)
                .map(|member| member.display_name.clone())
                .unwrap_or_default();
            state.timeline.append(ChatMessage {
                local_id: Some(local_id.clone()),
                persisted_id: None,
                room: self.room.clone(),
                author_id: me,
                author_display_name_at_send: my_name,
                body_encoded: body.clone(),
                created_at: Utc::now(),
            });

            let saved_draft = state.draft.clone();
            state.draft.clear();
            state.suggestions.dismiss();
            state.debouncer.cancel();
            (
                SendMessageRequest {
                    body,
                    local_id: Some(local_id),
                },
                saved_draft,
            )
        };
        self.emit(ChatEvent::TimelineChanged);

        let local_id = request.local_id.clone().unwrap_or_default();
        match self.backend.send_message(&self.room, request).await {
            Ok(entry) => {
                let mut stored = ChatMessage::from_entry(&self.room, entry);
                // The stored copy replaces our pending entry even when the
                // server does not echo the local id back.
                stored.local_id.get_or_insert_with(|| local_id.clone());
                let mut state = self.state.lock().await;
                if state.timeline.append(stored.clone()) == AppendOutcome::Duplicate {
                    // The live echo arrived first without our local id.
                    state.timeline.remove_pending(&local_id);
                }
                drop(state);
                info!(
                    classroom_id = %self.room.classroom_id,
                    lesson_id = ?self.room.lesson_id,
                    message_id = ?stored.persisted_id,
                    "send: message stored"
                );
                self.emit(ChatEvent::TimelineChanged);
                Ok(stored)
            }
            Err(source) => {
                warn!(
                    classroom_id = %self.room.classroom_id,
                    lesson_id = ?self.room.lesson_id,
                    "send: request failed: {source}"
                );
                let mut state = self.state.lock().await;
                state.timeline.remove_pending(&local_id);
                if state.draft.is_blank() {
                    state.draft = saved_draft;
                }
                drop(state);
                self.emit(ChatEvent::TimelineChanged);
                let err = ChatError::SendFailed(source);
                self.emit(ChatEvent::Notice(err.to_string()));
                Err(err)
            }
        }
    }

    /// First half of a deletion; the caller confirms with the user before
    /// passing the result to [`RoomSession::confirm_delete`].
    pub async fn request_delete(&self, message_id: &MessageId) -> ChatResult<PendingDeletion> {
        self.ensure_open()?;
        let state = self.state.lock().await;
        let message = state
            .timeline
            .get(message_id)
            .ok_or_else(|| ChatError::MessageNotFound(message_id.clone()))?;
        self.deletion.request(message)
    }

    /// Returns whether this call removed the message; a live deletion event
    /// may already have done so.
    pub async fn confirm_delete(&self, pending: PendingDeletion) -> ChatResult<bool> {
        self.ensure_open()?;
        let confirmed = match self.deletion.confirm(pending).await {
            Ok(confirmed) => confirmed,
            Err(err) => {
                self.emit(ChatEvent::Notice(err.to_string()));
                return Err(err);
            }
        };
        let removed = confirmed.apply(&mut self.state.lock().await.timeline);
        if removed {
            self.emit(ChatEvent::TimelineChanged);
        }
        Ok(removed)
    }

    /// Reloads history and merges it. Also retries the channel join for a
    /// room that entered history-only mode.
    pub async fn resync(&self) -> usize {
        if self.is_closed() {
            return 0;
        }
        if !self.live.is_joined(&self.room).await {
            if let Err(err) = self.live.join(&self.room).await {
                warn!(classroom_id = %self.room.classroom_id, "room: rejoin failed: {err}");
            }
        }
        let history = self
            .history
            .load_history(&self.room, self.history_limit, &self.directory)
            .await;
        self.merge_history(history).await
    }

    async fn merge_history(&self, history: Vec<ChatMessage>) -> usize {
        if self.is_closed() {
            return 0;
        }
        let added = self.state.lock().await.timeline.merge_history(history);
        if added > 0 {
            self.emit(ChatEvent::TimelineChanged);
        }
        added
    }

    async fn handle_live_event(&self, event: LiveEvent) {
        match event {
            LiveEvent::Resync => {
                let added = self.resync().await;
                debug!(classroom_id = %self.room.classroom_id, added, "room: resynced");
            }
            LiveEvent::Notice(notice) => self.emit(ChatEvent::Notice(notice)),
            event => {
                let mut directory = self.directory.write().await;
                let mut state = self.state.lock().await;
                if apply_live_event(&mut state.timeline, &mut directory, event) {
                    self.emit(ChatEvent::TimelineChanged);
                }
            }
        }
    }

    /// Stops the live pump and any pending search. Results that arrive later
    /// are discarded.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(pump) = self.pump.get() {
            pump.abort();
        }
        {
            let mut state = self.state.lock().await;
            state.debouncer.cancel();
            state.suggestions.dismiss();
        }
        self.live.forget(&self.room).await;
        info!(
            classroom_id = %self.room.classroom_id,
            lesson_id = ?self.room.lesson_id,
            "room: closed"
        );
    }
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.get() {
            pump.abort();
        }
    }
}

async fn run_pump(session: Weak<RoomSession>, mut events: RoomEvents) {
    while let Some(event) = events.next().await {
        let Some(session) = session.upgrade() else {
            break;
        };
        if session.is_closed() {
            break;
        }
        session.handle_live_event(event).await;
    }
}

#[cfg(test)]
#[path = "tests/room_tests.rs"]
mod tests;
