//! `@`-triggered member autocomplete for the compose field.
//!
//! The engine is a plain state machine:
//! `Idle -> Querying -> Open -> {Idle (dismiss/apply/send), Querying (keystroke)}`.
//! The only asynchronous step is the debounce between a keystroke and the
//! directory search; it is represented by a [`DebounceTicket`] that goes stale
//! as soon as another keystroke arrives.

use std::{future::Future, time::Duration};

use tokio::task::JoinHandle;

use crate::{
    directory::{Member, MemberDirectory},
    mention::MentionBindings,
};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(150);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeKey {
    ArrowDown,
    ArrowUp,
    Enter,
    Tab,
    Escape,
}

/// The `@` plus partially typed name between the trigger and the caret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionQuery {
    /// Byte offset of the triggering `@`.
    pub trigger: usize,
    pub caret: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SuggestionState {
    #[default]
    Idle,
    Querying(MentionQuery),
    Open {
        query: MentionQuery,
        candidates: Vec<Member>,
        selected: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceTicket {
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// The key is not meant for the suggestion list (e.g. Enter sends).
    NotHandled,
    Moved { selected: usize },
    Applied(Member),
    Dismissed,
}

/// Unsent message text, caret and the mention bindings made while typing it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposeDraft {
    pub text: String,
    pub caret: usize,
    pub bindings: MentionBindings,
}

impl ComposeDraft {
    /// Replaces the buffer. A caret outside the text or inside a multi-byte
    /// character is moved to the end.
    pub fn set_text(&mut self, text: impl Into<String>, caret: usize) {
        self.text = text.into();
        self.caret = if self.text.is_char_boundary(caret) {
            caret
        } else {
            self.text.len()
        };
        self.bindings.retain_present(&self.text);
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.caret = 0;
        self.bindings.clear();
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Finds an active mention query: an unescaped `@` before the caret with no
/// whitespace between it and the caret.
pub fn detect_mention_query(text: &str, caret: usize) -> Option<MentionQuery> {
    let before = text.get(..caret)?;
    let trigger = before.rfind('@')?;
    let query = &before[trigger + 1..];
    if query.chars().any(char::is_whitespace) || before[..trigger].ends_with('\\') {
        return None;
    }
    Some(MentionQuery {
        trigger,
        caret,
        text: query.to_string(),
    })
}

#[derive(Debug, Default)]
pub struct SuggestionEngine {
    state: SuggestionState,
    generation: u64,
}

impl SuggestionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SuggestionState {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, SuggestionState::Open { .. })
    }

    pub fn candidates(&self) -> &[Member] {
        match &self.state {
            SuggestionState::Open { candidates, .. } => candidates,
            _ => &[],
        }
    }

    pub fn selected(&self) -> Option<&Member> {
        match &self.state {
            SuggestionState::Open {
                candidates,
                selected,
                ..
            } => candidates.get(*selected),
            _ => None,
        }
    }

    /// Handles a buffer change. Returns a ticket when a search should run
    /// once the debounce delay elapses; any older ticket becomes stale.
    pub fn on_input(&mut self, draft: &ComposeDraft) -> Option<DebounceTicket> {
        self.generation += 1;
        match detect_mention_query(&draft.text, draft.caret) {
            Some(query) => {
                self.state = SuggestionState::Querying(query);
                Some(DebounceTicket {
                    generation: self.generation,
                })
            }
            None => {
                self.state = SuggestionState::Idle;
                None
            }
        }
    }

    /// Runs the search for a fired debounce timer. Returns true when the list
    /// opened.
    pub fn on_debounce(&mut self, ticket: DebounceTicket, directory: &MemberDirectory) -> bool {
        if ticket.generation != self.generation {
            return false;
        }
        let SuggestionState::Querying(query) = &self.state else {
            return false;
        };

        let candidates = directory.search(&query.text, true);
        if candidates.is_empty() {
            return false;
        }
        self.state = SuggestionState::Open {
            query: query.clone(),
            candidates,
            selected: 0,
        };
        true
    }

    pub fn on_key(&mut self, key: ComposeKey, draft: &mut ComposeDraft) -> KeyOutcome {
        let SuggestionState::Open {
            candidates,
            selected,
            ..
        } = &mut self.state
        else {
            return KeyOutcome::NotHandled;
        };

        match key {
            ComposeKey::ArrowDown => {
                *selected = (*selected + 1) % candidates.len();
                KeyOutcome::Moved {
                    selected: *selected,
                }
            }
            ComposeKey::ArrowUp => {
                *selected = (*selected + candidates.len() - 1) % candidates.len();
                KeyOutcome::Moved {
                    selected: *selected,
                }
            }
            ComposeKey::Enter | ComposeKey::Tab => {
                let candidate = candidates[*selected].clone();
                if self.apply(&candidate, draft) {
                    KeyOutcome::Applied(candidate)
                } else {
                    KeyOutcome::Dismissed
                }
            }
            ComposeKey::Escape => {
                self.dismiss();
                KeyOutcome::Dismissed
            }
        }
    }

    /// Replaces `@query` before the caret with `@Display Name ` and records
    /// the binding. Returns false when the buffer no longer holds a query.
    pub fn apply(&mut self, candidate: &Member, draft: &mut ComposeDraft) -> bool {
        let Some(query) = detect_mention_query(&draft.text, draft.caret) else {
            self.dismiss();
            return false;
        };

        let inserted = format!("@{} ", candidate.display_name);
        draft
            .text
            .replace_range(query.trigger..query.caret, &inserted);
        draft.caret = query.trigger + inserted.len();
        draft
            .bindings
            .insert(candidate.display_name.clone(), candidate.id.clone());
        self.dismiss();
        true
    }

    /// Escape or a click outside the list.
    pub fn dismiss(&mut self) {
        self.generation += 1;
        self.state = SuggestionState::Idle;
    }
}

/// Single in-flight timer per compose field; scheduling again aborts the
/// previous one.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn schedule<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
#[path = "tests/suggestion_tests.rs"]
mod tests;
