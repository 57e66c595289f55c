//! In-memory set of people who may appear in a room.
//!
//! The directory is fed from the roster, the authenticated profile, and the
//! authors found in history or live messages. Writes are additive merges: a
//! later candidate only fills fields that are still missing, so the order in
//! which the feeds resolve never matters.

use std::collections::HashMap;

use shared::{
    domain::MemberId,
    protocol::{HistoryEntry, RosterEntry, SelfProfile},
};

/// Maximum number of members returned by [`MemberDirectory::search`].
pub const SEARCH_PAGE_SIZE: usize = 8;

/// Name given to authors whose display name is unknown.
pub const PLACEHOLDER_NAME: &str = "Unknown member";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: MemberId,
    pub display_name: String,
    pub email: String,
    pub avatar_ref: Option<String>,
}

impl Member {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: MemberId(id.into()),
            display_name: display_name.into(),
            email: String::new(),
            avatar_ref: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn with_avatar(mut self, avatar_ref: impl Into<String>) -> Self {
        self.avatar_ref = Some(avatar_ref.into());
        self
    }

    /// True when the display name carries no real information.
    pub fn has_placeholder_name(&self) -> bool {
        is_placeholder_name(&self.display_name, &self.id)
    }
}

impl From<RosterEntry> for Member {
    fn from(entry: RosterEntry) -> Self {
        Self {
            id: entry.id,
            display_name: entry.display_name,
            email: entry.email,
            avatar_ref: entry.avatar_ref,
        }
    }
}

impl From<&SelfProfile> for Member {
    fn from(profile: &SelfProfile) -> Self {
        Self {
            id: profile.id.clone(),
            display_name: profile.display_name.clone(),
            email: profile.email.clone(),
            avatar_ref: profile.avatar_ref.clone(),
        }
    }
}

impl From<&HistoryEntry> for Member {
    fn from(entry: &HistoryEntry) -> Self {
        let display_name = if entry.author_display_name.trim().is_empty() {
            PLACEHOLDER_NAME.to_string()
        } else {
            entry.author_display_name.clone()
        };
        Self {
            id: entry.author_id.clone(),
            display_name,
            email: String::new(),
            avatar_ref: entry.author_avatar_ref.clone(),
        }
    }
}

pub fn is_placeholder_name(name: &str, id: &MemberId) -> bool {
    let name = name.trim();
    name.is_empty() || name == PLACEHOLDER_NAME || name == id.as_str()
}

#[derive(Debug, Default, Clone)]
pub struct MemberDirectory {
    members: Vec<Member>,
    index: HashMap<MemberId, usize>,
    self_id: Option<MemberId>,
}

impl MemberDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_self_id(&mut self, id: MemberId) {
        self.self_id = Some(id);
    }

    pub fn self_id(&self) -> Option<&MemberId> {
        self.self_id.as_ref()
    }

    /// Merges `candidate` into the directory. Returns true when anything changed.
    pub fn upsert(&mut self, candidate: Member) -> bool {
        let Some(&slot) = self.index.get(&candidate.id) else {
            self.index.insert(candidate.id.clone(), self.members.len());
            self.members.push(candidate);
            return true;
        };

        let existing = &mut self.members[slot];
        let mut changed = false;
        if existing.has_placeholder_name() && !candidate.has_placeholder_name() {
            existing.display_name = candidate.display_name;
            changed = true;
        }
        if existing.email.trim().is_empty() && !candidate.email.trim().is_empty() {
            existing.email = candidate.email;
            changed = true;
        }
        if existing.avatar_ref.is_none() && candidate.avatar_ref.is_some() {
            existing.avatar_ref = candidate.avatar_ref;
            changed = true;
        }
        changed
    }

    pub fn resolve_by_id(&self, id: &MemberId) -> Option<&Member> {
        self.index.get(id).map(|&slot| &self.members[slot])
    }

    /// Members whose display name or email contains `query`, case-insensitively,
    /// in insertion order and capped at [`SEARCH_PAGE_SIZE`].
    pub fn search(&self, query: &str, exclude_self: bool) -> Vec<Member> {
        let needle = query.trim().to_lowercase();
        self.members
            .iter()
            .filter(|member| !(exclude_self && self.self_id.as_ref() == Some(&member.id)))
            .filter(|member| {
                needle.is_empty()
                    || member.display_name.to_lowercase().contains(&needle)
                    || member.email.to_lowercase().contains(&needle)
            })
            .take(SEARCH_PAGE_SIZE)
            .cloned()
            .collect()
    }

    /// First member carrying exactly `display_name`.
    pub fn find_by_display_name(&self, display_name: &str) -> Option<&Member> {
        self.members
            .iter()
            .find(|member| member.display_name == display_name)
    }

    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.iter()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
#[path = "tests/directory_tests.rs"]
mod tests;
