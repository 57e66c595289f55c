//! Conversion between the authoring form of a mention (`@Display Name`) and
//! the wire form (`@uid:<memberId>`).
//!
//! Both directions are pure functions over the directory snapshot they are
//! given. Matching always runs longest literal first so a short name never
//! claims the prefix of a longer one ("Ann" vs "Anna Lee").

use std::{
    borrow::Cow,
    collections::{BTreeMap, HashSet},
    sync::OnceLock,
};

use regex::{Captures, Regex};
use shared::domain::{MemberId, OBJECT_ID_HEX_LEN};

use crate::directory::{is_placeholder_name, MemberDirectory};

pub const WIRE_MENTION_PREFIX: &str = "@uid:";

fn wire_mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@uid:([0-9A-Fa-f]+)").expect("valid wire mention regex"))
}

fn bare_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@\S+").expect("valid mention token regex"))
}

/// Compose-time association between inserted display text and the member it
/// stands for. Lives for one draft.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MentionBindings {
    entries: BTreeMap<String, MemberId>,
}

impl MentionBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, display_text: impl Into<String>, member_id: MemberId) {
        self.entries.insert(display_text.into(), member_id);
    }

    pub fn get(&self, display_text: &str) -> Option<&MemberId> {
        self.entries.get(display_text)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drops bindings whose text no longer appears as `@text` followed by
    /// whitespace or end of input.
    pub fn retain_present(&mut self, text: &str) {
        self.entries
            .retain(|display_text, _| mention_pattern(display_text).is_some_and(|re| re.is_match(text)));
    }

    fn longest_first(&self) -> Vec<(&str, &MemberId)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|(text, id)| (text.as_str(), id))
            .collect();
        entries.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()));
        entries
    }
}

/// Inline piece of a decoded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Mention {
        text: String,
        member_id: Option<MemberId>,
    },
}

impl Segment {
    pub fn as_str(&self) -> &str {
        match self {
            Segment::Text(text) | Segment::Mention { text, .. } => text,
        }
    }
}

pub fn render_plain(segments: &[Segment]) -> String {
    segments.iter().map(Segment::as_str).collect()
}

pub fn mention_texts(segments: &[Segment]) -> Vec<&str> {
    segments
        .iter()
        .filter_map(|segment| match segment {
            Segment::Mention { text, .. } => Some(text.as_str()),
            Segment::Text(_) => None,
        })
        .collect()
}

fn mention_pattern(literal: &str) -> Option<Regex> {
    if literal.trim().is_empty() {
        return None;
    }
    Regex::new(&format!(r"@{}(\s|$)", regex::escape(literal))).ok()
}

fn replace_mention(text: &str, literal: &str, member_id: &MemberId) -> String {
    let Some(pattern) = mention_pattern(literal) else {
        return text.to_string();
    };
    pattern
        .replace_all(text, |caps: &Captures<'_>| {
            format!("{WIRE_MENTION_PREFIX}{member_id}{}", &caps[1])
        })
        .into_owned()
}

/// Rewrites authored mentions into wire form.
///
/// Explicit bindings are applied first. Afterwards every directory display
/// name and email is tried as a fallback, which also catches mentions that were
/// pasted or typed without the suggestion list.
pub fn encode_outgoing(text: &str, bindings: &MentionBindings, directory: &MemberDirectory) -> String {
    if !text.contains('@') {
        return text.to_string();
    }

    let mut encoded = text.to_string();
    for (display_text, member_id) in bindings.longest_first() {
        encoded = replace_mention(&encoded, display_text, member_id);
    }

    let mut candidates: Vec<(&str, &MemberId)> = directory
        .members()
        .flat_map(|member| {
            [
                (member.display_name.as_str(), &member.id),
                (member.email.as_str(), &member.id),
            ]
        })
        .filter(|(literal, id)| !is_placeholder_name(literal, id))
        .collect();
    candidates.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()));

    for (literal, member_id) in candidates {
        if !encoded.contains('@') {
            break;
        }
        encoded = replace_mention(&encoded, literal, member_id);
    }
    encoded
}

/// Resolves `@uid:<24 hex>` tokens to `@Display Name`. Unknown ids render as
/// `@<id>`; runs of any other length are left untouched.
pub fn resolve_wire_mentions<'a>(text: &'a str, directory: &MemberDirectory) -> Cow<'a, str> {
    wire_mention_re().replace_all(text, |caps: &Captures<'_>| {
        let raw = &caps[1];
        if raw.len() != OBJECT_ID_HEX_LEN {
            return caps[0].to_string();
        }
        directory
            .resolve_by_id(&MemberId::new(raw))
            .or_else(|| directory.resolve_by_id(&MemberId::new(raw.to_ascii_lowercase())))
            .map(|member| format!("@{}", member.display_name))
            .unwrap_or_else(|| format!("@{raw}"))
    })
}

/// Decodes a wire-form body into renderable segments.
pub fn decode_incoming(text: &str, directory: &MemberDirectory) -> Vec<Segment> {
    let resolved = resolve_wire_mentions(text, directory);

    let mut seen = HashSet::new();
    let mut names: Vec<&str> = directory
        .members()
        .map(|member| member.display_name.as_str())
        .filter(|name| !name.trim().is_empty() && seen.insert(*name))
        .collect();
    names.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));

    let known_names = if names.is_empty() {
        None
    } else {
        let alternation = names
            .iter()
            .map(|name| regex::escape(name))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!("@(?:{alternation})")).ok()
    };
    let highlighter = known_names.as_ref().unwrap_or_else(|| bare_token_re());

    let mut segments = Vec::new();
    let mut cursor = 0;
    for found in highlighter.find_iter(&resolved) {
        if found.start() > cursor {
            segments.push(Segment::Text(resolved[cursor..found.start()].to_string()));
        }
        let mention = found.as_str();
        segments.push(Segment::Mention {
            text: mention.to_string(),
            member_id: directory
                .find_by_display_name(&mention[1..])
                .map(|member| member.id.clone()),
        });
        cursor = found.end();
    }
    if cursor < resolved.len() {
        segments.push(Segment::Text(resolved[cursor..].to_string()));
    }
    segments
}

#[cfg(test)]
#[path = "tests/mention_tests.rs"]
mod tests;
