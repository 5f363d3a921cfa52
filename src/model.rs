//! In-memory model for normalized inventory documents
//!
//! Both XML dialects normalize into an [`AccessCodeMap`]: an ordered
//! mapping from access code to the systems assigned under it. The map is
//! request-local and owned by the document it was parsed from.

use serde::{Deserialize, Serialize};

/// One assigned virtual system, in either dialect's shape.
///
/// The identity key differs per dialect: `name` for group systems, `ip`
/// for thumbnail systems.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemRecord {
    Group(GroupSystem),
    Thumbnail(ThumbSystem),
}

/// System entry from the group config dialect. Missing optional fields
/// default to the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GroupSystem {
    pub name: String,
    pub ip: String,
    pub os_type: String,
    pub image_name: String,
    pub group_id: String,
    pub group_name: String,
}

/// System entry from the thumbnail settings dialect.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ThumbSystem {
    pub ip: String,
    pub system_note: String,
}

impl SystemRecord {
    /// Dialect identity key: group systems by `name`, thumbnails by `ip`.
    pub fn identity(&self) -> &str {
        match self {
            SystemRecord::Group(s) => &s.name,
            SystemRecord::Thumbnail(s) => &s.ip,
        }
    }

    pub fn ip(&self) -> &str {
        match self {
            SystemRecord::Group(s) => &s.ip,
            SystemRecord::Thumbnail(s) => &s.ip,
        }
    }
}

/// Ordered mapping from access code to assigned systems.
///
/// Insertion keeps the position of the first occurrence of a code and
/// replaces its value on re-insert, so duplicate codes within one
/// document collapse the way a keyed map would.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccessCodeMap {
    entries: Vec<(String, Vec<SystemRecord>)>,
}

impl AccessCodeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: String, systems: Vec<SystemRecord>) {
        if let Some(existing) = self.entries.iter_mut().find(|(c, _)| *c == code) {
            existing.1 = systems;
        } else {
            self.entries.push((code, systems));
        }
    }

    pub fn get(&self, code: &str) -> Option<&[SystemRecord]> {
        self.entries
            .iter()
            .find(|(c, _)| c == code)
            .map(|(_, systems)| systems.as_slice())
    }

    pub fn contains(&self, code: &str) -> bool {
        self.entries.iter().any(|(c, _)| c == code)
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(c, _)| c.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[SystemRecord])> {
        self.entries
            .iter()
            .map(|(c, systems)| (c.as_str(), systems.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stable sort of the entries by the access-code suffix rule.
    pub fn sort_by_code_suffix(&mut self) {
        self.entries
            .sort_by(|(a, _), (b, _)| suffix_key(a).cmp(suffix_key(b)));
    }
}

/// Canonical sort key for an access code: its last two characters, the
/// whole code when shorter, `""` when empty. Comparison is case-sensitive
/// ordinal; ties keep original relative order (callers use stable sorts).
pub fn suffix_key(code: &str) -> &str {
    let char_count = code.chars().count();
    if char_count <= 2 {
        return code;
    }
    let (cut, _) = code.char_indices().nth(char_count - 2).unwrap_or((0, ' '));
    &code[cut..]
}
