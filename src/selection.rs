//! Selection engine
//!
//! Decides, per access code, which system identity keys survive into the
//! generated output. The default selection is computed once per upload
//! (optionally narrowed by an IP allow-list) and then edited by the
//! caller through idempotent toggles; a submitted selection replaces the
//! full state for every code in the current document.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::model::AccessCodeMap;

/// Per-access-code set of retained system identity keys.
///
/// Ephemeral: derived from form data or a stored default each request,
/// never persisted with the documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionSet {
    retained: BTreeMap<String, BTreeSet<String>>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retained keys for an access code, if the code is part of the
    /// selection at all. `None` means "no opinion": the rewriter leaves
    /// that code's systems untouched.
    pub fn retained(&self, code: &str) -> Option<&BTreeSet<String>> {
        self.retained.get(code)
    }

    pub fn contains(&self, code: &str, key: &str) -> bool {
        self.retained
            .get(code)
            .is_some_and(|keys| keys.contains(key))
    }

    pub fn set(&mut self, code: impl Into<String>, keys: impl IntoIterator<Item = String>) {
        self.retained.insert(code.into(), keys.into_iter().collect());
    }

    /// Idempotent checkbox update: add the key when checked, remove it
    /// when unchecked.
    pub fn toggle(&mut self, code: &str, key: &str, checked: bool) {
        let keys = self.retained.entry(code.to_string()).or_default();
        if checked {
            keys.insert(key.to_string());
        } else {
            keys.remove(key);
        }
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.retained.keys().map(|c| c.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.retained.is_empty()
    }
}

/// Compute the default selection for a freshly uploaded document.
///
/// With the IP filter active, a code's default retained systems are
/// exactly those whose `ip` appears in the allow-list (exact string
/// match); otherwise every system is retained.
pub fn default_selection(
    map: &AccessCodeMap,
    use_ip_filter: bool,
    ip_allow_list: &[String],
) -> SelectionSet {
    let mut selection = SelectionSet::new();
    for (code, systems) in map.iter() {
        let keys = systems
            .iter()
            .filter(|s| !use_ip_filter || ip_allow_list.iter().any(|ip| ip == s.ip()))
            .map(|s| s.identity().to_string());
        selection.set(code, keys);
    }
    selection
}

/// Build the final selection from a full-state submission.
///
/// Every code present in the document gets exactly the submitted keys;
/// codes absent from the submission get an empty set. Codes submitted
/// for an unknown document code are ignored.
pub fn apply_selection(
    map: &AccessCodeMap,
    submitted: &BTreeMap<String, Vec<String>>,
) -> SelectionSet {
    let mut selection = SelectionSet::new();
    for (code, _) in map.iter() {
        let keys = submitted.get(code).cloned().unwrap_or_default();
        selection.set(code, keys);
    }
    selection
}

/// Parse the newline-delimited allow-list text block the caller collects
/// from the upload form: one IP per line, trimmed, empties dropped.
pub fn parse_ip_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
