//! XML normalizer and access-code extractor
//!
//! Turns either inventory dialect into an [`AccessCodeMap`]. Group
//! documents are re-sorted by the access-code suffix rule after the walk;
//! thumbnail documents keep document order. The asymmetry is intentional
//! and downstream consumers depend on it.

use crate::dom::{Document, Element};
use crate::error::RosterError;
use crate::model::{AccessCodeMap, GroupSystem, SystemRecord, ThumbSystem};

fn child_text_or_empty(element: &Element, name: &str) -> String {
    element.child_text(name).unwrap_or_default().to_string()
}

/// Normalize a group config document.
///
/// Walks groups then students in document order, keeps students with a
/// non-empty access code, and re-sorts the result by the last two
/// characters of the code (stable).
pub fn parse_group_config(bytes: &[u8]) -> Result<AccessCodeMap, RosterError> {
    let doc = Document::parse(bytes)?;
    Ok(normalize_group_config(&doc))
}

/// Normalize an already-parsed group config tree.
pub fn normalize_group_config(doc: &Document) -> AccessCodeMap {
    let mut map = AccessCodeMap::new();
    for group in doc.root.children_named("group") {
        let group_id = child_text_or_empty(group, "group_id");
        let group_name = child_text_or_empty(group, "group_name");
        let Some(students) = group.find("students") else {
            continue;
        };
        for student in students.children_named("student") {
            let Some(code) = student.child_text("access_code") else {
                continue;
            };
            if code.is_empty() {
                continue;
            }
            let mut systems = Vec::new();
            if let Some(systems_elem) = student.find("systems") {
                for system in systems_elem.children_named("system") {
                    systems.push(SystemRecord::Group(GroupSystem {
                        name: child_text_or_empty(system, "name"),
                        ip: child_text_or_empty(system, "ip"),
                        os_type: child_text_or_empty(system, "os_type"),
                        image_name: child_text_or_empty(system, "image_name"),
                        group_id: group_id.clone(),
                        group_name: group_name.clone(),
                    }));
                }
            }
            map.insert(code.to_string(), systems);
        }
    }
    map.sort_by_code_suffix();
    map
}

/// Normalize a thumbnail settings document.
///
/// Items are taken anywhere in the tree, in document order, and never
/// re-sorted.
pub fn parse_thumbnail_settings(bytes: &[u8]) -> Result<AccessCodeMap, RosterError> {
    let doc = Document::parse(bytes)?;
    Ok(normalize_thumbnail_settings(&doc))
}

/// Normalize an already-parsed thumbnail settings tree.
pub fn normalize_thumbnail_settings(doc: &Document) -> AccessCodeMap {
    let mut map = AccessCodeMap::new();
    doc.root.for_each_descendant("thumbnail_item", &mut |item| {
        let Some(code) = item.child_text("access_code") else {
            return;
        };
        if code.is_empty() {
            return;
        }
        let mut systems = Vec::new();
        if let Some(systems_elem) = item.find("systems") {
            for system in systems_elem.children_named("system") {
                systems.push(SystemRecord::Thumbnail(ThumbSystem {
                    ip: child_text_or_empty(system, "ip"),
                    system_note: child_text_or_empty(system, "system_note"),
                }));
            }
        }
        map.insert(code.to_string(), systems);
    });
    map
}

/// Extract every access code from a document of either dialect.
///
/// Scans both `student` and `thumbnail_item` elements anywhere in the
/// tree; returns non-empty codes deduplicated and sorted. Used only for
/// archive indexing.
pub fn extract_access_codes(bytes: &[u8]) -> Result<Vec<String>, RosterError> {
    let doc = Document::parse(bytes)?;
    let mut codes: Vec<String> = Vec::new();
    let mut collect = |holder: &Element| {
        if let Some(code) = holder.child_text("access_code") {
            if !code.is_empty() {
                codes.push(code.to_string());
            }
        }
    };
    doc.root.for_each_descendant("student", &mut collect);
    doc.root.for_each_descendant("thumbnail_item", &mut collect);
    codes.sort();
    codes.dedup();
    Ok(codes)
}
