//! Canonical rewriter
//!
//! Applies a selection to the original parsed tree by removing unselected
//! `<system>` elements, reapplies the fixed ordering rules (numeric group
//! order, access-code-suffix student order; thumbnail items never move),
//! and emits the staged output file. Serialization itself lives in
//! [`crate::dom`].

use std::path::Path;

use tokio::fs;
use tracing::info;

use crate::dom::{Document, Element};
use crate::error::RosterError;
use crate::model::suffix_key;
use crate::selection::SelectionSet;

fn numeric_group_id(group: &Element) -> i64 {
    group
        .child_text("group_id")
        .and_then(|t| t.trim().parse().ok())
        .unwrap_or(0)
}

fn student_suffix(student: &Element) -> &str {
    student
        .child_text("access_code")
        .map(suffix_key)
        .unwrap_or("")
}

/// Rewrite a group config tree in place.
///
/// Groups are detached, sorted by integer `group_id` (unparsable or
/// missing sorts as 0) and reattached; students within each group are
/// detached, stable-sorted by the access-code suffix rule and reattached.
/// For students whose code is a key in the selection, systems whose
/// `name` is not retained are removed; codes absent from the selection
/// are left untouched.
pub fn rewrite_group_config(doc: &mut Document, selection: &SelectionSet) {
    let mut groups = doc.root.detach_children("group");
    groups.sort_by_key(numeric_group_id);

    for mut group in groups {
        if let Some(students_elem) = group.find_mut("students") {
            let mut students = students_elem.detach_children("student");
            students.sort_by(|a, b| student_suffix(a).cmp(student_suffix(b)));
            for mut student in students {
                let code = student.child_text("access_code").map(str::to_string);
                if let Some(retained) = code.as_deref().and_then(|c| selection.retained(c)) {
                    if let Some(systems_elem) = student.find_mut("systems") {
                        // A system without a <name> can never be retained.
                        systems_elem.retain_children_named("system", |system| {
                            system
                                .child_text("name")
                                .is_some_and(|name| retained.contains(name))
                        });
                    }
                }
                students_elem.append(student);
            }
        }
        doc.root.append(group);
    }
}

/// Rewrite a thumbnail settings tree in place.
///
/// For items whose code is a key in the selection, systems whose `ip` is
/// not retained are removed. Item order is never changed.
pub fn rewrite_thumbnail_settings(doc: &mut Document, selection: &SelectionSet) {
    doc.root.for_each_descendant_mut("thumbnail_item", &mut |item| {
        let code = item.child_text("access_code").map(str::to_string);
        let Some(retained) = code.as_deref().and_then(|c| selection.retained(c)) else {
            return;
        };
        if let Some(systems_elem) = item.find_mut("systems") {
            systems_elem.retain_children_named("system", |system| {
                system
                    .child_text("ip")
                    .is_some_and(|ip| retained.contains(ip))
            });
        }
    });
}

/// Write a rewritten tree to its staged path.
///
/// The staged name is temporary; the version store publishes it under
/// the canonical name and removes the staged file afterwards.
pub async fn write_staged(doc: &Document, path: &Path) -> Result<(), RosterError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, doc.serialize_bytes()).await?;
    info!(path = %path.display(), "Wrote staged config");
    Ok(())
}
