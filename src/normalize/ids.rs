//! Sequential id assignment for anonymous sections.
//!
//! Every section needs an id so the TOC and page-map stages can address
//! it. Sections that arrived without one get `sect_N`, where the counter
//! increases monotonically and skips over ids the book already uses — a
//! pre-existing `sect_2` is never reused, and neither is the candidate
//! that collided with it.
//!
//! Subtitles are deliberately not assigned ids; only sections are.

use crate::book::{Body, Book, FlowItem, Section};

use super::index::IdIndex;
use super::path::{RefPath, Step};

/// Assign `sect_N` ids to sections lacking one, registering each new id in
/// the index with the `section-generated` type tag.
pub fn assign_section_ids(book: &mut Book, ids: &mut IdIndex) {
    let mut counter = 1usize;
    let bodies = book.bodies.iter_mut().enumerate();
    for (body_index, body) in bodies {
        assign_in_body(body, body_index, ids, &mut counter);
    }
}

fn assign_in_body(body: &mut Body, body_index: usize, ids: &mut IdIndex, counter: &mut usize) {
    for (section_index, section) in body.sections.iter_mut().enumerate() {
        let path = vec![Step::Body(body_index), Step::ChildSection(section_index)];
        assign_in_section(section, path, ids, counter);
    }
}

fn assign_in_section(
    section: &mut Section,
    path: RefPath,
    ids: &mut IdIndex,
    counter: &mut usize,
) {
    if !section.has_id() {
        let id = next_free(ids, counter);
        ids.insert(id.clone(), "section-generated", path.clone());
        section.id = Some(id);
    }
    for (item_index, item) in section.content.iter_mut().enumerate() {
        if let FlowItem::Section(nested) = item {
            let mut nested_path = path.clone();
            nested_path.push(Step::Item(item_index));
            assign_in_section(nested, nested_path, ids, counter);
        }
    }
}

/// Advance the counter past collisions and return the first free id.
fn next_free(ids: &IdIndex, counter: &mut usize) -> String {
    loop {
        let candidate = format!("sect_{}", *counter);
        *counter += 1;
        if !ids.contains(&candidate) {
            return candidate;
        }
    }
}
