//! Footnote body normalization.
//!
//! Footnote bodies arrive in the wild in every shape: notes nested three
//! deep, wrapper sections holding the body title, ids missing or
//! duplicated. This pass rebuilds every footnotes body into a flat list of
//! addressable note sections:
//!
//! - A top-level section *with* an id becomes a note. A missing or empty
//!   title is fabricated as `~ <id> ~`; its content is flattened so no
//!   nested section remains.
//! - A top-level section *without* an id is a wrapper: its title, image,
//!   and epigraphs are promoted to the body (when the body lacks them) and
//!   its id-bearing descendants are extracted as notes.
//! - An id-bearing section nested inside a note is flattened into the
//!   parent's reading flow *and* extracted as its own note, so links that
//!   target it keep an addressable destination.
//!
//! The pass is idempotent: running it on an already-normalized body is a
//! no-op apart from the (stable) rebuild.

use std::collections::HashSet;

use crate::book::{
    Body, BodyKind, Book, Cite, FlowItem, Section, Title, TitleItem,
};
use crate::diag::{Diagnostics, WarnKind};

/// Normalize every footnotes body in place.
pub fn normalize_footnotes(book: &mut Book, diag: &mut Diagnostics) {
    let mut seen: HashSet<String> = HashSet::new();
    for body in &mut book.bodies {
        if body.kind != BodyKind::Footnotes {
            continue;
        }
        normalize_body(body, &mut seen, diag);
    }
}

fn normalize_body(body: &mut Body, seen: &mut HashSet<String>, diag: &mut Diagnostics) {
    let sections = std::mem::take(&mut body.sections);
    let mut notes = Vec::with_capacity(sections.len());

    for section in sections {
        if section.has_id() {
            collect_note(section, &mut notes, seen, diag);
        } else {
            promote_wrapper(body, section, &mut notes, seen, diag);
        }
    }

    body.sections = notes;
}

/// Turn an id-bearing section into a note, then extract its id-bearing
/// descendants as further notes (in document order).
fn collect_note(
    section: Section,
    notes: &mut Vec<Section>,
    seen: &mut HashSet<String>,
    diag: &mut Diagnostics,
) {
    let id = section.id.clone().unwrap_or_default();
    if !seen.insert(id.clone()) {
        diag.warn(
            WarnKind::DuplicateNoteId,
            &id,
            "footnote section with duplicate id dropped",
        );
        return;
    }

    let Section {
        id: _,
        title,
        image,
        epigraphs,
        annotation,
        content,
    } = section;

    notes.push(Section {
        id: Some(id.clone()),
        title: Some(ensure_title(title, &id)),
        image,
        epigraphs,
        annotation,
        content: flatten(content.clone()),
    });

    for item in content {
        extract_nested(item, notes, seen, diag);
    }
}

/// Walk wrapper content looking for id-bearing sections to extract.
fn extract_nested(
    item: FlowItem,
    notes: &mut Vec<Section>,
    seen: &mut HashSet<String>,
    diag: &mut Diagnostics,
) {
    if let FlowItem::Section(section) = item {
        if section.has_id() {
            collect_note(section, notes, seen, diag);
        } else {
            for item in section.content {
                extract_nested(item, notes, seen, diag);
            }
        }
    }
}

/// An id-less top-level section carries body metadata, not a note. Promote
/// what the body lacks, then extract its id-bearing descendants.
fn promote_wrapper(
    body: &mut Body,
    section: Section,
    notes: &mut Vec<Section>,
    seen: &mut HashSet<String>,
    diag: &mut Diagnostics,
) {
    let Section {
        id: _,
        title,
        image,
        epigraphs,
        annotation: _,
        content,
    } = section;

    if body.title.is_none()
        && let Some(title) = title
    {
        body.title = Some(title);
    }
    if body.image.is_none()
        && let Some(image) = image
    {
        body.image = Some(image);
    }
    if body.epigraphs.is_empty() {
        body.epigraphs = epigraphs;
    }

    for item in content {
        extract_nested(item, notes, seen, diag);
    }
}

/// Fabricate a `~ <id> ~` title when the section has none.
fn ensure_title(title: Option<Title>, id: &str) -> Title {
    match title {
        Some(title) if !title.plain_text().is_empty() => title,
        _ => Title::from_text(format!("~ {id} ~")),
    }
}

/// Re-express nested sections as flat flow items.
///
/// Title paragraphs become subtitles, empty title lines stay empty lines,
/// the block image becomes an image item, epigraphs become cites, the
/// annotation splices in place, and the nested content flattens
/// recursively. No section survives.
fn flatten(items: Vec<FlowItem>) -> Vec<FlowItem> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item {
            FlowItem::Section(section) => {
                if let Some(title) = section.title {
                    for entry in title.items {
                        match entry {
                            TitleItem::Paragraph(mut paragraph) => {
                                paragraph.special = true;
                                out.push(FlowItem::Subtitle(paragraph));
                            }
                            TitleItem::EmptyLine => out.push(FlowItem::EmptyLine),
                        }
                    }
                }
                if let Some(image) = section.image {
                    out.push(FlowItem::Image(image));
                }
                for epigraph in section.epigraphs {
                    out.push(FlowItem::Cite(Cite {
                        id: epigraph.id,
                        items: epigraph.items,
                        authors: epigraph.authors,
                    }));
                }
                out.extend(section.annotation);
                out.extend(flatten(section.content));
            }
            other => out.push(other),
        }
    }
    out
}
