//! Link classification and repair.
//!
//! After the first index build, every link in the book falls into one of
//! five states: valid internal, valid external, empty, broken internal, or
//! broken external. This pass repairs the broken ones so that downstream
//! emission never meets a dangling href:
//!
//! - Text links are replaced in place by a plain-text segment that keeps
//!   the visible link text and appends a bracketed marker.
//! - Image references (coverpage, block, inline) are redirected to a
//!   placeholder image whose binary is appended on first use.
//!
//! Each reverse-index entry carries its own path, and a rewrite only ever
//! replaces the leaf the path ends at, so repairing one reference never
//! invalidates another.

use crate::book::{Binary, Book, Span, walk::span_text};
use crate::config::NormalizeConfig;
use crate::diag::{Diagnostics, WarnKind};
use crate::media::PLACEHOLDER_SVG;

use super::index::{IdIndex, LinkKind, LinkRef, ReverseLinkIndex, build_reverse_links};
use super::path::{Node, Step, path_string, resolve_mut};

/// Why a reference is being rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Repair {
    Empty,
    BrokenInternal,
    BrokenExternal,
}

/// Mint the first `{stem}-N` id not present in the index, counting from 0.
pub fn mint_id(ids: &IdIndex, stem: &str) -> String {
    let mut n = 0usize;
    loop {
        let candidate = format!("{stem}-{n}");
        if !ids.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Classify every link group and repair the broken ones in place.
///
/// Returns the reverse index rebuilt from the mutated tree. The id index
/// is extended with every binary this pass mints (vignettes, placeholder)
/// but existing entries are untouched.
pub fn normalize_links(
    book: &mut Book,
    config: &NormalizeConfig,
    ids: &mut IdIndex,
    diag: &mut Diagnostics,
) -> ReverseLinkIndex {
    // Assign the placeholder id once; a book that already carries one
    // (from a previous run) keeps it.
    let placeholder = match &book.placeholder_id {
        Some(id) => id.clone(),
        None => {
            let id = mint_id(ids, "not-found");
            book.placeholder_id = Some(id.clone());
            id
        }
    };

    // Append a binary for every configured vignette blob not yet
    // registered.
    for (&pos, vignette) in &config.vignettes {
        if book.vignettes.contains_key(&pos) {
            continue;
        }
        let id = mint_id(ids, pos.as_str());
        let index = book.binaries.len();
        book.binaries.push(Binary {
            id: id.clone(),
            content_type: vignette.content_type.clone(),
            data: vignette.data.clone(),
            builtin_vignette: vignette.builtin,
        });
        ids.insert(id.clone(), "binary", vec![Step::Binary(index)]);
        book.vignettes.insert(pos, id);
    }

    // Binaries changed; re-derive the reverse index before classifying.
    let links = build_reverse_links(book);

    let mut needs_placeholder = false;
    for (target, refs) in links.iter() {
        let Some(first) = refs.first() else { continue };
        let repair = match first.kind {
            LinkKind::External => continue,
            LinkKind::EmptyHref => Repair::Empty,
            LinkKind::Broken => Repair::BrokenExternal,
            _ => {
                if ids.contains(target) {
                    continue;
                }
                Repair::BrokenInternal
            }
        };
        for link_ref in refs {
            rewrite(
                book,
                link_ref,
                target,
                repair,
                &placeholder,
                &mut needs_placeholder,
                diag,
            );
        }
    }

    // The placeholder binary exists iff something was redirected to it.
    if needs_placeholder && book.binary(&placeholder).is_none() {
        let index = book.binaries.len();
        book.binaries.push(Binary::new(
            placeholder.clone(),
            "image/svg+xml",
            PLACEHOLDER_SVG.to_vec(),
        ));
        ids.insert(placeholder, "binary", vec![Step::Binary(index)]);
    }

    build_reverse_links(book)
}

fn rewrite(
    book: &mut Book,
    link_ref: &LinkRef,
    target: &str,
    repair: Repair,
    placeholder: &str,
    needs_placeholder: &mut bool,
    diag: &mut Diagnostics,
) {
    let location = path_string(&link_ref.path);
    match resolve_mut(book, &link_ref.path) {
        Some(Node::Span(slot)) => match slot {
            Span::Link { spans, .. } => {
                let text = span_text(spans, false);
                *slot = Span::Text(repair_text(&text, repair, target));
                warn_repair(diag, repair, target, &location);
            }
            Span::Image(image) => {
                image.href = format!("#{placeholder}");
                *needs_placeholder = true;
                warn_repair(diag, repair, target, &location);
            }
            _ => diag.warn(
                WarnKind::UnresolvedPath,
                target,
                format!("reference path {location} does not end at a link"),
            ),
        },
        Some(Node::BlockImage(image)) => {
            image.href = format!("#{placeholder}");
            *needs_placeholder = true;
            warn_repair(diag, repair, target, &location);
        }
        _ => diag.warn(
            WarnKind::UnresolvedPath,
            target,
            format!("reference path {location} no longer resolves"),
        ),
    }
}

/// The replacement text for a repaired link segment.
fn repair_text(link_text: &str, repair: Repair, target: &str) -> String {
    let marker = match repair {
        Repair::Empty => "[empty link]".to_string(),
        Repair::BrokenInternal => format!("[broken link: #{target}]"),
        Repair::BrokenExternal => format!("[broken external link: {target}]"),
    };
    if link_text.is_empty() {
        marker
    } else {
        format!("{link_text} {marker}")
    }
}

fn warn_repair(diag: &mut Diagnostics, repair: Repair, target: &str, location: &str) {
    let (kind, detail) = match repair {
        Repair::Empty => (WarnKind::EmptyHref, "empty link rewritten"),
        Repair::BrokenInternal => (
            WarnKind::BrokenInternalLink,
            "link to missing id rewritten",
        ),
        Repair::BrokenExternal => (
            WarnKind::BrokenExternalLink,
            "malformed external link rewritten",
        ),
    };
    diag.warn(kind, target, format!("{detail} at {location}"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{Body, FlowItem, Paragraph, Section};
    use crate::normalize::index::build_indexes;

    fn book_with_paragraph(spans: Vec<Span>) -> Book {
        let mut book = Book::new();
        book.bodies.push(Body {
            sections: vec![Section {
                id: Some("s1".to_string()),
                content: vec![FlowItem::Paragraph(Paragraph {
                    spans,
                    ..Default::default()
                })],
                ..Default::default()
            }],
            ..Default::default()
        });
        book
    }

    fn first_span(book: &Book) -> &Span {
        match &book.bodies[0].sections[0].content[0] {
            FlowItem::Paragraph(p) => &p.spans[0],
            _ => panic!("expected paragraph"),
        }
    }

    #[test]
    fn test_broken_internal_link_becomes_text() {
        let mut book = book_with_paragraph(vec![Span::Link {
            href: "#nope".to_string(),
            kind: None,
            spans: vec![Span::Text("Click".to_string())],
        }]);
        let config = NormalizeConfig::default();
        let mut diag = Diagnostics::new();
        let (mut ids, _) = build_indexes(&book);

        normalize_links(&mut book, &config, &mut ids, &mut diag);

        match first_span(&book) {
            Span::Text(text) => assert_eq!(text, "Click [broken link: #nope]"),
            other => panic!("expected text, got {other:?}"),
        }
        // No image was redirected, so no placeholder binary appears.
        let placeholder = book.placeholder_id.clone().unwrap();
        assert!(book.binary(&placeholder).is_none());
        assert_eq!(diag.count(WarnKind::BrokenInternalLink), 1);
    }

    #[test]
    fn test_valid_internal_link_untouched() {
        let mut book = book_with_paragraph(vec![Span::Link {
            href: "#s1".to_string(),
            kind: None,
            spans: vec![Span::Text("Click".to_string())],
        }]);
        let config = NormalizeConfig::default();
        let mut diag = Diagnostics::new();
        let (mut ids, _) = build_indexes(&book);

        normalize_links(&mut book, &config, &mut ids, &mut diag);

        assert!(matches!(first_span(&book), Span::Link { .. }));
        assert!(diag.is_empty());
    }

    #[test]
    fn test_external_link_untouched() {
        let mut book = book_with_paragraph(vec![Span::Link {
            href: "https://example.com/page".to_string(),
            kind: None,
            spans: vec![Span::Text("site".to_string())],
        }]);
        let config = NormalizeConfig::default();
        let mut diag = Diagnostics::new();
        let (mut ids, _) = build_indexes(&book);

        normalize_links(&mut book, &config, &mut ids, &mut diag);

        assert!(matches!(first_span(&book), Span::Link { .. }));
    }

    #[test]
    fn test_empty_href_marker() {
        let mut book = book_with_paragraph(vec![Span::Link {
            href: String::new(),
            kind: None,
            spans: vec![Span::Text("dead".to_string())],
        }]);
        let config = NormalizeConfig::default();
        let mut diag = Diagnostics::new();
        let (mut ids, _) = build_indexes(&book);

        normalize_links(&mut book, &config, &mut ids, &mut diag);

        match first_span(&book) {
            Span::Text(text) => assert_eq!(text, "dead [empty link]"),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn test_broken_block_image_redirects_to_placeholder() {
        let mut book = Book::new();
        book.bodies.push(Body {
            sections: vec![Section {
                content: vec![FlowItem::Image(crate::book::BlockImage {
                    href: "#gone".to_string(),
                    ..Default::default()
                })],
                ..Default::default()
            }],
            ..Default::default()
        });
        let config = NormalizeConfig::default();
        let mut diag = Diagnostics::new();
        let (mut ids, _) = build_indexes(&book);

        normalize_links(&mut book, &config, &mut ids, &mut diag);

        let placeholder = book.placeholder_id.clone().unwrap();
        assert_eq!(placeholder, "not-found-0");
        match &book.bodies[0].sections[0].content[0] {
            FlowItem::Image(image) => assert_eq!(image.href, format!("#{placeholder}")),
            _ => panic!("expected image"),
        }
        let binary = book.binary(&placeholder).expect("placeholder appended");
        assert_eq!(binary.content_type, "image/svg+xml");
    }

    #[test]
    fn test_placeholder_append_is_idempotent() {
        let mut book = Book::new();
        book.bodies.push(Body {
            sections: vec![Section {
                content: vec![FlowItem::Image(crate::book::BlockImage {
                    href: "#gone".to_string(),
                    ..Default::default()
                })],
                ..Default::default()
            }],
            ..Default::default()
        });
        let config = NormalizeConfig::default();
        let mut diag = Diagnostics::new();
        let (mut ids, _) = build_indexes(&book);
        normalize_links(&mut book, &config, &mut ids, &mut diag);

        let binaries_after_first = book.binaries.len();
        // Second run: the image now points at the placeholder, which is in
        // the id index, so nothing is rewritten and nothing is appended.
        let (mut ids, _) = build_indexes(&book);
        normalize_links(&mut book, &config, &mut ids, &mut diag);
        assert_eq!(book.binaries.len(), binaries_after_first);
    }

    #[test]
    fn test_placeholder_id_avoids_collisions() {
        let mut book = book_with_paragraph(vec![Span::Text("x".to_string())]);
        book.binaries
            .push(Binary::new("not-found-0", "image/png", vec![0]));
        let config = NormalizeConfig::default();
        let mut diag = Diagnostics::new();
        let (mut ids, _) = build_indexes(&book);

        normalize_links(&mut book, &config, &mut ids, &mut diag);

        assert_eq!(book.placeholder_id.as_deref(), Some("not-found-1"));
    }

    #[test]
    fn test_vignettes_minted_with_unique_ids() {
        use crate::config::{Vignette, VignettePos};

        let mut book = book_with_paragraph(vec![Span::Text("x".to_string())]);
        book.binaries
            .push(Binary::new("chapter-end-0", "image/svg+xml", vec![1]));
        let mut config = NormalizeConfig::default();
        config.vignettes.insert(
            VignettePos::ChapterEnd,
            Vignette {
                data: vec![2, 3],
                content_type: "image/svg+xml".to_string(),
                builtin: true,
            },
        );
        let mut diag = Diagnostics::new();
        let (mut ids, _) = build_indexes(&book);

        normalize_links(&mut book, &config, &mut ids, &mut diag);

        let id = book.vignettes.get(&VignettePos::ChapterEnd).unwrap();
        assert_eq!(id, "chapter-end-1");
        let binary = book.binary(id).unwrap();
        assert!(binary.builtin_vignette);
        assert_eq!(binary.data, vec![2, 3]);
    }

    #[test]
    fn test_inline_image_with_broken_target() {
        let mut book = book_with_paragraph(vec![Span::Image(crate::book::InlineImage {
            href: "#missing".to_string(),
            ..Default::default()
        })]);
        let config = NormalizeConfig::default();
        let mut diag = Diagnostics::new();
        let (mut ids, _) = build_indexes(&book);

        normalize_links(&mut book, &config, &mut ids, &mut diag);

        match first_span(&book) {
            Span::Image(image) => assert_eq!(image.href, "#not-found-0"),
            other => panic!("expected inline image, got {other:?}"),
        }
        assert!(book.binary("not-found-0").is_some());
    }
}
