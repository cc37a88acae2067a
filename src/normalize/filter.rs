//! Drop images nothing references.
//!
//! After link repair every image reference in the book is valid, so a
//! single walk over the reverse index decides what the output container
//! actually needs. The cover, the placeholder, and registered vignettes
//! are always kept: renderers reach them through configuration, not
//! through links.

use crate::book::Book;
use crate::media::BookImages;

use super::index::ReverseLinkIndex;

/// Remove every prepared image that is not the placeholder, a vignette,
/// the cover, or the target of at least one image-kind reference.
pub fn filter_images(images: &mut BookImages, book: &Book, links: &ReverseLinkIndex) {
    images.retain(|image| {
        if book.placeholder_id.as_deref() == Some(image.id.as_str()) {
            return true;
        }
        if book.vignettes.values().any(|id| *id == image.id) {
            return true;
        }
        if book.cover_id() == Some(image.id.as_str()) {
            return true;
        }
        links
            .get(&image.id)
            .is_some_and(|refs| refs.iter().any(|r| r.kind.is_image()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{Binary, BlockImage, Body, FlowItem, Section};
    use crate::config::VignettePos;
    use crate::diag::Diagnostics;
    use crate::media::prepare_images;
    use crate::normalize::index::build_reverse_links;

    #[test]
    fn test_unreferenced_images_dropped_keepers_kept() {
        let mut book = Book::new();
        for id in ["used", "unused", "vignette", "cover"] {
            book.binaries.push(Binary::new(id, "image/svg+xml", b"<svg/>".to_vec()));
        }
        book.description.coverpage.push(BlockImage {
            href: "#cover".to_string(),
            ..Default::default()
        });
        book.vignettes
            .insert(VignettePos::ChapterEnd, "vignette".to_string());
        book.bodies.push(Body {
            sections: vec![Section {
                content: vec![FlowItem::Image(BlockImage {
                    href: "#used".to_string(),
                    ..Default::default()
                })],
                ..Default::default()
            }],
            ..Default::default()
        });

        let mut diag = Diagnostics::new();
        let mut images = prepare_images(&book, &crate::config::NormalizeConfig::default(), &mut diag);
        let links = build_reverse_links(&book);

        filter_images(&mut images, &book, &links);

        assert!(images.contains("used"));
        assert!(images.contains("vignette"));
        assert!(images.contains("cover"));
        assert!(!images.contains("unused"));
    }

    #[test]
    fn test_inline_link_target_is_not_an_image_reference() {
        // A plain text link to a binary id does not keep the image alive.
        use crate::book::{Paragraph, Span};

        let mut book = Book::new();
        book.binaries
            .push(Binary::new("pic", "image/svg+xml", b"<svg/>".to_vec()));
        book.bodies.push(Body {
            sections: vec![Section {
                content: vec![FlowItem::Paragraph(Paragraph {
                    spans: vec![Span::Link {
                        href: "#pic".to_string(),
                        kind: None,
                        spans: vec![Span::Text("see picture".to_string())],
                    }],
                    ..Default::default()
                })],
                ..Default::default()
            }],
            ..Default::default()
        });

        let mut diag = Diagnostics::new();
        let mut images = prepare_images(&book, &crate::config::NormalizeConfig::default(), &mut diag);
        let links = build_reverse_links(&book);

        filter_images(&mut images, &book, &links);
        assert!(!images.contains("pic"));
    }
}
