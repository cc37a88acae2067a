//! The book-normalization pipeline.
//!
//! A linear sequence of passes over one exclusively-owned [`Book`]:
//!
//! 1. Classify bodies against the configured footnote-name list.
//! 2. Flatten footnote bodies into addressable note sections.
//! 3. Build the id and reverse-link indexes.
//! 4. Repair broken links (text substitution / placeholder redirection).
//! 5. Assign `sect_N` ids to anonymous sections.
//! 6. Number footnotes and rewrite call-sites.
//! 7. Prepare images for the output target.
//! 8. Resolve stylesheet resources and mine page-break hints.
//! 9. Drop images nothing references.
//!
//! Indexes are rebuilt after any pass that reshaped the tree. No pass
//! suspends; cancellation is observed only between passes, through the
//! caller-supplied [`Cancel`] token. Everything that goes wrong inside a
//! parseable book is repaired and reported, never raised.

pub mod index;
pub mod path;

mod filter;
mod footnotes;
mod ids;
mod labels;
mod links;

pub use filter::filter_images;
pub use footnotes::normalize_footnotes;
pub use ids::assign_section_ids;
pub use labels::label_footnotes;
pub use links::{mint_id, normalize_links};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::book::{Body, BodyKind, Book};
use crate::config::NormalizeConfig;
use crate::css::{StylesheetResource, normalize_stylesheets};
use crate::diag::Diagnostics;
use crate::error::{Error, Result};
use crate::media::{BookImages, prepare_images};

use index::{FootnoteRefs, IdIndex, ReverseLinkIndex};

/// Cooperative cancellation token, checked between pipeline passes.
#[derive(Debug, Clone, Default)]
pub struct Cancel {
    flag: Arc<AtomicBool>,
}

impl Cancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Everything the pipeline hands back besides the mutated book.
#[derive(Debug, Clone)]
pub struct NormalizedBook {
    pub footnotes: FootnoteRefs,
    pub ids: IdIndex,
    pub links: ReverseLinkIndex,
    /// Prepared images, already filtered to what the output needs.
    pub images: BookImages,
    /// Stylesheet resources resolved to binaries and filenames.
    pub resources: Vec<StylesheetResource>,
    pub diagnostics: Diagnostics,
}

/// Run the full normalization pipeline over a parsed book.
pub fn normalize_book(
    book: &mut Book,
    config: &NormalizeConfig,
    cancel: &Cancel,
) -> Result<NormalizedBook> {
    let mut diag = Diagnostics::new();

    ensure_live(cancel)?;
    classify_bodies(book, config);
    normalize_footnotes(book, &mut diag);

    ensure_live(cancel)?;
    let (mut id_index, _) = index::build_indexes(book);
    let mut notes = index::build_footnote_refs(book);
    normalize_links(book, config, &mut id_index, &mut diag);

    ensure_live(cancel)?;
    assign_section_ids(book, &mut id_index);
    label_footnotes(book, config, &mut notes, &mut diag);

    ensure_live(cancel)?;
    let mut images = prepare_images(book, config, &mut diag);

    ensure_live(cancel)?;
    let resources = normalize_stylesheets(book, config, &mut diag);

    ensure_live(cancel)?;
    let link_index = index::build_reverse_links(book);
    filter_images(&mut images, book, &link_index);

    Ok(NormalizedBook {
        footnotes: notes,
        ids: id_index,
        links: link_index,
        images,
        resources,
        diagnostics: diag,
    })
}

fn ensure_live(cancel: &Cancel) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

/// Stamp every body with its role for this run.
fn classify_bodies(book: &mut Book, config: &NormalizeConfig) {
    for body in &mut book.bodies {
        body.kind = classify_body(body, config);
    }
}

fn classify_body(body: &Body, config: &NormalizeConfig) -> BodyKind {
    if config.is_footnote_body(&body.name) {
        BodyKind::Footnotes
    } else if body.name.is_empty() {
        BodyKind::Main
    } else {
        BodyKind::Other
    }
}
