//! The in-memory book model.
//!
//! A [`Book`] is the single value the normalization pipeline reads and
//! mutates: an ordered list of stylesheets, a metadata description, the
//! bodies with their section trees, and the embedded binary objects. All
//! recursive content lives in the closed sum types of [`flow`]; there is no
//! dynamic dispatch anywhere in the model.
//!
//! Cross-references between elements are plain id strings (`href="#id"`).
//! The model itself never owns an index; indexes are derived separately and
//! rebuilt whenever a pass reshapes the tree.

mod flow;
pub mod walk;

pub use flow::{
    BlockImage, Cite, Epigraph, FlowItem, InlineImage, Paragraph, Poem, Span, Stanza, Table,
    TableCell, TableRow, Title, TitleItem,
};

use std::collections::BTreeMap;

use crate::config::VignettePos;

/// A complete FictionBook document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Book {
    /// Stylesheets in document order. The default stylesheet, when
    /// configured, is prepended by the stylesheet normalizer.
    pub stylesheets: Vec<Stylesheet>,
    pub description: Description,
    pub bodies: Vec<Body>,
    /// Embedded binary objects in document order. Normalization appends
    /// minted binaries (vignettes, placeholder, stylesheet resources).
    pub binaries: Vec<Binary>,
    /// Vignette position to minted binary id.
    pub vignettes: BTreeMap<VignettePos, String>,
    /// Id of the placeholder image minted by the link normalizer.
    pub placeholder_id: Option<String>,
    /// Section depth (2..=6) to "page break before section title", mined
    /// from CSS. Depths never mentioned in CSS are absent.
    pub section_breaks: BTreeMap<u8, bool>,
    /// Whether a body title wants a page break before it, mined from CSS.
    pub body_title_break: bool,
}

impl Book {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a binary by id.
    pub fn binary(&self, id: &str) -> Option<&Binary> {
        self.binaries.iter().find(|b| b.id == id)
    }

    /// Whether a section title at `depth` needs a page break before it.
    ///
    /// Depth is clamped to 1..=6; depth 1 never breaks (the body title
    /// break is a separate flag).
    pub fn section_needs_break(&self, depth: usize) -> bool {
        let depth = depth.clamp(1, 6);
        if depth == 1 {
            return false;
        }
        self.section_breaks
            .get(&(depth as u8))
            .copied()
            .unwrap_or(false)
    }

    /// The cover image id: target of the first coverpage entry, if it is an
    /// internal reference.
    pub fn cover_id(&self) -> Option<&str> {
        self.description
            .coverpage
            .first()
            .and_then(|image| image.href.strip_prefix('#'))
    }
}

/// A stylesheet embedded in the document (or prepended by configuration).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stylesheet {
    /// The `type` attribute; only `text/css` sheets are processed.
    pub content_type: String,
    pub data: String,
    /// True for the caller-supplied default stylesheet. Its resources
    /// resolve against the current working directory instead of the source
    /// file's directory.
    pub default: bool,
}

impl Stylesheet {
    pub fn css(data: impl Into<String>) -> Self {
        Self {
            content_type: "text/css".to_string(),
            data: data.into(),
            default: false,
        }
    }

    pub fn is_css(&self) -> bool {
        self.content_type.eq_ignore_ascii_case("text/css")
    }
}

/// Book metadata. Opaque to normalization except for the language, the
/// coverpage list, and the document id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Description {
    pub book_title: String,
    pub lang: String,
    pub src_lang: Option<String>,
    pub genres: Vec<String>,
    pub authors: Vec<Person>,
    pub translators: Vec<Person>,
    pub keywords: Option<String>,
    pub date: Option<String>,
    pub sequence: Option<Sequence>,
    /// Annotation flow; never contains nested sections.
    pub annotation: Vec<FlowItem>,
    /// Coverpage image references in document order. The first entry's
    /// target is the cover.
    pub coverpage: Vec<BlockImage>,
    /// The document-info id element.
    pub doc_id: String,
    pub program_used: Option<String>,
    pub version: Option<String>,
    /// Publish-info children kept as opaque (element, text) pairs.
    pub publish_info: Vec<(String, String)>,
    pub custom_info: Vec<CustomInfo>,
}

/// An author or translator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Person {
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub nickname: String,
    /// The FB2 `<id>` child element, when present.
    pub id: Option<String>,
}

impl Person {
    /// Display form: "First Middle Last", falling back to the nickname.
    pub fn display(&self) -> String {
        let mut parts = Vec::new();
        for part in [&self.first_name, &self.middle_name, &self.last_name] {
            if !part.is_empty() {
                parts.push(part.as_str());
            }
        }
        if parts.is_empty() {
            return self.nickname.clone();
        }
        parts.join(" ")
    }
}

/// A series the book belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sequence {
    pub name: String,
    pub number: Option<u32>,
}

/// A `<custom-info>` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomInfo {
    pub info_type: String,
    pub text: String,
}

/// How a body participates in normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyKind {
    /// Regular reading content.
    #[default]
    Main,
    /// Top-level sections are addressable footnotes.
    Footnotes,
    /// A named body that is neither main content nor footnotes.
    Other,
}

/// A `<body>` element.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Body {
    /// The `name` attribute; classification into [`BodyKind`] happens in
    /// the pipeline against the configured footnote-name list.
    pub name: String,
    pub kind: BodyKind,
    pub title: Option<Title>,
    pub image: Option<BlockImage>,
    pub epigraphs: Vec<Epigraph>,
    pub sections: Vec<Section>,
}

/// A `<section>` element. Sections nest through [`FlowItem::Section`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Section {
    pub id: Option<String>,
    pub title: Option<Title>,
    pub image: Option<BlockImage>,
    pub epigraphs: Vec<Epigraph>,
    /// Annotation flow; never contains nested sections.
    pub annotation: Vec<FlowItem>,
    pub content: Vec<FlowItem>,
}

impl Section {
    /// Whether the section carries a usable (non-empty) id.
    pub fn has_id(&self) -> bool {
        self.id.as_deref().is_some_and(|id| !id.is_empty())
    }
}

/// An embedded `<binary>` object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binary {
    pub id: String,
    pub content_type: String,
    pub data: Vec<u8>,
    /// True for vignette blobs the caller marked as built-in; they get the
    /// Kindle stroke-width treatment when rasterized.
    pub builtin_vignette: bool,
}

impl Binary {
    pub fn new(id: impl Into<String>, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            content_type: content_type.into(),
            data,
            builtin_vignette: false,
        }
    }

    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }

    pub fn is_svg(&self) -> bool {
        self.content_type == "image/svg+xml" || self.content_type.ends_with("svg+xml")
    }
}
