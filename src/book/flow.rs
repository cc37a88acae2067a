//! Block-level and inline content types.
//!
//! All recursion in the book model flows through two closed sum types:
//! [`FlowItem`] for block content and [`Span`] for inline content. Every
//! pass matches these exhaustively, so adding a variant is a compile-time
//! event across the whole pipeline.

use super::Section;

/// A title: a sequence of paragraphs and empty lines.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Title {
    pub items: Vec<TitleItem>,
}

impl Title {
    /// A title holding a single plain-text paragraph.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            items: vec![TitleItem::Paragraph(Paragraph::from_text(text))],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleItem {
    Paragraph(Paragraph),
    EmptyLine,
}

/// An epigraph: flow items followed by text-author paragraphs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Epigraph {
    pub id: Option<String>,
    pub items: Vec<FlowItem>,
    pub authors: Vec<Paragraph>,
}

/// Block-level content inside a section, annotation, epigraph, or cite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowItem {
    Paragraph(Paragraph),
    /// A subtitle; structurally a paragraph.
    Subtitle(Paragraph),
    Image(BlockImage),
    Poem(Poem),
    Cite(Cite),
    Table(Table),
    EmptyLine,
    /// A nested section. Only valid inside section content; the footnote
    /// normalizer removes these from footnote bodies.
    Section(Section),
}

/// A `<p>`-like run of inline content.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Paragraph {
    pub id: Option<String>,
    /// The `style` attribute, passed through to the renderer.
    pub style: Option<String>,
    /// Title-ish paragraph (came from a title or subtitle position).
    pub special: bool,
    pub spans: Vec<Span>,
}

impl Paragraph {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            spans: vec![Span::Text(text.into())],
            ..Default::default()
        }
    }
}

/// Inline content. Non-leaf variants carry child spans and recurse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Span {
    Text(String),
    Strong(Vec<Span>),
    Emphasis(Vec<Span>),
    Strikethrough(Vec<Span>),
    Sub(Vec<Span>),
    Sup(Vec<Span>),
    Code(Vec<Span>),
    /// A named style run (`<style name="...">`).
    Style { name: String, spans: Vec<Span> },
    /// A link. `kind` is the FB2 `type` attribute (e.g. "note").
    Link {
        href: String,
        kind: Option<String>,
        spans: Vec<Span>,
    },
    Image(InlineImage),
}

impl Span {
    /// Child spans of a container variant; `None` for leaves.
    pub fn children(&self) -> Option<&[Span]> {
        match self {
            Span::Strong(spans)
            | Span::Emphasis(spans)
            | Span::Strikethrough(spans)
            | Span::Sub(spans)
            | Span::Sup(spans)
            | Span::Code(spans)
            | Span::Style { spans, .. }
            | Span::Link { spans, .. } => Some(spans),
            Span::Text(_) | Span::Image(_) => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Span>> {
        match self {
            Span::Strong(spans)
            | Span::Emphasis(spans)
            | Span::Strikethrough(spans)
            | Span::Sub(spans)
            | Span::Sup(spans)
            | Span::Code(spans)
            | Span::Style { spans, .. }
            | Span::Link { spans, .. } => Some(spans),
            Span::Text(_) | Span::Image(_) => None,
        }
    }
}

/// A block-position image (`<image>` as a flow item, body/section image, or
/// coverpage entry).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockImage {
    pub id: Option<String>,
    pub href: String,
    pub alt: Option<String>,
    pub title: Option<String>,
}

/// An image inside a paragraph.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InlineImage {
    pub id: Option<String>,
    pub href: String,
    pub alt: Option<String>,
}

/// A `<poem>`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Poem {
    pub id: Option<String>,
    pub title: Option<Title>,
    pub epigraphs: Vec<Epigraph>,
    pub stanzas: Vec<Stanza>,
    pub authors: Vec<Paragraph>,
    pub date: Option<String>,
}

/// A `<stanza>`: verse lines with optional title and subtitle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Stanza {
    pub title: Option<Title>,
    pub subtitle: Option<Paragraph>,
    pub lines: Vec<Paragraph>,
}

/// A `<cite>`: flow items followed by text-author paragraphs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cite {
    pub id: Option<String>,
    pub items: Vec<FlowItem>,
    pub authors: Vec<Paragraph>,
}

/// A `<table>`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    pub id: Option<String>,
    pub style: Option<String>,
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableRow {
    pub align: Option<String>,
    pub cells: Vec<TableCell>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableCell {
    pub id: Option<String>,
    /// True for `<th>`.
    pub header: bool,
    pub align: Option<String>,
    pub colspan: Option<u32>,
    pub rowspan: Option<u32>,
    pub spans: Vec<Span>,
}
