//! Index building: footnote refs, element ids, and reverse links.
//!
//! Three derived indexes are built in a single walk over the book:
//!
//! - [`FootnoteRefs`]: footnote id → position of its note section.
//! - [`IdIndex`]: element id → type tag + [`RefPath`] from the root.
//! - [`ReverseLinkIndex`]: link target → every reference that points at it.
//!
//! Indexes are weak back-references: they own nothing and must be rebuilt
//! after any pass that reshapes the tree. The builder itself never mutates
//! the book.

use std::collections::{BTreeMap, HashMap};

use percent_encoding::percent_decode_str;

use crate::book::{
    Body, BodyKind, Book, Cite, Epigraph, FlowItem, Paragraph, Poem, Section, Span, Stanza, Table,
    Title, TitleItem,
};

use super::path::{RefPath, Step};

/// Synthetic reverse-index key for links with an empty href.
pub const EMPTY_HREF_KEY: &str = "links/empty_href";

/// External URL schemes that make a link valid without a target id.
const EXTERNAL_SCHEMES: [&str; 5] = ["http", "https", "ftp", "ftps", "mailto"];

// ---------------------------------------------------------------------------
// Href classification
// ---------------------------------------------------------------------------

/// How a raw href is interpreted by the index builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HrefClass {
    /// `#target` — the percent-decoded target id.
    Internal(String),
    /// The empty string.
    Empty,
    /// A recognized external scheme (http, https, ftp, ftps, mailto).
    External,
    /// Anything else; recorded under the literal href.
    Broken,
}

/// Classify a raw href the way the reverse index keys it.
pub fn classify_href(href: &str) -> HrefClass {
    if href.is_empty() {
        return HrefClass::Empty;
    }
    if let Some(target) = href.strip_prefix('#') {
        let decoded = percent_decode_str(target).decode_utf8_lossy();
        return HrefClass::Internal(decoded.into_owned());
    }
    if let Some((scheme, rest)) = href.split_once(':')
        && !rest.is_empty()
        && EXTERNAL_SCHEMES
            .iter()
            .any(|s| scheme.eq_ignore_ascii_case(s))
    {
        return HrefClass::External;
    }
    HrefClass::Broken
}

// ---------------------------------------------------------------------------
// Footnote refs
// ---------------------------------------------------------------------------

/// Display label of a note, computed by the footnote labeler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteLabel {
    /// 1-based footnote-body number, or 0 when the book has a single
    /// footnote body.
    pub body_num: usize,
    /// 1-based note number within its body.
    pub note_num: usize,
    /// Expanded label text shown at the note and at every call-site.
    pub text: String,
}

/// Where a footnote section lives, plus its label once assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteRef {
    /// Index into `book.bodies`.
    pub body: usize,
    /// Index into that body's top-level sections.
    pub section: usize,
    pub label: Option<NoteLabel>,
    /// Call-sites rewritten so far, counted in source order. Occurrence
    /// numbers for `ref-<id>-<n>` back-links derive from this.
    pub call_sites: usize,
}

/// Footnote id → note position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FootnoteRefs {
    map: HashMap<String, NoteRef>,
}

impl FootnoteRefs {
    pub fn get(&self, id: &str) -> Option<&NoteRef> {
        self.map.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut NoteRef> {
        self.map.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.map.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &NoteRef)> {
        self.map.iter()
    }
}

/// The stable back-link id for one call-site occurrence of a note.
///
/// Occurrences are 1-based and numbered in source order.
pub fn backlink_ref(target_id: &str, occurrence: usize) -> String {
    format!("ref-{target_id}-{occurrence}")
}

/// Record the position of every top-level footnote section.
///
/// Duplicate ids keep the first occurrence; empty ids are skipped.
pub fn build_footnote_refs(book: &Book) -> FootnoteRefs {
    let mut refs = FootnoteRefs::default();
    for (body_index, body) in book.bodies.iter().enumerate() {
        if body.kind != BodyKind::Footnotes {
            continue;
        }
        for (section_index, section) in body.sections.iter().enumerate() {
            let Some(id) = section.id.as_deref() else {
                continue;
            };
            if id.is_empty() || refs.map.contains_key(id) {
                continue;
            }
            refs.map.insert(
                id.to_string(),
                NoteRef {
                    body: body_index,
                    section: section_index,
                    label: None,
                    call_sites: 0,
                },
            );
        }
    }
    refs
}

// ---------------------------------------------------------------------------
// Id index
// ---------------------------------------------------------------------------

/// One id-bearing element: its type tag and path from the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdEntry {
    /// `"section"`, `"section-generated"`, `"paragraph"`, `"image"`,
    /// `"binary"`, `"table-cell"`, ...
    pub kind: &'static str,
    pub path: RefPath,
}

/// Element id → typed reference path. First occurrence wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdIndex {
    map: HashMap<String, IdEntry>,
}

impl IdIndex {
    pub fn contains(&self, id: &str) -> bool {
        self.map.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&IdEntry> {
        self.map.get(id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Register an id minted by a normalization pass (generated section,
    /// vignette or placeholder binary, stylesheet resource).
    pub fn insert(&mut self, id: impl Into<String>, kind: &'static str, path: RefPath) {
        self.map.entry(id.into()).or_insert(IdEntry { kind, path });
    }

    fn record(&mut self, id: Option<&str>, kind: &'static str, path: &RefPath) {
        if let Some(id) = id
            && !id.is_empty()
        {
            self.insert(id.to_string(), kind, path.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Reverse link index
// ---------------------------------------------------------------------------

/// What kind of reference points at a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// An `<a>`-style inline link segment.
    InlineLink,
    /// An inline image segment.
    InlineImage,
    /// A block-position image.
    BlockImage,
    /// A coverpage entry.
    Coverpage,
    /// Href was the empty string.
    EmptyHref,
    /// Href had a recognized external scheme.
    External,
    /// Href was neither internal nor a recognized external URL.
    Broken,
}

impl LinkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkKind::InlineLink => "inline-link",
            LinkKind::InlineImage => "inline-image",
            LinkKind::BlockImage => "block-image",
            LinkKind::Coverpage => "coverpage",
            LinkKind::EmptyHref => "empty-href-link",
            LinkKind::External => "external-link",
            LinkKind::Broken => "broken-link",
        }
    }

    /// Whether this reference renders as an image.
    pub fn is_image(self) -> bool {
        matches!(
            self,
            LinkKind::InlineImage | LinkKind::BlockImage | LinkKind::Coverpage
        )
    }
}

/// One reference to a target: its kind and the path to the referring
/// element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRef {
    pub kind: LinkKind,
    pub path: RefPath,
}

/// Link target → references in source order. Keys iterate in lexical
/// order, so diagnostics are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReverseLinkIndex {
    map: BTreeMap<String, Vec<LinkRef>>,
}

impl ReverseLinkIndex {
    pub fn get(&self, target: &str) -> Option<&[LinkRef]> {
        self.map.get(target).map(Vec::as_slice)
    }

    pub fn contains(&self, target: &str) -> bool {
        self.map.contains_key(target)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<LinkRef>)> {
        self.map.iter()
    }

    fn record(&mut self, href: &str, kind: LinkKind, path: &RefPath) {
        let (key, kind) = match classify_href(href) {
            HrefClass::Internal(target) => (target, kind),
            HrefClass::Empty => (EMPTY_HREF_KEY.to_string(), LinkKind::EmptyHref),
            HrefClass::External => (href.to_string(), LinkKind::External),
            HrefClass::Broken => (href.to_string(), LinkKind::Broken),
        };
        self.map.entry(key).or_default().push(LinkRef {
            kind,
            path: path.clone(),
        });
    }
}

// ---------------------------------------------------------------------------
// The walk
// ---------------------------------------------------------------------------

/// Build the id index and the reverse link index in one walk.
pub fn build_indexes(book: &Book) -> (IdIndex, ReverseLinkIndex) {
    let mut walker = Walker {
        ids: IdIndex::default(),
        links: ReverseLinkIndex::default(),
        path: Vec::new(),
    };
    walker.book(book);
    (walker.ids, walker.links)
}

/// Rebuild just the reverse link index from the (possibly mutated) tree.
pub fn build_reverse_links(book: &Book) -> ReverseLinkIndex {
    build_indexes(book).1
}

struct Walker {
    ids: IdIndex,
    links: ReverseLinkIndex,
    path: RefPath,
}

impl Walker {
    fn with(&mut self, step: Step, f: impl FnOnce(&mut Self)) {
        self.path.push(step);
        f(self);
        self.path.pop();
    }

    fn book(&mut self, book: &Book) {
        for (i, binary) in book.binaries.iter().enumerate() {
            self.with(Step::Binary(i), |w| {
                w.ids.record(Some(&binary.id), "binary", &w.path);
            });
        }
        for (i, person) in book.description.authors.iter().enumerate() {
            self.with(Step::DescAuthor(i), |w| {
                w.ids.record(person.id.as_deref(), "author", &w.path);
            });
        }
        for (i, person) in book.description.translators.iter().enumerate() {
            self.with(Step::DescTranslator(i), |w| {
                w.ids.record(person.id.as_deref(), "author", &w.path);
            });
        }
        for (i, image) in book.description.coverpage.iter().enumerate() {
            self.with(Step::Coverpage(i), |w| {
                w.ids.record(image.id.as_deref(), "image", &w.path);
                w.links.record(&image.href, LinkKind::Coverpage, &w.path);
            });
        }
        for (i, item) in book.description.annotation.iter().enumerate() {
            self.with(Step::Annotation(i), |w| w.flow_item(item));
        }
        for (i, body) in book.bodies.iter().enumerate() {
            self.with(Step::Body(i), |w| w.body(body));
        }
    }

    fn body(&mut self, body: &Body) {
        if let Some(title) = &body.title {
            self.title(title);
        }
        if let Some(image) = &body.image {
            self.with(Step::Image, |w| {
                w.ids.record(image.id.as_deref(), "image", &w.path);
                w.links.record(&image.href, LinkKind::BlockImage, &w.path);
            });
        }
        for (i, epigraph) in body.epigraphs.iter().enumerate() {
            self.with(Step::Epigraph(i), |w| w.epigraph(epigraph));
        }
        for (i, section) in body.sections.iter().enumerate() {
            self.with(Step::ChildSection(i), |w| w.section(section));
        }
    }

    fn section(&mut self, section: &Section) {
        self.ids.record(section.id.as_deref(), "section", &self.path);
        if let Some(title) = &section.title {
            self.title(title);
        }
        if let Some(image) = &section.image {
            self.with(Step::Image, |w| {
                w.ids.record(image.id.as_deref(), "image", &w.path);
                w.links.record(&image.href, LinkKind::BlockImage, &w.path);
            });
        }
        for (i, epigraph) in section.epigraphs.iter().enumerate() {
            self.with(Step::Epigraph(i), |w| w.epigraph(epigraph));
        }
        for (i, item) in section.annotation.iter().enumerate() {
            self.with(Step::Annotation(i), |w| w.flow_item(item));
        }
        for (i, item) in section.content.iter().enumerate() {
            self.with(Step::Item(i), |w| w.flow_item(item));
        }
    }

    fn title(&mut self, title: &Title) {
        for (i, item) in title.items.iter().enumerate() {
            if let TitleItem::Paragraph(paragraph) = item {
                self.with(Step::TitleItem(i), |w| w.paragraph(paragraph, "paragraph"));
            }
        }
    }

    fn epigraph(&mut self, epigraph: &Epigraph) {
        self.ids
            .record(epigraph.id.as_deref(), "epigraph", &self.path);
        for (i, item) in epigraph.items.iter().enumerate() {
            self.with(Step::Item(i), |w| w.flow_item(item));
        }
        for (i, author) in epigraph.authors.iter().enumerate() {
            self.with(Step::Author(i), |w| w.paragraph(author, "paragraph"));
        }
    }

    fn flow_item(&mut self, item: &FlowItem) {
        match item {
            FlowItem::Paragraph(paragraph) => self.paragraph(paragraph, "paragraph"),
            FlowItem::Subtitle(paragraph) => self.paragraph(paragraph, "subtitle"),
            FlowItem::Image(image) => {
                self.ids.record(image.id.as_deref(), "image", &self.path);
                self.links
                    .record(&image.href, LinkKind::BlockImage, &self.path);
            }
            FlowItem::Poem(poem) => self.poem(poem),
            FlowItem::Cite(cite) => self.cite(cite),
            FlowItem::Table(table) => self.table(table),
            FlowItem::EmptyLine => {}
            FlowItem::Section(section) => self.section(section),
        }
    }

    fn paragraph(&mut self, paragraph: &Paragraph, kind: &'static str) {
        self.ids.record(paragraph.id.as_deref(), kind, &self.path);
        self.spans(&paragraph.spans);
    }

    fn spans(&mut self, spans: &[Span]) {
        for (i, span) in spans.iter().enumerate() {
            self.with(Step::Span(i), |w| match span {
                Span::Link { href, spans, .. } => {
                    w.links.record(href, LinkKind::InlineLink, &w.path);
                    w.spans(spans);
                }
                Span::Image(image) => {
                    w.ids.record(image.id.as_deref(), "image", &w.path);
                    w.links.record(&image.href, LinkKind::InlineImage, &w.path);
                }
                Span::Text(_) => {}
                other => {
                    if let Some(children) = other.children() {
                        w.spans(children);
                    }
                }
            });
        }
    }

    fn poem(&mut self, poem: &Poem) {
        self.ids.record(poem.id.as_deref(), "poem", &self.path);
        if let Some(title) = &poem.title {
            self.title(title);
        }
        for (i, epigraph) in poem.epigraphs.iter().enumerate() {
            self.with(Step::Epigraph(i), |w| w.epigraph(epigraph));
        }
        for (i, stanza) in poem.stanzas.iter().enumerate() {
            self.with(Step::Stanza(i), |w| w.stanza(stanza));
        }
        for (i, author) in poem.authors.iter().enumerate() {
            self.with(Step::Author(i), |w| w.paragraph(author, "paragraph"));
        }
    }

    fn stanza(&mut self, stanza: &Stanza) {
        if let Some(title) = &stanza.title {
            self.title(title);
        }
        if let Some(subtitle) = &stanza.subtitle {
            self.with(Step::StanzaSubtitle, |w| {
                w.paragraph(subtitle, "paragraph");
            });
        }
        for (i, line) in stanza.lines.iter().enumerate() {
            self.with(Step::StanzaLine(i), |w| w.paragraph(line, "paragraph"));
        }
    }

    fn cite(&mut self, cite: &Cite) {
        self.ids.record(cite.id.as_deref(), "cite", &self.path);
        for (i, item) in cite.items.iter().enumerate() {
            self.with(Step::Item(i), |w| w.flow_item(item));
        }
        for (i, author) in cite.authors.iter().enumerate() {
            self.with(Step::Author(i), |w| w.paragraph(author, "paragraph"));
        }
    }

    fn table(&mut self, table: &Table) {
        self.ids.record(table.id.as_deref(), "table", &self.path);
        for (r, row) in table.rows.iter().enumerate() {
            self.with(Step::Row(r), |w| {
                for (c, cell) in row.cells.iter().enumerate() {
                    w.with(Step::Cell(c), |w| {
                        w.ids.record(cell.id.as_deref(), "table-cell", &w.path);
                        w.spans(&cell.spans);
                    });
                }
            });
        }
    }
}
