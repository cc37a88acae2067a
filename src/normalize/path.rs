//! Typed reference paths into the book tree.
//!
//! Indexes never hold pointers into the book; they hold a [`RefPath`]: an
//! ordered list of typed owner steps from the root. A path stays valid as
//! long as no pass inserts or removes *siblings* along it — the link
//! normalizer only ever replaces leaves in place, so every recorded path in
//! a freshly built index survives the whole rewrite phase.
//!
//! [`resolve_mut`] walks a path down a mutable book and hands back the leaf
//! slot. Steps that cannot apply to the current node (a stale or foreign
//! path) resolve to `None`; callers treat that as an inconsistency warning,
//! never a panic.

use std::fmt;

use crate::book::{
    BlockImage, Body, Book, Cite, Epigraph, FlowItem, Paragraph, Poem, Section, Span, Stanza,
    Table, TableCell, TableRow, Title, TitleItem,
};

/// One typed step from an owner to one of its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// `book.bodies[i]`
    Body(usize),
    /// `book.binaries[i]`
    Binary(usize),
    /// `book.description.coverpage[i]`
    Coverpage(usize),
    /// `book.description.authors[i]` (description context only)
    DescAuthor(usize),
    /// `book.description.translators[i]`
    DescTranslator(usize),
    /// `body.sections[i]`
    ChildSection(usize),
    /// `title.items[i]` of the current titled node
    TitleItem(usize),
    /// The block-image slot of the current body or section
    Image,
    /// `epigraphs[i]` of the current body, section, or poem
    Epigraph(usize),
    /// Flow list entry `i` of the current node (section content, epigraph
    /// items, cite items)
    Item(usize),
    /// `annotation[i]` of the current section or the description
    Annotation(usize),
    /// Text-author paragraph `i` of the current epigraph, poem, or cite
    Author(usize),
    /// `poem.stanzas[i]`
    Stanza(usize),
    /// `stanza.lines[i]`
    StanzaLine(usize),
    /// The subtitle paragraph of the current stanza
    StanzaSubtitle,
    /// `table.rows[i]`
    Row(usize),
    /// `row.cells[i]`
    Cell(usize),
    /// `spans[i]` of the current paragraph, cell, or container span
    Span(usize),
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Body(i) => write!(f, "body[{i}]"),
            Step::Binary(i) => write!(f, "binary[{i}]"),
            Step::Coverpage(i) => write!(f, "coverpage[{i}]"),
            Step::DescAuthor(i) => write!(f, "author[{i}]"),
            Step::DescTranslator(i) => write!(f, "translator[{i}]"),
            Step::ChildSection(i) => write!(f, "section[{i}]"),
            Step::TitleItem(i) => write!(f, "title[{i}]"),
            Step::Image => write!(f, "image"),
            Step::Epigraph(i) => write!(f, "epigraph[{i}]"),
            Step::Item(i) => write!(f, "item[{i}]"),
            Step::Annotation(i) => write!(f, "annotation[{i}]"),
            Step::Author(i) => write!(f, "text-author[{i}]"),
            Step::Stanza(i) => write!(f, "stanza[{i}]"),
            Step::StanzaLine(i) => write!(f, "line[{i}]"),
            Step::StanzaSubtitle => write!(f, "subtitle"),
            Step::Row(i) => write!(f, "row[{i}]"),
            Step::Cell(i) => write!(f, "cell[{i}]"),
            Step::Span(i) => write!(f, "span[{i}]"),
        }
    }
}

/// An ordered list of steps from the book root to an element.
pub type RefPath = Vec<Step>;

/// Render a path as `body[0]/section[2]/item[1]/span[0]` for diagnostics.
pub fn path_string(path: &RefPath) -> String {
    let parts: Vec<String> = path.iter().map(Step::to_string).collect();
    parts.join("/")
}

/// A mutable handle to a node reached by a path.
pub enum Node<'a> {
    Book(&'a mut Book),
    Body(&'a mut Body),
    Section(&'a mut Section),
    Item(&'a mut FlowItem),
    Epigraph(&'a mut Epigraph),
    Paragraph(&'a mut Paragraph),
    Poem(&'a mut Poem),
    Stanza(&'a mut Stanza),
    Cite(&'a mut Cite),
    Table(&'a mut Table),
    Row(&'a mut TableRow),
    Cell(&'a mut TableCell),
    Title(&'a mut Title),
    /// A span slot; replacing `*slot` swaps the whole segment.
    Span(&'a mut Span),
    BlockImage(&'a mut BlockImage),
}

/// Resolve a path against the book, returning the leaf node.
pub fn resolve_mut<'a>(book: &'a mut Book, path: &RefPath) -> Option<Node<'a>> {
    let mut node = Node::Book(book);
    for step in path {
        node = descend(node, *step)?;
    }
    Some(focus(node))
}

/// Apply one step to a node. Flow items transparently focus on their inner
/// value, so a path can step from `Item(i)` straight into the section or
/// paragraph it holds.
fn descend(node: Node<'_>, step: Step) -> Option<Node<'_>> {
    let node = focus(node);
    match (node, step) {
        (Node::Book(book), Step::Body(i)) => book.bodies.get_mut(i).map(Node::Body),
        (Node::Book(book), Step::Coverpage(i)) => {
            book.description.coverpage.get_mut(i).map(Node::BlockImage)
        }
        (Node::Book(book), Step::Annotation(i)) => {
            book.description.annotation.get_mut(i).map(Node::Item)
        }
        // Binaries, description authors and translators are indexed for id
        // lookups but are never rewritten through paths.
        (Node::Book(_), Step::Binary(_) | Step::DescAuthor(_) | Step::DescTranslator(_)) => None,

        (Node::Body(body), Step::ChildSection(i)) => body.sections.get_mut(i).map(Node::Section),
        (Node::Body(body), Step::TitleItem(i)) => title_item(body.title.as_mut()?, i),
        (Node::Body(body), Step::Image) => body.image.as_mut().map(Node::BlockImage),
        (Node::Body(body), Step::Epigraph(i)) => body.epigraphs.get_mut(i).map(Node::Epigraph),

        (Node::Section(section), Step::TitleItem(i)) => title_item(section.title.as_mut()?, i),
        (Node::Section(section), Step::Image) => section.image.as_mut().map(Node::BlockImage),
        (Node::Section(section), Step::Epigraph(i)) => {
            section.epigraphs.get_mut(i).map(Node::Epigraph)
        }
        (Node::Section(section), Step::Annotation(i)) => {
            section.annotation.get_mut(i).map(Node::Item)
        }
        (Node::Section(section), Step::Item(i)) => section.content.get_mut(i).map(Node::Item),

        (Node::Epigraph(epigraph), Step::Item(i)) => epigraph.items.get_mut(i).map(Node::Item),
        (Node::Epigraph(epigraph), Step::Author(i)) => {
            epigraph.authors.get_mut(i).map(Node::Paragraph)
        }

        (Node::Poem(poem), Step::TitleItem(i)) => title_item(poem.title.as_mut()?, i),
        (Node::Poem(poem), Step::Epigraph(i)) => poem.epigraphs.get_mut(i).map(Node::Epigraph),
        (Node::Poem(poem), Step::Stanza(i)) => poem.stanzas.get_mut(i).map(Node::Stanza),
        (Node::Poem(poem), Step::Author(i)) => poem.authors.get_mut(i).map(Node::Paragraph),

        (Node::Stanza(stanza), Step::TitleItem(i)) => title_item(stanza.title.as_mut()?, i),
        (Node::Stanza(stanza), Step::StanzaSubtitle) => {
            stanza.subtitle.as_mut().map(Node::Paragraph)
        }
        (Node::Stanza(stanza), Step::StanzaLine(i)) => stanza.lines.get_mut(i).map(Node::Paragraph),

        (Node::Cite(cite), Step::Item(i)) => cite.items.get_mut(i).map(Node::Item),
        (Node::Cite(cite), Step::Author(i)) => cite.authors.get_mut(i).map(Node::Paragraph),

        (Node::Table(table), Step::Row(i)) => table.rows.get_mut(i).map(Node::Row),
        (Node::Row(row), Step::Cell(i)) => row.cells.get_mut(i).map(Node::Cell),
        (Node::Cell(cell), Step::Span(i)) => cell.spans.get_mut(i).map(Node::Span),

        (Node::Paragraph(paragraph), Step::Span(i)) => {
            paragraph.spans.get_mut(i).map(Node::Span)
        }
        (Node::Span(span), Step::Span(i)) => span.children_mut()?.get_mut(i).map(Node::Span),

        _ => None,
    }
}

/// Unwrap a flow item into its typed inner node.
fn focus(node: Node<'_>) -> Node<'_> {
    match node {
        Node::Item(item) => match item {
            FlowItem::Paragraph(paragraph) | FlowItem::Subtitle(paragraph) => {
                Node::Paragraph(paragraph)
            }
            FlowItem::Image(image) => Node::BlockImage(image),
            FlowItem::Poem(poem) => Node::Poem(poem),
            FlowItem::Cite(cite) => Node::Cite(cite),
            FlowItem::Table(table) => Node::Table(table),
            FlowItem::Section(section) => Node::Section(section),
            FlowItem::EmptyLine => Node::Item(item),
        },
        other => other,
    }
}

fn title_item(title: &mut Title, i: usize) -> Option<Node<'_>> {
    match title.items.get_mut(i)? {
        TitleItem::Paragraph(paragraph) => Some(Node::Paragraph(paragraph)),
        TitleItem::EmptyLine => None,
    }
}
