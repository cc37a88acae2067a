//! Traversal primitives and text extraction.
//!
//! Every walker here (and in the index builder) visits children in declared
//! source order: title → image → epigraphs → annotation → content for
//! sections, spans in source order for paragraphs, rows then cells for
//! tables, title → epigraphs → stanzas → text-authors for poems, items →
//! text-authors for cites and epigraphs. Downstream passes rely on this
//! order for deterministic output and diagnostics.

use super::{
    Body, Book, Cite, Epigraph, FlowItem, Paragraph, Poem, Section, Span, Stanza, Table, Title,
    TitleItem,
};

/// Concatenate the text of `spans`, recursing into containers.
///
/// With `skip_links` set, link segments contribute nothing (links have
/// their own label contract); this is the "plain text" form used for TOC
/// entries and note titles. Link text extraction itself passes `false`.
pub fn span_text(spans: &[Span], skip_links: bool) -> String {
    let mut out = String::new();
    collect_span_text(spans, skip_links, &mut out);
    out
}

fn collect_span_text(spans: &[Span], skip_links: bool, out: &mut String) {
    for span in spans {
        match span {
            Span::Text(text) => out.push_str(text),
            Span::Link { spans, .. } => {
                if !skip_links {
                    collect_span_text(spans, skip_links, out);
                }
            }
            Span::Image(_) => {}
            _ => {
                if let Some(children) = span.children() {
                    collect_span_text(children, skip_links, out);
                }
            }
        }
    }
}

impl Paragraph {
    /// Plain text of the paragraph, skipping link segments.
    pub fn plain_text(&self) -> String {
        span_text(&self.spans, true)
    }

    /// Space-joined `alt` attributes of contained inline images.
    pub fn image_alt(&self) -> String {
        let mut alts: Vec<&str> = Vec::new();
        collect_image_alt(&self.spans, &mut alts);
        alts.join(" ")
    }
}

fn collect_image_alt<'a>(spans: &'a [Span], out: &mut Vec<&'a str>) {
    for span in spans {
        match span {
            Span::Image(image) => {
                if let Some(alt) = image.alt.as_deref()
                    && !alt.is_empty()
                {
                    out.push(alt);
                }
            }
            _ => {
                if let Some(children) = span.children() {
                    collect_image_alt(children, out);
                }
            }
        }
    }
}

impl Title {
    /// Newline-joined plain text of the title paragraphs.
    pub fn plain_text(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        for item in &self.items {
            if let TitleItem::Paragraph(paragraph) = item {
                let text = paragraph.plain_text();
                if !text.trim().is_empty() {
                    lines.push(text.trim().to_string());
                }
            }
        }
        lines.join("\n")
    }

    /// Text for a TOC entry: plain text, else image alt text, else the
    /// caller-supplied fallback.
    pub fn toc_text(&self, fallback: &str) -> String {
        let text = self.plain_text();
        if !text.is_empty() {
            return text;
        }
        let mut alts: Vec<String> = Vec::new();
        for item in &self.items {
            if let TitleItem::Paragraph(paragraph) = item {
                let alt = paragraph.image_alt();
                if !alt.is_empty() {
                    alts.push(alt);
                }
            }
        }
        if !alts.is_empty() {
            return alts.join(" ");
        }
        fallback.to_string()
    }
}

/// Visit every paragraph in the book mutably, in source order.
pub fn for_each_paragraph_mut(book: &mut Book, f: &mut impl FnMut(&mut Paragraph)) {
    for item in &mut book.description.annotation {
        flow_paragraphs_mut(item, f);
    }
    for body in &mut book.bodies {
        body_paragraphs_mut(body, f);
    }
}

fn body_paragraphs_mut(body: &mut Body, f: &mut impl FnMut(&mut Paragraph)) {
    if let Some(title) = &mut body.title {
        title_paragraphs_mut(title, f);
    }
    for epigraph in &mut body.epigraphs {
        epigraph_paragraphs_mut(epigraph, f);
    }
    for section in &mut body.sections {
        section_paragraphs_mut(section, f);
    }
}

fn section_paragraphs_mut(section: &mut Section, f: &mut impl FnMut(&mut Paragraph)) {
    if let Some(title) = &mut section.title {
        title_paragraphs_mut(title, f);
    }
    for epigraph in &mut section.epigraphs {
        epigraph_paragraphs_mut(epigraph, f);
    }
    for item in &mut section.annotation {
        flow_paragraphs_mut(item, f);
    }
    for item in &mut section.content {
        flow_paragraphs_mut(item, f);
    }
}

fn title_paragraphs_mut(title: &mut Title, f: &mut impl FnMut(&mut Paragraph)) {
    for item in &mut title.items {
        if let TitleItem::Paragraph(paragraph) = item {
            f(paragraph);
        }
    }
}

fn epigraph_paragraphs_mut(epigraph: &mut Epigraph, f: &mut impl FnMut(&mut Paragraph)) {
    for item in &mut epigraph.items {
        flow_paragraphs_mut(item, f);
    }
    for author in &mut epigraph.authors {
        f(author);
    }
}

fn flow_paragraphs_mut(item: &mut FlowItem, f: &mut impl FnMut(&mut Paragraph)) {
    match item {
        FlowItem::Paragraph(paragraph) | FlowItem::Subtitle(paragraph) => f(paragraph),
        FlowItem::Poem(poem) => poem_paragraphs_mut(poem, f),
        FlowItem::Cite(cite) => cite_paragraphs_mut(cite, f),
        FlowItem::Table(_) => {}
        FlowItem::Image(_) | FlowItem::EmptyLine => {}
        FlowItem::Section(section) => section_paragraphs_mut(section, f),
    }
}

fn poem_paragraphs_mut(poem: &mut Poem, f: &mut impl FnMut(&mut Paragraph)) {
    if let Some(title) = &mut poem.title {
        title_paragraphs_mut(title, f);
    }
    for epigraph in &mut poem.epigraphs {
        epigraph_paragraphs_mut(epigraph, f);
    }
    for stanza in &mut poem.stanzas {
        stanza_paragraphs_mut(stanza, f);
    }
    for author in &mut poem.authors {
        f(author);
    }
}

fn stanza_paragraphs_mut(stanza: &mut Stanza, f: &mut impl FnMut(&mut Paragraph)) {
    if let Some(title) = &mut stanza.title {
        title_paragraphs_mut(title, f);
    }
    if let Some(subtitle) = &mut stanza.subtitle {
        f(subtitle);
    }
    for line in &mut stanza.lines {
        f(line);
    }
}

fn cite_paragraphs_mut(cite: &mut Cite, f: &mut impl FnMut(&mut Paragraph)) {
    for item in &mut cite.items {
        flow_paragraphs_mut(item, f);
    }
    for author in &mut cite.authors {
        f(author);
    }
}

/// Visit every span slot in the book mutably, pre-order, in source order.
///
/// The callback sees each span before its children, so replacing a
/// container in place (e.g. swapping a link's children for a single text
/// segment) is safe: the walker recurses into the replacement.
pub fn for_each_span_mut(book: &mut Book, f: &mut impl FnMut(&mut Span)) {
    for_each_paragraph_mut(book, &mut |paragraph| {
        spans_mut(&mut paragraph.spans, f);
    });
    // Table cells hold spans without an intervening paragraph.
    for_each_table_mut(book, &mut |table| {
        for row in &mut table.rows {
            for cell in &mut row.cells {
                spans_mut(&mut cell.spans, f);
            }
        }
    });
}

fn spans_mut(spans: &mut Vec<Span>, f: &mut impl FnMut(&mut Span)) {
    for span in spans {
        f(span);
        if let Some(children) = span.children_mut() {
            spans_mut(children, f);
        }
    }
}

/// Visit every table in the book mutably, in source order.
pub fn for_each_table_mut(book: &mut Book, f: &mut impl FnMut(&mut Table)) {
    for item in &mut book.description.annotation {
        flow_tables_mut(item, f);
    }
    for body in &mut book.bodies {
        for epigraph in &mut body.epigraphs {
            for item in &mut epigraph.items {
                flow_tables_mut(item, f);
            }
        }
        for section in &mut body.sections {
            section_tables_mut(section, f);
        }
    }
}

fn section_tables_mut(section: &mut Section, f: &mut impl FnMut(&mut Table)) {
    for epigraph in &mut section.epigraphs {
        for item in &mut epigraph.items {
            flow_tables_mut(item, f);
        }
    }
    for item in &mut section.annotation {
        flow_tables_mut(item, f);
    }
    for item in &mut section.content {
        flow_tables_mut(item, f);
    }
}

fn flow_tables_mut(item: &mut FlowItem, f: &mut impl FnMut(&mut Table)) {
    match item {
        FlowItem::Table(table) => f(table),
        FlowItem::Cite(cite) => {
            for item in &mut cite.items {
                flow_tables_mut(item, f);
            }
        }
        FlowItem::Poem(poem) => {
            for epigraph in &mut poem.epigraphs {
                for item in &mut epigraph.items {
                    flow_tables_mut(item, f);
                }
            }
        }
        FlowItem::Section(section) => section_tables_mut(section, f),
        _ => {}
    }
}

/// Visit every section in the book mutably, pre-order, in source order.
pub fn for_each_section_mut(book: &mut Book, f: &mut impl FnMut(&mut Section)) {
    for body in &mut book.bodies {
        for section in &mut body.sections {
            section_sections_mut(section, f);
        }
    }
}

fn section_sections_mut(section: &mut Section, f: &mut impl FnMut(&mut Section)) {
    f(section);
    for item in &mut section.content {
        if let FlowItem::Section(nested) = item {
            section_sections_mut(nested, f);
        }
    }
}
