//! Event-driven FB2 parser built on quick-xml.
//!
//! FB2 files in the wild are frequently windows-1251 or koi8-r; the
//! declared encoding is sniffed from the XML prolog and the whole
//! document is transcoded up front, so the event loop always works on
//! UTF-8. Namespace prefixes are ignored throughout (`l:href`,
//! `xlink:href`, and plain `href` are all the same attribute).

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::book::{
    Binary, BlockImage, Body, Book, Cite, CustomInfo, Description, Epigraph, FlowItem,
    InlineImage, Paragraph, Person, Poem, Section, Sequence, Span, Stanza, Stylesheet, Table,
    TableCell, TableRow, Title, TitleItem,
};
use crate::diag::{Diagnostics, WarnKind};
use crate::error::Result;

/// Parse an FB2 document from raw bytes.
pub fn parse_fb2(data: &[u8], diag: &mut Diagnostics) -> Result<Book> {
    let text = decode_xml(data);
    let mut reader = Reader::from_str(&text);

    let mut book = Book::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"FictionBook" => {}
                b"stylesheet" => {
                    let content_type =
                        attr(&e, b"type").unwrap_or_else(|| "text/css".to_string());
                    let data = element_text(&mut reader)?;
                    book.stylesheets.push(Stylesheet {
                        content_type,
                        data,
                        default: false,
                    });
                }
                b"description" => book.description = parse_description(&mut reader)?,
                b"body" => {
                    let name = attr(&e, b"name").unwrap_or_default();
                    let mut body = parse_body(&mut reader)?;
                    body.name = name;
                    book.bodies.push(body);
                }
                b"binary" => parse_binary(&mut reader, &e, &mut book, diag)?,
                _ => skip_element(&mut reader)?,
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(book)
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Transcode the document to UTF-8 using the prolog's declared encoding
/// (BOM sniffing included). Unknown labels fall back to UTF-8.
fn decode_xml(data: &[u8]) -> String {
    let encoding = declared_encoding(data)
        .and_then(encoding_rs::Encoding::for_label)
        .unwrap_or(encoding_rs::UTF_8);
    let (text, _, _) = encoding.decode(data);
    text.into_owned()
}

/// The `encoding="..."` value from the XML declaration, if any.
fn declared_encoding(data: &[u8]) -> Option<&[u8]> {
    let head = &data[..data.len().min(256)];
    let start = memchr::memmem::find(head, b"encoding")? + b"encoding".len();
    let mut rest = &head[start..];
    while let Some((&b, tail)) = rest.split_first() {
        match b {
            b' ' | b'\t' | b'=' => rest = tail,
            b'"' | b'\'' => {
                let end = memchr::memchr(b, tail)?;
                return Some(&tail[..end]);
            }
            _ => return None,
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Low-level helpers
// ---------------------------------------------------------------------------

/// Extract local name from a namespaced XML name (e.g. "l:href" -> "href").
fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}

/// Resolve XML entity references.
fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "amp" => return Some("&".to_string()),
        _ => {}
    }

    if let Some(hex) = entity.strip_prefix("#x") {
        if let Ok(code) = u32::from_str_radix(hex, 16)
            && let Some(c) = char::from_u32(code)
        {
            return Some(c.to_string());
        }
    } else if let Some(dec) = entity.strip_prefix('#')
        && let Ok(code) = dec.parse::<u32>()
        && let Some(c) = char::from_u32(code)
    {
        return Some(c.to_string());
    }
    None
}

/// An attribute by local name.
fn attr(e: &BytesStart, name: &[u8]) -> Option<String> {
    for attr in e.attributes().flatten() {
        if local_name(attr.key.as_ref()) == name {
            return Some(String::from_utf8_lossy(&attr.value).into_owned());
        }
    }
    None
}

/// An attribute by local name, mapped so empty values become `None`.
fn opt_attr(e: &BytesStart, name: &[u8]) -> Option<String> {
    attr(e, name).filter(|value| !value.is_empty())
}

/// Skip the current element entirely, counting nesting depth.
fn skip_element(reader: &mut Reader<&[u8]>) -> Result<()> {
    let mut depth = 1usize;
    loop {
        match reader.read_event()? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Event::Eof => return Ok(()),
            _ => {}
        }
    }
}

/// Collect the text content of the current element, resolving entities
/// and skipping any markup.
fn element_text(reader: &mut Reader<&[u8]>) -> Result<String> {
    let mut depth = 1usize;
    let mut text = String::new();
    loop {
        match reader.read_event()? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(text);
                }
            }
            Event::Text(e) => text.push_str(&String::from_utf8_lossy(e.as_ref())),
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(e.as_ref())),
            Event::GeneralRef(e) => {
                if let Some(resolved) = resolve_entity(&String::from_utf8_lossy(e.as_ref())) {
                    text.push_str(&resolved);
                }
            }
            Event::Eof => return Ok(text),
            _ => {}
        }
    }
}

fn block_image(e: &BytesStart) -> BlockImage {
    BlockImage {
        id: opt_attr(e, b"id"),
        href: attr(e, b"href").unwrap_or_default(),
        alt: opt_attr(e, b"alt"),
        title: opt_attr(e, b"title"),
    }
}

// ---------------------------------------------------------------------------
// Description
// ---------------------------------------------------------------------------

fn parse_description(reader: &mut Reader<&[u8]>) -> Result<Description> {
    let mut desc = Description::default();
    let mut depth = 1usize;
    loop {
        match reader.read_event()? {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"title-info" => parse_title_info(reader, &mut desc)?,
                b"document-info" => parse_document_info(reader, &mut desc)?,
                b"publish-info" => parse_publish_info(reader, &mut desc)?,
                b"custom-info" => {
                    let info_type = attr(&e, b"info-type").unwrap_or_default();
                    let text = element_text(reader)?;
                    desc.custom_info.push(CustomInfo { info_type, text });
                }
                _ => skip_element(reader)?,
            },
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(desc);
                }
            }
            Event::Eof => return Ok(desc),
            _ => {}
        }
    }
}

fn parse_title_info(reader: &mut Reader<&[u8]>, desc: &mut Description) -> Result<()> {
    loop {
        match reader.read_event()? {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"genre" => desc.genres.push(element_text(reader)?.trim().to_string()),
                b"author" => {
                    let person = parse_person(reader)?;
                    desc.authors.push(person);
                }
                b"translator" => {
                    let person = parse_person(reader)?;
                    desc.translators.push(person);
                }
                b"book-title" => desc.book_title = element_text(reader)?.trim().to_string(),
                b"lang" => desc.lang = element_text(reader)?.trim().to_string(),
                b"src-lang" => {
                    desc.src_lang = Some(element_text(reader)?.trim().to_string());
                }
                b"keywords" => desc.keywords = Some(element_text(reader)?.trim().to_string()),
                b"date" => desc.date = Some(element_text(reader)?.trim().to_string()),
                b"annotation" => desc.annotation = parse_flow(reader, b"annotation")?,
                b"coverpage" => parse_coverpage(reader, desc)?,
                _ => skip_element(reader)?,
            },
            Event::Empty(e) => {
                if local_name(e.name().as_ref()) == b"sequence" {
                    desc.sequence = Some(Sequence {
                        name: attr(&e, b"name").unwrap_or_default(),
                        number: attr(&e, b"number").and_then(|n| n.trim().parse().ok()),
                    });
                }
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"title-info" => return Ok(()),
            Event::Eof => return Ok(()),
            _ => {}
        }
    }
}

fn parse_coverpage(reader: &mut Reader<&[u8]>, desc: &mut Description) -> Result<()> {
    loop {
        match reader.read_event()? {
            Event::Empty(e) | Event::Start(e)
                if local_name(e.name().as_ref()) == b"image" =>
            {
                desc.coverpage.push(block_image(&e));
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"coverpage" => return Ok(()),
            Event::Eof => return Ok(()),
            _ => {}
        }
    }
}

fn parse_person(reader: &mut Reader<&[u8]>) -> Result<Person> {
    let mut person = Person::default();
    loop {
        match reader.read_event()? {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"first-name" => person.first_name = element_text(reader)?.trim().to_string(),
                b"middle-name" => person.middle_name = element_text(reader)?.trim().to_string(),
                b"last-name" => person.last_name = element_text(reader)?.trim().to_string(),
                b"nickname" => person.nickname = element_text(reader)?.trim().to_string(),
                b"id" => person.id = Some(element_text(reader)?.trim().to_string()),
                _ => skip_element(reader)?,
            },
            Event::End(e)
                if matches!(
                    local_name(e.name().as_ref()),
                    b"author" | b"translator"
                ) =>
            {
                return Ok(person);
            }
            Event::Eof => return Ok(person),
            _ => {}
        }
    }
}

fn parse_document_info(reader: &mut Reader<&[u8]>, desc: &mut Description) -> Result<()> {
    loop {
        match reader.read_event()? {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"id" => desc.doc_id = element_text(reader)?.trim().to_string(),
                b"program-used" => {
                    desc.program_used = Some(element_text(reader)?.trim().to_string());
                }
                b"version" => desc.version = Some(element_text(reader)?.trim().to_string()),
                _ => skip_element(reader)?,
            },
            Event::End(e) if local_name(e.name().as_ref()) == b"document-info" => {
                return Ok(());
            }
            Event::Eof => return Ok(()),
            _ => {}
        }
    }
}

fn parse_publish_info(reader: &mut Reader<&[u8]>, desc: &mut Description) -> Result<()> {
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(local_name(e.name().as_ref())).into_owned();
                let text = element_text(reader)?.trim().to_string();
                desc.publish_info.push((name, text));
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"publish-info" => return Ok(()),
            Event::Eof => return Ok(()),
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Bodies and sections
// ---------------------------------------------------------------------------

fn parse_body(reader: &mut Reader<&[u8]>) -> Result<Body> {
    let mut body = Body::default();
    loop {
        match reader.read_event()? {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"title" => body.title = Some(parse_title(reader)?),
                b"image" => {
                    body.image = Some(block_image(&e));
                    skip_element(reader)?;
                }
                b"epigraph" => body.epigraphs.push(parse_epigraph(reader, &e)?),
                b"section" => body.sections.push(parse_section(reader, &e)?),
                _ => skip_element(reader)?,
            },
            Event::Empty(e) if local_name(e.name().as_ref()) == b"image" => {
                body.image = Some(block_image(&e));
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"body" => return Ok(body),
            Event::Eof => return Ok(body),
            _ => {}
        }
    }
}

fn parse_section(reader: &mut Reader<&[u8]>, start: &BytesStart) -> Result<Section> {
    let mut section = Section {
        id: opt_attr(start, b"id"),
        ..Default::default()
    };
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let qname = e.name();
                let name = local_name(qname.as_ref());
                match name {
                    b"title" if section.content.is_empty() => {
                        section.title = Some(parse_title(reader)?);
                    }
                    b"epigraph" if section.content.is_empty() => {
                        section.epigraphs.push(parse_epigraph(reader, &e)?);
                    }
                    b"annotation" if section.content.is_empty() => {
                        section.annotation = parse_flow(reader, b"annotation")?;
                    }
                    b"image" if section.content.is_empty() && section.image.is_none() => {
                        section.image = Some(block_image(&e));
                        skip_element(reader)?;
                    }
                    b"section" => {
                        let nested = parse_section(reader, &e)?;
                        section.content.push(FlowItem::Section(nested));
                    }
                    _ => {
                        if let Some(item) = parse_flow_item(reader, &e)? {
                            section.content.push(item);
                        }
                    }
                }
            }
            Event::Empty(e) => match local_name(e.name().as_ref()) {
                b"empty-line" => section.content.push(FlowItem::EmptyLine),
                b"image" => {
                    if section.content.is_empty() && section.image.is_none() {
                        section.image = Some(block_image(&e));
                    } else {
                        section.content.push(FlowItem::Image(block_image(&e)));
                    }
                }
                _ => {}
            },
            Event::End(e) if local_name(e.name().as_ref()) == b"section" => {
                return Ok(section);
            }
            Event::Eof => return Ok(section),
            _ => {}
        }
    }
}

/// Parse one block-level element that just opened. Returns `None` for
/// elements that are not flow content (they are skipped).
fn parse_flow_item(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart,
) -> Result<Option<FlowItem>> {
    let item = match local_name(start.name().as_ref()) {
        b"p" => Some(FlowItem::Paragraph(parse_paragraph(reader, start, b"p")?)),
        b"subtitle" => {
            let mut paragraph = parse_paragraph(reader, start, b"subtitle")?;
            paragraph.special = true;
            Some(FlowItem::Subtitle(paragraph))
        }
        b"image" => {
            let image = block_image(start);
            skip_element(reader)?;
            Some(FlowItem::Image(image))
        }
        b"poem" => Some(FlowItem::Poem(parse_poem(reader, start)?)),
        b"cite" => Some(FlowItem::Cite(parse_cite(reader, start)?)),
        b"table" => Some(FlowItem::Table(parse_table(reader, start)?)),
        b"empty-line" => {
            skip_element(reader)?;
            Some(FlowItem::EmptyLine)
        }
        _ => {
            skip_element(reader)?;
            None
        }
    };
    Ok(item)
}

/// Parse flow content until the named end tag (annotations, epigraphs,
/// cites; nested sections are not valid here and are skipped).
fn parse_flow(reader: &mut Reader<&[u8]>, end: &[u8]) -> Result<Vec<FlowItem>> {
    let mut items = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if let Some(item) = parse_flow_item(reader, &e)? {
                    items.push(item);
                }
            }
            Event::Empty(e) => match local_name(e.name().as_ref()) {
                b"empty-line" => items.push(FlowItem::EmptyLine),
                b"image" => items.push(FlowItem::Image(block_image(&e))),
                _ => {}
            },
            Event::End(e) if local_name(e.name().as_ref()) == end => return Ok(items),
            Event::Eof => return Ok(items),
            _ => {}
        }
    }
}

fn parse_title(reader: &mut Reader<&[u8]>) -> Result<Title> {
    let mut title = Title::default();
    loop {
        match reader.read_event()? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"p" => {
                let mut paragraph = parse_paragraph(reader, &e, b"p")?;
                paragraph.special = true;
                title.items.push(TitleItem::Paragraph(paragraph));
            }
            Event::Start(_) => skip_element(reader)?,
            Event::Empty(e) if local_name(e.name().as_ref()) == b"empty-line" => {
                title.items.push(TitleItem::EmptyLine);
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"title" => return Ok(title),
            Event::Eof => return Ok(title),
            _ => {}
        }
    }
}

fn parse_epigraph(reader: &mut Reader<&[u8]>, start: &BytesStart) -> Result<Epigraph> {
    let mut epigraph = Epigraph {
        id: opt_attr(start, b"id"),
        ..Default::default()
    };
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if local_name(e.name().as_ref()) == b"text-author" {
                    epigraph
                        .authors
                        .push(parse_paragraph(reader, &e, b"text-author")?);
                } else if let Some(item) = parse_flow_item(reader, &e)? {
                    epigraph.items.push(item);
                }
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"empty-line" => {
                epigraph.items.push(FlowItem::EmptyLine);
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"epigraph" => {
                return Ok(epigraph);
            }
            Event::Eof => return Ok(epigraph),
            _ => {}
        }
    }
}

fn parse_poem(reader: &mut Reader<&[u8]>, start: &BytesStart) -> Result<Poem> {
    let mut poem = Poem {
        id: opt_attr(start, b"id"),
        ..Default::default()
    };
    loop {
        match reader.read_event()? {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"title" => poem.title = Some(parse_title(reader)?),
                b"epigraph" => poem.epigraphs.push(parse_epigraph(reader, &e)?),
                b"stanza" => poem.stanzas.push(parse_stanza(reader)?),
                b"text-author" => {
                    poem.authors
                        .push(parse_paragraph(reader, &e, b"text-author")?);
                }
                b"date" => poem.date = Some(element_text(reader)?.trim().to_string()),
                _ => skip_element(reader)?,
            },
            Event::End(e) if local_name(e.name().as_ref()) == b"poem" => return Ok(poem),
            Event::Eof => return Ok(poem),
            _ => {}
        }
    }
}

fn parse_stanza(reader: &mut Reader<&[u8]>) -> Result<Stanza> {
    let mut stanza = Stanza::default();
    loop {
        match reader.read_event()? {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"title" => stanza.title = Some(parse_title(reader)?),
                b"subtitle" => {
                    let mut paragraph = parse_paragraph(reader, &e, b"subtitle")?;
                    paragraph.special = true;
                    stanza.subtitle = Some(paragraph);
                }
                b"v" => stanza.lines.push(parse_paragraph(reader, &e, b"v")?),
                _ => skip_element(reader)?,
            },
            Event::End(e) if local_name(e.name().as_ref()) == b"stanza" => return Ok(stanza),
            Event::Eof => return Ok(stanza),
            _ => {}
        }
    }
}

fn parse_cite(reader: &mut Reader<&[u8]>, start: &BytesStart) -> Result<Cite> {
    let mut cite = Cite {
        id: opt_attr(start, b"id"),
        ..Default::default()
    };
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if local_name(e.name().as_ref()) == b"text-author" {
                    cite.authors
                        .push(parse_paragraph(reader, &e, b"text-author")?);
                } else if let Some(item) = parse_flow_item(reader, &e)? {
                    cite.items.push(item);
                }
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"empty-line" => {
                cite.items.push(FlowItem::EmptyLine);
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"cite" => return Ok(cite),
            Event::Eof => return Ok(cite),
            _ => {}
        }
    }
}

fn parse_table(reader: &mut Reader<&[u8]>, start: &BytesStart) -> Result<Table> {
    let mut table = Table {
        id: opt_attr(start, b"id"),
        style: opt_attr(start, b"style"),
        ..Default::default()
    };
    loop {
        match reader.read_event()? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"tr" => {
                let mut row = TableRow {
                    align: opt_attr(&e, b"align"),
                    ..Default::default()
                };
                loop {
                    match reader.read_event()? {
                        Event::Start(cell) => {
                            let cell_qname = cell.name();
                            let name = local_name(cell_qname.as_ref());
                            if name == b"th" || name == b"td" {
                                let header = name == b"th";
                                let end: &[u8] = if header { b"th" } else { b"td" };
                                row.cells.push(TableCell {
                                    id: opt_attr(&cell, b"id"),
                                    header,
                                    align: opt_attr(&cell, b"align"),
                                    colspan: attr(&cell, b"colspan")
                                        .and_then(|v| v.trim().parse().ok()),
                                    rowspan: attr(&cell, b"rowspan")
                                        .and_then(|v| v.trim().parse().ok()),
                                    spans: parse_spans(reader, end)?,
                                });
                            } else {
                                skip_element(reader)?;
                            }
                        }
                        Event::End(end) if local_name(end.name().as_ref()) == b"tr" => break,
                        Event::Eof => break,
                        _ => {}
                    }
                }
                table.rows.push(row);
            }
            Event::Start(_) => skip_element(reader)?,
            Event::End(e) if local_name(e.name().as_ref()) == b"table" => return Ok(table),
            Event::Eof => return Ok(table),
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Paragraphs and inline spans
// ---------------------------------------------------------------------------

fn parse_paragraph(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart,
    end: &[u8],
) -> Result<Paragraph> {
    Ok(Paragraph {
        id: opt_attr(start, b"id"),
        style: opt_attr(start, b"style"),
        special: false,
        spans: parse_spans(reader, end)?,
    })
}

/// Parse inline content until the named end tag.
fn parse_spans(reader: &mut Reader<&[u8]>, end: &[u8]) -> Result<Vec<Span>> {
    let mut spans: Vec<Span> = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Text(e) => push_text(&mut spans, &String::from_utf8_lossy(e.as_ref())),
            Event::CData(e) => push_text(&mut spans, &String::from_utf8_lossy(e.as_ref())),
            Event::GeneralRef(e) => {
                if let Some(resolved) = resolve_entity(&String::from_utf8_lossy(e.as_ref())) {
                    push_text(&mut spans, &resolved);
                }
            }
            Event::Start(e) => {
                let name = local_name(e.name().as_ref()).to_vec();
                match name.as_slice() {
                    b"strong" => spans.push(Span::Strong(parse_spans(reader, b"strong")?)),
                    b"emphasis" => {
                        spans.push(Span::Emphasis(parse_spans(reader, b"emphasis")?));
                    }
                    b"strikethrough" => {
                        spans.push(Span::Strikethrough(parse_spans(reader, b"strikethrough")?));
                    }
                    b"sub" => spans.push(Span::Sub(parse_spans(reader, b"sub")?)),
                    b"sup" => spans.push(Span::Sup(parse_spans(reader, b"sup")?)),
                    b"code" => spans.push(Span::Code(parse_spans(reader, b"code")?)),
                    b"style" => {
                        let style_name = attr(&e, b"name").unwrap_or_default();
                        spans.push(Span::Style {
                            name: style_name,
                            spans: parse_spans(reader, b"style")?,
                        });
                    }
                    b"a" => {
                        let href = attr(&e, b"href").unwrap_or_default();
                        let kind = opt_attr(&e, b"type");
                        spans.push(Span::Link {
                            href,
                            kind,
                            spans: parse_spans(reader, b"a")?,
                        });
                    }
                    b"image" => {
                        let image = InlineImage {
                            id: opt_attr(&e, b"id"),
                            href: attr(&e, b"href").unwrap_or_default(),
                            alt: opt_attr(&e, b"alt"),
                        };
                        skip_element(reader)?;
                        spans.push(Span::Image(image));
                    }
                    _ => skip_element(reader)?,
                }
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"image" => {
                spans.push(Span::Image(InlineImage {
                    id: opt_attr(&e, b"id"),
                    href: attr(&e, b"href").unwrap_or_default(),
                    alt: opt_attr(&e, b"alt"),
                }));
            }
            Event::End(e) if local_name(e.name().as_ref()) == end => return Ok(spans),
            Event::End(_) => return Ok(spans),
            Event::Eof => return Ok(spans),
            _ => {}
        }
    }
}

/// Append text, merging with a trailing text span.
fn push_text(spans: &mut Vec<Span>, text: &str) {
    if let Some(Span::Text(existing)) = spans.last_mut() {
        existing.push_str(text);
    } else {
        spans.push(Span::Text(text.to_string()));
    }
}

// ---------------------------------------------------------------------------
// Binaries
// ---------------------------------------------------------------------------

fn parse_binary(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart,
    book: &mut Book,
    diag: &mut Diagnostics,
) -> Result<()> {
    let id = attr(start, b"id").unwrap_or_default();
    let content_type = attr(start, b"content-type").unwrap_or_default();
    let text = element_text(reader)?;
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    match BASE64.decode(compact.as_bytes()) {
        Ok(data) => book.binaries.push(Binary::new(id, content_type, data)),
        Err(err) => diag.warn(
            WarnKind::BadBinaryPayload,
            &id,
            format!("base64 decode failed: {err}"),
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::BodyKind;

    const SAMPLE: &str = r##"<?xml version="1.0" encoding="utf-8"?>
<FictionBook xmlns="http://www.gribuser.ru/xml/fictionbook/2.0"
             xmlns:l="http://www.w3.org/1999/xlink">
  <description>
    <title-info>
      <genre>prose</genre>
      <author><first-name>Иван</first-name><last-name>Иванов</last-name></author>
      <book-title>Пример &amp; проба</book-title>
      <lang>ru</lang>
      <coverpage><image l:href="#cover.jpg"/></coverpage>
      <sequence name="Примеры" number="2"/>
    </title-info>
    <document-info>
      <id>doc-42</id>
      <version>1.1</version>
    </document-info>
  </description>
  <body>
    <title><p>Книга</p></title>
    <section id="ch1">
      <title><p>Глава 1</p></title>
      <p>Обычный текст <strong>жирный</strong> и <a l:href="#n1" type="note">сноска</a>.</p>
      <empty-line/>
      <poem><stanza><v>строка</v></stanza></poem>
    </section>
  </body>
  <body name="notes">
    <section id="n1"><title><p>1</p></title><p>Текст сноски.</p></section>
  </body>
  <binary id="cover.jpg" content-type="image/jpeg">/9j/4AAQ</binary>
</FictionBook>"##;

    #[test]
    fn test_parse_sample_structure() {
        let mut diag = Diagnostics::new();
        let book = parse_fb2(SAMPLE.as_bytes(), &mut diag).unwrap();

        assert_eq!(book.description.book_title, "Пример & проба");
        assert_eq!(book.description.lang, "ru");
        assert_eq!(book.description.doc_id, "doc-42");
        assert_eq!(book.description.authors[0].display(), "Иван Иванов");
        assert_eq!(
            book.description.sequence.as_ref().unwrap().number,
            Some(2)
        );
        assert_eq!(book.description.coverpage[0].href, "#cover.jpg");

        assert_eq!(book.bodies.len(), 2);
        assert_eq!(book.bodies[1].name, "notes");
        // Classification happens in the pipeline, not the parser.
        assert_eq!(book.bodies[1].kind, BodyKind::Main);

        let section = &book.bodies[0].sections[0];
        assert_eq!(section.id.as_deref(), Some("ch1"));
        assert_eq!(
            section.title.as_ref().unwrap().plain_text(),
            "Глава 1"
        );
        assert_eq!(section.content.len(), 3);
        match &section.content[0] {
            FlowItem::Paragraph(p) => {
                assert_eq!(p.plain_text(), "Обычный текст жирный и .");
                match &p.spans[3] {
                    Span::Link { href, kind, spans } => {
                        assert_eq!(href, "#n1");
                        assert_eq!(kind.as_deref(), Some("note"));
                        assert_eq!(spans, &vec![Span::Text("сноска".to_string())]);
                    }
                    other => panic!("expected link, got {other:?}"),
                }
            }
            other => panic!("expected paragraph, got {other:?}"),
        }
        assert!(matches!(section.content[1], FlowItem::EmptyLine));
        assert!(matches!(section.content[2], FlowItem::Poem(_)));

        assert_eq!(book.binaries.len(), 1);
        assert_eq!(book.binaries[0].id, "cover.jpg");
        assert_eq!(book.binaries[0].content_type, "image/jpeg");
        assert!(!book.binaries[0].data.is_empty());
        assert!(diag.is_empty());
    }

    #[test]
    fn test_windows_1251_declared_encoding() {
        let xml = "<?xml version=\"1.0\" encoding=\"windows-1251\"?>\
                   <FictionBook><body><section id=\"s\"><p>Привет</p></section></body></FictionBook>";
        let (encoded, _, _) = encoding_rs::WINDOWS_1251.encode(xml);
        let mut diag = Diagnostics::new();
        let book = parse_fb2(&encoded, &mut diag).unwrap();
        match &book.bodies[0].sections[0].content[0] {
            FlowItem::Paragraph(p) => assert_eq!(p.plain_text(), "Привет"),
            other => panic!("expected paragraph, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_base64_dropped_with_warning() {
        let xml = r#"<FictionBook><binary id="x" content-type="image/png">!!%%</binary></FictionBook>"#;
        let mut diag = Diagnostics::new();
        let book = parse_fb2(xml.as_bytes(), &mut diag).unwrap();
        assert!(book.binaries.is_empty());
        assert_eq!(diag.count(WarnKind::BadBinaryPayload), 1);
    }

    #[test]
    fn test_unknown_elements_skipped() {
        let xml = r#"<FictionBook>
            <weird><deep><deeper/></deep></weird>
            <body><section><p>ok<unknown>inner</unknown> text</p></section></body>
        </FictionBook>"#;
        let mut diag = Diagnostics::new();
        let book = parse_fb2(xml.as_bytes(), &mut diag).unwrap();
        match &book.bodies[0].sections[0].content[0] {
            FlowItem::Paragraph(p) => assert_eq!(p.plain_text(), "ok text"),
            other => panic!("expected paragraph, got {other:?}"),
        }
    }
}
