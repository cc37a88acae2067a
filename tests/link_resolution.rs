//! Link repair scenarios.
//!
//! Broken internal links become plain text with a marker; broken image
//! references are redirected to the placeholder; valid links survive
//! untouched.

use folio::book::{FlowItem, Span};
use folio::{Cancel, Diagnostics, NormalizeConfig, normalize_book, parse_fb2};

fn run(source: &str) -> (folio::Book, folio::NormalizedBook) {
    let mut diag = Diagnostics::new();
    let mut book = parse_fb2(source.as_bytes(), &mut diag).expect("parses");
    let result = normalize_book(&mut book, &NormalizeConfig::default(), &Cancel::new())
        .expect("normalizes");
    (book, result)
}

fn first_paragraph(book: &folio::Book) -> &folio::book::Paragraph {
    match &book.bodies[0].sections[0].content[0] {
        FlowItem::Paragraph(p) => p,
        other => panic!("expected paragraph, got {other:?}"),
    }
}

// ============================================================================
// Scenario: broken internal text link
// ============================================================================

#[test]
fn test_broken_internal_link_becomes_text() {
    let (book, _) = run(r##"<FictionBook>
      <body><section><p><a href="#nope">Click</a></p></section></body>
    </FictionBook>"##);

    let paragraph = first_paragraph(&book);
    assert_eq!(
        paragraph.spans,
        vec![Span::Text("Click [broken link: #nope]".to_string())]
    );
    // A text repair never creates the placeholder binary.
    let placeholder = book.placeholder_id.as_deref().unwrap();
    assert!(book.binary(placeholder).is_none());
}

#[test]
fn test_broken_external_link_marker() {
    let (book, _) = run(r##"<FictionBook>
      <body><section><p><a href="gopher://old/world">retro</a></p></section></body>
    </FictionBook>"##);

    let paragraph = first_paragraph(&book);
    assert_eq!(
        paragraph.spans,
        vec![Span::Text(
            "retro [broken external link: gopher://old/world]".to_string()
        )]
    );
}

#[test]
fn test_empty_href_marker() {
    let (book, _) = run(r##"<FictionBook>
      <body><section><p><a href="">dangling</a></p></section></body>
    </FictionBook>"##);

    let paragraph = first_paragraph(&book);
    assert_eq!(
        paragraph.spans,
        vec![Span::Text("dangling [empty link]".to_string())]
    );
}

#[test]
fn test_nested_link_text_is_recovered() {
    let (book, _) = run(r##"<FictionBook>
      <body><section><p><a href="#gone"><strong>bold</strong> tail</a></p></section></body>
    </FictionBook>"##);

    let paragraph = first_paragraph(&book);
    assert_eq!(
        paragraph.spans,
        vec![Span::Text("bold tail [broken link: #gone]".to_string())]
    );
}

// ============================================================================
// Scenario: broken block image
// ============================================================================

#[test]
fn test_broken_block_image_redirected_to_placeholder() {
    let (book, result) = run(r##"<FictionBook>
      <body><section><p>text</p><image href="#gone"/></section></body>
    </FictionBook>"##);

    assert_eq!(book.placeholder_id.as_deref(), Some("not-found-0"));
    match &book.bodies[0].sections[0].content[1] {
        FlowItem::Image(image) => assert_eq!(image.href, "#not-found-0"),
        other => panic!("expected image, got {other:?}"),
    }
    // Exactly one placeholder binary was appended, and it survives the
    // reference filter.
    let binary = book.binary("not-found-0").expect("placeholder binary");
    assert_eq!(binary.content_type, "image/svg+xml");
    assert!(result.images.contains("not-found-0"));
}

#[test]
fn test_broken_coverpage_redirected() {
    let (book, _) = run(r##"<FictionBook>
      <description><title-info>
        <book-title>t</book-title>
        <coverpage><image href="#lost"/></coverpage>
      </title-info></description>
      <body><section><p>x</p></section></body>
    </FictionBook>"##);

    assert_eq!(book.description.coverpage[0].href, "#not-found-0");
    assert!(book.binary("not-found-0").is_some());
}

#[test]
fn test_valid_links_untouched() {
    let (book, result) = run(r##"<FictionBook>
      <body>
        <section id="first"><p>
          <a href="#second">forward</a>
          <a href="https://example.com">out</a>
        </p></section>
        <section id="second"><p>target</p></section>
      </body>
    </FictionBook>"##);

    let paragraph = first_paragraph(&book);
    let links: Vec<&str> = paragraph
        .spans
        .iter()
        .filter_map(|span| match span {
            Span::Link { href, .. } => Some(href.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(links, vec!["#second", "https://example.com"]);
    assert!(result.links.contains("second"));
    assert!(result.links.contains("https://example.com"));
    assert!(result.diagnostics.is_empty());
}
