//! Footnote numbering across multiple footnote bodies.

use folio::book::{FlowItem, Span};
use folio::{Cancel, Diagnostics, NormalizeConfig, normalize_book, parse_fb2};

const TWO_BODIES: &str = r##"<FictionBook>
  <body>
    <section>
      <p>See <a href="#a" type="note">[note]</a> and <a href="#c" type="note">[note]</a>.</p>
    </section>
  </body>
  <body name="notes">
    <section id="a"><p>First note.</p></section>
    <section id="b"><p>Second note.</p></section>
  </body>
  <body name="comments">
    <section id="c"><p>A comment.</p></section>
  </body>
</FictionBook>"##;

fn run_with_template(source: &str, template: &str) -> (folio::Book, folio::NormalizedBook) {
    let mut diag = Diagnostics::new();
    let mut book = parse_fb2(source.as_bytes(), &mut diag).expect("parses");
    let config = NormalizeConfig {
        note_template: template.to_string(),
        ..Default::default()
    };
    let result = normalize_book(&mut book, &config, &Cancel::new()).expect("normalizes");
    (book, result)
}

#[test]
fn test_body_and_note_numbers_expand() {
    let (book, result) =
        run_with_template(TWO_BODIES, "{{.BodyNumber}}.{{.NoteNumber}}");

    let label = |id: &str| {
        result
            .footnotes
            .get(id)
            .and_then(|n| n.label.as_ref())
            .map(|l| l.text.clone())
            .unwrap_or_else(|| panic!("note {id} unlabeled"))
    };
    assert_eq!(label("a"), "1.1");
    assert_eq!(label("b"), "1.2");
    assert_eq!(label("c"), "2.1");

    // Note numbering restarts per body, in source order.
    for (id, expected) in [("a", 1), ("b", 2), ("c", 1)] {
        let note = result.footnotes.get(id).unwrap();
        assert_eq!(note.label.as_ref().unwrap().note_num, expected);
    }

    // Titles were overwritten with the display text.
    assert_eq!(
        book.bodies[1].sections[0]
            .title
            .as_ref()
            .unwrap()
            .plain_text(),
        "1.1"
    );

    // The call-site children were replaced; href preserved.
    let FlowItem::Paragraph(paragraph) = &book.bodies[0].sections[0].content[0] else {
        panic!("expected paragraph");
    };
    let mut rewritten = Vec::new();
    for span in &paragraph.spans {
        if let Span::Link { href, spans, .. } = span {
            rewritten.push((href.clone(), spans.clone()));
        }
    }
    assert_eq!(
        rewritten,
        vec![
            ("#a".to_string(), vec![Span::Text("1.1".to_string())]),
            ("#c".to_string(), vec![Span::Text("2.1".to_string())]),
        ]
    );
}

#[test]
fn test_single_footnote_body_number_is_zero() {
    let source = r##"<FictionBook>
      <body><section><p>x</p></section></body>
      <body name="notes"><section id="a"><p>n</p></section></body>
    </FictionBook>"##;
    let (_, result) = run_with_template(source, "{{.BodyNumber}}:{{.NoteNumber}}");

    let label = result.footnotes.get("a").unwrap().label.as_ref().unwrap();
    assert_eq!(label.body_num, 0);
    assert_eq!(label.text, "0:1");
}

#[test]
fn test_malformed_template_falls_back() {
    let (_, result) = run_with_template(TWO_BODIES, "{{.NoteNumber");

    assert_eq!(
        result.footnotes.get("a").unwrap().label.as_ref().unwrap().text,
        "1.1"
    );
    assert_eq!(
        result.footnotes.get("c").unwrap().label.as_ref().unwrap().text,
        "2.1"
    );
    assert!(result.diagnostics.count(folio::WarnKind::TemplateFallback) >= 1);
}

#[test]
fn test_call_site_occurrences_counted_in_order() {
    let source = r##"<FictionBook>
      <body><section>
        <p><a href="#a">one</a> then <a href="#a">two</a></p>
      </section></body>
      <body name="notes"><section id="a"><p>n</p></section></body>
    </FictionBook>"##;
    let (_, result) = run_with_template(source, "{{.NoteNumber}}");

    let note = result.footnotes.get("a").unwrap();
    assert_eq!(note.call_sites, 2);
    // Back-link ids a renderer would mint for these occurrences.
    assert_eq!(folio::normalize::index::backlink_ref("a", 1), "ref-a-1");
    assert_eq!(folio::normalize::index::backlink_ref("a", 2), "ref-a-2");
}
