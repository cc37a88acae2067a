//! Footnote numbering and call-site labeling.
//!
//! Two passes:
//!
//! 1. **Numbering** — every note section gets a display label expanded from
//!    the configured template (`{{.BodyNumber}}.{{.NoteNumber}}` style).
//!    The label lands both on the [`FootnoteRefs`] entry and in the note's
//!    title, replacing whatever the title held.
//! 2. **Call-site rewrite** — every inline link that targets a labeled
//!    note has its visible children replaced by the label text. Href and
//!    link kind are preserved, so navigation is unaffected.
//!
//! The `BodyNumber` variable is the 1-based footnote-body ordinal when the
//! book has several footnote bodies, and 0 when it has just one. Template
//! failures fall back to the plain `"b.n"` form.

use percent_encoding::percent_decode_str;

use crate::book::{BodyKind, Book, Span, Title, walk::for_each_span_mut};
use crate::config::NormalizeConfig;
use crate::diag::{Diagnostics, WarnKind};
use crate::template::Template;

use super::index::{FootnoteRefs, NoteLabel};

/// Number every footnote and rewrite every call-site.
pub fn label_footnotes(
    book: &mut Book,
    config: &NormalizeConfig,
    notes: &mut FootnoteRefs,
    diag: &mut Diagnostics,
) {
    let template = match Template::parse(&config.note_template) {
        Ok(template) => Some(template),
        Err(err) => {
            diag.warn(
                WarnKind::TemplateFallback,
                &config.note_template,
                format!("label template failed to parse: {err}"),
            );
            None
        }
    };

    let footnote_bodies: Vec<usize> = book
        .bodies
        .iter()
        .enumerate()
        .filter(|(_, body)| body.kind == BodyKind::Footnotes)
        .map(|(index, _)| index)
        .collect();
    let multi = footnote_bodies.len() > 1;
    let mut render_warned = false;

    for (ordinal, &body_index) in footnote_bodies.iter().enumerate() {
        let body_num = ordinal + 1;
        let template_body_num = if multi { body_num } else { 0 };
        let body = &mut book.bodies[body_index];
        let body_title = body
            .title
            .as_ref()
            .map(|title| title.toc_text(""))
            .unwrap_or_default();

        for (section_index, section) in body.sections.iter_mut().enumerate() {
            let note_num = section_index + 1;
            let note_title = section
                .title
                .as_ref()
                .map(|title| title.plain_text())
                .unwrap_or_default();
            let context = section.id.clone().unwrap_or_default();

            let body_num_text = template_body_num.to_string();
            let note_num_text = note_num.to_string();
            let vars = [
                ("Context", context.as_str()),
                ("BodyNumber", body_num_text.as_str()),
                ("NoteNumber", note_num_text.as_str()),
                ("BodyTitle", body_title.as_str()),
                ("NoteTitle", note_title.as_str()),
            ];

            let text = match template.as_ref().map(|t| t.render(&vars)) {
                Some(Ok(text)) => text,
                Some(Err(err)) => {
                    if !render_warned {
                        diag.warn(
                            WarnKind::TemplateFallback,
                            &config.note_template,
                            format!("label template failed to render: {err}"),
                        );
                        render_warned = true;
                    }
                    format!("{body_num}.{note_num}")
                }
                None => format!("{body_num}.{note_num}"),
            };

            if let Some(id) = section.id.as_deref()
                && let Some(note) = notes.get_mut(id)
            {
                note.label = Some(NoteLabel {
                    body_num: template_body_num,
                    note_num,
                    text: text.clone(),
                });
            }
            section.title = Some(Title::from_text(text));
        }
    }

    rewrite_call_sites(book, notes);
}

/// Replace the visible children of every labeled footnote call-site.
fn rewrite_call_sites(book: &mut Book, notes: &mut FootnoteRefs) {
    for_each_span_mut(book, &mut |span| {
        if let Span::Link { href, spans, .. } = span
            && let Some(target) = href.strip_prefix('#')
        {
            let target = percent_decode_str(target).decode_utf8_lossy();
            if let Some(note) = notes.get_mut(&target)
                && let Some(label) = &note.label
                && !label.text.is_empty()
            {
                *spans = vec![Span::Text(label.text.clone())];
                note.call_sites += 1;
            }
        }
    });
}
