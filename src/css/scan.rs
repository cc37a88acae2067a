//! Token-level CSS scanning.
//!
//! Two extractions, both built on the `cssparser` tokenizer rather than a
//! full rule parser — the pipeline needs exactly two facts from a
//! stylesheet and nothing else:
//!
//! - every external resource reference (`@import`, `@font-face src`, any
//!   `url(...)` value) with the context it appeared in, and
//! - the `page-break-before` verdict of simple class selectors
//!   (`.section-title-hN`, `.body-title`).
//!
//! Selector recognition is deliberately narrow: a selector list counts
//! only through members that are exactly one class selector. Compound
//! selectors like `.section-title-h2.foo` are ignored.

use std::collections::BTreeMap;
use std::collections::HashSet;

use cssparser::{ParseError, Parser, ParserInput, Token};

/// Where in the stylesheet a resource reference appeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefContext {
    /// `@import url(...)` / `@import "..."`.
    Import,
    /// Inside an `@font-face` block.
    FontFace,
    /// Any other property value.
    Other,
}

/// One external resource reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssRef {
    pub url: String,
    pub context: RefContext,
}

/// Extract every resource reference, deduplicated by URL in order of
/// first appearance.
pub fn extract_refs(css: &str) -> Vec<CssRef> {
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    let mut refs = Vec::new();
    let mut seen = HashSet::new();
    scan_refs(&mut parser, RefContext::Other, &mut refs, &mut seen);
    refs
}

fn scan_refs(
    parser: &mut Parser<'_, '_>,
    context: RefContext,
    refs: &mut Vec<CssRef>,
    seen: &mut HashSet<String>,
) {
    let mut import_pending = false;
    let mut font_face_pending = false;

    loop {
        let token = match parser.next() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };
        match token {
            Token::AtKeyword(name) => {
                import_pending = name.eq_ignore_ascii_case("import");
                font_face_pending = name.eq_ignore_ascii_case("font-face");
            }
            Token::QuotedString(value) => {
                // A bare string is a URL only in the @import prelude.
                if import_pending {
                    record(refs, seen, value.as_ref(), RefContext::Import);
                    import_pending = false;
                }
            }
            Token::UnquotedUrl(value) => {
                let context = if import_pending {
                    RefContext::Import
                } else {
                    context
                };
                record(refs, seen, value.as_ref(), context);
                import_pending = false;
            }
            Token::Function(name) if name.eq_ignore_ascii_case("url") => {
                let context = if import_pending {
                    RefContext::Import
                } else {
                    context
                };
                import_pending = false;
                let url: Result<Option<String>, ParseError<'_, ()>> =
                    parser.parse_nested_block(|block| {
                        let mut found = None;
                        while let Ok(token) = block.next() {
                            if let Token::QuotedString(value) = token {
                                found.get_or_insert(value.as_ref().to_string());
                            }
                        }
                        Ok(found)
                    });
                if let Ok(Some(url)) = url {
                    record(refs, seen, &url, context);
                }
            }
            Token::Function(_) | Token::ParenthesisBlock | Token::SquareBracketBlock => {
                let _: Result<(), ParseError<'_, ()>> = parser.parse_nested_block(|block| {
                    scan_refs(block, context, refs, seen);
                    Ok(())
                });
            }
            Token::CurlyBracketBlock => {
                let block_context = if font_face_pending {
                    RefContext::FontFace
                } else {
                    context
                };
                font_face_pending = false;
                let _: Result<(), ParseError<'_, ()>> = parser.parse_nested_block(|block| {
                    scan_refs(block, block_context, refs, seen);
                    Ok(())
                });
            }
            Token::Semicolon => {
                import_pending = false;
                font_face_pending = false;
            }
            _ => {}
        }
    }
}

fn record(refs: &mut Vec<CssRef>, seen: &mut HashSet<String>, url: &str, context: RefContext) {
    if seen.insert(url.to_string()) {
        refs.push(CssRef {
            url: url.to_string(),
            context,
        });
    }
}

// ---------------------------------------------------------------------------
// Page-break mining
// ---------------------------------------------------------------------------

/// Page-break verdicts mined from the stylesheets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageBreakRules {
    /// Section depth (2..=6) → break before. Depths never mentioned stay
    /// absent.
    pub sections: BTreeMap<u8, bool>,
    /// `.body-title` verdict, when mentioned.
    pub body_title: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakTarget {
    Section(u8),
    BodyTitle,
}

/// Mine `page-break-before` from every sheet in order; later rules
/// override earlier ones, so user CSS appended after the defaults wins.
pub fn extract_page_breaks(sheets: &[&str]) -> PageBreakRules {
    let mut rules = PageBreakRules::default();
    for css in sheets {
        scan_rules(css, &mut rules);
    }
    rules
}

fn scan_rules(css: &str, rules: &mut PageBreakRules) {
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);

    // Prelude tokens of the rule being collected, split on commas.
    let mut selectors: Vec<Vec<Token>> = Vec::new();
    let mut current: Vec<Token> = Vec::new();
    let mut in_at_rule = false;

    loop {
        let token = match parser.next_including_whitespace() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };
        match token {
            Token::AtKeyword(_) => {
                in_at_rule = true;
                current.clear();
                selectors.clear();
            }
            Token::Comma if !in_at_rule => {
                selectors.push(std::mem::take(&mut current));
            }
            Token::Semicolon => {
                in_at_rule = false;
                current.clear();
                selectors.clear();
            }
            Token::CurlyBracketBlock => {
                if in_at_rule {
                    // Nested rules inside at-rules are out of scope.
                    let _: Result<(), ParseError<'_, ()>> =
                        parser.parse_nested_block(|block| {
                            while block.next().is_ok() {}
                            Ok(())
                        });
                    in_at_rule = false;
                    current.clear();
                    selectors.clear();
                    continue;
                }
                selectors.push(std::mem::take(&mut current));
                let targets: Vec<BreakTarget> = selectors
                    .drain(..)
                    .filter_map(|tokens| simple_class(&tokens))
                    .filter_map(|class| break_target(&class))
                    .collect();
                if targets.is_empty() {
                    let _: Result<(), ParseError<'_, ()>> =
                        parser.parse_nested_block(|block| {
                            while block.next().is_ok() {}
                            Ok(())
                        });
                    continue;
                }
                let verdict: Result<Option<bool>, ParseError<'_, ()>> =
                    parser.parse_nested_block(|block| Ok(break_before_always(block)));
                // A matching rule without the property still overrides:
                // the verdict becomes "no break".
                let always = verdict.ok().flatten().unwrap_or(false);
                for target in targets {
                    match target {
                        BreakTarget::Section(depth) => {
                            rules.sections.insert(depth, always);
                        }
                        BreakTarget::BodyTitle => rules.body_title = Some(always),
                    }
                }
            }
            other => {
                if !in_at_rule {
                    current.push(other);
                }
            }
        }
    }
}

/// A selector that is exactly one class: `.name`, nothing else.
fn simple_class(tokens: &[Token]) -> Option<String> {
    let trimmed: Vec<&Token> = tokens
        .iter()
        .skip_while(|t| matches!(t, Token::WhiteSpace(_)))
        .collect();
    let trimmed: Vec<&Token> = trimmed
        .into_iter()
        .rev()
        .skip_while(|t| matches!(t, Token::WhiteSpace(_)))
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    match trimmed.as_slice() {
        [Token::Delim('.'), Token::Ident(name)] => Some(name.as_ref().to_string()),
        _ => None,
    }
}

fn break_target(class: &str) -> Option<BreakTarget> {
    if class.eq_ignore_ascii_case("body-title") {
        return Some(BreakTarget::BodyTitle);
    }
    let depth = class
        .strip_prefix("section-title-h")?
        .parse::<u8>()
        .ok()?;
    (2..=6).contains(&depth).then_some(BreakTarget::Section(depth))
}

/// The last `page-break-before` value in a declaration block, reduced to
/// "equals `always`". `None` when the property never appears.
fn break_before_always(block: &mut Parser<'_, '_>) -> Option<bool> {
    let mut verdict = None;
    loop {
        let token = match block.next() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };
        let Token::Ident(name) = token else { continue };
        if !matches!(block.next(), Ok(Token::Colon)) {
            continue;
        }
        let is_target = name.eq_ignore_ascii_case("page-break-before");
        let mut value: Option<String> = None;
        loop {
            match block.next() {
                Ok(Token::Semicolon) => break,
                Ok(Token::Ident(v)) => {
                    value.get_or_insert(v.as_ref().to_string());
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
        if is_target {
            verdict = Some(
                value
                    .map(|v| v.eq_ignore_ascii_case("always"))
                    .unwrap_or(false),
            );
        }
    }
    verdict
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_refs_contexts() {
        let css = r#"
            @import url("base.css");
            @import "extra.css";
            @font-face { font-family: "S"; src: url('fonts/serif.woff2'); }
            p { background: url(paper.png); }
        "#;
        let refs = extract_refs(css);
        let pairs: Vec<(&str, RefContext)> = refs
            .iter()
            .map(|r| (r.url.as_str(), r.context))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("base.css", RefContext::Import),
                ("extra.css", RefContext::Import),
                ("fonts/serif.woff2", RefContext::FontFace),
                ("paper.png", RefContext::Other),
            ]
        );
    }

    #[test]
    fn test_extract_refs_dedupes() {
        let css = "a { background: url(x.png); } b { background: url(x.png); }";
        assert_eq!(extract_refs(css).len(), 1);
    }

    #[test]
    fn test_page_break_simple_class() {
        let rules =
            extract_page_breaks(&[".section-title-h2 { page-break-before: always; }"]);
        assert_eq!(rules.sections.get(&2), Some(&true));
        assert_eq!(rules.sections.get(&3), None);
    }

    #[test]
    fn test_page_break_later_rule_overrides() {
        let default_css = ".section-title-h2 { page-break-before: always; }";
        let user_css = ".section-title-h2 { color: red; }";
        let rules = extract_page_breaks(&[default_css, user_css]);
        // The user rule mentions the class without the property, so the
        // verdict flips to false.
        assert_eq!(rules.sections.get(&2), Some(&false));

        let rules = extract_page_breaks(&[
            default_css,
            ".section-title-h2 { page-break-before: avoid; }",
        ]);
        assert_eq!(rules.sections.get(&2), Some(&false));
    }

    #[test]
    fn test_page_break_grouped_selector_honored() {
        let rules = extract_page_breaks(&[
            "h1, .section-title-h3, .other { page-break-before: ALWAYS; }",
        ]);
        assert_eq!(rules.sections.get(&3), Some(&true));
    }

    #[test]
    fn test_page_break_compound_selector_ignored() {
        let rules =
            extract_page_breaks(&[".section-title-h2.foo { page-break-before: always; }"]);
        assert!(rules.sections.is_empty());

        let rules =
            extract_page_breaks(&["div .section-title-h2 { page-break-before: always; }"]);
        assert!(rules.sections.is_empty());
    }

    #[test]
    fn test_body_title_break() {
        let rules = extract_page_breaks(&[".body-title { page-break-before: always; }"]);
        assert_eq!(rules.body_title, Some(true));

        let rules = extract_page_breaks(&["p { color: black; }"]);
        assert_eq!(rules.body_title, None);
    }

    #[test]
    fn test_out_of_range_depths_ignored() {
        let rules = extract_page_breaks(&[
            ".section-title-h1 { page-break-before: always; }
             .section-title-h7 { page-break-before: always; }",
        ]);
        assert!(rules.sections.is_empty());
    }
}
