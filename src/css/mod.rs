//! Stylesheet normalization.
//!
//! Each `text/css` stylesheet is scanned for external resource references,
//! which are resolved against the book's binaries (`#id`) or loaded
//! through the sandboxed filesystem rooted at the stylesheet's base
//! directory. Resolved resources get container filenames under `fonts/`
//! or `other/`; filesystem loads are appended to the book as new binaries.
//!
//! The same pass mines `page-break-before` hints for section titles and
//! stores them on the book.

mod scan;

pub use scan::{CssRef, PageBreakRules, RefContext, extract_page_breaks, extract_refs};

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::PathBuf;

use percent_encoding::percent_decode_str;

use crate::book::{Binary, Book, Stylesheet};
use crate::config::NormalizeConfig;
use crate::diag::{Diagnostics, WarnKind};
use crate::io::SandboxRoot;

/// A stylesheet resource resolved to a binary and an output filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StylesheetResource {
    /// The URL exactly as written in the CSS.
    pub url: String,
    /// Id of the binary holding the bytes.
    pub binary_id: String,
    pub mime: String,
    /// `fonts/<basename>` for fonts, `other/<basename>` otherwise.
    pub filename: String,
    /// True when the bytes came from the sandboxed filesystem rather than
    /// an embedded binary.
    pub from_fs: bool,
}

/// Resolve stylesheet resources and mine page-break hints.
pub fn normalize_stylesheets(
    book: &mut Book,
    config: &NormalizeConfig,
    diag: &mut Diagnostics,
) -> Vec<StylesheetResource> {
    // Prepend the configured default stylesheet once.
    if let Some(css) = &config.default_css
        && !book.stylesheets.iter().any(|s| s.default)
    {
        book.stylesheets.insert(
            0,
            Stylesheet {
                content_type: "text/css".to_string(),
                data: css.clone(),
                default: true,
            },
        );
    }

    let source_dir: PathBuf = config
        .source_path
        .as_deref()
        .and_then(|p| p.parent())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    // Collect refs per sheet first; resolution appends binaries and must
    // not run while the stylesheet list is borrowed.
    let mut pending: Vec<(CssRef, PathBuf)> = Vec::new();
    let mut seen_urls: HashSet<String> = HashSet::new();
    for sheet in &book.stylesheets {
        if !sheet.is_css() {
            continue;
        }
        let base = if sheet.default {
            PathBuf::from(".")
        } else {
            source_dir.clone()
        };
        for css_ref in extract_refs(&sheet.data) {
            if seen_urls.insert(css_ref.url.clone()) {
                pending.push((css_ref, base.clone()));
            }
        }
    }

    let mut resources = Vec::new();
    for (css_ref, base) in pending {
        if let Some(resource) = resolve_ref(book, &css_ref, &base, diag) {
            resources.push(resource);
        }
    }

    // Page-break hints, later sheets winning.
    let sheets: Vec<&str> = book
        .stylesheets
        .iter()
        .filter(|s| s.is_css())
        .map(|s| s.data.as_str())
        .collect();
    let rules = extract_page_breaks(&sheets);
    book.section_breaks = rules.sections;
    book.body_title_break = rules.body_title.unwrap_or(false);

    resources
}

fn resolve_ref(
    book: &mut Book,
    css_ref: &CssRef,
    base: &PathBuf,
    diag: &mut Diagnostics,
) -> Option<StylesheetResource> {
    let url = css_ref.url.as_str();

    if url.starts_with("data:") {
        return None;
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        diag.warn(
            WarnKind::ExternalCssUrl,
            url,
            "remote stylesheet resources are never fetched",
        );
        return None;
    }

    if let Some(id) = url.strip_prefix('#') {
        let id = percent_decode_str(id).decode_utf8_lossy().into_owned();
        let Some(binary) = book.binary(&id) else {
            diag.warn(
                WarnKind::MissingBinary,
                url,
                "stylesheet references a binary that does not exist",
            );
            return None;
        };
        let mime = binary.content_type.clone();
        let basename = format!("{id}.{}", ext_for_mime(&mime));
        return Some(StylesheetResource {
            url: url.to_string(),
            binary_id: id,
            mime: mime.clone(),
            filename: resource_filename(&mime, &basename),
            from_fs: false,
        });
    }

    // A relative path, confined to the sandbox root.
    let path = percent_decode_str(url).decode_utf8_lossy().into_owned();
    let sandbox = SandboxRoot::new(base);
    let data = match sandbox.read(&path) {
        Ok(data) => data,
        Err(err) => {
            let kind = if err.kind() == ErrorKind::PermissionDenied {
                WarnKind::SandboxRejected
            } else {
                WarnKind::ResourceUnreadable
            };
            diag.warn(kind, url, err.to_string());
            return None;
        }
    };

    let basename = path.rsplit('/').next().unwrap_or(&path).to_string();
    let mime = mime_for_extension(&basename);
    if let Some(expected) = font_magic(&mime)
        && !expected.iter().any(|magic| data.starts_with(magic))
    {
        diag.warn(
            WarnKind::BadFontMagic,
            url,
            format!("bytes do not look like {mime}"),
        );
        return None;
    }

    // Identical payloads (e.g. on a re-run) reuse the existing binary.
    let binary_id = match book
        .binaries
        .iter()
        .find(|b| b.content_type == mime && b.data == data)
    {
        Some(existing) => existing.id.clone(),
        None => {
            let id = mint_resource_id(book);
            book.binaries.push(Binary::new(id.clone(), mime.clone(), data));
            id
        }
    };

    Some(StylesheetResource {
        url: url.to_string(),
        binary_id,
        mime: mime.clone(),
        filename: resource_filename(&mime, &basename),
        from_fs: true,
    })
}

fn mint_resource_id(book: &Book) -> String {
    let mut n = 0usize;
    loop {
        let candidate = format!("css-res-{n}");
        if book.binary(&candidate).is_none() {
            return candidate;
        }
        n += 1;
    }
}

/// Fonts land under `fonts/`, everything else under `other/`.
fn resource_filename(mime: &str, basename: &str) -> String {
    if is_font_mime(mime) {
        format!("fonts/{basename}")
    } else {
        format!("other/{basename}")
    }
}

fn is_font_mime(mime: &str) -> bool {
    mime.starts_with("font/")
        || mime.starts_with("application/font-")
        || mime.starts_with("application/x-font-")
        || mime == "application/vnd.ms-fontobject"
}

fn mime_for_extension(name: &str) -> String {
    let ext = name
        .rsplit('.')
        .next()
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let mime = match ext.as_str() {
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "eot" => "application/vnd.ms-fontobject",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "css" => "text/css",
        _ => "application/octet-stream",
    };
    mime.to_string()
}

fn ext_for_mime(mime: &str) -> &str {
    match mime {
        "font/woff" => "woff",
        "font/woff2" => "woff2",
        "font/ttf" => "ttf",
        "font/otf" => "otf",
        "application/vnd.ms-fontobject" => "eot",
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/svg+xml" => "svg",
        "text/css" => "css",
        _ => "bin",
    }
}

/// Accepted magic prefixes for validated font types.
fn font_magic(mime: &str) -> Option<&'static [&'static [u8]]> {
    match mime {
        "font/woff" => Some(&[b"wOFF"]),
        "font/woff2" => Some(&[b"wOF2"]),
        "font/ttf" => Some(&[&[0x00, 0x01, 0x00, 0x00], b"true"]),
        "font/otf" => Some(&[b"OTTO"]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config_with_source(dir: &std::path::Path) -> NormalizeConfig {
        NormalizeConfig {
            source_path: Some(dir.join("book.fb2")),
            ..Default::default()
        }
    }

    #[test]
    fn test_embedded_binary_ref_resolves() {
        let mut book = Book::new();
        book.binaries
            .push(Binary::new("serif", "font/woff2", b"wOF2data".to_vec()));
        book.stylesheets.push(Stylesheet::css(
            "@font-face { src: url('#serif'); }",
        ));
        let config = NormalizeConfig::default();
        let mut diag = Diagnostics::new();

        let resources = normalize_stylesheets(&mut book, &config, &mut diag);
        assert_eq!(resources.len(), 1);
        let resource = &resources[0];
        assert_eq!(resource.binary_id, "serif");
        assert_eq!(resource.filename, "fonts/serif.woff2");
        assert!(!resource.from_fs);
        assert!(diag.is_empty());
    }

    #[test]
    fn test_missing_binary_warns_and_skips() {
        let mut book = Book::new();
        book.stylesheets
            .push(Stylesheet::css("p { background: url('#nope'); }"));
        let config = NormalizeConfig::default();
        let mut diag = Diagnostics::new();

        let resources = normalize_stylesheets(&mut book, &config, &mut diag);
        assert!(resources.is_empty());
        assert_eq!(diag.count(WarnKind::MissingBinary), 1);
    }

    #[test]
    fn test_filesystem_font_loaded_and_validated() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("fonts")).unwrap();
        let mut woff = b"wOFF".to_vec();
        woff.extend_from_slice(&[0u8; 16]);
        fs::write(dir.path().join("fonts/main.woff"), &woff).unwrap();

        let mut book = Book::new();
        book.stylesheets.push(Stylesheet::css(
            "@font-face { src: url('fonts/main.woff'); }",
        ));
        let config = config_with_source(dir.path());
        let mut diag = Diagnostics::new();

        let resources = normalize_stylesheets(&mut book, &config, &mut diag);
        assert_eq!(resources.len(), 1);
        let resource = &resources[0];
        assert_eq!(resource.mime, "font/woff");
        assert_eq!(resource.filename, "fonts/main.woff");
        assert!(resource.from_fs);
        assert_eq!(book.binary(&resource.binary_id).unwrap().data, woff);
    }

    #[test]
    fn test_bad_font_magic_dropped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("fake.ttf"), b"not a font at all").unwrap();

        let mut book = Book::new();
        book.stylesheets.push(Stylesheet::css(
            "@font-face { src: url('fake.ttf'); }",
        ));
        let config = config_with_source(dir.path());
        let mut diag = Diagnostics::new();

        let resources = normalize_stylesheets(&mut book, &config, &mut diag);
        assert!(resources.is_empty());
        assert_eq!(diag.count(WarnKind::BadFontMagic), 1);
        assert!(book.binaries.is_empty());
    }

    #[test]
    fn test_traversal_url_rejected() {
        let outer = TempDir::new().unwrap();
        fs::write(outer.path().join("passwd"), b"root:x").unwrap();
        let inner = outer.path().join("sub");
        fs::create_dir(&inner).unwrap();

        let mut book = Book::new();
        book.stylesheets.push(Stylesheet::css(
            "@font-face { src: url('../passwd'); }",
        ));
        let config = config_with_source(&inner);
        let mut diag = Diagnostics::new();

        let resources = normalize_stylesheets(&mut book, &config, &mut diag);
        assert!(resources.is_empty());
        assert!(book.binaries.is_empty());
        assert_eq!(diag.count(WarnKind::SandboxRejected), 1);
    }

    #[test]
    fn test_http_and_data_urls_skipped() {
        let mut book = Book::new();
        book.stylesheets.push(Stylesheet::css(
            "p { background: url('https://cdn.example/x.png'); } \
             q { background: url('data:image/png;base64,AAAA'); }",
        ));
        let config = NormalizeConfig::default();
        let mut diag = Diagnostics::new();

        let resources = normalize_stylesheets(&mut book, &config, &mut diag);
        assert!(resources.is_empty());
        // Only the http URL warns; data URLs are silently skipped.
        assert_eq!(diag.len(), 1);
        assert_eq!(diag.count(WarnKind::ExternalCssUrl), 1);
    }

    #[test]
    fn test_default_css_prepended_once_and_loses_to_user_rules() {
        let mut book = Book::new();
        book.stylesheets.push(Stylesheet::css(
            ".section-title-h2 { page-break-before: avoid; }",
        ));
        let config = NormalizeConfig {
            default_css: Some(
                ".section-title-h2 { page-break-before: always; }".to_string(),
            ),
            ..Default::default()
        };
        let mut diag = Diagnostics::new();

        normalize_stylesheets(&mut book, &config, &mut diag);
        assert!(book.stylesheets[0].default);
        // The book's own sheet comes later and overrides the default.
        assert_eq!(book.section_breaks.get(&2), Some(&false));

        // A second run does not prepend another copy.
        normalize_stylesheets(&mut book, &config, &mut diag);
        assert_eq!(book.stylesheets.iter().filter(|s| s.default).count(), 1);
    }
}
