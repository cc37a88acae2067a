//! Normalization configuration.
//!
//! All knobs recognized by the pipeline live here: footnote body
//! recognition, the note label template, image processing policy, vignette
//! blobs, the optional default stylesheet, and the output target that
//! decides Kindle-specific behavior.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Output format family the normalized book is destined for.
///
/// Image recoding policy differs between EPUB-family and Kindle-family
/// targets: Kindle readers want opaque JPEG everywhere, EPUB readers keep
/// SVG and transparency as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    #[default]
    Epub,
    Kepub,
    Azw3,
    Kfx,
}

impl Target {
    /// Whether this target follows the Kindle image policy.
    pub fn kindle(self) -> bool {
        matches!(self, Target::Azw3 | Target::Kfx)
    }
}

/// Cover resize policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoverResize {
    /// Leave the cover alone.
    #[default]
    None,
    /// Preserve aspect ratio; only resize when the image is shorter than
    /// the target screen height.
    KeepAspectRatio,
    /// Stretch to exactly the target screen dimensions.
    Stretch,
}

/// Target screen dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Screen {
    pub width: u32,
    pub height: u32,
}

impl Default for Screen {
    fn default() -> Self {
        // Paperwhite-class screen.
        Self {
            width: 1072,
            height: 1448,
        }
    }
}

/// Image processing policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageConfig {
    /// Re-encode images when it may shrink them.
    pub optimize: bool,
    /// Keep original bytes for undecodable images instead of substituting
    /// the placeholder.
    pub use_broken: bool,
    /// Flatten transparency against white even for non-Kindle targets.
    pub remove_transparency: bool,
    /// JPEG encoder quality, 1..=100.
    pub jpeg_quality: u8,
    /// Non-cover scale factor; 0 or 1 disables scaling.
    pub scale_factor: f32,
    pub screen: Screen,
    pub cover: CoverResize,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            optimize: false,
            use_broken: false,
            remove_transparency: false,
            jpeg_quality: 75,
            scale_factor: 0.0,
            screen: Screen::default(),
            cover: CoverResize::None,
        }
    }
}

/// Named decorative-image positions a renderer can fill in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VignettePos {
    BookTitleTop,
    BookTitleBottom,
    ChapterTitleTop,
    ChapterTitleBottom,
    ChapterEnd,
    SectionTitleTop,
    SectionTitleBottom,
    SectionEnd,
}

impl VignettePos {
    /// Stable kebab-case name; also the stem of the minted binary id.
    pub fn as_str(self) -> &'static str {
        match self {
            VignettePos::BookTitleTop => "book-title-top",
            VignettePos::BookTitleBottom => "book-title-bottom",
            VignettePos::ChapterTitleTop => "chapter-title-top",
            VignettePos::ChapterTitleBottom => "chapter-title-bottom",
            VignettePos::ChapterEnd => "chapter-end",
            VignettePos::SectionTitleTop => "section-title-top",
            VignettePos::SectionTitleBottom => "section-title-bottom",
            VignettePos::SectionEnd => "section-end",
        }
    }
}

/// A vignette image supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vignette {
    pub data: Vec<u8>,
    pub content_type: String,
    /// Built-in vignettes get the Kindle stroke-width treatment when
    /// rasterized.
    pub builtin: bool,
}

/// Everything the normalization pipeline needs to know from the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeConfig {
    /// Body `name` attributes (case-insensitive) that mark a footnotes body.
    pub footnote_bodies: Vec<String>,
    /// Note label template over `{Context, BodyNumber, NoteNumber,
    /// BodyTitle, NoteTitle}`.
    pub note_template: String,
    pub images: ImageConfig,
    /// Vignette blobs keyed by position; each gets a binary minted for it.
    pub vignettes: BTreeMap<VignettePos, Vignette>,
    /// Default CSS prepended before the book's own stylesheets.
    pub default_css: Option<String>,
    /// Source file path; its directory is the sandbox root for embedded
    /// stylesheet resources.
    pub source_path: Option<PathBuf>,
    pub target: Target,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            footnote_bodies: vec!["notes".to_string(), "comments".to_string()],
            note_template: "{{.NoteNumber}}".to_string(),
            images: ImageConfig::default(),
            vignettes: BTreeMap::new(),
            default_css: None,
            source_path: None,
            target: Target::Epub,
        }
    }
}

impl NormalizeConfig {
    /// Whether a body `name` attribute marks a footnotes body.
    pub fn is_footnote_body(&self, name: &str) -> bool {
        !name.is_empty()
            && self
                .footnote_bodies
                .iter()
                .any(|n| n.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kindle_targets() {
        assert!(!Target::Epub.kindle());
        assert!(!Target::Kepub.kindle());
        assert!(Target::Azw3.kindle());
        assert!(Target::Kfx.kindle());
    }

    #[test]
    fn test_footnote_body_match_is_case_insensitive() {
        let config = NormalizeConfig::default();
        assert!(config.is_footnote_body("Notes"));
        assert!(config.is_footnote_body("COMMENTS"));
        assert!(!config.is_footnote_body("main"));
        assert!(!config.is_footnote_body(""));
    }
}
