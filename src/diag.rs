//! Diagnostic stream for non-fatal normalization findings.
//!
//! Every repair the pipeline performs (dropped duplicate, rewritten link,
//! substituted image, skipped stylesheet resource) leaves a [`Warning`] here
//! so the caller can surface it. Warnings are also mirrored to the `tracing`
//! subscriber at warn level; the library never installs a subscriber itself.
//!
//! Warning order is deterministic for a given input because every pipeline
//! pass visits the tree in declared source order.

use std::fmt;

/// What kind of inconsistency was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarnKind {
    /// A footnote section reuses an id already taken by an earlier note.
    DuplicateNoteId,
    /// A binary reuses an id already taken by an earlier binary.
    DuplicateBinaryId,
    /// An internal link points at an id that exists nowhere in the book.
    BrokenInternalLink,
    /// A link href is neither internal nor a recognized external URL.
    BrokenExternalLink,
    /// A link href is the empty string.
    EmptyHref,
    /// A recorded reference path no longer resolves to a tree node.
    UnresolvedPath,
    /// CSS references `#id` but no such binary exists.
    MissingBinary,
    /// CSS references an http(s) resource, which is never fetched.
    ExternalCssUrl,
    /// A stylesheet path was absolute or escaped the sandbox root.
    SandboxRejected,
    /// A stylesheet resource could not be read from the filesystem.
    ResourceUnreadable,
    /// Loaded font bytes do not match the magic for their declared type.
    BadFontMagic,
    /// An embedded base-64 binary payload could not be decoded.
    BadBinaryPayload,
    /// An image could not be decoded; a placeholder was substituted.
    ImageDecode,
    /// An image could not be re-encoded; original bytes were kept.
    ImageEncode,
    /// The footnote label template failed; the default "b.n" form was used.
    TemplateFallback,
}

impl WarnKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WarnKind::DuplicateNoteId => "duplicate-note-id",
            WarnKind::DuplicateBinaryId => "duplicate-binary-id",
            WarnKind::BrokenInternalLink => "broken-internal-link",
            WarnKind::BrokenExternalLink => "broken-external-link",
            WarnKind::EmptyHref => "empty-href",
            WarnKind::UnresolvedPath => "unresolved-path",
            WarnKind::MissingBinary => "missing-binary",
            WarnKind::ExternalCssUrl => "external-css-url",
            WarnKind::SandboxRejected => "sandbox-rejected",
            WarnKind::ResourceUnreadable => "resource-unreadable",
            WarnKind::BadFontMagic => "bad-font-magic",
            WarnKind::BadBinaryPayload => "bad-binary-payload",
            WarnKind::ImageDecode => "image-decode",
            WarnKind::ImageEncode => "image-encode",
            WarnKind::TemplateFallback => "template-fallback",
        }
    }
}

/// A single non-fatal finding with its structured context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub kind: WarnKind,
    /// The id, href, or path the finding is about.
    pub subject: String,
    /// Human-readable detail.
    pub detail: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.kind.as_str(), self.subject, self.detail)
    }
}

/// Accumulates warnings across a pipeline run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning and mirror it to the `tracing` subscriber.
    pub fn warn(&mut self, kind: WarnKind, subject: impl Into<String>, detail: impl Into<String>) {
        let warning = Warning {
            kind,
            subject: subject.into(),
            detail: detail.into(),
        };
        tracing::warn!(
            kind = warning.kind.as_str(),
            subject = %warning.subject,
            "{}",
            warning.detail
        );
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    /// Count warnings of one kind.
    pub fn count(&self, kind: WarnKind) -> usize {
        self.warnings.iter().filter(|w| w.kind == kind).count()
    }
}
