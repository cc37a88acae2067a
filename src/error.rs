//! Error types for folio operations.

use thiserror::Error;

/// Errors that can occur while reading or normalizing a book.
///
/// Only genuinely fatal conditions surface here: I/O failures reading the
/// input, unparseable FB2 documents, and cancellation observed between
/// pipeline passes. Inconsistencies inside an otherwise parseable book
/// (duplicate ids, broken links, undecodable images) are repaired in place
/// and reported through [`crate::diag::Diagnostics`] instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Invalid FB2: {0}")]
    InvalidFb2(String),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("normalization cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
