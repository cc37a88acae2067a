//! FictionBook-2 reading.
//!
//! A permissive, event-driven FB2 reader: unknown elements are skipped,
//! missing attributes tolerated, and undecodable binaries dropped with a
//! warning. The goal is a usable [`Book`](crate::book::Book) from any
//! document that is well-formed XML, not schema validation.

mod parser;

pub use parser::parse_fb2;

use std::path::Path;

use crate::book::Book;
use crate::diag::Diagnostics;
use crate::error::Result;

/// Read and parse an FB2 file from disk.
pub fn read_fb2(path: impl AsRef<Path>, diag: &mut Diagnostics) -> Result<Book> {
    let data = std::fs::read(path)?;
    parse_fb2(&data, diag)
}
