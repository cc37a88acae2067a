//! # folio
//!
//! A FictionBook-2 normalization engine: parse an FB2 document into a
//! typed book model, then run the normalization pipeline that makes it a
//! closed, link-consistent value ready for EPUB/KEPUB/Kindle emission.
//!
//! ## What normalization does
//!
//! - Footnote bodies are flattened into addressable note sections with
//!   guaranteed titles and unique ids.
//! - Every internal reference is either valid or repaired: broken text
//!   links become plain text with a marker, broken image links are
//!   redirected to an embedded placeholder.
//! - Anonymous sections receive collision-free `sect_N` ids.
//! - Footnotes are numbered from a configurable template and every
//!   call-site's visible text is rewritten to match.
//! - Images are resized, recoded, and (for Kindle targets) rasterized and
//!   flattened for e-ink screens.
//! - Stylesheet resources resolve against embedded binaries or a
//!   sandboxed filesystem, and `page-break-before` hints are mined from
//!   the CSS.
//!
//! ## Quick start
//!
//! ```no_run
//! use folio::{Cancel, Diagnostics, NormalizeConfig, normalize_book, read_fb2};
//!
//! let mut diag = Diagnostics::new();
//! let mut book = read_fb2("input.fb2", &mut diag)?;
//!
//! let config = NormalizeConfig::default();
//! let result = normalize_book(&mut book, &config, &Cancel::new())?;
//!
//! // `book` is now self-consistent; `result` carries the indexes,
//! // prepared images, and accumulated warnings.
//! for warning in result.diagnostics.warnings() {
//!     eprintln!("{warning}");
//! }
//! # Ok::<(), folio::Error>(())
//! ```
//!
//! A successfully normalized book is produced whenever the input parses:
//! inconsistencies are repaired in place and surface only as warnings.

pub mod book;
pub mod config;
pub mod css;
pub mod diag;
pub mod error;
pub mod fb2;
pub mod io;
pub mod media;
pub mod normalize;
pub mod template;

pub use book::Book;
pub use config::{CoverResize, ImageConfig, NormalizeConfig, Screen, Target, Vignette, VignettePos};
pub use diag::{Diagnostics, WarnKind, Warning};
pub use error::{Error, Result};
pub use fb2::{parse_fb2, read_fb2};
pub use media::{BookImages, PreparedImage};
pub use normalize::{Cancel, NormalizedBook, normalize_book};
