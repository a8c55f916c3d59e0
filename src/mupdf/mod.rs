//! Low-level MuPDF wrapper
//!
//! MuPDF's `fz_context` is **not** thread-safe. Documents are therefore
//! reopened per operation inside [`SafeDocument`] and every call runs on
//! tokio's blocking pool.
//!
//! # Usage
//!
//! ```rust,ignore
//! use amnesia_reader::mupdf::{PageTextLayer, SafeDocument};
//!
//! let doc = SafeDocument::open(path, Some("secret"))?;
//! let text = doc.with_page(0, |page| Ok(PageTextLayer::extract(page)?.plain_text()))?;
//! ```

mod raster;
mod safe;
mod stext;

pub use raster::{encode_image, encode_pixmap, fit_scale, rasterize, rasterize_fit};
pub use safe::{page_rect, DocumentSource, SafeDocument};
pub use stext::{Glyph, LocatedMatch, PageTextLayer, TextLine};
