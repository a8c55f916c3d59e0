//! PDF format implementation
//!
//! [`PdfEngine`] implements the reading contract on top of MuPDF through
//! [`SafeDocument`](crate::mupdf::SafeDocument). Pages are raster output;
//! hit testing runs on the page text layer.

mod engine;
mod extract;

pub use engine::PdfEngine;
