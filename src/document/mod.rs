//! Unified document abstraction
//!
//! Format-agnostic pieces shared by the PDF and EPUB engines: the
//! [`DocumentEngine`] contract, the reader state machine, reader
//! configuration and how it is applied, and the error type.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────────────┐
//!                 │   DocumentEngine     │  load / navigate / render /
//!                 │   (trait)            │  search / hit-test / config
//!                 └──────────┬───────────┘
//!            ┌───────────────┼────────────────┐
//!            ▼               ▼                ▼
//!   ┌──────────────┐ ┌──────────────┐ ┌──────────────┐
//!   │  PdfEngine   │ │  EpubEngine  │ │  AnyEngine   │
//!   │  (MuPDF)     │ │  (zip+spine) │ │  (dispatch)  │
//!   └──────┬───────┘ └──────┬───────┘ └──────────────┘
//!          │                │
//!          ▼                ▼
//!   ┌──────────────┐ ┌──────────────────────┐
//!   │ SafeDocument │ │ SurfaceBridge        │
//!   │ + text layer │ │ (external renderer)  │
//!   └──────────────┘ └──────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use amnesia_reader::{AnyEngine, DocumentEngine, EngineSettings};
//!
//! let mut engine = AnyEngine::open("book.pdf".as_ref(), None, EngineSettings::default()).await?;
//! engine.go_to_page(3);
//! let page = engine.render_page(engine.current_page()).await?;
//! let hits = engine.search_text("chapter").await;
//! ```

mod applier;
mod config;
mod error;
mod state;
mod task;
mod text;
mod traits;
mod types;

pub use applier::{RenderScale, Stylesheet, MAX_RENDER_SCALE, MIN_RENDER_SCALE, STYLE_ELEMENT_ID};
pub use config::{Margins, ModeSettings, PageTransition, Palette, ReaderConfig, ReadingMode, Theme};
pub use error::{DocumentError, ErrorCategory, Result};
pub use state::{Navigator, ReaderState};
pub use task::{run_blocking, run_scan, CancelFlag, CancelOnDrop};
pub use text::{context as match_context, find_all, slice as match_text, TextMatch};
pub use traits::DocumentEngine;
pub use types::{
    DocumentFormat, DocumentMetadata, ImageFormat, NavigationUnit, ReaderLink, ReadingProgress,
    Rect, RenderPayload, RenderedPage, SearchMatch, SearchOptions, TextSelection, Thumbnail,
    TocEntry,
};
