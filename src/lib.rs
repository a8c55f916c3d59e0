//! Amnesia Reader
//!
//! Unified PDF/EPUB reading engine: one navigation, render, search and
//! selection contract over a MuPDF-backed PDF engine and a spine-based
//! EPUB engine that drives an external layout surface.
//!
//! # Modules
//!
//! - `document`: format-agnostic contract, reader state, config applier
//! - `formats`: the PDF and EPUB engines, plus [`AnyEngine`]
//! - `mupdf`: thread-safe MuPDF access and text layers
//! - `config`: engine settings from the environment
//! - `logging`: tracing subscriber setup

pub mod config;
pub mod document;
pub mod formats;
pub mod logging;
pub mod mupdf;

#[cfg(any(test, feature = "test-utils"))]
pub mod fixtures;

pub use config::EngineSettings;
pub use document::{
    DocumentEngine, DocumentError, DocumentFormat, ReaderConfig, ReaderState, ReadingMode,
    ReadingProgress, Result,
};
pub use formats::{detect_format, AnyEngine, EpubEngine, PdfEngine};
pub use logging::init_tracing;
