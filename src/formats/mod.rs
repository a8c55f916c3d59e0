//! Format-specific engines
//!
//! Each format module provides one type implementing
//! [`DocumentEngine`](crate::document::DocumentEngine). [`AnyEngine`] picks
//! the right one for a file and forwards every call to it.

pub mod epub;
pub mod pdf;

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

use crate::config::EngineSettings;
use crate::document::{
    DocumentEngine, DocumentError, DocumentFormat, DocumentMetadata, NavigationUnit,
    ReaderConfig, ReaderLink, ReaderState, ReadingMode, ReadingProgress, Rect, RenderedPage,
    Result, SearchMatch, SearchOptions, TextSelection, Thumbnail, TocEntry,
};

pub use epub::EpubEngine;
pub use pdf::PdfEngine;

/// Engine for whichever format a document turns out to be
pub enum AnyEngine {
    Pdf(PdfEngine),
    Epub(EpubEngine),
}

impl AnyEngine {
    /// Empty engine for `format`
    pub fn for_format(format: DocumentFormat, settings: EngineSettings) -> Self {
        match format {
            DocumentFormat::Pdf => AnyEngine::Pdf(PdfEngine::new(settings)),
            DocumentFormat::Epub => AnyEngine::Epub(EpubEngine::new(settings)),
        }
    }

    /// Sniff the format of `path`, then load it into a matching engine.
    ///
    /// Unknown formats fail with `UnsupportedFormat` before any parsing.
    pub async fn open(path: &Path, password: Option<&str>, settings: EngineSettings) -> Result<Self> {
        let format = detect_format(path)?;
        debug!(path = %path.display(), ?format, "detected document format");
        let mut engine = Self::for_format(format, settings);
        engine.load_document(path, password).await?;
        Ok(engine)
    }

    pub fn as_epub_mut(&mut self) -> Option<&mut EpubEngine> {
        match self {
            AnyEngine::Epub(engine) => Some(engine),
            AnyEngine::Pdf(_) => None,
        }
    }
}

/// Magic bytes first; the extension only decides for ZIP containers whose
/// first entry is not the EPUB mimetype
pub fn detect_format(path: &Path) -> Result<DocumentFormat> {
    let mut file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => DocumentError::NotFound(path.display().to_string()),
        _ => DocumentError::Io(e),
    })?;
    let mut head = Vec::with_capacity(128);
    file.by_ref().take(128).read_to_end(&mut head)?;

    if let Some(format) = DocumentFormat::from_magic_bytes(&head) {
        return Ok(format);
    }

    let by_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(DocumentFormat::from_extension);
    match by_extension {
        Some(DocumentFormat::Epub) if head.starts_with(b"PK\x03\x04") => Ok(DocumentFormat::Epub),
        _ => Err(DocumentError::UnsupportedFormat(format!(
            "unrecognised document {}",
            path.display()
        ))),
    }
}

macro_rules! dispatch {
    ($self:ident, $engine:ident => $body:expr) => {
        match $self {
            AnyEngine::Pdf($engine) => $body,
            AnyEngine::Epub($engine) => $body,
        }
    };
}

#[async_trait]
impl DocumentEngine for AnyEngine {
    fn format(&self) -> DocumentFormat {
        dispatch!(self, e => e.format())
    }

    fn navigation_unit(&self) -> NavigationUnit {
        dispatch!(self, e => e.navigation_unit())
    }

    async fn load_document(&mut self, path: &Path, password: Option<&str>) -> Result<()> {
        dispatch!(self, e => e.load_document(path, password).await)
    }

    fn close_document(&mut self) {
        dispatch!(self, e => e.close_document())
    }

    fn state(&self) -> ReaderState {
        dispatch!(self, e => e.state())
    }

    fn subscribe_state(&self) -> watch::Receiver<ReaderState> {
        dispatch!(self, e => e.subscribe_state())
    }

    fn page_count(&self) -> usize {
        dispatch!(self, e => e.page_count())
    }

    fn current_page(&self) -> usize {
        dispatch!(self, e => e.current_page())
    }

    fn go_to_page(&self, page: i64) -> bool {
        dispatch!(self, e => e.go_to_page(page))
    }

    fn go_to_position(&self, fraction: f32) -> bool {
        dispatch!(self, e => e.go_to_position(fraction))
    }

    fn can_go_to_next_page(&self) -> bool {
        dispatch!(self, e => e.can_go_to_next_page())
    }

    fn can_go_to_previous_page(&self) -> bool {
        dispatch!(self, e => e.can_go_to_previous_page())
    }

    fn reading_progress(&self) -> ReadingProgress {
        dispatch!(self, e => e.reading_progress())
    }

    fn subscribe_progress(&self) -> watch::Receiver<ReadingProgress> {
        dispatch!(self, e => e.subscribe_progress())
    }

    fn unit_positions(&self) -> Vec<f32> {
        dispatch!(self, e => e.unit_positions())
    }

    async fn render_page(&self, page: usize) -> Result<RenderedPage> {
        dispatch!(self, e => e.render_page(page).await)
    }

    async fn get_page_text(&self, page: usize) -> String {
        dispatch!(self, e => e.get_page_text(page).await)
    }

    async fn search_text_with(&self, query: &str, options: &SearchOptions) -> Vec<SearchMatch> {
        dispatch!(self, e => e.search_text_with(query, options).await)
    }

    async fn extract_page_thumbnail(&self, page: usize, width: u32, height: u32) -> Result<Thumbnail> {
        dispatch!(self, e => e.extract_page_thumbnail(page, width, height).await)
    }

    fn metadata(&self) -> Option<DocumentMetadata> {
        dispatch!(self, e => e.metadata())
    }

    async fn table_of_contents(&self) -> Vec<TocEntry> {
        dispatch!(self, e => e.table_of_contents().await)
    }

    async fn get_text_in_rect(&self, rect: Rect) -> String {
        dispatch!(self, e => e.get_text_in_rect(rect).await)
    }

    async fn get_word_at_position(&self, x: f32, y: f32) -> Option<TextSelection> {
        dispatch!(self, e => e.get_word_at_position(x, y).await)
    }

    async fn get_link_at_position(&self, x: f32, y: f32) -> Option<ReaderLink> {
        dispatch!(self, e => e.get_link_at_position(x, y).await)
    }

    fn update_config(&mut self, config: ReaderConfig) {
        dispatch!(self, e => e.update_config(config))
    }

    fn update_reading_mode(&mut self, mode: ReadingMode) {
        dispatch!(self, e => e.update_reading_mode(mode))
    }

    fn config(&self) -> &ReaderConfig {
        dispatch!(self, e => e.config())
    }

    fn reading_mode(&self) -> ReadingMode {
        dispatch!(self, e => e.reading_mode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, EpubChapter};

    #[tokio::test]
    async fn test_open_detects_pdf() {
        let file = fixtures::write_temp(&fixtures::pdf_with_pages(3), ".pdf");
        let engine = AnyEngine::open(file.path(), None, EngineSettings::default())
            .await
            .unwrap();
        assert!(matches!(engine, AnyEngine::Pdf(_)));
        assert_eq!(engine.format(), DocumentFormat::Pdf);
        assert_eq!(engine.page_count(), 3);
        assert_eq!(engine.navigation_unit(), NavigationUnit::Page);
    }

    #[tokio::test]
    async fn test_open_detects_epub() {
        let bytes = fixtures::epub_with_chapters(&[
            EpubChapter::new("One", "<p>alpha</p>"),
            EpubChapter::new("Two", "<p>beta</p>"),
        ]);
        let file = fixtures::write_temp(&bytes, ".epub");
        let mut engine = AnyEngine::open(file.path(), None, EngineSettings::default())
            .await
            .unwrap();
        assert_eq!(engine.format(), DocumentFormat::Epub);
        assert_eq!(engine.page_count(), 2);
        assert!(engine.as_epub_mut().is_some());

        assert!(engine.go_to_next_page());
        assert_eq!(engine.search_text("beta").await[0].page_number, 1);
        assert_eq!(engine.reading_progress().fraction(), 1.0);
    }

    #[tokio::test]
    async fn test_unknown_format_rejected() {
        let file = fixtures::write_temp(b"\x00\x01\x02\x03 definitely not a book", ".txt");
        let err = AnyEngine::open(file.path(), None, EngineSettings::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DocumentError::UnsupportedFormat(_)));

        let missing = detect_format(Path::new("/nonexistent/book.pdf")).unwrap_err();
        assert!(matches!(missing, DocumentError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_state_subscription_sees_ready() {
        let mut engine = AnyEngine::for_format(DocumentFormat::Pdf, EngineSettings::default());
        let mut states = engine.subscribe_state();
        assert_eq!(*states.borrow_and_update(), ReaderState::Initial);

        let file = fixtures::write_temp(&fixtures::pdf_with_pages(2), ".pdf");
        engine.load_document(file.path(), None).await.unwrap();
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), ReaderState::Ready { page_count: 2 });
    }
}
