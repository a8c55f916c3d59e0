//! Document engine contract
//!
//! One navigation/render/search/selection surface implemented by every
//! format engine.

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::watch;

use super::config::{ReaderConfig, ReadingMode};
use super::error::Result;
use super::state::ReaderState;
use super::types::{
    DocumentFormat, DocumentMetadata, NavigationUnit, ReaderLink, ReadingProgress, Rect,
    RenderedPage, SearchMatch, SearchOptions, TextSelection, Thumbnail, TocEntry,
};

/// Format-agnostic reading engine
///
/// Calls made while the engine is not Ready fail safely: navigation
/// returns `false`, queries return empty values, and fallible operations
/// return an error. None of them panic.
#[async_trait]
pub trait DocumentEngine: Send + Sync {
    fn format(&self) -> DocumentFormat;

    /// What a "page" means for this engine
    fn navigation_unit(&self) -> NavigationUnit {
        self.format().navigation_unit()
    }

    // --- lifecycle ---

    /// Open `path`, releasing any document already held.
    ///
    /// On success the state becomes Ready at page 0. On failure it becomes
    /// Error and the error is returned.
    async fn load_document(&mut self, path: &Path, password: Option<&str>) -> Result<()>;

    /// Release the document and return to Initial. Idempotent.
    fn close_document(&mut self);

    fn state(&self) -> ReaderState;

    fn subscribe_state(&self) -> watch::Receiver<ReaderState>;

    fn is_document_loaded(&self) -> bool {
        self.state().is_ready()
    }

    fn page_count(&self) -> usize;

    fn current_page(&self) -> usize;

    // --- navigation ---

    /// Move to `page` clamped into the document; true iff the index changed
    fn go_to_page(&self, page: i64) -> bool;

    fn go_to_next_page(&self) -> bool {
        self.go_to_page(self.current_page() as i64 + 1)
    }

    fn go_to_previous_page(&self) -> bool {
        self.go_to_page(self.current_page() as i64 - 1)
    }

    /// Jump to `floor(fraction * (page_count - 1))`
    fn go_to_position(&self, fraction: f32) -> bool;

    fn can_go_to_next_page(&self) -> bool;

    fn can_go_to_previous_page(&self) -> bool;

    /// `(current_page, page_count)` for the persistence collaborator
    fn reading_progress(&self) -> ReadingProgress;

    /// Updated after every successful navigation, load and close
    fn subscribe_progress(&self) -> watch::Receiver<ReadingProgress>;

    /// Fraction of the document at which each navigation unit starts
    fn unit_positions(&self) -> Vec<f32>;

    // --- content ---

    async fn render_page(&self, page: usize) -> Result<RenderedPage>;

    /// Plain text of one page/unit; empty when unavailable
    async fn get_page_text(&self, page: usize) -> String;

    async fn search_text(&self, query: &str) -> Vec<SearchMatch> {
        self.search_text_with(query, &SearchOptions::default()).await
    }

    /// Scan the whole document. Results ascend by page, then position.
    async fn search_text_with(&self, query: &str, options: &SearchOptions) -> Vec<SearchMatch>;

    async fn extract_page_thumbnail(&self, page: usize, width: u32, height: u32)
        -> Result<Thumbnail>;

    fn metadata(&self) -> Option<DocumentMetadata>;

    async fn table_of_contents(&self) -> Vec<TocEntry>;

    // --- hit testing (screen space of the current rendering) ---

    async fn get_text_in_rect(&self, rect: Rect) -> String;

    async fn get_word_at_position(&self, x: f32, y: f32) -> Option<TextSelection>;

    async fn get_link_at_position(&self, x: f32, y: f32) -> Option<ReaderLink>;

    // --- configuration ---

    /// Replace the reader configuration. Never changes the current page.
    fn update_config(&mut self, config: ReaderConfig);

    fn update_reading_mode(&mut self, mode: ReadingMode);

    fn config(&self) -> &ReaderConfig;

    fn reading_mode(&self) -> ReadingMode;
}
