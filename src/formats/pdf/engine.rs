//! PDF reading engine
//!
//! Pages are rasterised by MuPDF at the render scale derived from the
//! reader config. Text, search, selection and link geometry come from the
//! page text layer in page space and are multiplied by the render scale
//! before they reach the caller.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::extract::{check_pdf_header, link_at, read_metadata, read_outline};
use crate::config::EngineSettings;
use crate::document::{
    run_blocking, run_scan, DocumentEngine, DocumentError, DocumentFormat, DocumentMetadata,
    Navigator, ReaderConfig, ReaderLink, ReaderState, ReadingMode, ReadingProgress, Rect,
    RenderPayload, RenderScale, RenderedPage, Result, SearchMatch, SearchOptions, TextSelection,
    Thumbnail, TocEntry,
};
use crate::mupdf::{rasterize, rasterize_fit, PageTextLayer, SafeDocument};

pub struct PdfEngine {
    settings: EngineSettings,
    config: ReaderConfig,
    mode: ReadingMode,
    scale: RenderScale,
    navigator: Navigator,
    document: Option<Arc<SafeDocument>>,
    metadata: Option<DocumentMetadata>,
    document_id: Option<Uuid>,
}

impl Default for PdfEngine {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

impl PdfEngine {
    pub fn new(settings: EngineSettings) -> Self {
        let config = ReaderConfig::default();
        Self {
            settings,
            scale: RenderScale::from_config(&config),
            config,
            mode: ReadingMode::default_for(DocumentFormat::Pdf),
            navigator: Navigator::new(),
            document: None,
            metadata: None,
            document_id: None,
        }
    }

    /// Current render scale (clamped font size)
    pub fn render_scale(&self) -> f32 {
        self.scale.get()
    }

    fn loaded(&self) -> Result<Arc<SafeDocument>> {
        match &self.document {
            Some(doc) if self.navigator.is_ready() => Ok(doc.clone()),
            _ => Err(DocumentError::NotLoaded),
        }
    }

    fn check_page(&self, page: usize) -> Result<()> {
        let count = self.navigator.page_count();
        if page >= count {
            return Err(DocumentError::PageOutOfRange { index: page, count });
        }
        Ok(())
    }

    /// Text layer of the page currently shown
    async fn current_layer(&self) -> Option<PageTextLayer> {
        let doc = self.loaded().ok()?;
        let page = self.navigator.current_page();
        run_blocking("pdf.text_layer", self.settings.render_timeout, move || {
            doc.with_page(page, PageTextLayer::extract)
        })
        .await
        .map_err(|e| debug!(page, error = %e, "text layer unavailable"))
        .ok()
    }
}

#[async_trait]
impl DocumentEngine for PdfEngine {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pdf
    }

    async fn load_document(&mut self, path: &Path, password: Option<&str>) -> Result<()> {
        self.close_document();
        self.navigator.begin_loading();

        let id = Uuid::new_v4();
        info!(document_id = %id, path = %path.display(), "loading PDF");

        let owned_path = path.to_path_buf();
        let password = password.map(str::to_string);
        let opened = run_blocking("pdf.open", self.settings.parse_timeout, move || {
            check_pdf_header(&owned_path)?;
            let doc = SafeDocument::open(&owned_path, password.as_deref())?;
            let metadata = doc.with_doc(|d| Ok(read_metadata(d)))?;
            Ok((doc, metadata))
        })
        .await;

        match opened {
            Ok((doc, metadata)) => {
                let page_count = doc.page_count();
                self.document = Some(Arc::new(doc));
                self.metadata = Some(metadata);
                self.document_id = Some(id);
                self.navigator.finish_loading(page_count);
                info!(document_id = %id, page_count, "PDF ready");
                Ok(())
            }
            Err(e) => {
                warn!(document_id = %id, path = %path.display(), error = %e, "failed to load PDF");
                self.navigator.fail(e.to_string());
                Err(e)
            }
        }
    }

    fn close_document(&mut self) {
        let had_document = self.document.take().is_some();
        self.metadata = None;
        if let Some(id) = self.document_id.take() {
            debug!(document_id = %id, "closing PDF");
        }
        if had_document || self.navigator.state() != ReaderState::Initial {
            self.navigator.reset();
        }
    }

    fn state(&self) -> ReaderState {
        self.navigator.state()
    }

    fn subscribe_state(&self) -> watch::Receiver<ReaderState> {
        self.navigator.subscribe_state()
    }

    fn page_count(&self) -> usize {
        self.navigator.page_count()
    }

    fn current_page(&self) -> usize {
        self.navigator.current_page()
    }

    fn go_to_page(&self, page: i64) -> bool {
        let moved = self.navigator.go_to(page);
        if moved {
            debug!(page = self.navigator.current_page(), "navigated");
        }
        moved
    }

    fn go_to_position(&self, fraction: f32) -> bool {
        match self.navigator.position_target(fraction) {
            Some(target) => self.go_to_page(target as i64),
            None => false,
        }
    }

    fn can_go_to_next_page(&self) -> bool {
        self.navigator.can_go_next()
    }

    fn can_go_to_previous_page(&self) -> bool {
        self.navigator.can_go_previous()
    }

    fn reading_progress(&self) -> ReadingProgress {
        self.navigator.progress()
    }

    fn subscribe_progress(&self) -> watch::Receiver<ReadingProgress> {
        self.navigator.subscribe_progress()
    }

    fn unit_positions(&self) -> Vec<f32> {
        self.navigator.unit_positions()
    }

    async fn render_page(&self, page: usize) -> Result<RenderedPage> {
        let doc = self.loaded()?;
        self.check_page(page)?;
        let scale = self.scale.get();
        let format = self.settings.page_format;

        run_blocking("pdf.render", self.settings.render_timeout, move || {
            doc.with_page(page, |p| {
                let (data, width, height) = rasterize(p, scale, format)?;
                Ok(RenderedPage {
                    page_number: page,
                    width,
                    height,
                    payload: RenderPayload::Raster { format, data },
                })
            })
        })
        .await
    }

    async fn get_page_text(&self, page: usize) -> String {
        let Ok(doc) = self.loaded() else {
            return String::new();
        };
        if self.check_page(page).is_err() {
            return String::new();
        }
        run_blocking("pdf.text", self.settings.render_timeout, move || {
            doc.with_page(page, |p| Ok(PageTextLayer::extract(p)?.plain_text()))
        })
        .await
        .unwrap_or_else(|e| {
            debug!(page, error = %e, "text extraction failed");
            String::new()
        })
    }

    async fn search_text_with(&self, query: &str, options: &SearchOptions) -> Vec<SearchMatch> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        let Ok(doc) = self.loaded() else {
            return Vec::new();
        };

        let scale = self.scale.get();
        let query = query.to_string();
        let options = options.clone();
        let page_count = doc.page_count();

        // One page per lock so renders and hit tests interleave with the scan
        let result = run_scan("pdf.search", self.settings.search_timeout, move |cancel| {
            let mut matches = Vec::new();
            for page_number in 0..page_count {
                if cancel.is_cancelled() {
                    debug!(page_number, "search cancelled");
                    break;
                }
                let layer = match doc.with_page(page_number, PageTextLayer::extract) {
                    Ok(layer) => layer,
                    Err(e) => {
                        debug!(page_number, error = %e, "skipping page in search");
                        continue;
                    }
                };
                for m in layer.find(&query, options.case_sensitive, options.context_length) {
                    matches.push(SearchMatch {
                        page_number,
                        text: m.text,
                        rect: m.rect.scale(scale),
                        position: m.position,
                        prefix: m.prefix,
                        suffix: m.suffix,
                    });
                    if options.limit.is_some_and(|limit| matches.len() >= limit) {
                        return Ok(matches);
                    }
                }
            }
            Ok(matches)
        })
        .await;

        match result {
            Ok(matches) => {
                debug!(count = matches.len(), "PDF search finished");
                matches
            }
            Err(e) => {
                warn!(error = %e, "PDF search failed");
                Vec::new()
            }
        }
    }

    async fn extract_page_thumbnail(&self, page: usize, width: u32, height: u32) -> Result<Thumbnail> {
        let doc = self.loaded()?;
        self.check_page(page)?;
        let format = self.settings.thumbnail_format;

        run_blocking("pdf.thumbnail", self.settings.render_timeout, move || {
            doc.with_page(page, |p| {
                let (image, w, h) = rasterize_fit(p, width, height, format)?;
                Ok(Thumbnail {
                    page_number: page,
                    width: w,
                    height: h,
                    format,
                    image,
                })
            })
        })
        .await
    }

    fn metadata(&self) -> Option<DocumentMetadata> {
        self.metadata.clone()
    }

    async fn table_of_contents(&self) -> Vec<TocEntry> {
        let Ok(doc) = self.loaded() else {
            return Vec::new();
        };
        run_blocking("pdf.outline", self.settings.parse_timeout, move || {
            doc.with_doc(read_outline)
        })
        .await
        .unwrap_or_else(|e| {
            debug!(error = %e, "no outline");
            Vec::new()
        })
    }

    async fn get_text_in_rect(&self, rect: Rect) -> String {
        let scale = self.scale.get();
        match self.current_layer().await {
            Some(layer) => layer.text_in_rect(&rect.scale(1.0 / scale)),
            None => String::new(),
        }
    }

    async fn get_word_at_position(&self, x: f32, y: f32) -> Option<TextSelection> {
        let scale = self.scale.get();
        let layer = self.current_layer().await?;
        let (text, rect) = layer.word_at(x / scale, y / scale)?;
        Some(TextSelection {
            text,
            rect: rect.scale(scale),
            page_number: self.navigator.current_page(),
        })
    }

    async fn get_link_at_position(&self, x: f32, y: f32) -> Option<ReaderLink> {
        let doc = self.loaded().ok()?;
        let page = self.navigator.current_page();
        let scale = self.scale.get();
        let (px, py) = (x / scale, y / scale);

        let link = run_blocking("pdf.links", self.settings.render_timeout, move || {
            doc.with_page(page, |p| link_at(p, px, py))
        })
        .await
        .map_err(|e| debug!(page, error = %e, "link lookup failed"))
        .ok()??;

        Some(ReaderLink {
            rect: link.rect.scale(scale),
            ..link
        })
    }

    fn update_config(&mut self, config: ReaderConfig) {
        self.scale = RenderScale::from_config(&config);
        self.config = config;
        debug!(scale = self.scale.get(), "PDF render scale updated");
    }

    fn update_reading_mode(&mut self, mode: ReadingMode) {
        self.mode = mode;
        debug!(?mode, "PDF reading mode updated");
    }

    fn config(&self) -> &ReaderConfig {
        &self.config
    }

    fn reading_mode(&self) -> ReadingMode {
        self.mode
    }
}
