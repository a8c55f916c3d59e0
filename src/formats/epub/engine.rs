//! EPUB reading engine
//!
//! A "page" here is one spine unit. The engine reads the unit's markup
//! from the archive, injects the stylesheet computed from the reader
//! config and hands the result to the rendering surface. Layout inside a
//! unit belongs to the surface, so selection and link hit tests are
//! questions sent over the [`SurfaceBridge`].

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;
use zip::ZipArchive;

use super::content::markup_to_text;
use super::package::{read_text, EpubPackage, SpineUnit};
use super::surface::{SurfaceBridge, SurfaceCommand};
use crate::config::EngineSettings;
use crate::formats::detect_format;
use crate::document::{
    find_all, match_context, match_text, run_blocking, run_scan, DocumentEngine, DocumentError,
    DocumentFormat, DocumentMetadata, Navigator, ReaderConfig, ReaderLink, ReaderState,
    ReadingMode, ReadingProgress, Rect, RenderPayload, RenderedPage, Result, SearchMatch,
    SearchOptions, Stylesheet, TextSelection, Thumbnail, TocEntry,
};
use crate::mupdf::{rasterize_fit, SafeDocument};

/// Base font size in points for MuPDF's HTML layout. The injected
/// stylesheet already scales body text by the configured font size.
const THUMBNAIL_BASE_EM: f32 = 12.0;

/// Open archive plus its parsed package
struct EpubBook {
    archive: Mutex<ZipArchive<BufReader<File>>>,
    package: EpubPackage,
    toc: Vec<TocEntry>,
}

impl EpubBook {
    fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;
        let package = EpubPackage::from_archive(&mut archive)?;

        let toc = match &package.ncx_path {
            Some(ncx_path) => read_text(&mut archive, ncx_path)
                .and_then(|xml| package.parse_ncx(&xml))
                .unwrap_or_else(|e| {
                    warn!(ncx = %ncx_path, error = %e, "unreadable NCX, using spine order");
                    Vec::new()
                }),
            None => Vec::new(),
        };
        let toc = if toc.is_empty() { package.spine_toc() } else { toc };

        Ok(Self {
            archive: Mutex::new(archive),
            package,
            toc,
        })
    }

    fn unit(&self, index: usize) -> Result<&SpineUnit> {
        self.package
            .spine
            .get(index)
            .ok_or(DocumentError::PageOutOfRange {
                index,
                count: self.package.spine.len(),
            })
    }

    fn unit_markup(&self, index: usize) -> Result<String> {
        let unit = self.unit(index)?;
        let mut archive = self.archive.lock();
        read_text(&mut *archive, &unit.path)
    }

    fn unit_text(&self, index: usize) -> Result<String> {
        Ok(markup_to_text(&self.unit_markup(index)?))
    }

    /// Whether unit `index` names an entry the archive actually has
    fn has_unit(&self, index: usize) -> bool {
        self.unit(index)
            .is_ok_and(|unit| self.package.contains_entry(&unit.path))
    }

    /// `(archive path, styled markup)` for a unit
    fn styled_unit(&self, index: usize, stylesheet: &Stylesheet) -> Result<(String, String)> {
        let href = self.unit(index)?.path.clone();
        let html = stylesheet.inject(&self.unit_markup(index)?)?;
        Ok((href, html))
    }
}

/// What the surface should show, shared with presentation jobs
#[derive(Debug)]
struct Presenter {
    stylesheet: Stylesheet,
    /// Ticket of the most recent presentation request
    latest: u64,
}

/// Read unit `index`, style it and hand it to the surface, unless a newer
/// request came in while the unit was being read
fn present_unit(
    book: &EpubBook,
    index: usize,
    ticket: u64,
    presenter: &Mutex<Presenter>,
    surface: &SurfaceBridge,
) -> Result<()> {
    let href = book.unit(index)?.path.clone();
    let markup = book.unit_markup(index)?;

    // Styling and sending happen under the lock so a concurrent restyle is
    // either already in the markup or follows it on the channel
    let presenter = presenter.lock();
    if presenter.latest != ticket {
        debug!(unit = index, "presentation superseded");
        return Ok(());
    }
    let html = presenter.stylesheet.inject(&markup)?;
    surface.notify(SurfaceCommand::Load {
        page_number: index,
        href,
        html,
    });
    Ok(())
}

/// Lay styled unit markup out with MuPDF's HTML engine and run `f` on
/// the result
fn with_thumbnail_layout<F, R>(html: String, viewport: (u32, u32), f: F) -> Result<R>
where
    F: FnOnce(&mut mupdf::Document) -> Result<R>,
{
    let doc = SafeDocument::from_bytes(html.into_bytes(), "text/html")?;
    doc.with_doc_mut(|d| {
        d.layout(viewport.0 as f32, viewport.1 as f32, THUMBNAIL_BASE_EM)?;
        f(d)
    })
}

/// Reject anything that is not an EPUB container before unzipping it
fn check_epub_header(path: &Path) -> Result<()> {
    match detect_format(path)? {
        DocumentFormat::Epub => Ok(()),
        other => Err(DocumentError::UnsupportedFormat(format!(
            "{} is {}, not an EPUB container",
            path.display(),
            other.mime_type()
        ))),
    }
}

/// Scheme-qualified hrefs (`https:`, `mailto:`) leave the book
fn is_external(href: &str) -> bool {
    match href.split_once(':') {
        Some((scheme, _)) => {
            !scheme.is_empty()
                && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

pub struct EpubEngine {
    settings: EngineSettings,
    config: ReaderConfig,
    mode: ReadingMode,
    presenter: Arc<Mutex<Presenter>>,
    navigator: Navigator,
    book: Option<Arc<EpubBook>>,
    surface: Option<SurfaceBridge>,
    metadata: Option<DocumentMetadata>,
    document_id: Option<Uuid>,
}

impl Default for EpubEngine {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

impl EpubEngine {
    pub fn new(settings: EngineSettings) -> Self {
        let config = ReaderConfig::default();
        let mode = ReadingMode::default_for(DocumentFormat::Epub);
        let presenter = Presenter {
            stylesheet: Stylesheet::from_config(&config, mode, settings.viewport),
            latest: 0,
        };
        Self {
            presenter: Arc::new(Mutex::new(presenter)),
            settings,
            config,
            mode,
            navigator: Navigator::new(),
            book: None,
            surface: None,
            metadata: None,
            document_id: None,
        }
    }

    pub fn attach_surface(&mut self, surface: SurfaceBridge) {
        self.surface = Some(surface);
    }

    /// Create a surface channel from the engine settings and attach it.
    /// The caller drives the returned receiver.
    pub fn connect_surface(&mut self) -> mpsc::Receiver<SurfaceCommand> {
        let (bridge, rx) = SurfaceBridge::channel(
            self.settings.surface_channel_capacity,
            self.settings.surface_timeout,
        );
        self.attach_surface(bridge);
        rx
    }

    /// Stylesheet currently injected into every unit
    pub fn stylesheet(&self) -> Stylesheet {
        self.presenter.lock().stylesheet.clone()
    }

    fn loaded(&self) -> Result<Arc<EpubBook>> {
        match &self.book {
            Some(book) if self.navigator.is_ready() => Ok(book.clone()),
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

    /// Live surface, if one is attached and still listening
    fn surface(&self) -> Option<&SurfaceBridge> {
        self.surface.as_ref().filter(|s| !s.is_closed())
    }

    /// Hand unit `index` to the surface.
    ///
    /// The unit is read and styled on the blocking pool; the caller only
    /// takes a ticket. Without a surface there is nothing to do.
    fn present(&self, index: usize) {
        let Some(surface) = self.surface().cloned() else {
            return;
        };
        let Ok(book) = self.loaded() else {
            return;
        };
        let presenter = self.presenter.clone();
        let ticket = {
            let mut p = presenter.lock();
            p.latest += 1;
            p.latest
        };

        let job = move || {
            if let Err(e) = present_unit(&book, index, ticket, &presenter, &surface) {
                warn!(unit = index, error = %e, "cannot present spine unit");
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(job);
            }
            Err(_) => job(),
        }
    }

    fn restyle(&mut self) {
        let stylesheet = Stylesheet::from_config(&self.config, self.mode, self.settings.viewport);
        let mut presenter = self.presenter.lock();
        if let Some(surface) = self.surface() {
            surface.notify(SurfaceCommand::ApplyStyles {
                stylesheet: stylesheet.css().to_string(),
            });
        }
        presenter.stylesheet = stylesheet;
    }

    fn resolve_link(&self, href: &str) -> (Option<usize>, Option<String>) {
        if is_external(href) {
            return (None, Some(href.to_string()));
        }
        let current = self.navigator.current_page();
        if href.starts_with('#') {
            return (Some(current), None);
        }
        match self
            .book
            .as_ref()
            .and_then(|book| book.package.spine_index_for_href(current, href))
        {
            Some(index) => (Some(index), None),
            None => {
                debug!(href, "link does not resolve to a spine unit");
                (None, Some(href.to_string()))
            }
        }
    }
}

#[async_trait]
impl DocumentEngine for EpubEngine {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Epub
    }

    async fn load_document(&mut self, path: &Path, password: Option<&str>) -> Result<()> {
        self.close_document();
        self.navigator.begin_loading();

        let id = Uuid::new_v4();
        info!(document_id = %id, path = %path.display(), "loading EPUB");
        if password.is_some() {
            debug!(document_id = %id, "password ignored for EPUB");
        }

        let owned_path = path.to_path_buf();
        let opened = run_blocking("epub.open", self.settings.parse_timeout, move || {
            check_epub_header(&owned_path)?;
            EpubBook::open(&owned_path)
        })
        .await;

        match opened {
            Ok(book) => {
                let unit_count = book.package.spine.len();
                self.metadata = Some(book.package.metadata.clone());
                self.book = Some(Arc::new(book));
                self.document_id = Some(id);
                self.navigator.finish_loading(unit_count);
                info!(document_id = %id, unit_count, "EPUB ready");

                self.present(0);
                Ok(())
            }
            Err(e) => {
                warn!(document_id = %id, path = %path.display(), error = %e, "failed to load EPUB");
                self.navigator.fail(e.to_string());
                Err(e)
            }
        }
    }

    fn close_document(&mut self) {
        let had_book = self.book.take().is_some();
        self.metadata = None;
        if let Some(id) = self.document_id.take() {
            debug!(document_id = %id, "closing EPUB");
        }
        if had_book || self.navigator.state() != ReaderState::Initial {
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
        let Some(target) = self.navigator.clamp(page) else {
            return false;
        };
        if target == self.navigator.current_page() {
            return false;
        }
        if !self.book.as_ref().is_some_and(|book| book.has_unit(target)) {
            warn!(unit = target, "spine unit missing from archive");
            return false;
        }
        let moved = self.navigator.go_to(target as i64);
        if moved {
            debug!(unit = target, "navigated");
            self.present(target);
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
        let book = self.loaded()?;
        self.check_page(page)?;
        let stylesheet = self.stylesheet();
        let (width, height) = self.settings.viewport;

        run_blocking("epub.render", self.settings.render_timeout, move || {
            let (href, html) = book.styled_unit(page, &stylesheet)?;
            Ok(RenderedPage {
                page_number: page,
                width,
                height,
                payload: RenderPayload::Markup { href, html },
            })
        })
        .await
    }

    async fn get_page_text(&self, page: usize) -> String {
        let Ok(book) = self.loaded() else {
            return String::new();
        };
        if self.check_page(page).is_err() {
            return String::new();
        }
        run_blocking("epub.text", self.settings.render_timeout, move || book.unit_text(page))
            .await
            .unwrap_or_else(|e| {
                debug!(unit = page, error = %e, "text extraction failed");
                String::new()
            })
    }

    async fn search_text_with(&self, query: &str, options: &SearchOptions) -> Vec<SearchMatch> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        let Ok(book) = self.loaded() else {
            return Vec::new();
        };

        let query = query.to_string();
        let options = options.clone();

        let result = run_scan("epub.search", self.settings.search_timeout, move |cancel| {
            let mut matches = Vec::new();
            for page_number in 0..book.package.spine.len() {
                if cancel.is_cancelled() {
                    debug!(page_number, "search cancelled");
                    break;
                }
                let text = match book.unit_text(page_number) {
                    Ok(text) => text,
                    Err(e) => {
                        debug!(page_number, error = %e, "skipping unit in search");
                        continue;
                    }
                };
                let chars: Vec<char> = text.chars().collect();
                for m in find_all(&chars, &query, options.case_sensitive) {
                    let (prefix, suffix) = match_context(&chars, m, options.context_length);
                    matches.push(SearchMatch {
                        page_number,
                        text: match_text(&chars, m),
                        rect: Rect::default(),
                        position: m.start,
                        prefix,
                        suffix,
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
                debug!(count = matches.len(), "EPUB search finished");
                matches
            }
            Err(e) => {
                warn!(error = %e, "EPUB search failed");
                Vec::new()
            }
        }
    }

    async fn extract_page_thumbnail(&self, page: usize, width: u32, height: u32) -> Result<Thumbnail> {
        let book = self.loaded()?;
        self.check_page(page)?;
        let stylesheet = self.stylesheet();
        let viewport = self.settings.viewport;
        let format = self.settings.thumbnail_format;

        run_blocking("epub.thumbnail", self.settings.render_timeout, move || {
            let (_, html) = book.styled_unit(page, &stylesheet)?;
            let (image, w, h) = with_thumbnail_layout(html, viewport, |d| {
                let first = d.load_page(0)?;
                rasterize_fit(&first, width, height, format)
            })?;
            Ok(Thumbnail {
                page_number: page,
                width: w,
                height: h,
                format,
                image,
            })
        })
        .await
    }

    fn metadata(&self) -> Option<DocumentMetadata> {
        self.metadata.clone()
    }

    async fn table_of_contents(&self) -> Vec<TocEntry> {
        self.loaded().map(|book| book.toc.clone()).unwrap_or_default()
    }

    async fn get_text_in_rect(&self, rect: Rect) -> String {
        let Some(surface) = self.surface().filter(|_| self.navigator.is_ready()) else {
            return String::new();
        };
        surface.text_in_rect(rect).await.unwrap_or_else(|e| {
            debug!(error = %e, "text-in-rect query failed");
            String::new()
        })
    }

    async fn get_word_at_position(&self, x: f32, y: f32) -> Option<TextSelection> {
        let surface = self.surface().filter(|_| self.navigator.is_ready())?;
        let word = surface
            .word_at(x, y)
            .await
            .map_err(|e| debug!(x, y, error = %e, "word query failed"))
            .ok()??;
        if word.text.trim().is_empty() {
            return None;
        }
        Some(TextSelection {
            text: word.text,
            rect: word.rect,
            page_number: self.navigator.current_page(),
        })
    }

    async fn get_link_at_position(&self, x: f32, y: f32) -> Option<ReaderLink> {
        let surface = self.surface().filter(|_| self.navigator.is_ready())?;
        let link = surface
            .link_at(x, y)
            .await
            .map_err(|e| debug!(x, y, error = %e, "link query failed"))
            .ok()??;
        let href = link.href.filter(|h| !h.is_empty())?;
        let (target_page, uri) = self.resolve_link(&href);
        Some(ReaderLink {
            rect: link.rect,
            target_page,
            uri,
        })
    }

    fn update_config(&mut self, config: ReaderConfig) {
        self.config = config;
        self.restyle();
        debug!(font_size = self.config.font_size, "EPUB stylesheet updated");
    }

    fn update_reading_mode(&mut self, mode: ReadingMode) {
        self.mode = mode;
        if let Some(surface) = self.surface() {
            surface.notify(SurfaceCommand::SetReadingMode {
                mode,
                settings: mode.settings(),
            });
        }
        self.restyle();
        debug!(?mode, "EPUB reading mode updated");
    }

    fn config(&self) -> &ReaderConfig {
        &self.config
    }

    fn reading_mode(&self) -> ReadingMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{NavigationUnit, Theme, STYLE_ELEMENT_ID};
    use crate::fixtures::{self, EpubChapter};
    use crate::formats::epub::surface::SurfaceQuery;
    use serde_json::{json, Value};
    use std::time::Duration;

    fn five_chapters() -> Vec<u8> {
        fixtures::epub_with_chapters(&[
            EpubChapter::new("Prologue", "<p>The first chapter begins with rain.</p>"),
            EpubChapter::new("Interlude", "<p>Nothing of note happens here.</p>"),
            EpubChapter::new("Storm", "<p>Another Chapter, then one more chapter.</p>"),
            EpubChapter::new("Calm", "<p>Quiet water.</p>"),
            EpubChapter::new("Epilogue", "<p>The final chapter &amp; farewell.</p>"),
        ])
    }

    async fn loaded(bytes: &[u8]) -> (EpubEngine, tempfile::NamedTempFile) {
        let file = fixtures::write_temp(bytes, ".epub");
        let mut engine = EpubEngine::default();
        engine.load_document(file.path(), None).await.unwrap();
        (engine, file)
    }

    /// Surface stub answering every query with `answer`
    fn answering_surface(
        engine: &mut EpubEngine,
        answer: impl Fn(&SurfaceQuery) -> Option<Value> + Send + 'static,
    ) {
        let mut rx = engine.connect_surface();
        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                if let SurfaceCommand::Query { query, reply } = cmd {
                    if let Some(value) = answer(&query) {
                        let _ = reply.send(value);
                    } else {
                        // Hold the reply so the query times out
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        drop(reply);
                    }
                }
            }
        });
    }

    #[tokio::test]
    async fn test_five_unit_search() {
        let (engine, _file) = loaded(&five_chapters()).await;
        assert_eq!(engine.page_count(), 5);
        assert_eq!(engine.navigation_unit(), NavigationUnit::SpineItem);
        assert!(engine.is_document_loaded());

        let hits = engine.search_text("chapter").await;
        let units: Vec<usize> = hits.iter().map(|m| m.page_number).collect();
        assert_eq!(units, vec![0, 2, 2, 4]);
        assert_eq!(hits[1].text, "Chapter");
        assert!(hits.iter().all(|m| m.rect.is_empty()));

        let exact = engine
            .search_text_with(
                "Chapter",
                &SearchOptions {
                    case_sensitive: true,
                    context_length: 8,
                    ..SearchOptions::default()
                },
            )
            .await;
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].page_number, 2);
        assert_eq!(exact[0].suffix.as_deref(), Some(", then o"));

        assert!(engine.search_text("   ").await.is_empty());
        assert!(engine.search_text("zeppelin").await.is_empty());
    }

    #[tokio::test]
    async fn test_page_text_skips_head() {
        let (engine, _file) = loaded(&five_chapters()).await;
        assert_eq!(
            engine.get_page_text(4).await,
            "Epilogue\nThe final chapter & farewell."
        );
        assert_eq!(engine.get_page_text(5).await, "");
    }

    #[tokio::test]
    async fn test_navigation_and_progress() {
        let (engine, _file) = loaded(&five_chapters()).await;
        let mut progress = engine.subscribe_progress();
        progress.borrow_and_update();

        assert!(engine.go_to_page(3));
        assert!(progress.has_changed().unwrap());
        assert_eq!(engine.reading_progress().current_page, 3);
        assert!(!engine.go_to_page(3));

        assert!(engine.go_to_page(100));
        assert_eq!(engine.current_page(), 4);
        assert!(!engine.go_to_next_page());
        assert!(engine.go_to_position(0.0));
        assert_eq!(engine.current_page(), 0);
        assert_eq!(engine.unit_positions(), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[tokio::test]
    async fn test_surface_receives_styled_units() {
        let file = fixtures::write_temp(&five_chapters(), ".epub");
        let mut engine = EpubEngine::default();
        let mut rx = engine.connect_surface();
        engine.load_document(file.path(), None).await.unwrap();

        match rx.recv().await.unwrap() {
            SurfaceCommand::Load { page_number, href, html } => {
                assert_eq!(page_number, 0);
                assert_eq!(href, "OEBPS/text/ch1.xhtml");
                assert!(html.contains(STYLE_ELEMENT_ID));
                assert!(html.contains("first chapter"));
            }
            other => panic!("unexpected command {:?}", other),
        }

        engine.go_to_page(2);
        assert!(matches!(
            rx.recv().await.unwrap(),
            SurfaceCommand::Load { page_number: 2, .. }
        ));

        engine.update_config(ReaderConfig {
            font_size: 1.5,
            theme: Theme::Dark,
            ..ReaderConfig::default()
        });
        match rx.recv().await.unwrap() {
            SurfaceCommand::ApplyStyles { stylesheet } => {
                assert!(stylesheet.contains("font-size: 1.5em"));
                assert!(stylesheet.contains("#121212"));
            }
            other => panic!("unexpected command {:?}", other),
        }
        // Restyling does not navigate
        assert_eq!(engine.current_page(), 2);

        engine.update_reading_mode(ReadingMode::Paged);
        assert!(matches!(
            rx.recv().await.unwrap(),
            SurfaceCommand::SetReadingMode { mode: ReadingMode::Paged, .. }
        ));
        match rx.recv().await.unwrap() {
            SurfaceCommand::ApplyStyles { stylesheet } => assert!(stylesheet.contains("column-count: 1")),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_navigation_does_not_wait_for_archive() {
        let file = fixtures::write_temp(&five_chapters(), ".epub");
        let mut engine = EpubEngine::default();
        let mut rx = engine.connect_surface();
        engine.load_document(file.path(), None).await.unwrap();
        assert!(matches!(
            rx.recv().await.unwrap(),
            SurfaceCommand::Load { page_number: 0, .. }
        ));

        // Any unit read now blocks until the archive is released
        let book = engine.book.clone().unwrap();
        let archive = book.archive.lock();
        assert!(engine.go_to_page(1));
        assert!(engine.go_to_page(3));
        assert_eq!(engine.current_page(), 3);
        engine.update_config(ReaderConfig {
            font_size: 1.75,
            ..ReaderConfig::default()
        });
        drop(archive);

        assert!(matches!(
            rx.recv().await.unwrap(),
            SurfaceCommand::ApplyStyles { .. }
        ));
        match tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
        {
            SurfaceCommand::Load { page_number, html, .. } => {
                assert_eq!(page_number, 3);
                assert!(html.contains("font-size: 1.75em"));
            }
            other => panic!("unexpected command {:?}", other),
        }
        // Unit 1 was superseded before it could be shown
        assert!(tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_missing_unit_does_not_navigate() {
        let files = vec![
            (
                "META-INF/container.xml".to_string(),
                r#"<container><rootfiles><rootfile full-path="book.opf" media-type="application/oebps-package+xml"/></rootfiles></container>"#.to_string(),
            ),
            (
                "book.opf".to_string(),
                r#"<package><manifest>
                     <item id="a" href="a.xhtml" media-type="application/xhtml+xml"/>
                     <item id="b" href="b.xhtml" media-type="application/xhtml+xml"/>
                   </manifest><spine><itemref idref="a"/><itemref idref="b"/></spine></package>"#
                    .to_string(),
            ),
            (
                "a.xhtml".to_string(),
                "<html><body><p>Only this one exists.</p></body></html>".to_string(),
            ),
        ];
        let (engine, _file) = loaded(&fixtures::zip_entries(&files)).await;
        assert_eq!(engine.page_count(), 2);
        assert!(!engine.go_to_page(1));
        assert_eq!(engine.current_page(), 0);
        assert!(!engine.can_go_to_previous_page());
    }

    #[tokio::test]
    async fn test_render_page_is_styled_markup() {
        let (mut engine, _file) = loaded(&five_chapters()).await;
        engine.update_config(ReaderConfig {
            font_family: "Literata".into(),
            ..ReaderConfig::default()
        });
        let page = engine.render_page(1).await.unwrap();
        assert_eq!((page.width, page.height), (800, 1200));
        let html = page.payload.as_markup().unwrap();
        assert!(html.contains("Nothing of note"));
        assert!(html.contains("Literata"));
        assert!(engine.render_page(9).await.is_err());
    }

    #[tokio::test]
    async fn test_hit_tests_go_through_surface() {
        let (mut engine, _file) = loaded(&five_chapters()).await;
        answering_surface(&mut engine, |query| {
            Some(match query {
                SurfaceQuery::TextInRect { .. } => json!("rain"),
                SurfaceQuery::WordAt { .. } => {
                    json!({"text": "rain", "rect": {"x": 10.0, "y": 20.0, "width": 30.0, "height": 12.0}})
                }
                SurfaceQuery::LinkAt { x, .. } if *x < 100.0 => {
                    json!({"rect": {"x": 0.0, "y": 0.0, "width": 50.0, "height": 10.0}, "href": "ch3.xhtml#storm"})
                }
                SurfaceQuery::LinkAt { .. } => {
                    json!({"rect": {"x": 0.0, "y": 0.0, "width": 50.0, "height": 10.0}, "href": "https://example.com/"})
                }
            })
        });

        engine.go_to_page(1);
        assert_eq!(engine.get_text_in_rect(Rect::new(0.0, 0.0, 100.0, 100.0)).await, "rain");

        let word = engine.get_word_at_position(15.0, 25.0).await.unwrap();
        assert_eq!(word.text, "rain");
        assert_eq!(word.page_number, 1);
        assert_eq!(word.rect, Rect::new(10.0, 20.0, 30.0, 12.0));

        let internal = engine.get_link_at_position(5.0, 5.0).await.unwrap();
        assert_eq!(internal.target_page, Some(2));
        assert_eq!(internal.uri, None);

        let external = engine.get_link_at_position(500.0, 5.0).await.unwrap();
        assert_eq!(external.target_page, None);
        assert_eq!(external.uri.as_deref(), Some("https://example.com/"));
    }

    #[tokio::test]
    async fn test_unanswered_query_times_out_as_miss() {
        let file = fixtures::write_temp(&five_chapters(), ".epub");
        let mut engine = EpubEngine::new(EngineSettings {
            surface_timeout: Duration::from_millis(50),
            ..EngineSettings::default()
        });
        answering_surface(&mut engine, |_| None);
        engine.load_document(file.path(), None).await.unwrap();

        assert!(engine.get_word_at_position(1.0, 1.0).await.is_none());
        assert_eq!(engine.get_text_in_rect(Rect::new(0.0, 0.0, 5.0, 5.0)).await, "");
    }

    #[tokio::test]
    async fn test_hit_tests_without_surface() {
        let (engine, _file) = loaded(&five_chapters()).await;
        assert!(engine.get_word_at_position(1.0, 1.0).await.is_none());
        assert!(engine.get_link_at_position(1.0, 1.0).await.is_none());
        assert_eq!(engine.get_text_in_rect(Rect::new(0.0, 0.0, 1.0, 1.0)).await, "");
    }

    #[tokio::test]
    async fn test_metadata_and_toc() {
        let (engine, _file) = loaded(&five_chapters()).await;
        let metadata = engine.metadata().unwrap();
        assert_eq!(metadata.title.as_deref(), Some("Fixture Book"));
        assert_eq!(metadata.creators, vec!["Ada Writer".to_string()]);

        let toc = engine.table_of_contents().await;
        let labels: Vec<&str> = toc.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["Prologue", "Interlude", "Storm", "Calm", "Epilogue"]);
        assert_eq!(toc[3].target_page, Some(3));
    }

    #[tokio::test]
    async fn test_thumbnail_fits_box() {
        let (engine, _file) = loaded(&five_chapters()).await;
        let thumb = engine.extract_page_thumbnail(0, 96, 128).await.unwrap();
        assert!(thumb.width <= 96 && thumb.height <= 128);
        assert!(thumb.width > 0 && thumb.height > 0);
        assert!(thumb.image.starts_with(&[0xFF, 0xD8]));
        assert!(engine.extract_page_thumbnail(7, 96, 128).await.is_err());
    }

    fn long_chapter() -> String {
        let body: String = (0..300)
            .map(|i| format!("<p>Paragraph {} of a chapter that keeps going past one screen.</p>", i))
            .collect();
        format!("<html><head><title>Long</title></head><body>{}</body></html>", body)
    }

    fn thumbnail_page_count(font_size: f32) -> i32 {
        let config = ReaderConfig {
            font_size,
            ..ReaderConfig::default()
        };
        let viewport = EngineSettings::default().viewport;
        let stylesheet = Stylesheet::from_config(
            &config,
            ReadingMode::default_for(DocumentFormat::Epub),
            viewport,
        );
        let html = stylesheet.inject(&long_chapter()).unwrap();
        with_thumbnail_layout(html, viewport, |d| Ok(d.page_count()?)).unwrap()
    }

    #[test]
    fn test_thumbnail_layout_applies_font_size_once() {
        let normal = thumbnail_page_count(1.0);
        let doubled = thumbnail_page_count(2.0);
        assert!(normal >= 1);
        assert!(doubled > normal);
        // Twice the type takes about four times the area, not sixteen
        assert!(
            doubled <= normal * 6,
            "{} pages at 2em against {} at 1em",
            doubled,
            normal
        );
    }

    #[tokio::test]
    async fn test_corrupt_and_foreign_archives() {
        // Zip with the EPUB mimetype but no container
        let files = vec![("OEBPS/content.opf".to_string(), "<package/>".to_string())];
        let file = fixtures::write_temp(&fixtures::zip_entries(&files), ".epub");
        let mut engine = EpubEngine::default();
        let err = engine.load_document(file.path(), None).await.unwrap_err();
        assert!(matches!(err, DocumentError::Corrupt(_)));
        assert!(matches!(engine.state(), ReaderState::Error { .. }));

        let pdf = fixtures::write_temp(&fixtures::pdf_with_pages(1), ".epub");
        let err = engine.load_document(pdf.path(), None).await.unwrap_err();
        assert!(matches!(err, DocumentError::UnsupportedFormat(_)));

        let err = engine
            .load_document(Path::new("/nonexistent/book.epub"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::NotFound(_)));

        // Recovers on a good file
        let good = fixtures::write_temp(&five_chapters(), ".epub");
        engine.load_document(good.path(), None).await.unwrap();
        assert_eq!(engine.state(), ReaderState::Ready { page_count: 5 });
    }

    #[tokio::test]
    async fn test_close_resets() {
        let (mut engine, _file) = loaded(&five_chapters()).await;
        engine.go_to_page(2);
        engine.close_document();
        assert_eq!(engine.state(), ReaderState::Initial);
        assert_eq!(engine.page_count(), 0);
        assert!(engine.metadata().is_none());
        assert!(engine.search_text("chapter").await.is_empty());
        engine.close_document();
    }

    #[test]
    fn test_is_external() {
        assert!(is_external("https://example.com"));
        assert!(is_external("mailto:a@b.c"));
        assert!(!is_external("ch2.xhtml#p:1"));
        assert!(!is_external("../text/ch1.xhtml"));
        assert!(!is_external("#note"));
    }
}
