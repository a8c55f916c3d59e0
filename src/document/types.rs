//! Core document types
//!
//! Format-agnostic values handed across the reading contract.

use serde::{Deserialize, Serialize};

/// Document format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Epub,
}

impl DocumentFormat {
    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "epub" => Some(Self::Epub),
            _ => None,
        }
    }

    /// Detect format from MIME type
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "application/pdf" => Some(Self::Pdf),
            "application/epub+zip" => Some(Self::Epub),
            _ => None,
        }
    }

    /// Detect format from magic bytes
    pub fn from_magic_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 4 {
            return None;
        }

        if bytes.starts_with(b"%PDF") {
            return Some(Self::Pdf);
        }

        // EPUB: a ZIP whose first entry is the stored `mimetype` file.
        // Other ZIP formats (.docx, .jar, ...) are not accepted here.
        if bytes.starts_with(b"PK\x03\x04") {
            return stored_mimetype(bytes)
                .and_then(Self::from_mime)
                .filter(|format| *format == Self::Epub);
        }

        None
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Epub => "application/epub+zip",
        }
    }

    /// What a "page" means for this format
    pub fn navigation_unit(&self) -> NavigationUnit {
        match self {
            Self::Pdf => NavigationUnit::Page,
            Self::Epub => NavigationUnit::SpineItem,
        }
    }
}

/// Content of the first ZIP entry when it is an uncompressed `mimetype`
fn stored_mimetype(bytes: &[u8]) -> Option<&str> {
    let u16_at = |at: usize| {
        let field = bytes.get(at..at + 2)?;
        Some(u16::from_le_bytes([field[0], field[1]]) as usize)
    };
    let method = u16_at(8)?;
    let name_len = u16_at(26)?;
    let extra_len = u16_at(28)?;
    if method != 0 || bytes.get(30..30 + name_len)? != b"mimetype" {
        return None;
    }
    let size = bytes.get(18..22)?;
    let size = u32::from_le_bytes([size[0], size[1], size[2], size[3]]) as usize;
    let start = 30 + name_len + extra_len;
    let content = bytes.get(start..start + size)?;
    std::str::from_utf8(content).ok().map(str::trim)
}

/// Granularity of page indices for an engine.
///
/// EPUB engines navigate whole content documents; pagination inside one
/// is left to the rendering surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NavigationUnit {
    Page,
    SpineItem,
}

/// Rectangle in either page space or screen space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_ltrb(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            x: left.min(right),
            y: top.min(bottom),
            width: (right - left).abs(),
            height: (bottom - top).abs(),
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.right() && y >= self.y && y <= self.bottom()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    /// Smallest rectangle covering both
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect::from_ltrb(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    /// Multiply every coordinate by `factor` (page space -> screen space)
    pub fn scale(&self, factor: f32) -> Rect {
        Rect {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
        }
    }
}

/// Raster encodings produced by the engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
}

/// Payload of a rendered page
#[derive(Debug, Clone, PartialEq)]
pub enum RenderPayload {
    /// Encoded raster image (fixed-page documents)
    Raster { format: ImageFormat, data: Vec<u8> },
    /// Complete styled markup document for the rendering surface
    Markup { href: String, html: String },
}

impl RenderPayload {
    pub fn as_markup(&self) -> Option<&str> {
        match self {
            RenderPayload::Markup { html, .. } => Some(html),
            RenderPayload::Raster { .. } => None,
        }
    }

    pub fn as_raster(&self) -> Option<&[u8]> {
        match self {
            RenderPayload::Raster { data, .. } => Some(data),
            RenderPayload::Markup { .. } => None,
        }
    }
}

/// One page or spine unit, rendered with the current configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    pub page_number: usize,
    pub width: u32,
    pub height: u32,
    pub payload: RenderPayload,
}

/// Thumbnail image, sized independently of the live render scale
#[derive(Debug, Clone, PartialEq)]
pub struct Thumbnail {
    pub page_number: usize,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub image: Vec<u8>,
}

/// Search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMatch {
    /// Page or spine index
    pub page_number: usize,
    /// Matched text as it appears in the document
    pub text: String,
    /// Screen-space bounds; empty for markup units (the surface lays them out)
    pub rect: Rect,
    /// Character offset of the match inside the unit's plain text
    pub position: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

/// Search options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOptions {
    /// Case sensitive search
    #[serde(default)]
    pub case_sensitive: bool,
    /// Stop after this many matches
    #[serde(default)]
    pub limit: Option<usize>,
    /// Characters of context on each side of a match (0 disables context)
    #[serde(default)]
    pub context_length: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            limit: None,
            context_length: 0,
        }
    }
}

/// Text under a rectangle or point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSelection {
    pub text: String,
    pub rect: Rect,
    pub page_number: usize,
}

/// Link under a point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderLink {
    pub rect: Rect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_page: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// Position reported to the persistence collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingProgress {
    pub current_page: usize,
    pub page_count: usize,
}

impl ReadingProgress {
    /// Fraction of the document reached, 1.0 on the last page
    pub fn fraction(&self) -> f32 {
        match self.page_count {
            0 => 0.0,
            1 => 1.0,
            n => self.current_page as f32 / (n - 1) as f32,
        }
    }
}

/// Document metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub creators: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

/// Table of contents entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TocEntry {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_page: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TocEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_magic_bytes() {
        assert_eq!(
            DocumentFormat::from_magic_bytes(b"%PDF-1.4\n%"),
            Some(DocumentFormat::Pdf)
        );

        let epub = zip_local_entry(0, b"mimetype", b"application/epub+zip");
        assert_eq!(
            DocumentFormat::from_magic_bytes(&epub),
            Some(DocumentFormat::Epub)
        );

        let docx = zip_local_entry(8, b"[Content_Types].xml", b"compressed");
        assert_eq!(DocumentFormat::from_magic_bytes(&docx), None);

        // A PDF mimetype inside a ZIP is still not a PDF
        let odd = zip_local_entry(0, b"mimetype", b"application/pdf");
        assert_eq!(DocumentFormat::from_magic_bytes(&odd), None);

        let deflated = zip_local_entry(8, b"mimetype", b"application/epub+zip");
        assert_eq!(DocumentFormat::from_magic_bytes(&deflated), None);
        assert_eq!(DocumentFormat::from_magic_bytes(b"GIF89a"), None);
    }

    #[test]
    fn test_format_from_mime() {
        assert_eq!(
            DocumentFormat::from_mime("application/epub+zip"),
            Some(DocumentFormat::Epub)
        );
        assert_eq!(DocumentFormat::from_mime("application/pdf"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_mime("text/html"), None);
    }

    /// ZIP local file header followed by `content`
    fn zip_local_entry(method: u16, name: &[u8], content: &[u8]) -> Vec<u8> {
        let mut entry = b"PK\x03\x04".to_vec();
        entry.extend_from_slice(&20u16.to_le_bytes()); // version
        entry.extend_from_slice(&0u16.to_le_bytes()); // flags
        entry.extend_from_slice(&method.to_le_bytes());
        entry.extend_from_slice(&[0u8; 8]); // time, date, crc
        entry.extend_from_slice(&(content.len() as u32).to_le_bytes());
        entry.extend_from_slice(&(content.len() as u32).to_le_bytes());
        entry.extend_from_slice(&(name.len() as u16).to_le_bytes());
        entry.extend_from_slice(&0u16.to_le_bytes());
        entry.extend_from_slice(name);
        entry.extend_from_slice(content);
        entry
    }

    #[test]
    fn test_rect_scale_and_union() {
        let a = Rect::new(10.0, 10.0, 5.0, 5.0);
        let b = Rect::from_ltrb(20.0, 12.0, 30.0, 18.0);
        let u = a.union(&b);
        assert_eq!(u, Rect::new(10.0, 10.0, 20.0, 8.0));
        assert_eq!(a.scale(2.0), Rect::new(20.0, 20.0, 10.0, 10.0));
        assert!(u.contains(25.0, 15.0));
        assert_eq!(Rect::default().union(&a), a);
    }

    #[test]
    fn test_progress_fraction() {
        let progress = ReadingProgress {
            current_page: 3,
            page_count: 7,
        };
        assert!((progress.fraction() - 0.5).abs() < f32::EPSILON);
        assert_eq!(ReadingProgress::default().fraction(), 0.0);
    }
}
