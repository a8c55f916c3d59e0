//! MuPDF-side helpers for the PDF engine
//!
//! Everything here runs inside a `SafeDocument` closure on the blocking
//! pool and works in page space.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use mupdf::{Document, MetadataName, Page};

use crate::document::{DocumentError, DocumentMetadata, ReaderLink, Rect, Result, TocEntry};

/// How far into the file the `%PDF` marker may appear
const HEADER_WINDOW: usize = 1024;

/// Reject anything that is not a PDF before MuPDF sees it
pub fn check_pdf_header(path: &Path) -> Result<()> {
    let mut file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => DocumentError::NotFound(path.display().to_string()),
        _ => DocumentError::Io(e),
    })?;
    let mut head = Vec::with_capacity(HEADER_WINDOW);
    file.by_ref()
        .take(HEADER_WINDOW as u64)
        .read_to_end(&mut head)?;

    if head.windows(5).any(|w| w == b"%PDF-") {
        Ok(())
    } else {
        Err(DocumentError::UnsupportedFormat(format!(
            "{} is not a PDF",
            path.display()
        )))
    }
}

pub fn read_metadata(doc: &Document) -> DocumentMetadata {
    let get = |name: MetadataName| doc.metadata(name).ok().filter(|s| !s.trim().is_empty());
    DocumentMetadata {
        title: get(MetadataName::Title),
        creators: get(MetadataName::Author).into_iter().collect(),
        language: None,
        identifier: None,
    }
}

pub fn read_outline(doc: &Document) -> Result<Vec<TocEntry>> {
    let outlines = doc.outlines()?;
    Ok(convert_outlines(&outlines))
}

fn convert_outlines(outlines: &[mupdf::Outline]) -> Vec<TocEntry> {
    outlines
        .iter()
        .map(|outline| {
            let label = if outline.title.trim().is_empty() {
                "Untitled".to_string()
            } else {
                outline.title.trim().to_string()
            };
            TocEntry {
                label,
                target_page: outline.dest.map(|d| d.loc.page_number as usize),
                href: outline.uri.clone().filter(|u| !u.is_empty()),
                children: convert_outlines(&outline.down),
            }
        })
        .collect()
}

/// First link whose hot area (page space) contains the point
pub fn link_at(page: &Page, x: f32, y: f32) -> Result<Option<ReaderLink>> {
    for link in page.links()? {
        let b = link.bounds;
        let rect = Rect::from_ltrb(b.x0, b.y0, b.x1, b.y1);
        if rect.is_empty() || !rect.contains(x, y) {
            continue;
        }
        let (target_page, uri) = match link.dest {
            Some(dest) => (Some(dest.loc.page_number as usize), None),
            None if !link.uri.is_empty() => (None, Some(link.uri.clone())),
            None => continue,
        };
        return Ok(Some(ReaderLink {
            rect,
            target_page,
            uri,
        }));
    }
    Ok(None)
}
