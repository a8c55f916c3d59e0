//! Thread-safe document wrapper for MuPDF
//!
//! MuPDF documents are not thread-safe. This wrapper:
//!
//! 1. Stores the document source (path or bytes) and the password
//! 2. Opens and unlocks a fresh document for each operation
//! 3. Uses `parking_lot::Mutex` to serialize access
//!
//! No MuPDF object outlives the closure it was handed to, so the wrapper
//! itself is plain `Send + Sync` data.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mupdf::{Document, Page};
use parking_lot::Mutex;
use tracing::debug;

use crate::document::{DocumentError, Rect, Result};

/// Source data for a document
#[derive(Clone)]
pub enum DocumentSource {
    /// Document on disk; MuPDF picks the handler from the extension
    Path(PathBuf),
    /// In-memory document with an explicit handler magic (MIME type)
    Bytes {
        data: Arc<Vec<u8>>,
        magic: &'static str,
    },
}

impl std::fmt::Debug for DocumentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Bytes { data, magic } => f
                .debug_struct("Bytes")
                .field("len", &data.len())
                .field("magic", magic)
                .finish(),
        }
    }
}

/// Thread-safe document wrapper
pub struct SafeDocument {
    source: DocumentSource,
    password: Option<String>,
    page_count: usize,
    lock: Mutex<()>,
}

impl std::fmt::Debug for SafeDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafeDocument")
            .field("source", &self.source)
            .field("has_password", &self.password.is_some())
            .field("page_count", &self.page_count)
            .finish()
    }
}

impl SafeDocument {
    /// Open a document on disk, unlocking it with `password` if needed.
    ///
    /// Fails with `PasswordRequired`/`InvalidPassword` for locked documents
    /// and `Corrupt` when MuPDF cannot parse the file or it has no pages.
    pub fn open(path: &Path, password: Option<&str>) -> Result<Self> {
        Self::from_source(
            DocumentSource::Path(path.to_path_buf()),
            password.map(str::to_string),
        )
    }

    /// Open an in-memory document, e.g. `"text/html"` markup
    pub fn from_bytes(data: Vec<u8>, magic: &'static str) -> Result<Self> {
        Self::from_source(
            DocumentSource::Bytes {
                data: Arc::new(data),
                magic,
            },
            None,
        )
    }

    fn from_source(source: DocumentSource, password: Option<String>) -> Result<Self> {
        let mut doc = open_source(&source)?;
        unlock(&mut doc, password.as_deref())?;

        let page_count = doc.page_count()?.max(0) as usize;
        if page_count == 0 {
            return Err(DocumentError::Corrupt("document has no pages".into()));
        }
        debug!(source = ?source, page_count, "opened MuPDF document");

        Ok(Self {
            source,
            password,
            page_count,
            lock: Mutex::new(()),
        })
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    fn open_document(&self) -> Result<Document> {
        let mut doc = open_source(&self.source)?;
        unlock(&mut doc, self.password.as_deref())?;
        Ok(doc)
    }

    /// Run `f` against a freshly opened, unlocked document
    pub fn with_doc<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Document) -> Result<R>,
    {
        let _guard = self.lock.lock();
        let doc = self.open_document()?;
        f(&doc)
    }

    /// Like [`with_doc`](Self::with_doc), for operations such as `layout`
    pub fn with_doc_mut<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Document) -> Result<R>,
    {
        let _guard = self.lock.lock();
        let mut doc = self.open_document()?;
        f(&mut doc)
    }

    /// Run `f` against one page, checking the index first
    pub fn with_page<F, R>(&self, index: usize, f: F) -> Result<R>
    where
        F: FnOnce(&Page) -> Result<R>,
    {
        if index >= self.page_count {
            return Err(DocumentError::PageOutOfRange {
                index,
                count: self.page_count,
            });
        }
        self.with_doc(|doc| {
            let page = doc.load_page(index as i32)?;
            f(&page)
        })
    }
}

fn open_source(source: &DocumentSource) -> Result<Document> {
    let doc = match source {
        DocumentSource::Path(path) => {
            if !path.exists() {
                return Err(DocumentError::NotFound(path.display().to_string()));
            }
            let path_str = path.to_string_lossy();
            Document::open(&*path_str)?
        }
        DocumentSource::Bytes { data, magic } => Document::from_bytes(data.as_slice(), magic)?,
    };
    Ok(doc)
}

fn unlock(doc: &mut Document, password: Option<&str>) -> Result<()> {
    if !doc.needs_password()? {
        return Ok(());
    }
    match password {
        None | Some("") => Err(DocumentError::PasswordRequired),
        Some(password) => {
            if doc.authenticate(password)? {
                Ok(())
            } else {
                Err(DocumentError::InvalidPassword)
            }
        }
    }
}

/// Page bounds as a [`Rect`] in page space
pub fn page_rect(page: &Page) -> Result<Rect> {
    let b = page.bounds()?;
    Ok(Rect::from_ltrb(b.x0, b.y0, b.x1, b.y1))
}
