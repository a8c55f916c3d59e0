//! Document error types
//!
//! Unified error handling for both reading engines (PDF, EPUB).

use thiserror::Error;

/// Coarse error category, used by UI layers to pick a recovery strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Opening or parsing the document failed
    Load,
    /// Producing a page/unit rendering failed
    Render,
    /// The external rendering surface did not answer
    Surface,
    /// Worker task or runtime failure
    Internal,
}

/// Unified document error type
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Document not found
    #[error("Document not found: {0}")]
    NotFound(String),

    /// IO error (std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unsupported or unrecognized format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Container structure is damaged or incomplete
    #[error("Corrupt document: {0}")]
    Corrupt(String),

    /// Access-controlled document opened without a password
    #[error("Document is password protected")]
    PasswordRequired,

    /// Access-controlled document opened with the wrong password
    #[error("Invalid password")]
    InvalidPassword,

    /// Operation requires a loaded document
    #[error("No document loaded")]
    NotLoaded,

    /// Page or spine index outside the document
    #[error("Page {index} out of range (page count {count})")]
    PageOutOfRange { index: usize, count: usize },

    /// Failed to render content
    #[error("Render error: {0}")]
    Render(String),

    /// Image processing error
    #[error("Image error: {0}")]
    Image(String),

    /// Rendering surface is not attached or has shut down
    #[error("Rendering surface closed")]
    SurfaceClosed,

    /// Rendering surface did not answer in time
    #[error("Rendering surface timed out after {0} ms")]
    SurfaceTimeout(u64),

    /// Rendering surface answered with an unexpected payload
    #[error("Rendering surface protocol error: {0}")]
    SurfaceProtocol(String),

    /// Blocking worker task panicked or was cancelled
    #[error("Task failed: {0}")]
    TaskFailed(String),

    /// Timeout error
    #[error("Operation timed out after {0} ms")]
    Timeout(u64),
}

/// Result type alias for document operations
pub type Result<T> = std::result::Result<T, DocumentError>;

impl DocumentError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound(_)
            | Self::Io(_)
            | Self::UnsupportedFormat(_)
            | Self::Corrupt(_)
            | Self::PasswordRequired
            | Self::InvalidPassword
            | Self::NotLoaded => ErrorCategory::Load,
            Self::PageOutOfRange { .. } | Self::Render(_) | Self::Image(_) => ErrorCategory::Render,
            Self::SurfaceClosed | Self::SurfaceTimeout(_) | Self::SurfaceProtocol(_) => {
                ErrorCategory::Surface
            }
            Self::TaskFailed(_) | Self::Timeout(_) => ErrorCategory::Internal,
        }
    }

    /// Whether offering the user a retry makes sense.
    ///
    /// Password and format errors need different input, not another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::PasswordRequired | Self::InvalidPassword | Self::UnsupportedFormat(_) => false,
            Self::PageOutOfRange { .. } => false,
            other => matches!(
                other.category(),
                ErrorCategory::Load | ErrorCategory::Render | ErrorCategory::Internal
            ),
        }
    }
}

impl From<mupdf::error::Error> for DocumentError {
    fn from(err: mupdf::error::Error) -> Self {
        DocumentError::Corrupt(err.to_string())
    }
}

impl From<zip::result::ZipError> for DocumentError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(io) => DocumentError::Io(io),
            zip::result::ZipError::FileNotFound => {
                DocumentError::Corrupt("missing archive entry".into())
            }
            other => DocumentError::Corrupt(other.to_string()),
        }
    }
}

impl From<quick_xml::DeError> for DocumentError {
    fn from(err: quick_xml::DeError) -> Self {
        DocumentError::Corrupt(format!("XML: {}", err))
    }
}

impl From<image::ImageError> for DocumentError {
    fn from(err: image::ImageError) -> Self {
        DocumentError::Image(err.to_string())
    }
}
