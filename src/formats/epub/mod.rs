//! EPUB format implementation
//!
//! # Architecture
//!
//! - [`package`]: container, OPF and NCX parsing plus archive path lookup
//! - `content`: markup to plain text for search and page text
//! - [`surface`]: command channel to the external layout surface
//! - [`EpubEngine`]: the reading contract over all of the above
//!
//! Content documents are never laid out here. Each navigation step sends
//! styled markup to the surface; selection and link lookups are answered
//! by it.

mod content;
mod engine;
pub mod package;
pub mod surface;

pub use content::markup_to_text;
pub use engine::EpubEngine;
pub use surface::{LinkReply, SurfaceBridge, SurfaceCommand, SurfaceQuery, WordReply};
