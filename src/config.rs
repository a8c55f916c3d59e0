//! Engine settings
//!
//! Plumbing knobs (timeouts, channel sizes, viewport) read from the
//! environment. Reader preferences live in [`crate::document::ReaderConfig`].

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::document::ImageFormat;

/// Default viewport for markup rendering, in CSS pixels
pub const DEFAULT_VIEWPORT: (u32, u32) = (800, 1200);

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Opening and parsing a document
    pub parse_timeout: Duration,
    /// Rendering one page or thumbnail
    pub render_timeout: Duration,
    /// Whole-document search
    pub search_timeout: Duration,
    /// One query to the external rendering surface
    pub surface_timeout: Duration,
    /// Bounded queue towards the rendering surface
    pub surface_channel_capacity: usize,
    /// Size the rendering surface lays markup out in
    pub viewport: (u32, u32),
    pub page_format: ImageFormat,
    pub thumbnail_format: ImageFormat,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            parse_timeout: Duration::from_secs(30),
            render_timeout: Duration::from_secs(30),
            search_timeout: Duration::from_secs(30),
            surface_timeout: Duration::from_millis(2000),
            surface_channel_capacity: 32,
            viewport: DEFAULT_VIEWPORT,
            page_format: ImageFormat::Png,
            thumbnail_format: ImageFormat::Jpeg,
        }
    }
}

impl EngineSettings {
    /// Load `.env` (if present) and then read the environment
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            parse_timeout: Duration::from_secs(env_or(
                "READER_PARSE_TIMEOUT_SECS",
                defaults.parse_timeout.as_secs(),
            )),
            render_timeout: Duration::from_secs(env_or(
                "READER_RENDER_TIMEOUT_SECS",
                defaults.render_timeout.as_secs(),
            )),
            search_timeout: Duration::from_secs(env_or(
                "READER_SEARCH_TIMEOUT_SECS",
                defaults.search_timeout.as_secs(),
            )),
            surface_timeout: Duration::from_millis(env_or(
                "READER_SURFACE_TIMEOUT_MS",
                defaults.surface_timeout.as_millis() as u64,
            )),
            surface_channel_capacity: env_or(
                "READER_SURFACE_CHANNEL_CAPACITY",
                defaults.surface_channel_capacity,
            )
            .max(1),
            viewport: (
                env_or("READER_VIEWPORT_WIDTH", defaults.viewport.0).max(1),
                env_or("READER_VIEWPORT_HEIGHT", defaults.viewport.1).max(1),
            ),
            page_format: defaults.page_format,
            thumbnail_format: defaults.thumbnail_format,
        }
    }
}

fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, fallback = %default, "ignoring unparsable setting");
            default
        }),
        Err(_) => default,
    }
}
