//! Reader preferences
//!
//! `ReaderConfig` is an immutable value: every `update_config` call hands
//! the engine a whole new one. The external settings store persists it
//! through serde, so every field has a default.

use serde::{Deserialize, Serialize};

use super::types::DocumentFormat;

/// Colour theme
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Theme {
    #[default]
    Light,
    Dark,
    Sepia,
    Amoled,
    /// Follows the platform; resolved as Light by the engine
    System,
    Custom {
        name: String,
        /// `#rrggbb`
        background: String,
        /// `#rrggbb`; derived from the background's luminance when absent
        #[serde(default)]
        foreground: Option<String>,
    },
}

/// Resolved colours for a theme
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    pub background: String,
    pub foreground: String,
    pub link: String,
}

impl Theme {
    pub fn palette(&self) -> Palette {
        let (background, foreground, link) = match self {
            Theme::Light | Theme::System => ("#ffffff", "#000000", "#1a5fb4"),
            Theme::Dark => ("#121212", "#e0e0e0", "#8ab4f8"),
            Theme::Sepia => ("#f4ecd8", "#5b4636", "#8a5a2b"),
            Theme::Amoled => ("#000000", "#ffffff", "#8ab4f8"),
            Theme::Custom {
                background,
                foreground,
                ..
            } => {
                let background = normalize_hex(background).unwrap_or_else(|| "#ffffff".into());
                let foreground = foreground
                    .as_deref()
                    .and_then(normalize_hex)
                    .unwrap_or_else(|| contrast_color(&background).to_string());
                let link = if is_light(&background) { "#1a5fb4" } else { "#8ab4f8" };
                return Palette {
                    background,
                    foreground,
                    link: link.to_string(),
                };
            }
        };
        Palette {
            background: background.to_string(),
            foreground: foreground.to_string(),
            link: link.to_string(),
        }
    }
}

fn normalize_hex(value: &str) -> Option<String> {
    let hex = value.trim().trim_start_matches('#');
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        6 => hex.to_string(),
        _ => return None,
    };
    if expanded.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(format!("#{}", expanded.to_ascii_lowercase()))
    } else {
        None
    }
}

fn is_light(hex: &str) -> bool {
    let channel = |i: usize| {
        u8::from_str_radix(hex.get(i..i + 2).unwrap_or("ff"), 16).unwrap_or(255) as f32
    };
    let luminance = (0.299 * channel(1) + 0.587 * channel(3) + 0.114 * channel(5)) / 255.0;
    luminance > 0.5
}

fn contrast_color(background: &str) -> &'static str {
    if is_light(background) {
        "#000000"
    } else {
        "#ffffff"
    }
}

/// Page margins in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Margins {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Margins {
    pub fn uniform(value: f32) -> Self {
        Self {
            left: value,
            top: value,
            right: value,
            bottom: value,
        }
    }
}

impl Default for Margins {
    fn default() -> Self {
        Self::uniform(16.0)
    }
}

/// Page turn animation; cosmetic, played by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageTransition {
    None,
    #[default]
    Slide,
    Curl,
    Fade,
}

/// Reader preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReaderConfig {
    pub theme: Theme,
    /// Multiplier: 1.0 is the document's natural size
    pub font_size: f32,
    pub font_family: String,
    pub line_spacing: f32,
    pub margins: Margins,
    pub page_transition: PageTransition,
    pub scroll_sensitivity: f32,
    pub allow_screenshots: bool,
    pub keep_screen_on: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            font_size: 1.0,
            font_family: "serif".to_string(),
            line_spacing: 1.5,
            margins: Margins::default(),
            page_transition: PageTransition::Slide,
            scroll_sensitivity: 1.0,
            allow_screenshots: false,
            keep_screen_on: true,
        }
    }
}

/// Layout mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingMode {
    Scroll,
    Paged,
    Webtoon,
    Spread,
}

/// Behaviour implied by a reading mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeSettings {
    pub paginated: bool,
    pub scroll_enabled: bool,
    pub allow_zoom: bool,
    pub fit_to_width: bool,
    pub pages_per_view: u8,
}

impl ReadingMode {
    /// Initial mode for a freshly opened document
    pub fn default_for(format: DocumentFormat) -> Self {
        match format {
            DocumentFormat::Pdf => ReadingMode::Paged,
            DocumentFormat::Epub => ReadingMode::Scroll,
        }
    }

    pub fn settings(&self) -> ModeSettings {
        match self {
            ReadingMode::Scroll => ModeSettings {
                paginated: false,
                scroll_enabled: true,
                allow_zoom: true,
                fit_to_width: false,
                pages_per_view: 1,
            },
            ReadingMode::Paged => ModeSettings {
                paginated: true,
                scroll_enabled: false,
                allow_zoom: true,
                fit_to_width: false,
                pages_per_view: 1,
            },
            ReadingMode::Webtoon => ModeSettings {
                paginated: false,
                scroll_enabled: true,
                allow_zoom: false,
                fit_to_width: true,
                pages_per_view: 1,
            },
            ReadingMode::Spread => ModeSettings {
                paginated: true,
                scroll_enabled: false,
                allow_zoom: true,
                fit_to_width: false,
                pages_per_view: 2,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_config_defaults_from_partial_json() {
        let cfg: ReaderConfig = serde_json::from_str(r#"{"fontSize": 1.4}"#).unwrap();
        assert_eq!(cfg.font_size, 1.4);
        assert_eq!(cfg.line_spacing, 1.5);
        assert_eq!(cfg.margins, Margins::uniform(16.0));
        assert_eq!(cfg.page_transition, PageTransition::Slide);
        assert!(cfg.keep_screen_on);
        assert!(!cfg.allow_screenshots);
    }

    #[test]
    fn test_theme_round_trips_tagged() {
        let json = r#"{"kind":"custom","name":"Night","background":"#223"}"#;
        let theme: Theme = serde_json::from_str(json).unwrap();
        let palette = theme.palette();
        assert_eq!(palette.background, "#222233");
        assert_eq!(palette.foreground, "#ffffff");
    }

    #[test]
    fn test_builtin_palettes() {
        assert_eq!(Theme::Sepia.palette().background, "#f4ecd8");
        assert_eq!(Theme::Amoled.palette().background, "#000000");
        assert_eq!(Theme::System.palette(), Theme::Light.palette());
    }

    #[test]
    fn test_default_mode_per_format() {
        assert_eq!(ReadingMode::default_for(DocumentFormat::Pdf), ReadingMode::Paged);
        assert_eq!(ReadingMode::default_for(DocumentFormat::Epub), ReadingMode::Scroll);
        assert_eq!(ReadingMode::Spread.settings().pages_per_view, 2);
        assert!(!ReadingMode::Webtoon.settings().allow_zoom);
    }
}
