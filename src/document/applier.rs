//! Configuration applier
//!
//! Translates a format-agnostic [`ReaderConfig`] into what each engine
//! actually consumes: a raster scale for PDF pages and a stylesheet for
//! EPUB markup.

use std::fmt::Write as _;

use lol_html::html_content::ContentType;
use lol_html::{element, rewrite_str, RewriteStrSettings};

use super::config::{ReaderConfig, ReadingMode};
use super::error::{DocumentError, Result};

pub const MIN_RENDER_SCALE: f32 = 0.5;
pub const MAX_RENDER_SCALE: f32 = 3.0;

/// Id of the injected `<style>` element
pub const STYLE_ELEMENT_ID: &str = "amnesia-reader-style";

/// Zoom factor applied to intrinsic page sizes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderScale(f32);

impl RenderScale {
    pub fn from_config(config: &ReaderConfig) -> Self {
        Self::clamped(config.font_size)
    }

    pub fn clamped(value: f32) -> Self {
        if !value.is_finite() {
            return Self(1.0);
        }
        Self(value.clamp(MIN_RENDER_SCALE, MAX_RENDER_SCALE))
    }

    pub fn get(&self) -> f32 {
        self.0
    }
}

impl Default for RenderScale {
    fn default() -> Self {
        Self(1.0)
    }
}

/// CSS computed for EPUB content documents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stylesheet {
    css: String,
}

impl Stylesheet {
    /// Build the stylesheet for a config, mode and viewport size
    pub fn from_config(config: &ReaderConfig, mode: ReadingMode, viewport: (u32, u32)) -> Self {
        let palette = config.theme.palette();
        let font_size = if config.font_size.is_finite() && config.font_size > 0.0 {
            config.font_size
        } else {
            1.0
        };
        let line_spacing = if config.line_spacing.is_finite() && config.line_spacing > 0.0 {
            config.line_spacing
        } else {
            1.5
        };
        let m = &config.margins;

        let mut css = String::new();
        let _ = write!(
            css,
            "html, body {{ margin: 0; background-color: {bg}; }}\n\
             body {{ font-family: {family}; font-size: {size}em; line-height: {line}; \
             padding: {top}px {right}px {bottom}px {left}px; color: {fg}; \
             background-color: {bg}; overflow-wrap: break-word; }}\n\
             a {{ color: {link}; }}\n\
             img, svg {{ max-width: 100%; height: auto; }}\n",
            bg = palette.background,
            fg = palette.foreground,
            link = palette.link,
            family = css_font_family(&config.font_family),
            size = font_size,
            line = line_spacing,
            top = m.top,
            right = m.right,
            bottom = m.bottom,
            left = m.left,
        );

        let settings = mode.settings();
        if settings.paginated {
            let (width, height) = viewport;
            let _ = write!(
                css,
                "html {{ height: {height}px; }}\n\
                 body {{ box-sizing: border-box; height: {height}px; column-count: {columns}; \
                 column-gap: {gap}px; column-fill: auto; overflow: hidden; \
                 width: {width}px; }}\n",
                height = height,
                width = width,
                columns = settings.pages_per_view,
                gap = m.left + m.right,
            );
        } else if settings.fit_to_width {
            css.push_str("img, svg { width: 100%; }\n");
        }

        Self { css }
    }

    pub fn css(&self) -> &str {
        &self.css
    }

    fn style_element(&self) -> String {
        format!("<style id=\"{}\">\n{}</style>", STYLE_ELEMENT_ID, self.css)
    }

    /// Return `markup` with this stylesheet applied.
    ///
    /// The style element goes last in `<head>` so it wins over publisher
    /// CSS of equal specificity. Fragments without a head are wrapped in a
    /// complete document.
    pub fn inject(&self, markup: &str) -> Result<String> {
        let lowered = markup.to_ascii_lowercase();
        let style = self.style_element();

        if !has_tag(&lowered, "head") {
            if has_tag(&lowered, "html") {
                let head = format!("<head>{}</head>", style);
                return rewrite_str(
                    markup,
                    RewriteStrSettings {
                        element_content_handlers: vec![element!("html", |el| {
                            el.prepend(&head, ContentType::Html);
                            Ok(())
                        })],
                        ..RewriteStrSettings::default()
                    },
                )
                .map_err(|e| DocumentError::Render(format!("stylesheet injection: {}", e)));
            }
            return Ok(format!(
                "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\"/>\n\
                 <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\"/>\n\
                 {}\n</head>\n<body>\n{}\n</body>\n</html>",
                style, markup
            ));
        }

        rewrite_str(
            markup,
            RewriteStrSettings {
                element_content_handlers: vec![
                    // A stale copy from an earlier pass must not linger
                    element!("style#amnesia-reader-style", |el| {
                        el.remove();
                        Ok(())
                    }),
                    element!("head", |el| {
                        el.append(&style, ContentType::Html);
                        Ok(())
                    }),
                ],
                ..RewriteStrSettings::default()
            },
        )
        .map_err(|e| DocumentError::Render(format!("stylesheet injection: {}", e)))
    }
}

fn has_tag(lowered: &str, name: &str) -> bool {
    let open = format!("<{}", name);
    lowered.match_indices(&open).any(|(at, _)| {
        matches!(
            lowered.as_bytes().get(at + open.len()),
            Some(b'>' | b' ' | b'\t' | b'\n' | b'\r' | b'/')
        )
    })
}

fn css_font_family(family: &str) -> String {
    let family = family.trim();
    match family.to_ascii_lowercase().as_str() {
        "" => "serif".to_string(),
        "serif" | "sans-serif" | "monospace" | "cursive" | "fantasy" | "system-ui" => {
            family.to_ascii_lowercase()
        }
        _ => format!("\"{}\", serif", family.replace(['"', ';', '{', '}'], "")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::config::{Margins, Theme};

    #[test]
    fn test_render_scale_clamps() {
        let mut cfg = ReaderConfig::default();
        assert_eq!(RenderScale::from_config(&cfg).get(), 1.0);
        cfg.font_size = 7.5;
        assert_eq!(RenderScale::from_config(&cfg).get(), MAX_RENDER_SCALE);
        cfg.font_size = 0.1;
        assert_eq!(RenderScale::from_config(&cfg).get(), MIN_RENDER_SCALE);
        cfg.font_size = f32::NAN;
        assert_eq!(RenderScale::from_config(&cfg).get(), 1.0);
    }

    #[test]
    fn test_stylesheet_reflects_config() {
        let cfg = ReaderConfig {
            theme: Theme::Sepia,
            font_size: 1.25,
            font_family: "Literata".into(),
            line_spacing: 1.8,
            margins: Margins {
                left: 10.0,
                top: 20.0,
                right: 30.0,
                bottom: 40.0,
            },
            ..ReaderConfig::default()
        };
        let sheet = Stylesheet::from_config(&cfg, ReadingMode::Scroll, (800, 1200));
        let css = sheet.css();
        assert!(css.contains("font-size: 1.25em"));
        assert!(css.contains("line-height: 1.8"));
        assert!(css.contains("padding: 20px 30px 40px 10px"));
        assert!(css.contains("#f4ecd8"));
        assert!(css.contains("\"Literata\", serif"));
        assert!(!css.contains("column-count"));
    }

    #[test]
    fn test_paged_modes_use_columns() {
        let cfg = ReaderConfig::default();
        let paged = Stylesheet::from_config(&cfg, ReadingMode::Paged, (800, 1200));
        assert!(paged.css().contains("column-count: 1"));
        assert!(paged.css().contains("height: 1200px"));
        let spread = Stylesheet::from_config(&cfg, ReadingMode::Spread, (800, 1200));
        assert!(spread.css().contains("column-count: 2"));
    }

    #[test]
    fn test_inject_into_head() {
        let sheet = Stylesheet::from_config(&ReaderConfig::default(), ReadingMode::Scroll, (800, 1200));
        let html = "<html><head><title>t</title></head><body><p>x</p></body></html>";
        let out = sheet.inject(html).unwrap();
        let style_at = out.find(STYLE_ELEMENT_ID).unwrap();
        assert!(style_at > out.find("<title>").unwrap());
        assert!(style_at < out.find("</head>").unwrap());

        // Re-injecting replaces instead of stacking
        let twice = sheet.inject(&out).unwrap();
        assert_eq!(twice.matches(STYLE_ELEMENT_ID).count(), 1);
    }

    #[test]
    fn test_header_is_not_head() {
        assert!(!has_tag("<body><header>x</header></body>", "head"));
        assert!(has_tag("<head>\n</head>", "head"));
        assert!(has_tag("<html xmlns=\"x\">", "html"));
    }

    #[test]
    fn test_inject_wraps_fragment() {
        let sheet = Stylesheet::from_config(&ReaderConfig::default(), ReadingMode::Scroll, (800, 1200));
        let out = sheet.inject("<p>Just a paragraph</p>").unwrap();
        assert!(out.starts_with("<!DOCTYPE html>"));
        assert!(out.contains("<p>Just a paragraph</p>"));
        assert!(out.contains(STYLE_ELEMENT_ID));
    }
}
