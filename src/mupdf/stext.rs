//! Page text layer
//!
//! MuPDF structured text reduced to lines of positioned glyphs. Search,
//! rectangle selection and word hit-testing all run on this layer, in
//! page space.

use mupdf::text_page::TextBlockType;
use mupdf::{Page, TextPageFlags};

use crate::document::{find_all, match_context, match_text, Rect, Result, TextMatch};

/// One character with its bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glyph {
    pub c: char,
    pub rect: Rect,
}

/// Glyphs on one baseline
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub glyphs: Vec<Glyph>,
    pub bounds: Rect,
}

/// A match located on the page
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedMatch {
    pub text: String,
    pub rect: Rect,
    /// Character offset inside [`PageTextLayer::plain_text`]
    pub position: usize,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageTextLayer {
    lines: Vec<TextLine>,
}

impl PageTextLayer {
    pub fn extract(page: &Page) -> Result<Self> {
        let text_page = page.to_text_page(TextPageFlags::empty())?;
        let mut lines = Vec::new();

        for block in text_page.blocks() {
            if block.r#type() != TextBlockType::Text {
                continue;
            }
            for line in block.lines() {
                let glyphs: Vec<Glyph> = line
                    .chars()
                    .filter_map(|ch| {
                        let c = ch.char()?;
                        let q = ch.quad();
                        let rect = Rect::from_ltrb(
                            q.ul.x.min(q.ll.x),
                            q.ul.y.min(q.ur.y),
                            q.ur.x.max(q.lr.x),
                            q.ll.y.max(q.lr.y),
                        );
                        Some(Glyph { c, rect })
                    })
                    .collect();
                if glyphs.is_empty() {
                    continue;
                }
                let b = line.bounds();
                lines.push(TextLine {
                    glyphs,
                    bounds: Rect::from_ltrb(b.x0, b.y0, b.x1, b.y1),
                });
            }
        }

        Ok(Self { lines })
    }

    pub fn from_lines(lines: Vec<TextLine>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[TextLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    // Characters in reading order with one '\n' between lines; the
    // separator has no rect.
    fn flatten(&self) -> (Vec<char>, Vec<Option<Rect>>) {
        let mut chars = Vec::new();
        let mut rects = Vec::new();
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                chars.push('\n');
                rects.push(None);
            }
            for g in &line.glyphs {
                chars.push(g.c);
                rects.push(Some(g.rect));
            }
        }
        (chars, rects)
    }

    pub fn plain_text(&self) -> String {
        self.flatten().0.into_iter().collect()
    }

    pub fn find(&self, query: &str, case_sensitive: bool, context_length: usize) -> Vec<LocatedMatch> {
        let (chars, rects) = self.flatten();
        find_all(&chars, query, case_sensitive)
            .into_iter()
            .map(|m: TextMatch| {
                let rect = rects[m.start..m.end]
                    .iter()
                    .flatten()
                    .fold(Rect::default(), |acc, r| acc.union(r));
                let (prefix, suffix) = match_context(&chars, m, context_length);
                LocatedMatch {
                    text: match_text(&chars, m),
                    rect,
                    position: m.start,
                    prefix,
                    suffix,
                }
            })
            .collect()
    }

    /// Text of glyphs whose centre lies inside `area`, one line per row
    pub fn text_in_rect(&self, area: &Rect) -> String {
        let mut out: Vec<String> = Vec::new();
        for line in &self.lines {
            if !line.bounds.intersects(area) {
                continue;
            }
            let picked: String = line
                .glyphs
                .iter()
                .filter(|g| {
                    let (cx, cy) = (g.rect.x + g.rect.width / 2.0, g.rect.y + g.rect.height / 2.0);
                    area.contains(cx, cy)
                })
                .map(|g| g.c)
                .collect();
            let picked = picked.trim();
            if !picked.is_empty() {
                out.push(picked.to_string());
            }
        }
        out.join("\n")
    }

    /// Word under the point, with its bounds
    pub fn word_at(&self, x: f32, y: f32) -> Option<(String, Rect)> {
        for line in &self.lines {
            let hit = line.glyphs.iter().position(|g| g.rect.contains(x, y)).or_else(|| {
                if !line.bounds.contains(x, y) {
                    return None;
                }
                // Between glyphs on the line: take the nearest one
                line.glyphs
                    .iter()
                    .enumerate()
                    .min_by(|(_, a), (_, b)| {
                        let da = (a.rect.x + a.rect.width / 2.0 - x).abs();
                        let db = (b.rect.x + b.rect.width / 2.0 - x).abs();
                        da.total_cmp(&db)
                    })
                    .map(|(i, _)| i)
            });
            let Some(i) = hit else { continue };
            if !is_word_char(line.glyphs[i].c) {
                return None;
            }

            let mut start = i;
            while start > 0 && is_word_char(line.glyphs[start - 1].c) {
                start -= 1;
            }
            let mut end = i + 1;
            while end < line.glyphs.len() && is_word_char(line.glyphs[end].c) {
                end += 1;
            }

            let word = &line.glyphs[start..end];
            let text: String = word.iter().map(|g| g.c).collect();
            let rect = word
                .iter()
                .fold(Rect::default(), |acc, g| acc.union(&g.rect));
            return Some((text, rect));
        }
        None
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '\'' || c == '\u{2019}' || c == '-' || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    // Monospaced line: each glyph 10 wide, 12 tall
    fn line(text: &str, x: f32, y: f32) -> TextLine {
        let glyphs: Vec<Glyph> = text
            .chars()
            .enumerate()
            .map(|(i, c)| Glyph {
                c,
                rect: Rect::new(x + i as f32 * 10.0, y, 10.0, 12.0),
            })
            .collect();
        let bounds = Rect::new(x, y, text.chars().count() as f32 * 10.0, 12.0);
        TextLine { glyphs, bounds }
    }

    fn layer() -> PageTextLayer {
        PageTextLayer::from_lines(vec![
            line("Hello brave world", 0.0, 0.0),
            line("second line here", 0.0, 20.0),
        ])
    }

    #[test]
    fn test_plain_text_joins_lines() {
        assert_eq!(layer().plain_text(), "Hello brave world\nsecond line here");
    }

    #[test]
    fn test_find_reports_rect_and_position() {
        let found = layer().find("BRAVE", false, 0);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "brave");
        assert_eq!(found[0].position, 6);
        assert_eq!(found[0].rect, Rect::new(60.0, 0.0, 50.0, 12.0));
        assert!(layer().find("", false, 0).is_empty());
    }

    #[test]
    fn test_find_with_context() {
        let found = layer().find("line", false, 7);
        assert_eq!(found[0].prefix.as_deref(), Some("second"));
        assert_eq!(found[0].suffix.as_deref(), Some("here"));
    }

    #[test]
    fn test_text_in_rect() {
        let l = layer();
        assert_eq!(l.text_in_rect(&Rect::new(55.0, 0.0, 50.0, 12.0)), "brave");
        assert_eq!(l.text_in_rect(&Rect::new(0.0, 0.0, 45.0, 40.0)), "Hello\nsecon");
        assert_eq!(l.text_in_rect(&Rect::new(500.0, 500.0, 10.0, 10.0)), "");
    }

    #[test]
    fn test_word_at() {
        let l = layer();
        let (word, rect) = l.word_at(75.0, 5.0).unwrap();
        assert_eq!(word, "brave");
        assert_eq!(rect, Rect::new(60.0, 0.0, 50.0, 12.0));
        // Space between words is not a word
        assert!(l.word_at(55.0, 5.0).is_none());
        assert!(l.word_at(300.0, 300.0).is_none());
        assert_eq!(l.word_at(5.0, 25.0).unwrap().0, "second");
    }
}
