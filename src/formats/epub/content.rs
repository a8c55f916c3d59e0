//! Markup to plain text for EPUB content documents
//!
//! Search positions are character offsets into this text, so the output
//! must be stable for a given document.

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

/// Elements whose content never reaches the reader
const SKIPPED: &[&[u8]] = &[b"head", b"script", b"style", b"noscript", b"svg"];

/// Elements that start a new line
const BLOCKS: &[&[u8]] = &[
    b"p", b"div", b"section", b"article", b"aside", b"header", b"footer", b"nav", b"h1", b"h2",
    b"h3", b"h4", b"h5", b"h6", b"li", b"ul", b"ol", b"dt", b"dd", b"dl", b"blockquote", b"pre",
    b"tr", b"table", b"figure", b"figcaption", b"hr", b"br", b"body",
];

/// Plain text of an XHTML content document
///
/// One line per block element, whitespace inside a line collapsed.
pub fn markup_to_text(markup: &str) -> String {
    match extract_events(markup) {
        Ok(text) => text,
        Err(e) => {
            debug!(error = %e, "malformed markup, stripping tags");
            strip_tags(markup)
        }
    }
}

fn extract_events(markup: &str) -> Result<String, quick_xml::Error> {
    let mut reader = Reader::from_str(markup);
    reader.check_end_names(false);

    let mut raw = String::with_capacity(markup.len() / 2);
    let mut skip_depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.local_name();
                let name = name.as_ref();
                if skip_depth > 0 || SKIPPED.contains(&name) {
                    skip_depth += 1;
                } else if is_block(name) {
                    raw.push('\n');
                }
            }
            Event::End(e) => {
                let name = e.local_name();
                if skip_depth > 0 {
                    skip_depth -= 1;
                } else if is_block(name.as_ref()) {
                    raw.push('\n');
                }
            }
            Event::Empty(e) => {
                if skip_depth == 0 && is_block(e.local_name().as_ref()) {
                    raw.push('\n');
                }
            }
            Event::Text(t) if skip_depth == 0 => {
                let text = String::from_utf8_lossy(t.as_ref());
                push_inline(&mut raw, &html_escape::decode_html_entities(&text));
            }
            Event::CData(c) if skip_depth == 0 => {
                push_inline(&mut raw, &String::from_utf8_lossy(c.as_ref()));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(normalize_lines(&raw))
}

/// Source line breaks inside a block are just spaces
fn push_inline(out: &mut String, text: &str) {
    out.extend(text.chars().map(|c| if c.is_whitespace() { ' ' } else { c }));
}

fn is_block(name: &[u8]) -> bool {
    BLOCKS.iter().any(|b| b.eq_ignore_ascii_case(name))
}

/// Drop everything between `<` and `>`; used when the markup is not XML
fn strip_tags(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len() / 2);
    let mut in_tag = false;
    for c in markup.chars() {
        match c {
            '<' => {
                in_tag = true;
                out.push('\n');
            }
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(if c.is_whitespace() { ' ' } else { c }),
            _ => {}
        }
    }
    normalize_lines(&html_escape::decode_html_entities(&out))
}

fn normalize_lines(raw: &str) -> String {
    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
