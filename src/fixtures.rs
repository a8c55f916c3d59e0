//! Sample documents built in memory for tests and benchmarks
//!
//! The PDFs are minimal but valid (correct xref offsets, base-14 font);
//! the EPUBs follow the OCF layout with a stored `mimetype` entry first.

use std::io::{Cursor, Write};

use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Link annotation target for a fixture page
#[derive(Debug, Clone)]
pub enum PdfLink {
    Uri(String),
    /// Zero-based page index
    Page(usize),
}

/// Link hot area in PDF user space (origin bottom-left)
pub const LINK_RECT: [f32; 4] = [72.0, 700.0, 300.0, 730.0];

#[derive(Debug, Clone)]
struct FixturePage {
    text: String,
    link: Option<PdfLink>,
}

/// Builds a Letter-sized PDF, one line of Helvetica 12pt per page at (72, 720)
#[derive(Debug, Clone, Default)]
pub struct PdfBuilder {
    pages: Vec<FixturePage>,
    title: Option<String>,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn page(mut self, text: &str) -> Self {
        self.pages.push(FixturePage {
            text: text.to_string(),
            link: None,
        });
        self
    }

    pub fn page_with_link(mut self, text: &str, link: PdfLink) -> Self {
        self.pages.push(FixturePage {
            text: text.to_string(),
            link: Some(link),
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        // 1 catalog, 2 pages tree, 3 font, then (page, content) pairs, then info
        let page_obj = |i: usize| 4 + 2 * i;
        let mut objects: Vec<String> = Vec::new();

        objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
        let kids: Vec<String> = (0..self.pages.len())
            .map(|i| format!("{} 0 R", page_obj(i)))
            .collect();
        objects.push(format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            self.pages.len()
        ));
        objects.push(
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
                .to_string(),
        );

        for (i, page) in self.pages.iter().enumerate() {
            let annots = match &page.link {
                None => String::new(),
                Some(link) => {
                    let action = match link {
                        PdfLink::Uri(uri) => {
                            format!("/A << /S /URI /URI ({}) >>", escape_pdf_string(uri))
                        }
                        PdfLink::Page(target) => {
                            format!("/Dest [{} 0 R /XYZ null null null]", page_obj(*target))
                        }
                    };
                    format!(
                        " /Annots [<< /Type /Annot /Subtype /Link /Rect [{} {} {} {}] /Border [0 0 0] {} >>]",
                        LINK_RECT[0], LINK_RECT[1], LINK_RECT[2], LINK_RECT[3], action
                    )
                }
            };
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
                 /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R{} >>",
                page_obj(i) + 1,
                annots
            ));
            let stream = format!(
                "BT /F1 12 Tf 72 720 Td ({}) Tj ET",
                escape_pdf_string(&page.text)
            );
            objects.push(format!(
                "<< /Length {} >>\nstream\n{}\nendstream",
                stream.len(),
                stream
            ));
        }

        let info = self.title.as_ref().map(|title| {
            objects.push(format!("<< /Title ({}) >>", escape_pdf_string(title)));
            objects.len()
        });

        let trailer_extra = info
            .map(|num| format!(" /Info {} 0 R", num))
            .unwrap_or_default();
        assemble(&objects, &trailer_extra)
    }
}

/// `count` pages reading "Page N of the sample document"
pub fn pdf_with_pages(count: usize) -> Vec<u8> {
    (1..=count)
        .fold(PdfBuilder::new(), |b, n| {
            b.page(&format!("Page {} of the sample document", n))
        })
        .build()
}

/// One page per entry of `texts`
pub fn pdf_with_texts(texts: &[&str]) -> Vec<u8> {
    texts
        .iter()
        .fold(PdfBuilder::new(), |b, t| b.page(t))
        .build()
}

const PASSWORD_PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01,
    0x08, 0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53,
    0x69, 0x7A,
];

/// One blank page protected by the standard security handler, revision 2
/// (40-bit RC4), opening with `user_password`.
pub fn encrypted_pdf(user_password: &str) -> Vec<u8> {
    let id = *b"amnesia-fixture!";
    let permissions: i32 = -44;

    let owner_digest = md5::compute(pad_password("owner-secret"));
    let o = rc4(&owner_digest.0[..5], &pad_password(user_password));

    let mut key_input = Vec::with_capacity(32 + 32 + 4 + id.len());
    key_input.extend_from_slice(&pad_password(user_password));
    key_input.extend_from_slice(&o);
    key_input.extend_from_slice(&permissions.to_le_bytes());
    key_input.extend_from_slice(&id);
    let key_digest = md5::compute(&key_input);
    let u = rc4(&key_digest.0[..5], &PASSWORD_PADDING);

    let objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << >> >>".to_string(),
        format!(
            "<< /Filter /Standard /V 1 /R 2 /Length 40 /O <{}> /U <{}> /P {} >>",
            hex(&o),
            hex(&u),
            permissions
        ),
    ];
    let id_hex = hex(&id);
    assemble(
        &objects,
        &format!(" /Encrypt 4 0 R /ID [<{}> <{}>]", id_hex, id_hex),
    )
}

fn assemble(objects: &[String], trailer_extra: &str) -> Vec<u8> {
    let mut out: Vec<u8> = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }

    let xref_at = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R{} >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            trailer_extra,
            xref_at
        )
        .as_bytes(),
    );
    out
}

fn escape_pdf_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('(', "\\(").replace(')', "\\)")
}

fn pad_password(password: &str) -> [u8; 32] {
    let mut padded = [0u8; 32];
    let bytes = password.as_bytes();
    let n = bytes.len().min(32);
    padded[..n].copy_from_slice(&bytes[..n]);
    padded[n..].copy_from_slice(&PASSWORD_PADDING[..32 - n]);
    padded
}

fn rc4(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut s: Vec<u8> = (0..=255).collect();
    let mut j: u8 = 0;
    for i in 0..256 {
        j = j.wrapping_add(s[i]).wrapping_add(key[i % key.len()]);
        s.swap(i, j as usize);
    }
    let (mut i, mut j) = (0u8, 0u8);
    data.iter()
        .map(|byte| {
            i = i.wrapping_add(1);
            j = j.wrapping_add(s[i as usize]);
            s.swap(i as usize, j as usize);
            let k = s[(s[i as usize].wrapping_add(s[j as usize])) as usize];
            byte ^ k
        })
        .collect()
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// One spine unit of a fixture EPUB
#[derive(Debug, Clone)]
pub struct EpubChapter {
    pub title: String,
    /// Raw XHTML placed inside `<body>` after the heading
    pub body: String,
}

impl EpubChapter {
    pub fn new(title: &str, body: &str) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
        }
    }
}

/// Chapter file name inside the archive, relative to the OPF
pub fn epub_chapter_href(index: usize) -> String {
    format!("text/ch{}.xhtml", index + 1)
}

/// EPUB 2 package with an NCX, chapters under `OEBPS/text/`
pub fn epub_with_chapters(chapters: &[EpubChapter]) -> Vec<u8> {
    let mut manifest = String::from(
        "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n",
    );
    let mut spine = String::new();
    let mut nav_points = String::new();
    for (i, chapter) in chapters.iter().enumerate() {
        let href = epub_chapter_href(i);
        manifest.push_str(&format!(
            "    <item id=\"ch{}\" href=\"{}\" media-type=\"application/xhtml+xml\"/>\n",
            i + 1,
            href
        ));
        spine.push_str(&format!("    <itemref idref=\"ch{}\"/>\n", i + 1));
        nav_points.push_str(&format!(
            "    <navPoint id=\"np{n}\" playOrder=\"{n}\"><navLabel><text>{title}</text></navLabel>\
             <content src=\"{href}\"/></navPoint>\n",
            n = i + 1,
            title = chapter.title,
            href = href
        ));
    }

    let opf = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
    <dc:title>Fixture Book</dc:title>
    <dc:creator opf:role="aut">Ada Writer</dc:creator>
    <dc:language>en</dc:language>
    <dc:identifier id="bookid">urn:uuid:00000000-0000-4000-8000-000000000001</dc:identifier>
  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine toc="ncx">
{spine}  </spine>
</package>
"#
    );
    let ncx = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head/>
  <docTitle><text>Fixture Book</text></docTitle>
  <navMap>
{nav_points}  </navMap>
</ncx>
"#
    );

    let mut files: Vec<(String, String)> = vec![
        (
            "META-INF/container.xml".to_string(),
            r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#
            .to_string(),
        ),
        ("OEBPS/content.opf".to_string(), opf),
        ("OEBPS/toc.ncx".to_string(), ncx),
    ];
    for (i, chapter) in chapters.iter().enumerate() {
        files.push((
            format!("OEBPS/{}", epub_chapter_href(i)),
            format!(
                r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>{title}</title></head>
<body>
<h1>{title}</h1>
{body}
</body>
</html>
"#,
                title = chapter.title,
                body = chapter.body
            ),
        ));
    }
    zip_entries(&files)
}

/// Zip `files` after a stored `mimetype` entry, as OCF requires
pub fn zip_entries(files: &[(String, String)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    writer
        .start_file("mimetype", stored)
        .expect("start mimetype entry");
    writer
        .write_all(b"application/epub+zip")
        .expect("write mimetype");
    for (name, content) in files {
        writer
            .start_file(name.as_str(), deflated)
            .expect("start zip entry");
        writer.write_all(content.as_bytes()).expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

/// Persist `bytes` to a temp file with the given suffix (e.g. `".pdf"`)
pub fn write_temp(bytes: &[u8], suffix: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .prefix("amnesia-reader-")
        .suffix(suffix)
        .tempfile()
        .expect("create temp file");
    file.write_all(bytes).expect("write temp file");
    file.flush().expect("flush temp file");
    file
}
