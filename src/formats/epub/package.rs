//! EPUB package parsing
//!
//! `META-INF/container.xml` names the OPF; the OPF gives metadata, the
//! manifest and the spine; the NCX (when present) gives the table of
//! contents. All three are deserialized with quick-xml's serde support.

use std::collections::HashMap;
use std::io::{Read, Seek};

use quick_xml::de::from_str;
use serde::Deserialize;
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::document::{DocumentError, DocumentMetadata, Result, TocEntry};

const CONTAINER_PATH: &str = "META-INF/container.xml";

/// One spine entry, resolved to an archive path
#[derive(Debug, Clone, PartialEq)]
pub struct SpineUnit {
    pub id: String,
    /// Entry name inside the zip archive
    pub path: String,
    pub media_type: String,
    pub linear: bool,
}

/// Parsed package document
#[derive(Debug, Clone)]
pub struct EpubPackage {
    pub opf_path: String,
    pub metadata: DocumentMetadata,
    pub spine: Vec<SpineUnit>,
    /// Archive path of the NCX, if the package has one
    pub ncx_path: Option<String>,
    entries: Vec<String>,
}

impl EpubPackage {
    /// Read container, OPF and manifest from an open archive
    pub fn from_archive<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Self> {
        let entries: Vec<String> = archive.file_names().map(str::to_string).collect();

        let container_name = find_matching_file(&entries, CONTAINER_PATH)
            .ok_or_else(|| DocumentError::Corrupt("missing META-INF/container.xml".into()))?;
        let container: Container = from_str(&read_text(archive, &container_name)?)?;
        let opf_path = container
            .rootfiles
            .rootfile
            .iter()
            .find(|r| {
                r.media_type
                    .as_deref()
                    .map_or(true, |m| m == "application/oebps-package+xml")
            })
            .map(|r| normalize_epub_path(&r.full_path))
            .ok_or_else(|| DocumentError::Corrupt("container lists no package document".into()))?;

        let opf_name = find_matching_file(&entries, &opf_path)
            .ok_or_else(|| DocumentError::Corrupt(format!("missing package document {}", opf_path)))?;
        let package: OpfPackage = from_str(&read_text(archive, &opf_name)?)?;

        Self::from_parts(opf_name, package, entries)
    }

    fn from_parts(opf_path: String, package: OpfPackage, entries: Vec<String>) -> Result<Self> {
        let base = parent_dir(&opf_path);

        let mut manifest: HashMap<String, (String, String)> = HashMap::new();
        for item in package.manifest.items {
            let path = resolve_href(&base, &item.href);
            let media_type = item.media_type.unwrap_or_else(|| {
                mime_guess::from_path(&path)
                    .first()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "application/xhtml+xml".to_string())
            });
            manifest.insert(item.id, (path, media_type));
        }

        let mut spine = Vec::with_capacity(package.spine.itemrefs.len());
        for itemref in &package.spine.itemrefs {
            let Some((path, media_type)) = manifest.get(&itemref.idref) else {
                warn!(idref = %itemref.idref, "spine references unknown manifest item");
                continue;
            };
            let path = find_matching_file(&entries, path).unwrap_or_else(|| path.clone());
            spine.push(SpineUnit {
                id: itemref.idref.clone(),
                path,
                media_type: media_type.clone(),
                linear: itemref.linear.as_deref() != Some("no"),
            });
        }
        if spine.is_empty() {
            return Err(DocumentError::Corrupt("package spine is empty".into()));
        }

        let ncx_path = package
            .spine
            .toc
            .as_ref()
            .and_then(|id| manifest.get(id))
            .or_else(|| {
                manifest
                    .values()
                    .find(|(_, media_type)| media_type == "application/x-dtbncx+xml")
            })
            .and_then(|(path, _)| find_matching_file(&entries, path));

        let metadata = package.metadata.map(OpfMetadata::into_metadata).unwrap_or_default();
        debug!(opf = %opf_path, units = spine.len(), "parsed EPUB package");

        Ok(Self {
            opf_path,
            metadata,
            spine,
            ncx_path,
            entries,
        })
    }

    /// Whether the archive has an entry named exactly `path`
    pub fn contains_entry(&self, path: &str) -> bool {
        self.entries.iter().any(|e| e == path)
    }

    /// Spine index of the unit `href` points at, resolved against the
    /// unit at `from` (fragments ignored)
    pub fn spine_index_for_href(&self, from: usize, href: &str) -> Option<usize> {
        let base = self.spine.get(from).map(|u| parent_dir(&u.path))?;
        let target = resolve_href(&base, href);
        let target = find_matching_file(&self.entries, &target).unwrap_or(target);
        self.spine.iter().position(|u| u.path == target)
    }

    /// Table of contents from the NCX, mapped onto spine indices
    pub fn parse_ncx(&self, ncx_xml: &str) -> Result<Vec<TocEntry>> {
        let ncx: Ncx = from_str(ncx_xml)?;
        let base = self.ncx_path.as_deref().map(parent_dir).unwrap_or_default();
        let points = ncx.nav_map.map(|m| m.points).unwrap_or_default();
        Ok(self.convert_nav_points(&base, points))
    }

    fn convert_nav_points(&self, base: &str, points: Vec<NavPoint>) -> Vec<TocEntry> {
        points
            .into_iter()
            .map(|point| {
                let href = point.content.map(|c| c.src).filter(|s| !s.is_empty());
                let target_page = href.as_deref().and_then(|src| {
                    let path = resolve_href(base, src);
                    let path = find_matching_file(&self.entries, &path).unwrap_or(path);
                    self.spine.iter().position(|u| u.path == path)
                });
                let label = point
                    .label
                    .map(|l| l.text.trim().to_string())
                    .filter(|l| !l.is_empty())
                    .unwrap_or_else(|| "Untitled".to_string());
                TocEntry {
                    label,
                    target_page,
                    href,
                    children: self.convert_nav_points(base, point.children),
                }
            })
            .collect()
    }

    /// One entry per spine unit, for packages without a usable NCX
    pub fn spine_toc(&self) -> Vec<TocEntry> {
        self.spine
            .iter()
            .enumerate()
            .map(|(i, unit)| TocEntry {
                label: format!("Section {}", i + 1),
                target_page: Some(i),
                href: Some(unit.path.clone()),
                children: Vec::new(),
            })
            .collect()
    }
}

/// Read an archive entry as UTF-8 text (lossy)
pub fn read_text<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<String> {
    let mut file = archive.by_name(name)?;
    let mut bytes = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut bytes)?;
    Ok(match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

/// Normalize EPUB path for matching
///
/// - URL-decode percent-encoded characters
/// - Replace backslashes with forward slashes
/// - Remove leading "./" or "/"
pub fn normalize_epub_path(path: &str) -> String {
    let decoded = urlencoding::decode(path).unwrap_or_else(|_| path.into());
    decoded
        .replace('\\', "/")
        .trim_start_matches("./")
        .trim_start_matches('/')
        .to_string()
}

/// Directory part of an archive path, with trailing slash ("" at root)
fn parent_dir(path: &str) -> String {
    match path.rfind('/') {
        Some(i) => path[..=i].to_string(),
        None => String::new(),
    }
}

/// Resolve `href` (relative, maybe encoded, maybe with fragment) against
/// `base_dir`, collapsing `.` and `..` segments
pub fn resolve_href(base_dir: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or(href);
    let href = normalize_epub_path(href);
    let joined = format!("{}{}", base_dir, href);

    let mut parts: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

/// Find a matching file in the archive using fuzzy matching
///
/// Match priority:
/// 1. Exact match (case-insensitive)
/// 2. Suffix match on a path boundary
/// 3. Filename-only match, when exactly one entry has that name
pub fn find_matching_file(file_names: &[String], href: &str) -> Option<String> {
    let href = normalize_epub_path(href);
    let href_lower = href.to_lowercase();
    if href_lower.is_empty() {
        return None;
    }

    if let Some(name) = file_names.iter().find(|n| **n == href) {
        return Some(name.clone());
    }
    if let Some(name) = file_names
        .iter()
        .find(|n| normalize_epub_path(n).to_lowercase() == href_lower)
    {
        return Some(name.clone());
    }

    let suffix = format!("/{}", href_lower);
    if let Some(name) = file_names
        .iter()
        .find(|n| normalize_epub_path(n).to_lowercase().ends_with(&suffix))
    {
        return Some(name.clone());
    }

    let filename = href_lower.rsplit('/').next().unwrap_or(&href_lower);
    let mut same_name = file_names.iter().filter(|n| {
        normalize_epub_path(n)
            .to_lowercase()
            .rsplit('/')
            .next()
            .is_some_and(|f| f == filename)
    });
    match (same_name.next(), same_name.next()) {
        (Some(only), None) => Some(only.clone()),
        _ => None,
    }
}

// container.xml

#[derive(Debug, Deserialize)]
struct Container {
    rootfiles: RootFiles,
}

#[derive(Debug, Deserialize)]
struct RootFiles {
    #[serde(rename = "rootfile", default)]
    rootfile: Vec<RootFile>,
}

#[derive(Debug, Deserialize)]
struct RootFile {
    #[serde(rename = "@full-path")]
    full_path: String,
    #[serde(rename = "@media-type", default)]
    media_type: Option<String>,
}

// OPF XML structures for deserialization

#[derive(Debug, Deserialize)]
struct OpfPackage {
    #[serde(default)]
    metadata: Option<OpfMetadata>,
    manifest: OpfManifest,
    spine: OpfSpine,
}

#[derive(Debug, Default, Deserialize)]
struct OpfMetadata {
    #[serde(rename = "title", default)]
    title: Vec<DcElement>,

    #[serde(rename = "creator", default)]
    creator: Vec<DcElement>,

    #[serde(rename = "language", default)]
    language: Vec<DcElement>,

    #[serde(rename = "identifier", default)]
    identifier: Vec<DcElement>,
}

impl OpfMetadata {
    fn into_metadata(self) -> DocumentMetadata {
        let first = |items: Vec<DcElement>| {
            items
                .into_iter()
                .map(|e| e.content.trim().to_string())
                .find(|s| !s.is_empty())
        };
        DocumentMetadata {
            creators: self
                .creator
                .into_iter()
                .map(|c| c.content.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            title: first(self.title),
            language: first(self.language),
            identifier: first(self.identifier),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DcElement {
    #[serde(rename = "$text", default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpfManifest {
    #[serde(rename = "item", default)]
    items: Vec<OpfItem>,
}

#[derive(Debug, Deserialize)]
struct OpfItem {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@media-type", default)]
    media_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpfSpine {
    #[serde(rename = "@toc", default)]
    toc: Option<String>,
    #[serde(rename = "itemref", default)]
    itemrefs: Vec<OpfItemRef>,
}

#[derive(Debug, Deserialize)]
struct OpfItemRef {
    #[serde(rename = "@idref")]
    idref: String,
    #[serde(rename = "@linear", default)]
    linear: Option<String>,
}

// NCX

#[derive(Debug, Deserialize)]
struct Ncx {
    #[serde(rename = "navMap", default)]
    nav_map: Option<NavMap>,
}

#[derive(Debug, Deserialize)]
struct NavMap {
    #[serde(rename = "navPoint", default)]
    points: Vec<NavPoint>,
}

#[derive(Debug, Deserialize)]
struct NavPoint {
    #[serde(rename = "navLabel", default)]
    label: Option<NavLabel>,
    #[serde(default)]
    content: Option<NavContent>,
    #[serde(rename = "navPoint", default)]
    children: Vec<NavPoint>,
}

#[derive(Debug, Deserialize)]
struct NavLabel {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct NavContent {
    #[serde(rename = "@src")]
    src: String,
}
