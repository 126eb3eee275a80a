//! Multi-format text extraction (EPUB, PDF, DOCX, PPTX, TXT).
//!
//! Each extractor takes the raw bytes of one source document and returns its
//! plain UTF-8 text. Extraction never panics; a failure is returned as an
//! [`ExtractError`] and the ingestion driver records it and moves on.
//!
//! Line layout per format:
//!
//! | Format | One line per |
//! |--------|--------------|
//! | EPUB | XHTML content item (spine order) |
//! | PDF | page |
//! | DOCX | paragraph |
//! | PPTX | text-bearing shape, slides in order |
//! | TXT | unchanged |

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::models::DocumentFormat;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// XHTML elements whose end starts a new line in EPUB text.
const BLOCK_ELEMENTS: &[&[u8]] = &[
    b"p", b"div", b"h1", b"h2", b"h3", b"h4", b"h5", b"h6", b"li", b"tr", b"blockquote",
    b"section", b"pre", b"dt", b"dd",
];

/// Extraction error. The pipeline reports it and skips the item.
#[derive(Debug)]
pub enum ExtractError {
    Io(String),
    TooLarge { size: u64, limit: u64 },
    Pdf(String),
    Ooxml(String),
    Epub(String),
    Text(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Io(e) => write!(f, "could not read file: {}", e),
            ExtractError::TooLarge { size, limit } => {
                write!(f, "file is {} bytes, limit is {} bytes", size, limit)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Ooxml(e) => write!(f, "OOXML extraction failed: {}", e),
            ExtractError::Epub(e) => write!(f, "EPUB extraction failed: {}", e),
            ExtractError::Text(e) => write!(f, "text decoding failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Read a file from disk and extract its text.
///
/// `max_bytes` rejects oversized sources before reading them.
pub fn extract_file(
    path: &Path,
    format: DocumentFormat,
    max_bytes: Option<u64>,
) -> Result<String, ExtractError> {
    if let Some(limit) = max_bytes {
        let size = std::fs::metadata(path)
            .map_err(|e| ExtractError::Io(e.to_string()))?
            .len();
        if size > limit {
            return Err(ExtractError::TooLarge { size, limit });
        }
    }
    let bytes = std::fs::read(path).map_err(|e| ExtractError::Io(e.to_string()))?;
    extract_text(&bytes, format)
}

/// Extract plain text from the bytes of a document in `format`.
pub fn extract_text(bytes: &[u8], format: DocumentFormat) -> Result<String, ExtractError> {
    match format {
        DocumentFormat::Epub => extract_epub(bytes),
        DocumentFormat::Pdf => extract_pdf(bytes),
        DocumentFormat::Docx => extract_docx(bytes),
        DocumentFormat::Pptx => extract_pptx(bytes),
        DocumentFormat::Txt => String::from_utf8(bytes.to_vec())
            .map_err(|e| ExtractError::Text(e.to_string())),
    }
}

// ============ PDF ============

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract panics on some malformed inputs instead of returning an error.
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| ExtractError::Pdf("parser aborted on malformed input".to_string()))?
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(join_pages(&pages))
}

/// Concatenate page texts, one newline per page. Empty pages stay empty.
fn join_pages(pages: &[String]) -> String {
    let mut out = String::new();
    for page in pages {
        out.push_str(page.trim_end_matches('\n'));
        out.push('\n');
    }
    out
}

// ============ OOXML (DOCX, PPTX) ============

type ZipReader<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_zip(bytes: &[u8]) -> Result<ZipReader<'_>, String> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| e.to_string())
}

fn read_zip_entry_bounded(
    archive: &mut ZipReader<'_>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, String> {
    let entry = archive.by_name(name).map_err(|e| format!("{}: {}", name, e))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| e.to_string())?;
    if out.len() as u64 >= max_bytes {
        return Err(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        ));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_zip(bytes).map_err(ExtractError::Ooxml)?;
    let doc_xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)
        .map_err(ExtractError::Ooxml)?;
    let paragraphs = docx_paragraphs(&doc_xml).map_err(ExtractError::Ooxml)?;
    Ok(paragraphs.join("\n"))
}

/// Collect the text of every `w:p` in document order.
///
/// Paragraphs nested in text boxes finish before their enclosing paragraph
/// and are emitted first.
fn docx_paragraphs(xml: &[u8]) -> Result<Vec<String>, String> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut paragraphs = Vec::new();
    let mut open: Vec<String> = Vec::new();
    let mut in_t = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => open.push(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if let Some(current) = open.last_mut() {
                    match e.local_name().as_ref() {
                        b"tab" => current.push('\t'),
                        b"br" | b"cr" => current.push('\n'),
                        _ => {}
                    }
                }
                if e.local_name().as_ref() == b"p" {
                    paragraphs.push(String::new());
                }
            }
            Ok(Event::Text(te)) if in_t => {
                let text = te.unescape().map_err(|e| e.to_string())?;
                if let Some(current) = open.last_mut() {
                    current.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" => {
                    if let Some(done) = open.pop() {
                        paragraphs.push(done);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs)
}

fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_zip(bytes).map_err(ExtractError::Ooxml)?;
    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    slide_names.sort_by_key(|name| {
        name.trim_start_matches("ppt/slides/slide")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });

    let mut out = String::new();
    for name in slide_names {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)
            .map_err(ExtractError::Ooxml)?;
        for shape_text in pptx_shape_texts(&xml).map_err(ExtractError::Ooxml)? {
            out.push_str(&shape_text);
            out.push('\n');
        }
    }
    Ok(out)
}

/// Text of every shape (`p:sp`) on one slide that has a non-empty text body.
/// A shape's paragraphs are joined with newlines.
fn pptx_shape_texts(xml: &[u8]) -> Result<Vec<String>, String> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut shapes = Vec::new();

    let mut in_shape = false;
    let mut in_body = false;
    let mut in_t = false;
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"sp" => {
                    in_shape = true;
                    paragraphs.clear();
                }
                b"txBody" if in_shape => in_body = true,
                b"p" if in_body => current.clear(),
                b"t" if in_body => in_t = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if in_body && e.local_name().as_ref() == b"br" {
                    current.push('\n');
                }
            }
            Ok(Event::Text(te)) if in_t => {
                let text = te.unescape().map_err(|e| e.to_string())?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" if in_body => paragraphs.push(std::mem::take(&mut current)),
                b"txBody" => in_body = false,
                b"sp" => {
                    in_shape = false;
                    let text = paragraphs.join("\n");
                    if !text.trim().is_empty() {
                        shapes.push(text);
                    }
                    paragraphs.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    Ok(shapes)
}

// ============ EPUB ============

fn extract_epub(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_zip(bytes).map_err(ExtractError::Epub)?;
    let items = epub_content_items(&mut archive)?;
    if items.is_empty() {
        return Err(ExtractError::Epub(
            "no XHTML content items found".to_string(),
        ));
    }

    let mut out = String::new();
    for name in items {
        let html = match read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES) {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!(item = %name, error = %e, "skipping unreadable EPUB item");
                continue;
            }
        };
        out.push_str(&html_to_text(&html));
        out.push('\n');
    }
    Ok(out)
}

/// Archive paths of the book's XHTML items in reading order.
///
/// Follows `META-INF/container.xml` to the OPF package and orders items by
/// the spine, then any remaining XHTML manifest items. Archives without a
/// usable package fall back to every `.xhtml`/`.html` entry in archive order.
fn epub_content_items(archive: &mut ZipReader<'_>) -> Result<Vec<String>, ExtractError> {
    let opf_path = read_zip_entry_bounded(archive, "META-INF/container.xml", MAX_XML_ENTRY_BYTES)
        .ok()
        .and_then(|xml| find_rootfile(&xml));

    let Some(opf_path) = opf_path else {
        return Ok(archive
            .file_names()
            .filter(|n| is_html_name(n))
            .map(|s| s.to_string())
            .collect());
    };

    let opf = read_zip_entry_bounded(archive, &opf_path, MAX_XML_ENTRY_BYTES)
        .map_err(ExtractError::Epub)?;
    let package = parse_opf(&opf).map_err(ExtractError::Epub)?;
    let base = match opf_path.rfind('/') {
        Some(pos) => &opf_path[..=pos],
        None => "",
    };

    let mut ordered: Vec<String> = Vec::new();
    for idref in &package.spine {
        if let Some((href, media_type)) = package.manifest.get(idref) {
            if is_html_media_type(media_type) {
                ordered.push(href.clone());
            }
        }
    }
    for (_, (href, media_type)) in package.manifest_order() {
        if is_html_media_type(media_type) && !ordered.contains(href) {
            ordered.push(href.clone());
        }
    }

    Ok(ordered
        .into_iter()
        .map(|href| resolve_href(base, &href))
        .filter(|name| archive.index_for_name(name).is_some())
        .collect())
}

fn is_html_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".xhtml") || lower.ends_with(".html") || lower.ends_with(".htm")
}

fn is_html_media_type(media_type: &str) -> bool {
    media_type == "application/xhtml+xml" || media_type == "text/html"
}

/// Join an OPF-relative href onto the OPF directory, resolving `..`.
fn resolve_href(base: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or(href).replace("%20", " ");
    let mut parts: Vec<&str> = base.split('/').filter(|p| !p.is_empty()).collect();
    for segment in href.split('/') {
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

fn find_rootfile(xml: &[u8]) -> Option<String> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"rootfile" => {
                return attribute(&e, b"full-path");
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

struct OpfPackage {
    /// id → (href, media-type)
    manifest: HashMap<String, (String, String)>,
    manifest_ids: Vec<String>,
    spine: Vec<String>,
}

impl OpfPackage {
    fn manifest_order(&self) -> impl Iterator<Item = (&String, &(String, String))> {
        self.manifest_ids
            .iter()
            .filter_map(|id| self.manifest.get(id).map(|entry| (id, entry)))
    }
}

fn parse_opf(xml: &[u8]) -> Result<OpfPackage, String> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut package = OpfPackage {
        manifest: HashMap::new(),
        manifest_ids: Vec::new(),
        spine: Vec::new(),
    };
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"item" => {
                    let id = attribute(&e, b"id");
                    let href = attribute(&e, b"href");
                    let media_type = attribute(&e, b"media-type").unwrap_or_default();
                    if let (Some(id), Some(href)) = (id, href) {
                        package.manifest_ids.push(id.clone());
                        package.manifest.insert(id, (href, media_type));
                    }
                }
                b"itemref" => {
                    if let Some(idref) = attribute(&e, b"idref") {
                        package.spine.push(idref);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("invalid OPF package: {}", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(package)
}

fn attribute(e: &quick_xml::events::BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        if a.key.local_name().as_ref() == key {
            a.unescape_value().ok().map(|v| v.into_owned())
        } else {
            None
        }
    })
}

/// Strip markup from an XHTML document, keeping its visible text.
///
/// `head`, `script` and `style` content is dropped; block elements end a
/// line. Malformed markup stops the parse and keeps the text read so far.
pub fn html_to_text(html: &[u8]) -> String {
    let mut reader = Reader::from_reader(html);
    {
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = false;
    }
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut skip_depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if matches!(e.local_name().as_ref(), b"head" | b"script" | b"style") {
                    skip_depth += 1;
                }
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if matches!(name.as_ref(), b"head" | b"script" | b"style") {
                    skip_depth = skip_depth.saturating_sub(1);
                } else if skip_depth == 0 && BLOCK_ELEMENTS.contains(&name.as_ref()) {
                    out.push('\n');
                }
            }
            Ok(Event::Empty(e)) => {
                if skip_depth == 0 && e.local_name().as_ref() == b"br" {
                    out.push('\n');
                }
            }
            Ok(Event::Text(te)) if skip_depth == 0 => {
                match te.unescape_with(html_entity) {
                    Ok(text) => out.push_str(&text),
                    Err(_) => out.push_str(&unescape_lenient(&String::from_utf8_lossy(&te))),
                }
            }
            Ok(Event::CData(cd)) if skip_depth == 0 => {
                out.push_str(&String::from_utf8_lossy(&cd));
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::debug!(error = %e, "stopping at malformed markup");
                break;
            }
            _ => {}
        }
        buf.clear();
    }
    tidy_lines(&out)
}

/// XML's five entities plus every HTML5 named entity.
fn html_entity(name: &str) -> Option<&'static str> {
    match name {
        "nbsp" => Some(" "),
        _ => quick_xml::escape::resolve_html5_entity(name),
    }
}

/// Resolve entities one at a time, leaving only the unknown ones as written.
fn unescape_lenient(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match tail.find(';') {
            Some(end) if end <= 32 => {
                let token = &tail[..=end];
                match quick_xml::escape::unescape_with(token, html_entity) {
                    Ok(text) => out.push_str(&text),
                    Err(_) => out.push_str(token),
                }
                rest = &tail[end + 1..];
            }
            _ => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Trim each line and collapse runs of blank lines to one.
fn tidy_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 || out.is_empty() {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim_end().to_string()
}
