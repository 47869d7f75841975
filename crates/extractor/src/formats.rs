//! Format-specific parsers. Every parser here is fallible internally but
//! never surfaces that failure to the dispatcher: callers get `("", mime)`
//! and a logged warning instead (§4.2, §7).

use std::io::Read;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::warn;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_XLSX: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_JSON: &str = "application/json";
pub const MIME_JS: &str = "application/javascript";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_ZIP: &str = "application/zip";
pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

/// Sniff the media type from file content, falling back to the path's
/// extension only for the handful of text-like types that share no common
/// magic bytes.
pub fn detect_media_type(path: &Path, head: &[u8]) -> String {
    if head.starts_with(b"%PDF-") {
        return MIME_PDF.to_string();
    }
    if head.starts_with(b"PK\x03\x04") {
        return sniff_ooxml(path).unwrap_or_else(|| MIME_ZIP.to_string());
    }
    if is_probably_binary(head) {
        return MIME_OCTET_STREAM.to_string();
    }
    match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase) {
        Some(ref ext) if ext == "js" => MIME_JS.to_string(),
        Some(ref ext) if ext == "json" => MIME_JSON.to_string(),
        _ => MIME_TEXT.to_string(),
    }
}

/// A zip container could be docx/xlsx/pptx or a plain zip; distinguish by
/// the presence of the OOXML part that names the document kind.
fn sniff_ooxml(path: &Path) -> Option<String> {
    let file = std::fs::File::open(path).ok()?;
    let mut archive = zip::ZipArchive::new(file).ok()?;
    if archive.by_name("word/document.xml").is_ok() {
        return Some(MIME_DOCX.to_string());
    }
    if archive.by_name("xl/workbook.xml").is_ok() {
        return Some(MIME_XLSX.to_string());
    }
    if archive.by_name("ppt/presentation.xml").is_ok() {
        return Some(MIME_PPTX.to_string());
    }
    None
}

fn is_probably_binary(sample: &[u8]) -> bool {
    if sample.contains(&0) {
        return true;
    }
    let ctrl = sample
        .iter()
        .filter(|&&b| b < 0x09 || (b > 0x0D && b < 0x20))
        .count();
    !sample.is_empty() && ctrl * 20 > sample.len()
}

static WARNED_ONCE: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

fn warn_once(media_type: &str, reason: &str) {
    let mut seen = WARNED_ONCE.lock().expect("warn registry lock poisoned");
    if seen.insert(media_type.to_string()) {
        warn!(media_type, reason, "parser unavailable for media type");
    }
}

/// `utf-8, latin-1, cp1252, iso-8859-1` in order; latin-1 is a total
/// function over bytes so in practice it always wins once utf-8 fails — the
/// remaining two entries exist for fidelity with the documented order, not
/// because they are ever reached.
pub fn decode_bytes(bytes: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    decode_latin1(bytes)
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

const TRUNCATE_CHARS: usize = 1024 * 1024;
const TRUNCATE_MARKER: &str = "... [truncated]";

/// Truncate decoded text at 1 MiB of characters with a trailing marker.
pub fn truncate_decoded(text: String) -> String {
    if text.chars().count() <= TRUNCATE_CHARS {
        return text;
    }
    let mut out: String = text.chars().take(TRUNCATE_CHARS).collect();
    out.push_str(TRUNCATE_MARKER);
    out
}

/// PDF text extraction, page by page, concatenated.
pub fn extract_pdf(path: &Path) -> String {
    match pdf_extract::extract_text(path) {
        Ok(text) => text,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "pdf extraction failed");
            String::new()
        }
    }
}

/// Word-processor document text: every paragraph's runs, joined by newlines.
pub fn extract_docx(path: &Path) -> String {
    let Ok(bytes) = std::fs::read(path) else {
        return String::new();
    };
    match docx_rs::read_docx(&bytes) {
        Ok(docx) => docx_paragraphs_to_text(&docx),
        Err(e) => {
            warn!(path = %path.display(), error = ?e, "docx extraction failed");
            String::new()
        }
    }
}

fn docx_paragraphs_to_text(docx: &docx_rs::Docx) -> String {
    use docx_rs::{DocumentChild, ParagraphChild, RunChild};

    let mut lines = Vec::new();
    for child in &docx.document.children {
        if let DocumentChild::Paragraph(paragraph) = child {
            let mut line = String::new();
            for pchild in &paragraph.children {
                if let ParagraphChild::Run(run) = pchild {
                    for rchild in &run.children {
                        if let RunChild::Text(text) = rchild {
                            line.push_str(&text.text);
                        }
                    }
                }
            }
            if !line.is_empty() {
                lines.push(line);
            }
        }
    }
    lines.join("\n")
}

/// Spreadsheet text: cells joined by tabs, rows by newlines, sheets by a
/// blank line.
pub fn extract_xlsx(path: &Path) -> String {
    use calamine::{open_workbook_auto, Data, Reader};

    let mut workbook = match open_workbook_auto(path) {
        Ok(wb) => wb,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "spreadsheet open failed");
            return String::new();
        }
    };

    let mut sheets_out = Vec::new();
    for sheet_name in workbook.sheet_names() {
        let Ok(range) = workbook.worksheet_range(&sheet_name) else {
            continue;
        };
        let rows: Vec<String> = range
            .rows()
            .map(|row| {
                row.iter()
                    .map(cell_to_string)
                    .collect::<Vec<_>>()
                    .join("\t")
            })
            .collect();
        if !rows.is_empty() {
            sheets_out.push(rows.join("\n"));
        }
    }
    sheets_out.join("\n\n")
}

fn cell_to_string(cell: &calamine::Data) -> String {
    use calamine::Data;
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

static SLIDE_TEXT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<a:t>([^<]*)</a:t>").unwrap());

/// Presentation text: DrawingML text runs from every slide, slides
/// separated by a blank line. No mainstream crate reads pptx directly, so
/// this walks the zip's `ppt/slides/slideN.xml` parts and regex-extracts
/// `<a:t>` run text, which covers the overwhelming majority of slide
/// content without a full OOXML object model.
pub fn extract_pptx(path: &Path) -> String {
    let Ok(file) = std::fs::File::open(path) else {
        return String::new();
    };
    let Ok(mut archive) = zip::ZipArchive::new(file) else {
        return String::new();
    };

    let mut slide_names: Vec<String> = (0..archive.len())
        .filter_map(|i| archive.by_index(i).ok().map(|f| f.name().to_string()))
        .filter(|name| {
            name.starts_with("ppt/slides/slide") && name.ends_with(".xml")
        })
        .collect();
    slide_names.sort_by_key(|name| slide_number(name));

    let mut slides_out = Vec::new();
    for name in slide_names {
        let Ok(mut entry) = archive.by_name(&name) else {
            continue;
        };
        let mut xml = String::new();
        if entry.read_to_string(&mut xml).is_err() {
            continue;
        }
        let runs: Vec<String> = SLIDE_TEXT_RE
            .captures_iter(&xml)
            .map(|c| unescape_xml(&c[1]))
            .filter(|s| !s.is_empty())
            .collect();
        if !runs.is_empty() {
            slides_out.push(runs.join(" "));
        }
    }
    slides_out.join("\n\n")
}

fn slide_number(name: &str) -> u32 {
    name.trim_start_matches("ppt/slides/slide")
        .trim_end_matches(".xml")
        .parse()
        .unwrap_or(0)
}

fn unescape_xml(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}

/// Signal that OCR for image-only documents was requested but is not wired
/// in this build; logs once per media type rather than once per file.
pub fn warn_missing_ocr(media_type: &str) {
    warn_once(media_type, "ocr backend not configured");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_bytes_prefers_utf8() {
        assert_eq!(decode_bytes("héllo".as_bytes()), "héllo");
    }

    #[test]
    fn decode_bytes_falls_back_to_latin1() {
        // 0xe9 is 'é' in Latin-1 but not valid standalone UTF-8.
        let bytes = [b'a', 0xe9, b'b'];
        assert_eq!(decode_bytes(&bytes), "a\u{e9}b");
    }

    #[test]
    fn truncate_decoded_marks_long_text() {
        let long = "x".repeat(TRUNCATE_CHARS + 10);
        let out = truncate_decoded(long);
        assert!(out.ends_with(TRUNCATE_MARKER));
        assert_eq!(out.chars().count(), TRUNCATE_CHARS + TRUNCATE_MARKER.len());
    }

    #[test]
    fn truncate_decoded_leaves_short_text_untouched() {
        let short = "hello".to_string();
        assert_eq!(truncate_decoded(short.clone()), short);
    }

    #[test]
    fn detect_media_type_recognizes_pdf_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.pdf");
        assert_eq!(detect_media_type(&path, b"%PDF-1.4 rest"), MIME_PDF);
    }

    #[test]
    fn detect_media_type_defaults_text_for_plain_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.unknownext");
        assert_eq!(detect_media_type(&path, b"hello world"), MIME_TEXT);
    }

    #[test]
    fn detect_media_type_respects_json_extension_for_textlike_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.json");
        assert_eq!(detect_media_type(&path, b"{\"a\":1}"), MIME_JSON);
    }

    #[test]
    fn slide_text_regex_extracts_runs() {
        let xml = "<p><a:t>Hello</a:t><a:t>World</a:t></p>";
        let runs: Vec<String> = SLIDE_TEXT_RE
            .captures_iter(xml)
            .map(|c| c[1].to_string())
            .collect();
        assert_eq!(runs, vec!["Hello".to_string(), "World".to_string()]);
    }

    #[test]
    fn unescape_xml_handles_entities() {
        assert_eq!(unescape_xml("A &amp; B &lt;tag&gt;"), "A & B <tag>");
    }
}
