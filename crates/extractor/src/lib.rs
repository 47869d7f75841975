//! File classification (§4.1) and text extraction dispatch (§4.2).
//!
//! The public surface is intentionally narrow: [`should_index`],
//! [`metadata_for`], and [`extract`]. Every parser failure is absorbed
//! internally — callers never see an `Err` from [`extract`]; they see empty
//! text and a media-type tag, exactly as the original extraction service
//! does.

pub mod classifier;
pub mod formats;
pub mod notebook;

use std::fs::File;
use std::io::Read;
use std::path::Path;

pub use classifier::{metadata_for, should_index};

const SNIFF_WINDOW: usize = 4096;

/// Detect the media type and extract text from `path`.
///
/// Returns `("", media_type)` on any failure — a missing file, a corrupt
/// document, an unreadable archive — and never propagates an error.
pub fn extract(path: &Path) -> (String, String) {
    let head = read_head(path);
    let media_type = formats::detect_media_type(path, &head);

    // The notebook format is checked by suffix regardless of the sniffed
    // media type, since `.ipynb` files are plain JSON with no distinct
    // magic bytes of their own.
    if path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("ipynb"))
    {
        let raw = std::fs::read(path).unwrap_or_default();
        let decoded = formats::decode_bytes(&raw);
        let text = notebook::extract_notebook(&decoded);
        return (formats::truncate_decoded(text), media_type);
    }

    let text = if media_type == formats::MIME_PDF {
        formats::extract_pdf(path)
    } else if media_type == formats::MIME_DOCX {
        formats::extract_docx(path)
    } else if media_type == formats::MIME_XLSX {
        formats::extract_xlsx(path)
    } else if media_type == formats::MIME_PPTX {
        formats::extract_pptx(path)
    } else if is_byte_decodable(&media_type) {
        let raw = std::fs::read(path).unwrap_or_default();
        formats::decode_bytes(&raw)
    } else if media_type.starts_with("image/") {
        formats::warn_missing_ocr(&media_type);
        String::new()
    } else {
        String::new()
    };

    (formats::truncate_decoded(text), media_type)
}

fn is_byte_decodable(media_type: &str) -> bool {
    media_type.starts_with("text/")
        || media_type == formats::MIME_JSON
        || media_type == formats::MIME_JS
}

fn read_head(path: &Path) -> Vec<u8> {
    let Ok(mut file) = File::open(path) else {
        return Vec::new();
    };
    let mut buf = vec![0u8; SNIFF_WINDOW];
    match file.read(&mut buf) {
        Ok(n) => {
            buf.truncate(n);
            buf
        }
        Err(_) => Vec::new(),
    }
}
