//! PDF text extraction
//!
//! Parses an uploaded PDF from memory with `lopdf`, extracting the text of
//! every page together with the document information dictionary.

use std::path::Path;

use lopdf::{Dictionary, Document, Object};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::{PdfError, Result};

/// Title used when neither the PDF nor the upload provides one
pub const FALLBACK_PDF_TITLE: &str = "Untitled document";

/// Entries of the PDF `Info` dictionary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfInfo {
    /// Document title
    pub title: Option<String>,
    /// Author
    pub author: Option<String>,
    /// Subject
    pub subject: Option<String>,
    /// Keywords, verbatim
    pub keywords: Option<String>,
    /// Creating application
    pub creator: Option<String>,
    /// Producing application
    pub producer: Option<String>,
}

/// Result of extracting a PDF
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfExtraction {
    /// Title from the info dictionary or the file name
    pub title: String,
    /// Extracted text, pages separated by newlines
    pub text: String,
    /// Number of pages
    pub pages: usize,
    /// PDF header version, e.g. "1.5"
    pub version: String,
    /// Document information dictionary
    pub info: PdfInfo,
}

impl PdfExtraction {
    /// Metadata blob stored alongside the document
    pub fn metadata(&self, file_name: Option<&str>, size: usize) -> serde_json::Value {
        serde_json::json!({
            "fileName": file_name,
            "size": size,
            "pages": self.pages,
            "version": self.version,
            "info": self.info,
        })
    }
}

/// PDF extraction functionality
pub struct PdfExtractor;

impl PdfExtractor {
    /// Extract text and info from PDF bytes.
    ///
    /// `file_name` is used as the title when the PDF has no `Title` entry.
    #[instrument(skip(bytes), fields(size = bytes.len()))]
    pub fn extract(bytes: &[u8], file_name: Option<&str>) -> Result<PdfExtraction> {
        let doc = Document::load_mem(bytes).map_err(|e| PdfError::LoadFailed(e.to_string()))?;

        let pages = doc.get_pages();
        let mut text = String::new();
        for page_num in pages.keys() {
            let page_text =
                doc.extract_text(&[*page_num])
                    .map_err(|e| PdfError::ExtractionFailed {
                        page: *page_num,
                        message: e.to_string(),
                    })?;
            text.push_str(page_text.trim_end());
            text.push('\n');
        }

        let info = Self::info(&doc);
        let title = info
            .title
            .clone()
            .or_else(|| file_name.and_then(file_stem))
            .unwrap_or_else(|| FALLBACK_PDF_TITLE.to_string());

        if text.trim().is_empty() {
            warn!("PDF has no extractable text; it may be scanned");
        }

        info!("Extracted {} pages from PDF \"{}\"", pages.len(), title);

        Ok(PdfExtraction {
            title,
            text: text.trim().to_string(),
            pages: pages.len(),
            version: doc.version.clone(),
            info,
        })
    }

    /// Read the `Info` dictionary, tolerating missing or malformed entries
    fn info(doc: &Document) -> PdfInfo {
        let dict = match doc.trailer.get(b"Info") {
            Ok(Object::Reference(id)) => doc.get_dictionary(*id).ok(),
            Ok(Object::Dictionary(dict)) => Some(dict),
            _ => None,
        };

        let Some(dict) = dict else {
            debug!("PDF has no Info dictionary");
            return PdfInfo::default();
        };

        PdfInfo {
            title: info_field(dict, b"Title"),
            author: info_field(dict, b"Author"),
            subject: info_field(dict, b"Subject"),
            keywords: info_field(dict, b"Keywords"),
            creator: info_field(dict, b"Creator"),
            producer: info_field(dict, b"Producer"),
        }
    }
}

fn info_field(dict: &Dictionary, key: &[u8]) -> Option<String> {
    dict.get(key)
        .ok()
        .and_then(|obj| obj.as_str().ok())
        .map(decode_pdf_string)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Decode a PDF text string: UTF-16BE with BOM, otherwise byte-per-char.
fn decode_pdf_string(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => bytes.iter().map(|&b| b as char).collect(),
        },
    }
}

fn file_stem(name: &str) -> Option<String> {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}
