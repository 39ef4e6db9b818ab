//! Document metadata
//!
//! The graph only needs one thing from the open document: its declared
//! title. For PDFs that is the `Title` entry of the document information
//! dictionary, read with lopdf.

use citegraph_common::errors::{AppError, Result};
use lopdf::Object;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Metadata the graph builder consumes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
}

impl DocumentMetadata {
    /// Metadata with a known title; blank titles count as absent
    pub fn titled(title: impl Into<String>) -> Self {
        let title = title.into();
        let title = title.trim();
        Self {
            title: (!title.is_empty()).then(|| title.to_string()),
        }
    }
}

/// An open document
pub trait Document: Send + Sync {
    fn metadata(&self) -> DocumentMetadata;
}

impl Document for DocumentMetadata {
    fn metadata(&self) -> DocumentMetadata {
        self.clone()
    }
}

/// PDF whose metadata was read when it was opened
#[derive(Debug, Clone)]
pub struct PdfDocument {
    metadata: DocumentMetadata,
}

impl PdfDocument {
    pub fn open(path: &Path) -> Result<Self> {
        let doc = lopdf::Document::load(path).map_err(|e| AppError::Document {
            path: path.display().to_string(),
            message: format!("Failed to load PDF: {}", e),
        })?;
        Ok(Self::from_lopdf(&doc))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let doc = lopdf::Document::load_mem(bytes).map_err(|e| AppError::Document {
            path: "<memory>".to_string(),
            message: format!("Failed to load PDF: {}", e),
        })?;
        Ok(Self::from_lopdf(&doc))
    }

    fn from_lopdf(doc: &lopdf::Document) -> Self {
        let title = info_title(doc).map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
        debug!(title = ?title, "Read PDF metadata");
        Self {
            metadata: DocumentMetadata { title },
        }
    }
}

impl Document for PdfDocument {
    fn metadata(&self) -> DocumentMetadata {
        self.metadata.clone()
    }
}

fn info_title(doc: &lopdf::Document) -> Option<String> {
    let info = resolve(doc, doc.trailer.get(b"Info").ok()?)?.as_dict().ok()?;
    match resolve(doc, info.get(b"Title").ok()?)? {
        Object::String(bytes, _) => Some(decode_text_string(bytes)),
        _ => None,
    }
}

fn resolve<'a>(doc: &'a lopdf::Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// PDF text strings are UTF-16BE with a byte order mark, UTF-8 with a
/// byte order mark (PDF 2.0), or PDFDocEncoding.
fn decode_text_string(bytes: &[u8]) -> String {
    let text = if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        char::decode_utf16(units)
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    } else if let Some(utf8) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        String::from_utf8_lossy(utf8).into_owned()
    } else {
        // Latin-1 agrees with PDFDocEncoding on printable text
        bytes.iter().map(|&b| b as char).collect()
    };
    text.replace('\0', "")
}
