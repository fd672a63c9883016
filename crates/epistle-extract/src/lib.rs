//! Text extraction from mail attachments.
//!
//! Connectors supply raw bytes plus whatever the provider claimed about the
//! content type; this crate turns them into plain UTF-8 text for the
//! extraction prompts. PDF is the only binary format handled here. Anything
//! else either decodes as text or is reported as unsupported, and the
//! pipeline degrades to body-only extraction.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

/// Result type alias using the extraction error type.
pub type Result<T> = std::result::Result<T, ExtractError>;

/// MIME type for PDF documents.
pub const MIME_PDF: &str = "application/pdf";

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors raised during attachment text extraction.
///
/// Extraction failures are never fatal to a scan; the pipeline records them
/// and continues with the message body alone.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The content type is not one this extractor can handle.
    #[error("unsupported content type: {0}")]
    UnsupportedFormat(String),

    /// The PDF parser rejected the document.
    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    /// Extraction machinery failed (task join, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Extractor Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for turning attachment bytes into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract text from attachment bytes.
    ///
    /// `mime_type` is the provider-reported content type, which mail
    /// providers frequently get wrong; implementations may also sniff the
    /// filename and magic bytes.
    async fn extract_text(
        &self,
        bytes: &[u8],
        mime_type: Option<&str>,
        filename: &str,
    ) -> Result<String>;

    /// Get the name of this extractor.
    fn name(&self) -> &str;
}

/// An extractor that can be shared across threads.
pub type SharedExtractor = Arc<dyn TextExtractor>;

// ─────────────────────────────────────────────────────────────────────────────
// Document Extractor
// ─────────────────────────────────────────────────────────────────────────────

/// The default extractor: PDF via `pdf-extract`, everything text-like as
/// lossy UTF-8.
#[derive(Debug, Default, Clone)]
pub struct DocumentExtractor;

impl DocumentExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TextExtractor for DocumentExtractor {
    async fn extract_text(
        &self,
        bytes: &[u8],
        mime_type: Option<&str>,
        filename: &str,
    ) -> Result<String> {
        if looks_like_pdf(bytes, mime_type, filename) {
            debug!(filename, len = bytes.len(), "extracting PDF attachment");
            return extract_pdf(bytes).await;
        }

        if looks_like_text(mime_type, filename) {
            return Ok(String::from_utf8_lossy(bytes).into_owned());
        }

        Err(ExtractError::UnsupportedFormat(
            mime_type.unwrap_or("unknown").to_string(),
        ))
    }

    fn name(&self) -> &str {
        "document"
    }
}

/// Extract PDF text on the blocking pool; the parser is CPU-bound.
async fn extract_pdf(bytes: &[u8]) -> Result<String> {
    let bytes = bytes.to_vec();
    tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text_from_mem(&bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
    })
    .await
    .map_err(|e| ExtractError::Internal(format!("extraction task failed: {}", e)))?
}

fn looks_like_pdf(bytes: &[u8], mime_type: Option<&str>, filename: &str) -> bool {
    mime_type == Some(MIME_PDF)
        || filename.to_lowercase().ends_with(".pdf")
        || bytes.starts_with(b"%PDF-")
}

fn looks_like_text(mime_type: Option<&str>, filename: &str) -> bool {
    if let Some(mime) = mime_type
        && (mime.starts_with("text/") || mime == "application/json")
    {
        return true;
    }
    let lower = filename.to_lowercase();
    ["txt", "csv", "json", "md", "html", "eml"]
        .iter()
        .any(|ext| lower.ends_with(&format!(".{}", ext)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Extractor
// ─────────────────────────────────────────────────────────────────────────────

/// A mock extractor for testing purposes.
///
/// By default echoes the bytes as UTF-8. Responses can be pinned per
/// filename, and failures queued for the next calls.
#[derive(Debug, Default)]
pub struct MockExtractor {
    responses: HashMap<String, String>,
    failures: Mutex<Vec<ExtractError>>,
}

impl MockExtractor {
    /// Create a mock extractor that echoes input bytes as text.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the text returned for a given filename.
    pub fn with_response(mut self, filename: impl Into<String>, text: impl Into<String>) -> Self {
        self.responses.insert(filename.into(), text.into());
        self
    }

    /// Queue an error to be returned by the next `extract_text` call.
    pub fn push_failure(&self, error: ExtractError) {
        self.failures.lock().unwrap().push(error);
    }
}

#[async_trait]
impl TextExtractor for MockExtractor {
    async fn extract_text(
        &self,
        bytes: &[u8],
        _mime_type: Option<&str>,
        filename: &str,
    ) -> Result<String> {
        {
            let mut failures = self.failures.lock().unwrap();
            if !failures.is_empty() {
                return Err(failures.remove(0));
            }
        }

        if let Some(text) = self.responses.get(filename) {
            return Ok(text.clone());
        }
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
