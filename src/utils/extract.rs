//! Content extraction from cached attachments.
//!
//! Every extraction returns the file as base64. Text is added when the file
//! is plain text or a registered [`Converter`] understands its format. A
//! converter that fails (or panics) downgrades the result to
//! [`ExtractionMethod::RawFallback`]; extraction itself only fails when the
//! file cannot be read.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::ExtractionConfig;
use crate::utils::cache::CachedFile;
use crate::utils::office::{DocxConverter, PptxConverter, XlsxConverter};
use crate::utils::pdf::PdfConverter;

/// File formats the extractor distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Text,
    Pdf,
    Docx,
    Xlsx,
    Pptx,
    Other,
}

impl DocumentFormat {
    /// Format implied by a file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "txt" | "md" | "csv" | "tsv" | "json" | "xml" | "html" | "htm" => DocumentFormat::Text,
            "pdf" => DocumentFormat::Pdf,
            "docx" => DocumentFormat::Docx,
            "xlsx" => DocumentFormat::Xlsx,
            "pptx" => DocumentFormat::Pptx,
            _ => DocumentFormat::Other,
        }
    }

    /// Format implied by the leading bytes
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(b"%PDF-") {
            return DocumentFormat::Pdf;
        }
        if bytes.starts_with(b"PK\x03\x04") {
            return sniff_ooxml(bytes);
        }
        DocumentFormat::Other
    }

    /// Name used in configuration and in [`ExtractionMethod::Converted`]
    pub fn converter_name(&self) -> &'static str {
        match self {
            DocumentFormat::Text => "text",
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Xlsx => "xlsx",
            DocumentFormat::Pptx => "pptx",
            DocumentFormat::Other => "other",
        }
    }
}

fn sniff_ooxml(bytes: &[u8]) -> DocumentFormat {
    let Ok(archive) = zip::ZipArchive::new(Cursor::new(bytes)) else {
        return DocumentFormat::Other;
    };
    let names: Vec<&str> = archive.file_names().collect();
    if names.contains(&"word/document.xml") {
        DocumentFormat::Docx
    } else if names.contains(&"xl/workbook.xml") {
        DocumentFormat::Xlsx
    } else if names.contains(&"ppt/presentation.xml") {
        DocumentFormat::Pptx
    } else {
        DocumentFormat::Other
    }
}

/// Detect the format from the file name, falling back to magic bytes
pub fn detect_format(file_name: &str, bytes: &[u8]) -> DocumentFormat {
    let by_ext = extension(file_name)
        .map(DocumentFormat::from_extension)
        .unwrap_or(DocumentFormat::Other);
    if by_ext != DocumentFormat::Other {
        return by_ext;
    }
    DocumentFormat::sniff(bytes)
}

fn extension(file_name: &str) -> Option<&str> {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
}

/// MIME type reported for a file
pub fn mime_type(file_name: &str, format: DocumentFormat) -> &'static str {
    let by_ext = match extension(file_name).map(str::to_ascii_lowercase).as_deref() {
        Some("txt") => Some("text/plain"),
        Some("md") => Some("text/markdown"),
        Some("csv") => Some("text/csv"),
        Some("tsv") => Some("text/tab-separated-values"),
        Some("json") => Some("application/json"),
        Some("xml") => Some("application/xml"),
        Some("html") | Some("htm") => Some("text/html"),
        Some("doc") => Some("application/msword"),
        Some("xls") => Some("application/vnd.ms-excel"),
        Some("ppt") => Some("application/vnd.ms-powerpoint"),
        Some("zip") => Some("application/zip"),
        Some("png") => Some("image/png"),
        Some("jpg") | Some("jpeg") => Some("image/jpeg"),
        _ => None,
    };
    if let Some(mime) = by_ext {
        return mime;
    }
    match format {
        DocumentFormat::Pdf => "application/pdf",
        DocumentFormat::Docx => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        DocumentFormat::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        DocumentFormat::Pptx => {
            "application/vnd.openxmlformats-officedocument.presentationml.presentation"
        }
        DocumentFormat::Text => "text/plain",
        DocumentFormat::Other => "application/octet-stream",
    }
}

/// How the text of an [`ExtractedContent`] was obtained
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Decoded directly as UTF-8
    NativeText,
    /// Produced by a registered converter
    Converted { converter: String },
    /// No text; only the raw bytes are available
    RawFallback { reason: String },
}

/// Result of extracting one cached file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub text: Option<String>,
    pub base64: String,
    pub method: ExtractionMethod,
}

/// Extraction errors
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("conversion failed: {0}")]
    Failed(String),

    #[error("document has no extractable text")]
    Empty,

    #[error("converter panicked: {0}")]
    Panicked(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A document-to-text converter for one format
pub trait Converter: Send + Sync + std::fmt::Debug {
    /// Format this converter handles
    fn format(&self) -> DocumentFormat;

    /// Convert the whole document into text (Markdown where structure helps)
    fn convert(&self, bytes: &[u8]) -> Result<String, ExtractionError>;
}

/// Registry of converters plus extraction settings
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    converters: Vec<Arc<dyn Converter>>,
    max_text_chars: Option<usize>,
}

impl Extractor {
    /// Extractor with no converters (native text only)
    pub fn new() -> Self {
        Self::default()
    }

    /// Extractor with the converters named in the configuration
    pub fn from_config(config: &ExtractionConfig) -> Self {
        let mut extractor = Self::new();
        extractor.max_text_chars = config.max_text_chars;
        for name in &config.enabled_converters {
            let converter: Arc<dyn Converter> = match name.trim().to_ascii_lowercase().as_str() {
                "pdf" => Arc::new(PdfConverter),
                "docx" => Arc::new(DocxConverter),
                "xlsx" => Arc::new(XlsxConverter),
                "pptx" => Arc::new(PptxConverter),
                other => {
                    warn!(converter = other, "Unknown converter in configuration, ignoring");
                    continue;
                }
            };
            extractor = extractor.with_converter(converter);
        }
        extractor
    }

    /// Register a converter, replacing any existing one for the same format
    pub fn with_converter(mut self, converter: Arc<dyn Converter>) -> Self {
        let format = converter.format();
        self.converters.retain(|c| c.format() != format);
        self.converters.push(converter);
        self
    }

    /// Cap returned text at this many characters
    pub fn with_max_text_chars(mut self, max: Option<usize>) -> Self {
        self.max_text_chars = max;
        self
    }

    /// Formats that currently have a converter
    pub fn supported_formats(&self) -> Vec<DocumentFormat> {
        self.converters.iter().map(|c| c.format()).collect()
    }

    fn converter_for(&self, format: DocumentFormat) -> Option<Arc<dyn Converter>> {
        self.converters.iter().find(|c| c.format() == format).cloned()
    }

    /// Read a cached file and extract its content
    pub async fn extract(&self, file: &CachedFile) -> Result<ExtractedContent, ExtractionError> {
        let bytes = tokio::fs::read(&file.path).await?;
        let converter = {
            let format = detect_format(&file.file_name, &bytes);
            self.converter_for(format)
        };
        let file_name = file.file_name.clone();
        let max = self.max_text_chars;

        tokio::task::spawn_blocking(move || extract_bytes(&file_name, &bytes, converter, max))
            .await
            .map_err(|e| ExtractionError::Panicked(e.to_string()))
    }

    /// Extract from bytes already in memory (blocking)
    pub fn extract_from_bytes(&self, file_name: &str, bytes: &[u8]) -> ExtractedContent {
        let converter = self.converter_for(detect_format(file_name, bytes));
        extract_bytes(file_name, bytes, converter, self.max_text_chars)
    }
}

fn extract_bytes(
    file_name: &str,
    bytes: &[u8],
    converter: Option<Arc<dyn Converter>>,
    max_text_chars: Option<usize>,
) -> ExtractedContent {
    let format = detect_format(file_name, bytes);

    let (text, method) = match (format, converter) {
        (DocumentFormat::Text, _) => (Some(decode_text(bytes)), ExtractionMethod::NativeText),
        (DocumentFormat::Other, _) => (
            None,
            ExtractionMethod::RawFallback {
                reason: "unsupported format".to_string(),
            },
        ),
        (format, None) => (
            None,
            ExtractionMethod::RawFallback {
                reason: format!("no converter for {}", format.converter_name()),
            },
        ),
        (format, Some(converter)) => match run_converter(converter.as_ref(), bytes) {
            Ok(text) => (
                Some(text),
                ExtractionMethod::Converted {
                    converter: format.converter_name().to_string(),
                },
            ),
            Err(e) => {
                warn!(file_name, error = %e, "Conversion failed, returning raw bytes");
                (
                    None,
                    ExtractionMethod::RawFallback {
                        reason: e.to_string(),
                    },
                )
            }
        },
    };

    debug!(file_name, format = format.converter_name(), "Extracted content");
    ExtractedContent {
        file_name: file_name.to_string(),
        mime_type: mime_type(file_name, format).to_string(),
        size_bytes: bytes.len() as u64,
        text: text.map(|t| truncate_chars(t, max_text_chars)),
        base64: STANDARD.encode(bytes),
        method,
    }
}

fn run_converter(converter: &dyn Converter, bytes: &[u8]) -> Result<String, ExtractionError> {
    let text = catch_unwind(AssertUnwindSafe(|| converter.convert(bytes))).map_err(|panic| {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        ExtractionError::Panicked(message)
    })??;

    if text.trim().is_empty() {
        return Err(ExtractionError::Empty);
    }
    Ok(text)
}

fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

fn truncate_chars(text: String, max: Option<usize>) -> String {
    match max {
        Some(max) if text.chars().count() > max => text.chars().take(max).collect(),
        _ => text,
    }
}

/// Read one named part of a zip container, capped at `limit` bytes
pub(crate) fn read_zip_part(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &str,
    limit: u64,
) -> Result<Option<String>, ExtractionError> {
    let part = match archive.by_name(name) {
        Ok(part) => part,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(ExtractionError::Failed(format!("{}: {}", name, e))),
    };
    let mut content = String::new();
    part.take(limit).read_to_string(&mut content)?;
    Ok(Some(content))
}
