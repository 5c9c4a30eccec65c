//! PDF text extraction using the pdf-extract crate.
//!
//! pdf-extract is pure Rust but panics on some malformed files; the
//! [`Extractor`](crate::utils::Extractor) runs every converter under
//! `catch_unwind`, so a panic here becomes a raw fallback.

use crate::utils::extract::{Converter, DocumentFormat, ExtractionError};

/// PDF to plain text converter
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfConverter;

impl Converter for PdfConverter {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pdf
    }

    fn convert(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        if !bytes.starts_with(b"%PDF-") {
            return Err(ExtractionError::Failed("missing %PDF header".to_string()));
        }

        let text = pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| ExtractionError::Failed(format!("Failed to extract text from PDF: {}", e)))?;

        // Scanned PDFs have no text layer
        if text.trim().is_empty() {
            tracing::debug!("Extracted empty text from PDF");
            return Err(ExtractionError::Empty);
        }

        Ok(normalize(&text))
    }
}

/// Drop trailing spaces and collapse runs of blank lines
fn normalize(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for line in text.lines().map(str::trim_end) {
        if line.is_empty() && out.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        out.push(line);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::extract::{ExtractionMethod, Extractor};
    use std::sync::Arc;

    #[test]
    fn test_rejects_non_pdf() {
        assert!(matches!(
            PdfConverter.convert(b"hello"),
            Err(ExtractionError::Failed(_))
        ));
    }

    #[test]
    fn test_corrupt_pdf_falls_back() {
        let extractor = Extractor::new().with_converter(Arc::new(PdfConverter));
        let content = extractor.extract_from_bytes("broken.pdf", b"%PDF-1.4\nnot really a pdf");
        assert!(matches!(content.method, ExtractionMethod::RawFallback { .. }));
        assert_eq!(content.text, None);
    }

    /// One page with a single Helvetica text run, xref offsets computed
    fn one_page_pdf(text: &str) -> Vec<u8> {
        let stream = format!("BT /F1 24 Tf 72 720 Td ({}) Tj ET", text);
        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >>".to_string(),
            format!("<< /Length {} >>\nstream\n{}\nendstream", stream.len(), stream),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>".to_string(),
        ];

        let mut pdf = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }
        let xref = pdf.len();
        pdf.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
        for offset in offsets {
            pdf.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        pdf.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                xref
            )
            .as_bytes(),
        );
        pdf
    }

    #[test]
    fn test_extracts_text_layer() {
        let text = PdfConverter.convert(&one_page_pdf("Subsidy Guidelines")).unwrap();
        assert!(text.contains("Subsidy Guidelines"), "got {:?}", text);
    }

    #[test]
    fn test_extractor_uses_pdf_converter() {
        let extractor = Extractor::new().with_converter(Arc::new(PdfConverter));
        let content = extractor.extract_from_bytes("guide.pdf", &one_page_pdf("Application Form"));
        assert_eq!(
            content.method,
            ExtractionMethod::Converted {
                converter: "pdf".to_string()
            }
        );
        assert!(content.text.unwrap().contains("Application Form"));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("a  \n\n\n\nb\n\n"), "a\n\nb");
        assert_eq!(normalize("\n\nx"), "x");
    }
}
