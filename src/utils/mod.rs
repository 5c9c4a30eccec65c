//! Utility modules supporting grant operations.
//!
//! - [`AttachmentCache`]: on-disk cache of grant attachments
//! - [`Extractor`]: text extraction from cached files, with pluggable [`Converter`]s
//! - [`aggregate`] / [`render_csv`]: statistics over a result set
//! - [`HttpClient`]: shared HTTP client built from configuration
//! - validation helpers for keywords, ids and file names
//!
//! # Caching and extracting an attachment
//!
//! ```rust,no_run
//! use jgrants_mcp::models::AttachmentRef;
//! use jgrants_mcp::sources::MockSource;
//! use jgrants_mcp::utils::{AttachmentCache, Extractor};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = AttachmentCache::new("/tmp/jgrants-files");
//! let source = MockSource::new();
//! let attachment = AttachmentRef::inline("readme.txt", "aGVsbG8=");
//!
//! let file = cache.ensure_cached("a0W1", &attachment, &source).await?;
//! let content = Extractor::new().extract(&file).await?;
//! println!("{:?}", content.text);
//! # Ok(())
//! # }
//! ```

mod aggregate;
mod cache;
mod display;
mod extract;
mod http;
mod office;
mod pdf;
mod validate;

pub use aggregate::{aggregate, days_left, render_csv, HIGH_VALUE_THRESHOLD, URGENT_WINDOW_DAYS};
pub use cache::{
    AttachmentCache, AttachmentFetcher, CachedFile, CachedFileInfo, CachedGrant, DownloadError,
};
pub use display::{
    format_date, format_datetime, format_yen, group_digits, is_terminal, truncate_chars,
    truncate_with_ellipsis,
};
pub use extract::{
    detect_format, mime_type, Converter, DocumentFormat, ExtractedContent, ExtractionError,
    ExtractionMethod, Extractor,
};
pub use http::HttpClient;
pub use office::{DocxConverter, PptxConverter, XlsxConverter};
pub use pdf::PdfConverter;
pub use validate::{validate_base_url, validate_file_name, validate_grant_id, ValidationError};
