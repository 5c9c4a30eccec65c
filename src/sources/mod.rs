//! Remote data sources for grant listings.
//!
//! This module defines the [`GrantSource`] trait that the service layer talks
//! to. [`JGrantsSource`] implements it against the public jGrants API and
//! [`MockSource`] serves canned data for tests and offline use.
//!
//! Sources pass parameters through unmodified and never retry: a failed call
//! surfaces immediately as a typed [`SourceError`].

mod jgrants;
pub mod mock;

pub use jgrants::JGrantsSource;
pub use mock::MockSource;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::models::{AttachmentRef, AttachmentSource, GrantDetail, RemoteQuery, SearchResultSet};

/// Interface to a grant-listing backend
#[async_trait]
pub trait GrantSource: Send + Sync + std::fmt::Debug {
    /// Short identifier (e.g. "jgrants")
    fn id(&self) -> &str;

    /// Human-readable name
    fn name(&self) -> &str;

    /// Run a search
    async fn search(&self, query: &RemoteQuery) -> Result<SearchResultSet, SourceError>;

    /// Fetch the full detail record of one grant
    async fn fetch_detail(&self, id: &str) -> Result<GrantDetail, SourceError>;

    /// Fetch the raw bytes of an attachment.
    ///
    /// The default handles attachments embedded in the detail response.
    async fn download_attachment(&self, attachment: &AttachmentRef) -> Result<Vec<u8>, SourceError> {
        match &attachment.source {
            AttachmentSource::Inline { data } => decode_inline(data),
            AttachmentSource::Remote { .. } => Err(SourceError::NotImplemented),
        }
    }
}

/// Decode a base64 attachment payload
pub fn decode_inline(data: &str) -> Result<Vec<u8>, SourceError> {
    // Some payloads arrive wrapped across lines
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| SourceError::Parse(format!("base64 attachment: {}", e)))
}

/// Errors that can occur when interacting with a source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The requested operation is not implemented for this source
    #[error("Operation not implemented for this source")]
    NotImplemented,

    /// Connection failure or timeout
    #[error("Network error: {0}")]
    Network(String),

    /// Response body could not be understood
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Grant or attachment not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Non-success response from the remote API
    #[error("API error: {0}")]
    Api(String),

    /// IO error (file system)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            SourceError::Api(format!("status {}: {}", status, err))
        } else {
            SourceError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON: {}", err))
    }
}
