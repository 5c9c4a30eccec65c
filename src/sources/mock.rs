//! Mock source for testing purposes.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::models::{
    AttachmentRef, AttachmentSource, GrantDetail, GrantSummary, RemoteQuery, SearchResultSet,
};
use crate::sources::{decode_inline, GrantSource, SourceError};

/// A mock source that serves predefined grants and attachment bytes.
///
/// Attachment payloads are keyed by file name. Inline attachments without a
/// registered payload are decoded from their base64 data.
#[derive(Debug, Default)]
pub struct MockSource {
    search_response: Mutex<Option<SearchResultSet>>,
    details: Mutex<HashMap<String, GrantDetail>>,
    payloads: Mutex<HashMap<String, Vec<u8>>>,
    failures: Mutex<HashMap<String, String>>,
    last_query: Mutex<Option<RemoteQuery>>,
    search_calls: AtomicUsize,
    download_calls: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockSource {
    /// Create a new mock source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the grants returned by every search; the count is the list length.
    pub fn set_search_results(&self, grants: Vec<GrantSummary>) {
        *lock(&self.search_response) = Some(SearchResultSet {
            total_count: grants.len(),
            grants,
        });
    }

    /// Register a detail record under its id.
    pub fn add_detail(&self, detail: GrantDetail) {
        lock(&self.details).insert(detail.summary.id.clone(), detail);
    }

    /// Serve these bytes for the attachment with the given file name.
    pub fn set_payload(&self, file_name: &str, bytes: Vec<u8>) {
        lock(&self.payloads).insert(file_name.to_string(), bytes);
    }

    /// Make downloads of the given file name fail.
    pub fn fail_download(&self, file_name: &str, reason: &str) {
        lock(&self.failures).insert(file_name.to_string(), reason.to_string());
    }

    /// The query received by the most recent search.
    pub fn last_query(&self) -> Option<RemoteQuery> {
        lock(&self.last_query).clone()
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    /// Number of attachment downloads attempted so far.
    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GrantSource for MockSource {
    fn id(&self) -> &str {
        "mock"
    }

    fn name(&self) -> &str {
        "Mock Source"
    }

    async fn search(&self, query: &RemoteQuery) -> Result<SearchResultSet, SourceError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_query) = Some(query.clone());

        Ok(lock(&self.search_response)
            .clone()
            .unwrap_or(SearchResultSet {
                total_count: 0,
                grants: Vec::new(),
            }))
    }

    async fn fetch_detail(&self, id: &str) -> Result<GrantDetail, SourceError> {
        lock(&self.details)
            .get(id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(id.to_string()))
    }

    async fn download_attachment(&self, attachment: &AttachmentRef) -> Result<Vec<u8>, SourceError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(reason) = lock(&self.failures).get(&attachment.name) {
            return Err(SourceError::Network(reason.clone()));
        }
        if let Some(bytes) = lock(&self.payloads).get(&attachment.name) {
            return Ok(bytes.clone());
        }
        match &attachment.source {
            AttachmentSource::Inline { data } => decode_inline(data),
            AttachmentSource::Remote { .. } => Err(SourceError::NotFound(attachment.name.clone())),
        }
    }
}

/// Helper to create a grant summary for tests.
pub fn make_grant(id: &str, title: &str) -> GrantSummary {
    GrantSummary::new(id, title)
}
