//! Grant service shared by the CLI and the MCP server.
//!
//! [`GrantService`] wires a [`GrantSource`], the [`AttachmentCache`] and the
//! [`Extractor`] together. It holds no mutable state; the only state shared
//! between calls is the cache directory on disk.

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::models::{
    build_query, AttachmentCategory, AttachmentRef, DownloadOutcome, GrantDetail, GrantSummary,
    RemoteQuery, SearchParams, StatisticsSnapshot,
};
use crate::sources::{GrantSource, JGrantsSource, SourceError};
use crate::utils::{
    aggregate, render_csv, validate_grant_id, AttachmentCache, CachedGrant, DownloadError,
    ExtractionError, ExtractionMethod, Extractor, ValidationError,
};

/// Service name reported by `ping`
pub const SERVICE_NAME: &str = "jgrants-mcp";

/// Errors returned by service operations
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Cache(#[from] DownloadError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

impl ServiceError {
    /// Whether the error was caused by the caller's input
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ServiceError::Validation(_)
                | ServiceError::Source(SourceError::NotFound(_))
                | ServiceError::Cache(DownloadError::Invalid(_))
                | ServiceError::Cache(DownloadError::NotCached { .. })
        )
    }
}

/// Result of a search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub total_count: usize,
    pub summaries: Vec<GrantSummary>,
    /// Query actually sent, after defaults were applied
    pub applied_query: RemoteQuery,
}

/// Result of a detail request, with per-attachment download outcomes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailReport {
    pub detail: GrantDetail,
    pub save_directory: PathBuf,
    pub fetched_at: DateTime<Utc>,
}

impl DetailReport {
    /// (cached, failed) attachment counts
    pub fn download_counts(&self) -> (usize, usize) {
        self.detail
            .all_attachments()
            .fold((0, 0), |(ok, failed), (_, a)| match a.outcome {
                DownloadOutcome::Cached { .. } => (ok + 1, failed),
                DownloadOutcome::Failed { .. } => (ok, failed + 1),
                DownloadOutcome::Pending => (ok, failed),
            })
    }
}

/// Output format of the overview
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverviewFormat {
    #[default]
    Json,
    Csv,
}

impl OverviewFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Some(OverviewFormat::Json),
            "csv" => Some(OverviewFormat::Csv),
            _ => None,
        }
    }
}

/// Statistics over the currently open grants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Overview {
    Json(StatisticsSnapshot),
    Csv {
        total_count: usize,
        #[serde(rename = "statistics_generated_at")]
        generated_at: DateTime<Utc>,
        #[serde(rename = "deadline_statistics")]
        deadline_csv: String,
        #[serde(rename = "amount_statistics")]
        amount_csv: String,
    },
}

/// Requested representation of a cached file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    #[default]
    Markdown,
    Base64,
}

impl ContentFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Some(ContentFormat::Markdown),
            "base64" => Some(ContentFormat::Base64),
            _ => None,
        }
    }
}

/// Content of a cached file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum FileContent {
    /// Extracted text; raw bytes are included only when no text could be produced
    Markdown {
        #[serde(rename = "filename")]
        file_name: String,
        mime_type: String,
        size_bytes: u64,
        extraction_method: ExtractionMethod,
        #[serde(skip_serializing_if = "Option::is_none")]
        content_markdown: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        content_base64: Option<String>,
    },
    /// Raw bytes only
    Base64 {
        #[serde(rename = "filename")]
        file_name: String,
        mime_type: String,
        size_bytes: u64,
        content_base64: String,
        data_uri: String,
    },
}

/// Listing of the cache directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inventory {
    pub root: PathBuf,
    pub grants: Vec<CachedGrant>,
    pub total_files: usize,
    pub total_bytes: u64,
}

/// Liveness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ping {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

/// Core service
#[derive(Debug, Clone)]
pub struct GrantService {
    source: Arc<dyn GrantSource>,
    cache: AttachmentCache,
    extractor: Extractor,
    download_on_detail: bool,
}

impl GrantService {
    /// Create a service from its parts
    pub fn new(source: Arc<dyn GrantSource>, cache: AttachmentCache, extractor: Extractor) -> Self {
        Self {
            source,
            cache,
            extractor,
            download_on_detail: true,
        }
    }

    /// Create a service talking to the jGrants API as configured
    pub fn from_config(config: &Config) -> Result<Self, ServiceError> {
        let source = JGrantsSource::new(&config.api)?;
        Ok(Self::new(
            Arc::new(source),
            AttachmentCache::new(config.cache_root()),
            Extractor::from_config(&config.extraction),
        )
        .with_download_on_detail(config.cache.download_on_detail))
    }

    /// Whether `detail` downloads attachments into the cache
    pub fn with_download_on_detail(mut self, enabled: bool) -> Self {
        self.download_on_detail = enabled;
        self
    }

    pub fn source(&self) -> &dyn GrantSource {
        self.source.as_ref()
    }

    pub fn cache(&self) -> &AttachmentCache {
        &self.cache
    }

    /// Search grants
    pub async fn search(&self, params: &SearchParams) -> Result<SearchOutcome, ServiceError> {
        let query = build_query(params)?;
        debug!(keyword = %query.keyword, "Searching grants");

        let result = self.source.search(&query).await?;
        info!(
            keyword = %query.keyword,
            total = result.total_count,
            returned = result.grants.len(),
            "Search completed"
        );

        Ok(SearchOutcome {
            total_count: result.total_count,
            summaries: result.grants,
            applied_query: query,
        })
    }

    /// Fetch a grant and cache its attachments.
    ///
    /// Attachment failures are recorded on each attachment and never fail
    /// the call.
    pub async fn detail(&self, id: &str) -> Result<DetailReport, ServiceError> {
        let id = validate_grant_id(id)?;
        let mut detail = self.source.fetch_detail(&id).await?;
        let save_directory = self.cache.grant_dir(&id)?;

        if self.download_on_detail && detail.attachment_count() > 0 {
            self.download_attachments(&id, &mut detail).await;
        }

        info!(
            id = %id,
            attachments = detail.attachment_count(),
            "Fetched grant detail"
        );
        Ok(DetailReport {
            detail,
            save_directory,
            fetched_at: Utc::now(),
        })
    }

    async fn download_attachments(&self, id: &str, detail: &mut GrantDetail) {
        let jobs: Vec<(AttachmentCategory, usize, AttachmentRef)> = detail
            .attachments
            .iter()
            .flat_map(|(category, list)| {
                list.iter()
                    .enumerate()
                    .map(move |(index, a)| (*category, index, a.clone()))
            })
            .collect();

        let source = self.source.as_ref();
        let downloads = jobs.iter().map(|(category, index, attachment)| async move {
            let result = self.cache.ensure_cached(id, attachment, source).await;
            (*category, *index, result)
        });

        for (category, index, result) in join_all(downloads).await {
            let Some(slot) = detail
                .attachments
                .get_mut(&category)
                .and_then(|list| list.get_mut(index))
            else {
                continue;
            };
            slot.outcome = match result {
                Ok(file) => DownloadOutcome::Cached {
                    path: file.path,
                    size: file.size,
                },
                Err(e) => {
                    warn!(grant = id, file = %slot.name, error = %e, "Attachment download failed");
                    DownloadOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            };
        }
    }

    /// Statistics over all currently open grants
    pub async fn overview(&self, format: OverviewFormat) -> Result<Overview, ServiceError> {
        let outcome = self.search(&SearchParams::default()).await?;
        let snapshot = aggregate(&outcome.summaries, Utc::now());

        Ok(match format {
            OverviewFormat::Json => Overview::Json(snapshot),
            OverviewFormat::Csv => {
                let csv = render_csv(&snapshot);
                Overview::Csv {
                    total_count: snapshot.total_count,
                    generated_at: snapshot.generated_at,
                    deadline_csv: csv.deadline_csv,
                    amount_csv: csv.amount_csv,
                }
            }
        })
    }

    /// Read a cached attachment
    pub async fn file_content(
        &self,
        grant_id: &str,
        file_name: &str,
        format: ContentFormat,
    ) -> Result<FileContent, ServiceError> {
        let file = self.cache.locate(grant_id, file_name).await?;
        let content = self.extractor.extract(&file).await?;

        Ok(match format {
            ContentFormat::Markdown => {
                let has_text = content.text.is_some();
                FileContent::Markdown {
                    file_name: content.file_name,
                    mime_type: content.mime_type,
                    size_bytes: content.size_bytes,
                    extraction_method: content.method,
                    content_markdown: content.text,
                    content_base64: (!has_text).then_some(content.base64),
                }
            }
            ContentFormat::Base64 => FileContent::Base64 {
                data_uri: format!("data:{};base64,{}", content.mime_type, content.base64),
                file_name: content.file_name,
                mime_type: content.mime_type,
                size_bytes: content.size_bytes,
                content_base64: content.base64,
            },
        })
    }

    /// List everything in the cache
    pub async fn list_cached_files(&self) -> Result<Inventory, ServiceError> {
        let grants = self.cache.list_all().await?;
        let total_files = grants.iter().map(|g| g.files.len()).sum();
        let total_bytes = grants
            .iter()
            .flat_map(|g| g.files.iter())
            .map(|f| f.size_bytes)
            .sum();

        Ok(Inventory {
            root: self.cache.root().to_path_buf(),
            grants,
            total_files,
            total_bytes,
        })
    }

    /// Liveness check; never touches the network
    pub fn ping(&self) -> Ping {
        Ping {
            status: "ok".to_string(),
            service: SERVICE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MockSource;

    fn service(source: Arc<MockSource>, root: &std::path::Path) -> GrantService {
        GrantService::new(source, AttachmentCache::new(root), Extractor::new())
    }

    #[tokio::test]
    async fn test_search_rejects_short_keyword() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(MockSource::new());
        let svc = service(source.clone(), dir.path());

        let err = svc.search(&SearchParams::new("a")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(err.is_user_error());
        assert_eq!(source.search_calls(), 0);
    }

    #[tokio::test]
    async fn test_detail_without_download() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(MockSource::new());
        source.add_detail(
            GrantDetail::from_summary(GrantSummary::new("g1", "t")).attach(
                AttachmentCategory::ApplicationForm,
                AttachmentRef::inline("a.txt", "aGk="),
            ),
        );
        let svc = service(source.clone(), dir.path()).with_download_on_detail(false);

        let report = svc.detail("g1").await.unwrap();
        assert_eq!(report.download_counts(), (0, 0));
        assert_eq!(source.download_calls(), 0);
        assert_eq!(report.save_directory, dir.path().join("g1"));
    }

    #[tokio::test]
    async fn test_detail_invalid_id() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(Arc::new(MockSource::new()), dir.path());
        assert!(matches!(
            svc.detail("../x").await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_file_content_formats() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("g1")).unwrap();
        std::fs::write(dir.path().join("g1").join("memo.txt"), "hello").unwrap();
        let svc = service(Arc::new(MockSource::new()), dir.path());

        match svc.file_content("g1", "memo.txt", ContentFormat::Markdown).await.unwrap() {
            FileContent::Markdown {
                content_markdown,
                content_base64,
                ..
            } => {
                assert_eq!(content_markdown.as_deref(), Some("hello"));
                assert!(content_base64.is_none());
            }
            other => panic!("unexpected: {:?}", other),
        }

        match svc.file_content("g1", "memo.txt", ContentFormat::Base64).await.unwrap() {
            FileContent::Base64 { data_uri, .. } => {
                assert_eq!(data_uri, "data:text/plain;base64,aGVsbG8=");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_file_content_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(Arc::new(MockSource::new()), dir.path());
        let err = svc
            .file_content("g1", "missing.pdf", ContentFormat::Markdown)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Cache(DownloadError::NotCached { .. })
        ));
    }

    #[test]
    fn test_ping() {
        let dir = tempfile::tempdir().unwrap();
        let ping = service(Arc::new(MockSource::new()), dir.path()).ping();
        assert_eq!(ping.status, "ok");
        assert_eq!(ping.service, SERVICE_NAME);
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!(OverviewFormat::parse("CSV"), Some(OverviewFormat::Csv));
        assert_eq!(OverviewFormat::parse("xml"), None);
        assert_eq!(ContentFormat::parse("base64"), Some(ContentFormat::Base64));
    }
}
