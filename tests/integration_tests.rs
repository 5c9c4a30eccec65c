//! Integration tests for jgrants-mcp
//!
//! These tests drive the grant service end to end through the mock source and
//! a temporary cache directory, exercise the MCP tool registry, and run the
//! real jGrants client against a local mock HTTP server.

use jgrants_mcp::mcp::{McpServer, ToolRegistry};
use jgrants_mcp::models::{
    AcceptanceFilter, AttachmentCategory, AttachmentRef, DownloadOutcome, GrantDetail,
    GrantSummary, SearchParams,
};
use jgrants_mcp::service::{ContentFormat, FileContent, GrantService, Overview, OverviewFormat};
use jgrants_mcp::sources::{mock::make_grant, GrantSource, JGrantsSource, MockSource, SourceError};
use jgrants_mcp::utils::{
    AttachmentCache, Converter, DocumentFormat, ExtractionError, ExtractionMethod, Extractor,
};
use serde_json::json;
use std::sync::Arc;

fn service_with(source: Arc<MockSource>, root: &std::path::Path) -> GrantService {
    GrantService::new(source, AttachmentCache::new(root), Extractor::new())
}

#[derive(Debug)]
struct FakePdf;

impl Converter for FakePdf {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pdf
    }

    fn convert(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        Ok(format!("第1章 公募要領 ({} bytes)", bytes.len()))
    }
}

#[tokio::test]
async fn test_repeated_cache_fetches_once() {
    let dir = tempfile::tempdir().unwrap();
    let source = MockSource::new();
    source.set_payload("guide.pdf", b"%PDF-1.4 data".to_vec());
    let cache = AttachmentCache::new(dir.path());
    let attachment = AttachmentRef::remote("guide.pdf", "https://example.com/guide.pdf");

    let first = cache.ensure_cached("g1", &attachment, &source).await.unwrap();
    let second = cache.ensure_cached("g1", &attachment, &source).await.unwrap();

    assert_eq!(first.path, second.path);
    assert_eq!(second.size, 13);
    assert_eq!(source.download_calls(), 1);
}

#[tokio::test]
async fn test_overview_partitions_amounts() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(MockSource::new());
    source.set_search_results(vec![
        make_grant("a", "none"),
        make_grant("b", "small").max_limit(Some(800_000)),
        make_grant("c", "mid").max_limit(Some(5_000_000)),
        make_grant("d", "large").max_limit(Some(90_000_000)),
        make_grant("e", "huge").max_limit(Some(500_000_000)),
    ]);
    let svc = service_with(source.clone(), dir.path());

    let Overview::Json(stats) = svc.overview(OverviewFormat::Json).await.unwrap() else {
        panic!("expected JSON overview");
    };
    assert_eq!(stats.total_count, 5);
    assert_eq!(stats.by_amount.total(), 5);
    assert_eq!(stats.by_amount.unspecified, 1);
    assert_eq!(stats.by_amount.over_100m, 1);
    // No end dates: nothing in the deadline buckets
    assert_eq!(stats.by_deadline.total(), 0);
    let high: Vec<_> = stats.high_value.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(high, vec!["e", "d"]);

    let query = source.last_query().unwrap();
    assert_eq!(query.acceptance, AcceptanceFilter::OpenOnly);
}

#[tokio::test]
async fn test_overview_csv_tables() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(MockSource::new());
    source.set_search_results(vec![make_grant("a", "x").max_limit(Some(1_000_000))]);
    let svc = service_with(source, dir.path());

    match svc.overview(OverviewFormat::Csv).await.unwrap() {
        Overview::Csv {
            total_count,
            deadline_csv,
            amount_csv,
            ..
        } => {
            assert_eq!(total_count, 1);
            assert!(deadline_csv.starts_with("period,count\n"));
            assert!(amount_csv.contains("under_1m,1\n"));
        }
        other => panic!("expected CSV overview, got {:?}", other),
    }
}

#[tokio::test]
async fn test_keyword_length_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(MockSource::new());
    let svc = service_with(source.clone(), dir.path());

    assert!(svc.search(&SearchParams::new("")).await.is_err());
    assert!(svc.search(&SearchParams::new("I")).await.is_err());
    assert_eq!(source.search_calls(), 0);

    let outcome = svc.search(&SearchParams::new("IT")).await.unwrap();
    assert_eq!(outcome.applied_query.keyword, "IT");
    assert_eq!(source.search_calls(), 1);
}

#[tokio::test]
async fn test_search_passes_remote_results_through() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(MockSource::new());
    source.set_search_results(vec![
        make_grant("a0W1", "IT導入補助金2025"),
        make_grant("a0W2", "IT導入支援事業"),
    ]);
    let svc = service_with(source.clone(), dir.path());

    let params = SearchParams::new("IT導入").acceptance(AcceptanceFilter::OpenOnly);
    let outcome = svc.search(&params).await.unwrap();

    assert_eq!(outcome.total_count, outcome.summaries.len());
    let ids: Vec<_> = outcome.summaries.iter().map(|g| g.id.as_str()).collect();
    assert_eq!(ids, vec!["a0W1", "a0W2"]);

    let sent = source.last_query().unwrap();
    assert_eq!(sent.keyword, "IT導入");
    assert!(sent.to_query_string().contains("acceptance=1"));
}

#[tokio::test]
async fn test_detail_records_partial_download_failure() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(MockSource::new());
    source.add_detail(
        GrantDetail::from_summary(GrantSummary::new("a0W9", "省エネ補助金"))
            .attach(
                AttachmentCategory::ApplicationGuidelines,
                AttachmentRef::inline("guide.txt", "5YWs5Yuf6KaB6aCY"),
            )
            .attach(
                AttachmentCategory::OutlineOfGrant,
                AttachmentRef::remote("outline.pdf", "https://example.com/outline.pdf"),
            )
            .attach(
                AttachmentCategory::ApplicationForm,
                AttachmentRef::remote("form.docx", "https://example.com/form.docx"),
            ),
    );
    source.set_payload("outline.pdf", b"%PDF-1.7".to_vec());
    source.fail_download("form.docx", "connection reset");
    let svc = service_with(source.clone(), dir.path());

    let report = svc.detail("a0W9").await.unwrap();
    assert_eq!(report.download_counts(), (2, 1));
    assert_eq!(report.save_directory, dir.path().join("a0W9"));

    let form = &report.detail.attachments[&AttachmentCategory::ApplicationForm][0];
    match &form.outcome {
        DownloadOutcome::Failed { reason } => assert!(reason.contains("connection reset")),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(dir.path().join("a0W9").join("guide.txt").is_file());
    assert!(!dir.path().join("a0W9").join("form.docx").exists());

    let inventory = svc.list_cached_files().await.unwrap();
    assert_eq!(inventory.total_files, 2);
    assert_eq!(inventory.grants[0].grant_id, "a0W9");
}

#[tokio::test]
async fn test_detail_unknown_id_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service_with(Arc::new(MockSource::new()), dir.path());
    let err = svc.detail("a0W404").await.unwrap_err();
    assert!(err.is_user_error());
}

#[tokio::test]
async fn test_pdf_extraction_with_and_without_converter() {
    let dir = tempfile::tempdir().unwrap();
    let grant_dir = dir.path().join("g1");
    std::fs::create_dir_all(&grant_dir).unwrap();
    std::fs::write(grant_dir.join("guide.pdf"), b"%PDF-1.4 fake body").unwrap();

    let with_converter = GrantService::new(
        Arc::new(MockSource::new()),
        AttachmentCache::new(dir.path()),
        Extractor::new().with_converter(Arc::new(FakePdf)),
    );
    match with_converter
        .file_content("g1", "guide.pdf", ContentFormat::Markdown)
        .await
        .unwrap()
    {
        FileContent::Markdown {
            content_markdown,
            content_base64,
            extraction_method,
            mime_type,
            ..
        } => {
            assert!(!content_markdown.unwrap().is_empty());
            assert!(content_base64.is_none());
            assert!(matches!(extraction_method, ExtractionMethod::Converted { .. }));
            assert_eq!(mime_type, "application/pdf");
        }
        other => panic!("unexpected: {:?}", other),
    }

    let without = service_with(Arc::new(MockSource::new()), dir.path());
    match without
        .file_content("g1", "guide.pdf", ContentFormat::Markdown)
        .await
        .unwrap()
    {
        FileContent::Markdown {
            content_markdown,
            content_base64,
            extraction_method,
            ..
        } => {
            assert!(content_markdown.is_none());
            assert!(content_base64.is_some());
            assert!(matches!(extraction_method, ExtractionMethod::RawFallback { .. }));
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[tokio::test]
async fn test_tool_registry_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(MockSource::new());
    source.add_detail(
        GrantDetail::from_summary(GrantSummary::new("g1", "テスト")).attach(
            AttachmentCategory::ApplicationForm,
            AttachmentRef::inline("memo.txt", "aGVsbG8="),
        ),
    );
    let service = Arc::new(service_with(source, dir.path()));
    let registry = ToolRegistry::from_service(service.clone());
    assert_eq!(registry.all().len(), 6);

    let detail = registry
        .execute("get_subsidy_detail", json!({ "subsidy_id": "g1" }))
        .await
        .unwrap();
    assert_eq!(detail["detail"]["id"], "g1");

    let content = registry
        .execute(
            "get_file_content",
            json!({ "subsidy_id": "g1", "filename": "memo.txt" }),
        )
        .await
        .unwrap();
    assert_eq!(content["format"], "markdown");
    assert_eq!(content["content_markdown"], "hello");

    let listing = registry.execute("list_cached_files", json!({})).await.unwrap();
    assert_eq!(listing["total_files"], 1);

    let err = registry
        .execute(
            "get_file_content",
            json!({ "subsidy_id": "g1", "filename": "../secret" }),
        )
        .await
        .unwrap_err();
    assert!(!err.is_empty());

    assert!(McpServer::new(service).is_ok());
}

const SEARCH_BODY: &str = r#"{
  "metadata": {"type": "application/json", "resultset": {"count": 2}},
  "result": [
    {
      "id": "a0WJ200000CDR9HMAX",
      "name": "S-00007689",
      "title": "令和7年度 IT導入補助金",
      "target_area_search": "全国",
      "subsidy_max_limit": 4500000,
      "acceptance_start_datetime": "2025-03-31T15:00:00.000Z",
      "acceptance_end_datetime": "2099-12-31T14:59:00.000Z",
      "target_number_of_employees": "従業員数の制約なし"
    },
    {
      "id": "a0WJ200000CDR9HMAY",
      "title": "小規模事業者持続化補助金",
      "subsidy_max_limit": "2,000,000円"
    }
  ]
}"#;

#[tokio::test]
async fn test_jgrants_search_against_mock_server() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/subsidies")
        .match_query(mockito::Matcher::AllOf(vec![
            mockito::Matcher::UrlEncoded("keyword".into(), "IT導入".into()),
            mockito::Matcher::UrlEncoded("acceptance".into(), "1".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(SEARCH_BODY)
        .create_async()
        .await;

    let source = Arc::new(JGrantsSource::with_base_url(&server.url()).unwrap());
    let dir = tempfile::tempdir().unwrap();
    let svc = GrantService::new(source, AttachmentCache::new(dir.path()), Extractor::new());

    let outcome = svc.search(&SearchParams::new("IT導入")).await.unwrap();
    mock.assert_async().await;

    assert_eq!(outcome.total_count, 2);
    assert_eq!(outcome.summaries[0].subsidy_max_limit, Some(4_500_000));
    assert_eq!(outcome.summaries[1].subsidy_max_limit, Some(2_000_000));
    assert_eq!(outcome.summaries[0].title, "令和7年度 IT導入補助金");
}

#[tokio::test]
async fn test_jgrants_empty_result() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/subsidies")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body(r#"{"metadata": {"resultset": {"count": 0}}, "result": []}"#)
        .create_async()
        .await;

    let source = JGrantsSource::with_base_url(&server.url()).unwrap();
    let query = jgrants_mcp::models::build_query(&SearchParams::default()).unwrap();
    let result = source.search(&query).await.unwrap();
    assert_eq!(result.total_count, 0);
    assert!(result.grants.is_empty());
}

#[tokio::test]
async fn test_jgrants_detail_not_found() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/subsidies/id/missing")
        .with_status(404)
        .with_body(r#"{"message": "not found"}"#)
        .create_async()
        .await;

    let source = JGrantsSource::with_base_url(&server.url()).unwrap();
    let err = source.fetch_detail("missing").await.unwrap_err();
    assert!(matches!(err, SourceError::NotFound(_)));
}

#[tokio::test]
async fn test_jgrants_server_error_is_api_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/subsidies")
        .match_query(mockito::Matcher::Any)
        .with_status(503)
        .create_async()
        .await;

    let source = JGrantsSource::with_base_url(&server.url()).unwrap();
    let query = jgrants_mcp::models::build_query(&SearchParams::new("補助金")).unwrap();
    let err = source.search(&query).await.unwrap_err();
    assert!(matches!(err, SourceError::Api(_)));
}

#[tokio::test]
async fn test_jgrants_detail_with_inline_attachment() {
    let mut server = mockito::Server::new_async().await;
    let body = json!({
        "result": [{
            "id": "a0W1",
            "title": "ものづくり補助金",
            "detail": "<p>概要</p><p>対象者</p>",
            "application_guidelines": [{"name": "guide.txt", "data": "aGVsbG8="}]
        }]
    });
    let _mock = server
        .mock("GET", "/subsidies/id/a0W1")
        .with_status(200)
        .with_body(body.to_string())
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(JGrantsSource::with_base_url(&server.url()).unwrap());
    let svc = GrantService::new(source, AttachmentCache::new(dir.path()), Extractor::new());

    let report = svc.detail("a0W1").await.unwrap();
    assert!(report.detail.description.contains("概要"));
    assert!(!report.detail.description.contains("<p>"));
    assert_eq!(report.download_counts(), (1, 0));
    assert_eq!(
        std::fs::read(dir.path().join("a0W1").join("guide.txt")).unwrap(),
        b"hello"
    );
}
