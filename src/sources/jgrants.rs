//! jGrants public API source implementation.
//!
//! Endpoints (v1, no authentication):
//! - `GET {base}/subsidies?keyword=..&sort=..&order=..&acceptance=..` for search
//! - `GET {base}/subsidies/id/{id}` for detail, with attachments inlined as base64

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use scraper::Html;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::borrow::Cow;
use std::sync::OnceLock;
use tracing::debug;

use crate::config::ApiConfig;
use crate::models::{
    AttachmentCategory, AttachmentRef, AttachmentSource, GrantDetail, GrantSummary, RemoteQuery,
    SearchResultSet,
};
use crate::sources::{decode_inline, GrantSource, SourceError};
use crate::utils::{validate_base_url, HttpClient};

/// Portal timestamps without an offset are Japan local time
const JST_OFFSET_SECS: i32 = 9 * 3600;

/// jGrants subsidy portal
#[derive(Debug, Clone)]
pub struct JGrantsSource {
    http: HttpClient,
    base_url: String,
}

impl JGrantsSource {
    /// Create a source from API settings
    pub fn new(config: &ApiConfig) -> Result<Self, SourceError> {
        let base_url = validate_base_url(&config.base_url)
            .map_err(|e| SourceError::InvalidRequest(e.to_string()))?;
        Ok(Self {
            http: HttpClient::from_config(config)?,
            base_url,
        })
    }

    /// Create a source against another base URL with default settings
    pub fn with_base_url(base_url: &str) -> Result<Self, SourceError> {
        let config = ApiConfig {
            base_url: base_url.to_string(),
            ..ApiConfig::default()
        };
        Self::new(&config)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T, SourceError> {
        debug!(url, "jGrants request");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::Network(format!("Failed to reach jGrants: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            return Err(SourceError::Api(format!(
                "jGrants API returned status: {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SourceError::Network(format!("Failed to read response: {}", e)))?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl GrantSource for JGrantsSource {
    fn id(&self) -> &str {
        "jgrants"
    }

    fn name(&self) -> &str {
        "jGrants"
    }

    async fn search(&self, query: &RemoteQuery) -> Result<SearchResultSet, SourceError> {
        let url = format!("{}/subsidies?{}", self.base_url, query.to_query_string());
        let data: WireSearchResponse = self.get_json(&url, "search endpoint").await?;
        Ok(parse_search(data, Utc::now()))
    }

    async fn fetch_detail(&self, id: &str) -> Result<GrantDetail, SourceError> {
        let url = format!("{}/subsidies/id/{}", self.base_url, urlencoding::encode(id));
        let data: WireDetailResponse = self.get_json(&url, id).await?;
        parse_detail(id, data, Utc::now())
    }

    async fn download_attachment(&self, attachment: &AttachmentRef) -> Result<Vec<u8>, SourceError> {
        match &attachment.source {
            AttachmentSource::Inline { data } => decode_inline(data),
            AttachmentSource::Remote { url } => {
                debug!(url = url.as_str(), name = attachment.name.as_str(), "Downloading attachment");
                let response = self.http.get(url).send().await.map_err(|e| {
                    SourceError::Network(format!("Failed to download {}: {}", attachment.name, e))
                })?;
                let status = response.status();
                if status == reqwest::StatusCode::NOT_FOUND {
                    return Err(SourceError::NotFound(attachment.name.clone()));
                }
                if !status.is_success() {
                    return Err(SourceError::Api(format!(
                        "attachment download returned status: {}",
                        status
                    )));
                }
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| SourceError::Network(format!("Failed to read body: {}", e)))?;
                Ok(bytes.to_vec())
            }
        }
    }
}

fn parse_search(data: WireSearchResponse, now: DateTime<Utc>) -> SearchResultSet {
    let grants: Vec<GrantSummary> = data
        .result
        .unwrap_or_default()
        .iter()
        .filter_map(|g| {
            let summary = summary_from_wire(g, None, now);
            if summary.is_none() {
                debug!("Skipping search record without id");
            }
            summary
        })
        .collect();

    let total_count = data
        .metadata
        .and_then(|m| m.resultset)
        .and_then(|r| r.count)
        .unwrap_or(grants.len());

    SearchResultSet {
        total_count,
        grants,
    }
}

fn parse_detail(
    id: &str,
    data: WireDetailResponse,
    now: DateTime<Utc>,
) -> Result<GrantDetail, SourceError> {
    let wire = data
        .result
        .unwrap_or_default()
        .into_iter()
        .next()
        .ok_or_else(|| SourceError::NotFound(id.to_string()))?;

    let summary = summary_from_wire(&wire.grant, Some(id), now)
        .ok_or_else(|| SourceError::NotFound(id.to_string()))?;

    let mut detail = GrantDetail::from_summary(summary);
    detail.catch_phrase = text_field(&wire.subsidy_catch_phrase);
    detail.description = html_to_text(wire.detail.as_deref().unwrap_or_default());
    detail.use_purpose = text_field(&wire.grant.use_purpose);
    detail.target_area_detail = text_field(&wire.target_area_detail);
    detail.subsidy_rate = text_field(&wire.subsidy_rate);
    detail.project_end_deadline = wire.project_end_deadline.as_deref().and_then(parse_timestamp);
    detail.application_url = wire
        .front_subsidy_detail_page_url
        .filter(|u| !u.trim().is_empty());

    let groups = [
        (AttachmentCategory::ApplicationGuidelines, wire.application_guidelines),
        (AttachmentCategory::OutlineOfGrant, wire.outline_of_grant),
        (AttachmentCategory::ApplicationForm, wire.application_form),
    ];
    for (category, files) in groups {
        for file in files.unwrap_or_default() {
            match attachment_from_wire(file) {
                Some(attachment) => detail = detail.attach(category, attachment),
                None => debug!(category = category.wire_name(), "Skipping attachment without name or payload"),
            }
        }
    }

    Ok(detail)
}

fn summary_from_wire(
    wire: &WireGrant,
    fallback_id: Option<&str>,
    now: DateTime<Utc>,
) -> Option<GrantSummary> {
    let id = wire
        .id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or(fallback_id)?;

    let start = wire.acceptance_start_datetime.as_deref().and_then(parse_timestamp);
    let end = wire.acceptance_end_datetime.as_deref().and_then(parse_timestamp);

    let mut summary = GrantSummary::new(id, text_field(&wire.title))
        .window(start, end, now)
        .max_limit(wire.subsidy_max_limit.as_ref().and_then(parse_amount));
    summary.name = text_field(&wire.name);
    summary.target_area_search = text_field(&wire.target_area_search);
    summary.industry = text_field(&wire.industry);
    summary.target_number_of_employees = text_field(&wire.target_number_of_employees);
    Some(summary)
}

fn attachment_from_wire(file: WireAttachment) -> Option<AttachmentRef> {
    let name = file.name.filter(|n| !n.trim().is_empty())?;
    let mut attachment = match (file.data, file.url) {
        (Some(data), _) if !data.is_empty() => AttachmentRef::inline(name, data),
        (_, Some(url)) if !url.is_empty() => AttachmentRef::remote(name, url),
        _ => return None,
    };
    if file.size.is_some() {
        attachment.declared_size = file.size;
    }
    Some(attachment)
}

fn text_field(value: &Option<String>) -> String {
    value.as_deref().map(str::trim).unwrap_or_default().to_string()
}

/// Parse a subsidy ceiling that may arrive as a number or a string
fn parse_amount(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !matches!(c, ',' | ' ' | '円'))
                .collect();
            cleaned.parse::<u64>().ok()
        }
        _ => None,
    }
}

/// Parse a portal timestamp; naive values are taken as JST
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    let jst = FixedOffset::east_opt(JST_OFFSET_SECS)?;
    let naive = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    naive
        .and_local_timezone(jst)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn block_break_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<br\s*/?>|</(p|div|li|h[1-6]|tr|table|ul|ol)\s*>").ok())
        .as_ref()
}

fn inline_space_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t\u{00a0}\u{3000}]+").ok())
        .as_ref()
}

/// Convert the portal's HTML description into plain text.
///
/// Block-level closing tags become line breaks, runs of spaces collapse and
/// blank lines are squeezed to one.
pub(crate) fn html_to_text(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }

    let marked = match block_break_re() {
        Some(re) => re.replace_all(html, "$0\n"),
        None => Cow::Borrowed(html),
    };
    let fragment = Html::parse_fragment(&marked);
    let raw: String = fragment.root_element().text().collect();

    let mut out: Vec<String> = Vec::new();
    for line in raw.lines() {
        let line = match inline_space_re() {
            Some(re) => re.replace_all(line, " ").trim().to_string(),
            None => line.trim().to_string(),
        };
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

// Wire fields are fail-soft: a value of the wrong type reads as absent
// instead of failing the whole response.

fn lenient_string<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(de)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_amount<'de, D: Deserializer<'de>>(de: D) -> Result<Option<u64>, D::Error> {
    Ok(Option::<Value>::deserialize(de)?.as_ref().and_then(parse_amount))
}

fn lenient_count<'de, D: Deserializer<'de>>(de: D) -> Result<Option<usize>, D::Error> {
    Ok(lenient_amount(de)?.and_then(|n| usize::try_from(n).ok()))
}

fn lenient_record<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(Option::<Value>::deserialize(de)?.and_then(|v| serde_json::from_value(v).ok()))
}

/// Keep the array elements that parse; anything but an array is absent
fn lenient_list<'de, D, T>(de: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Option::<Value>::deserialize(de)? {
        Some(Value::Array(items)) => Some(
            items
                .into_iter()
                .filter_map(|item| match serde_json::from_value(item) {
                    Ok(parsed) => Some(parsed),
                    Err(e) => {
                        debug!(error = %e, "Skipping malformed record");
                        None
                    }
                })
                .collect(),
        ),
        _ => None,
    })
}

#[derive(Debug, Deserialize)]
struct WireSearchResponse {
    #[serde(default, deserialize_with = "lenient_record")]
    metadata: Option<WireMetadata>,
    #[serde(default, deserialize_with = "lenient_list")]
    result: Option<Vec<WireGrant>>,
}

#[derive(Debug, Deserialize)]
struct WireMetadata {
    #[serde(default, deserialize_with = "lenient_record")]
    resultset: Option<WireResultSet>,
}

#[derive(Debug, Deserialize)]
struct WireResultSet {
    #[serde(default, deserialize_with = "lenient_count")]
    count: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct WireGrant {
    #[serde(default, deserialize_with = "lenient_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    target_area_search: Option<String>,
    #[serde(default)]
    subsidy_max_limit: Option<Value>,
    #[serde(default, deserialize_with = "lenient_string")]
    acceptance_start_datetime: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    acceptance_end_datetime: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    target_number_of_employees: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    industry: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    use_purpose: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireDetailResponse {
    #[serde(default, deserialize_with = "lenient_list")]
    result: Option<Vec<WireDetail>>,
}

#[derive(Debug, Deserialize)]
struct WireDetail {
    #[serde(flatten)]
    grant: WireGrant,
    #[serde(default, deserialize_with = "lenient_string")]
    subsidy_catch_phrase: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    detail: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    target_area_detail: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    subsidy_rate: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    project_end_deadline: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    front_subsidy_detail_page_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    application_guidelines: Option<Vec<WireAttachment>>,
    #[serde(default, deserialize_with = "lenient_list")]
    outline_of_grant: Option<Vec<WireAttachment>>,
    #[serde(default, deserialize_with = "lenient_list")]
    application_form: Option<Vec<WireAttachment>>,
}

#[derive(Debug, Deserialize)]
struct WireAttachment {
    #[serde(default, deserialize_with = "lenient_string")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    data: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    url: Option<String>,
    #[serde(default, deserialize_with = "lenient_amount")]
    size: Option<u64>,
}
