//! Tool handlers backed by the grant service.
//!
//! Handlers parse loosely typed JSON arguments, call [`GrantService`] and
//! return the serialized result. Every failure becomes an error string so the
//! server keeps running.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::tools::ToolHandler;
use crate::models::{AcceptanceFilter, SearchParams, SortKey, SortOrder};
use crate::service::{ContentFormat, GrantService, OverviewFormat, ServiceError};

/// Non-blank string argument
fn opt_string(args: &Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn required_string(args: &Value, key: &str) -> Result<String, String> {
    opt_string(args, key).ok_or_else(|| format!("Missing '{}' parameter", key))
}

/// Integer argument, also accepted as a numeric string
fn opt_u64(args: &Value, key: &str) -> Result<Option<u64>, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
            .map(Some)
            .ok_or_else(|| format!("'{}' must be a non-negative integer", key)),
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| format!("Failed to serialize result: {}", e))
}

fn tool_error(tool: &str, error: ServiceError) -> String {
    if error.is_user_error() {
        debug!(tool, error = %error, "Tool call rejected");
    } else {
        warn!(tool, error = %error, "Tool call failed");
    }
    error.to_string()
}

/// Build search parameters from tool arguments
pub(crate) fn search_params(args: &Value) -> Result<SearchParams, String> {
    let mut params = SearchParams {
        // An explicit empty keyword still goes through length validation
        keyword: args
            .get("keyword")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        industry: opt_string(args, "industry"),
        target_area: opt_string(args, "target_area_search"),
        employees: opt_string(args, "target_number_of_employees"),
        use_purpose: opt_string(args, "use_purpose"),
        ..Default::default()
    };

    if let Some(sort) = opt_string(args, "sort") {
        params.sort =
            Some(SortKey::parse(&sort).ok_or_else(|| format!("Unsupported sort field: {}", sort))?);
    }
    if let Some(order) = opt_string(args, "order") {
        params.order =
            Some(SortOrder::parse(&order).ok_or_else(|| format!("Unsupported order: {}", order))?);
    }
    if let Some(acceptance) = opt_u64(args, "acceptance")? {
        params.acceptance = Some(AcceptanceFilter::from_wire(acceptance));
    }
    Ok(params)
}

/// Handler for `search_subsidies`
#[derive(Debug)]
pub struct SubsidySearchHandler {
    pub service: Arc<GrantService>,
}

#[async_trait::async_trait]
impl ToolHandler for SubsidySearchHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let params = search_params(&args)?;
        let outcome = self
            .service
            .search(&params)
            .await
            .map_err(|e| tool_error("search_subsidies", e))?;
        to_json(&outcome)
    }
}

/// Handler for `get_subsidy_detail`
#[derive(Debug)]
pub struct SubsidyDetailHandler {
    pub service: Arc<GrantService>,
}

#[async_trait::async_trait]
impl ToolHandler for SubsidyDetailHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let id = required_string(&args, "subsidy_id")?;
        let report = self
            .service
            .detail(&id)
            .await
            .map_err(|e| tool_error("get_subsidy_detail", e))?;
        to_json(&report)
    }
}

/// Handler for `get_subsidy_overview`
#[derive(Debug)]
pub struct SubsidyOverviewHandler {
    pub service: Arc<GrantService>,
}

#[async_trait::async_trait]
impl ToolHandler for SubsidyOverviewHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let format = match opt_string(&args, "output_format") {
            None => OverviewFormat::default(),
            Some(raw) => OverviewFormat::parse(&raw)
                .ok_or_else(|| format!("Unsupported output_format: {}", raw))?,
        };
        let overview = self
            .service
            .overview(format)
            .await
            .map_err(|e| tool_error("get_subsidy_overview", e))?;
        to_json(&overview)
    }
}

/// Handler for `get_file_content`
#[derive(Debug)]
pub struct FileContentHandler {
    pub service: Arc<GrantService>,
}

#[async_trait::async_trait]
impl ToolHandler for FileContentHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let id = required_string(&args, "subsidy_id")?;
        let file_name = required_string(&args, "filename")?;
        let format = match opt_string(&args, "return_format") {
            None => ContentFormat::default(),
            Some(raw) => ContentFormat::parse(&raw)
                .ok_or_else(|| format!("Unsupported return_format: {}", raw))?,
        };
        let content = self
            .service
            .file_content(&id, &file_name, format)
            .await
            .map_err(|e| tool_error("get_file_content", e))?;
        to_json(&content)
    }
}

/// Handler for `list_cached_files`
#[derive(Debug)]
pub struct ListCachedFilesHandler {
    pub service: Arc<GrantService>,
}

#[async_trait::async_trait]
impl ToolHandler for ListCachedFilesHandler {
    async fn execute(&self, _args: Value) -> Result<Value, String> {
        let inventory = self
            .service
            .list_cached_files()
            .await
            .map_err(|e| tool_error("list_cached_files", e))?;
        to_json(&inventory)
    }
}

/// Handler for `ping`
#[derive(Debug)]
pub struct PingHandler {
    pub service: Arc<GrantService>,
}

#[async_trait::async_trait]
impl ToolHandler for PingHandler {
    async fn execute(&self, _args: Value) -> Result<Value, String> {
        to_json(&self.service.ping())
    }
}
