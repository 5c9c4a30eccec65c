//! Tool registry for MCP tools.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

use super::handlers::{
    FileContentHandler, ListCachedFilesHandler, PingHandler, SubsidyDetailHandler,
    SubsidyOverviewHandler, SubsidySearchHandler,
};
use crate::service::GrantService;

/// An MCP tool that can be called by the client
#[derive(Clone)]
pub struct Tool {
    /// Tool name (e.g., "search_subsidies")
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// JSON Schema for input parameters
    pub input_schema: Value,

    /// Handler function to execute the tool
    pub handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish()
    }
}

/// Handler for executing a tool
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync + std::fmt::Debug {
    /// Execute the tool with the given arguments
    async fn execute(&self, args: Value) -> Result<Value, String>;
}

/// Registry for all MCP tools
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
}

impl ToolRegistry {
    /// Registry with every grant tool bound to `service`
    pub fn from_service(service: Arc<GrantService>) -> Self {
        let mut registry = Self::default();
        registry.register_grant_tools(&service);
        registry
    }

    fn register_grant_tools(&mut self, service: &Arc<GrantService>) {
        self.register(Tool {
            name: "search_subsidies".to_string(),
            description: "Search subsidies on the jGrants portal. Returns the total count, \
                          the matching grants and the query actually sent."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "keyword": {
                        "type": "string",
                        "description": "Search keyword, 2 to 255 characters. Defaults to '事業' when omitted."
                    },
                    "use_purpose": {
                        "type": "string",
                        "description": "Usage purpose filter (e.g. '設備整備・IT導入をしたい')"
                    },
                    "industry": {
                        "type": "string",
                        "description": "Industry filter (e.g. '製造業')"
                    },
                    "target_number_of_employees": {
                        "type": "string",
                        "description": "Employee-count filter (e.g. '20名以下')"
                    },
                    "target_area_search": {
                        "type": "string",
                        "description": "Target area filter (e.g. '東京都')"
                    },
                    "sort": {
                        "type": "string",
                        "enum": ["acceptance_end_datetime", "acceptance_start_datetime", "created_date"],
                        "default": "acceptance_end_datetime"
                    },
                    "order": {
                        "type": "string",
                        "enum": ["ASC", "DESC"],
                        "default": "ASC"
                    },
                    "acceptance": {
                        "type": "integer",
                        "description": "1 for grants currently accepting applications, 0 for all",
                        "enum": [0, 1],
                        "default": 1
                    }
                }
            }),
            handler: Arc::new(SubsidySearchHandler {
                service: service.clone(),
            }),
        });

        self.register(Tool {
            name: "get_subsidy_detail".to_string(),
            description: "Get the full record of a subsidy and download its attachments \
                          into the local file cache. Each attachment reports whether it was cached."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "subsidy_id": {
                        "type": "string",
                        "description": "Subsidy ID as returned by search_subsidies"
                    }
                },
                "required": ["subsidy_id"]
            }),
            handler: Arc::new(SubsidyDetailHandler {
                service: service.clone(),
            }),
        });

        self.register(Tool {
            name: "get_subsidy_overview".to_string(),
            description: "Statistics over the subsidies currently accepting applications: \
                          deadline distribution, amount distribution, urgent and high-value grants."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "output_format": {
                        "type": "string",
                        "enum": ["json", "csv"],
                        "default": "json"
                    }
                }
            }),
            handler: Arc::new(SubsidyOverviewHandler {
                service: service.clone(),
            }),
        });

        self.register(Tool {
            name: "get_file_content".to_string(),
            description: "Read an attachment from the local cache. 'markdown' returns extracted \
                          text (PDF, Word, Excel, PowerPoint); 'base64' returns the raw bytes."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "subsidy_id": {
                        "type": "string",
                        "description": "Subsidy ID the file belongs to"
                    },
                    "filename": {
                        "type": "string",
                        "description": "File name as listed by get_subsidy_detail or list_cached_files"
                    },
                    "return_format": {
                        "type": "string",
                        "enum": ["markdown", "base64"],
                        "default": "markdown"
                    }
                },
                "required": ["subsidy_id", "filename"]
            }),
            handler: Arc::new(FileContentHandler {
                service: service.clone(),
            }),
        });

        self.register(Tool {
            name: "list_cached_files".to_string(),
            description: "List every attachment in the local file cache, grouped by subsidy ID."
                .to_string(),
            input_schema: json!({ "type": "object", "properties": {} }),
            handler: Arc::new(ListCachedFilesHandler {
                service: service.clone(),
            }),
        });

        self.register(Tool {
            name: "ping".to_string(),
            description: "Health check. Does not contact the portal.".to_string(),
            input_schema: json!({ "type": "object", "properties": {} }),
            handler: Arc::new(PingHandler {
                service: service.clone(),
            }),
        });
    }

    /// Register a tool
    pub fn register(&mut self, tool: Tool) {
        self.tools.insert(tool.name.clone(), tool);
    }

    /// Get all tools, sorted by name
    pub fn all(&self) -> Vec<&Tool> {
        let mut tools: Vec<&Tool> = self.tools.values().collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Execute a tool by name
    pub async fn execute(&self, name: &str, args: Value) -> Result<Value, String> {
        let tool = self
            .get(name)
            .ok_or_else(|| format!("Tool '{}' not found", name))?;

        tool.handler.execute(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MockSource;
    use crate::utils::{AttachmentCache, Extractor};

    fn registry() -> (ToolRegistry, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let service = GrantService::new(
            Arc::new(MockSource::new()),
            AttachmentCache::new(dir.path()),
            Extractor::new(),
        );
        (ToolRegistry::from_service(Arc::new(service)), dir)
    }

    #[test]
    fn test_registry_lists_grant_tools() {
        let (registry, _dir) = registry();
        let names: Vec<_> = registry.all().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "get_file_content",
                "get_subsidy_detail",
                "get_subsidy_overview",
                "list_cached_files",
                "ping",
                "search_subsidies",
            ]
        );
    }

    #[test]
    fn test_required_fields_in_schema() {
        let (registry, _dir) = registry();
        let tool = registry.get("get_file_content").unwrap();
        assert_eq!(
            tool.input_schema["required"],
            json!(["subsidy_id", "filename"])
        );
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let (registry, _dir) = registry();
        let err = registry.execute("download_everything", json!({})).await.unwrap_err();
        assert!(err.contains("not found"));
    }
}
