//! MCP server implementation using pmcp.
//!
//! JSON-RPC handling over stdio or streamable HTTP is done by pmcp; this
//! module only adapts the [`ToolRegistry`] to pmcp's tool handlers.

use crate::mcp::tools::{ToolHandler as GrantToolHandler, ToolRegistry};
use crate::service::{GrantService, SERVICE_NAME};
use async_trait::async_trait;
use pmcp::{
    server::streamable_http_server::StreamableHttpServer, Error, RequestHandlerExtra, Server,
    ServerCapabilities, ToolHandler, ToolInfo,
};
use serde_json::Value;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// MCP server exposing the grant tools
#[derive(Debug, Clone)]
pub struct McpServer {
    server: Arc<Mutex<Server>>,
}

impl McpServer {
    /// Create a server whose tools share `service`
    pub fn new(service: Arc<GrantService>) -> Result<Self, pmcp::Error> {
        let tools = ToolRegistry::from_service(service);
        let server = build_server(&tools)?;
        Ok(Self {
            server: Arc::new(Mutex::new(server)),
        })
    }

    /// Serve over stdio until the client disconnects.
    ///
    /// Consumes the server; stdout carries JSON-RPC only.
    pub async fn run_stdio(self) -> Result<(), pmcp::Error> {
        tracing::info!("Starting MCP server in stdio mode");

        let server = Arc::try_unwrap(self.server)
            .map_err(|_| Error::internal("MCP server is still shared"))?
            .into_inner();

        server.run_stdio().await
    }

    /// Serve streamable HTTP on `host:port`.
    ///
    /// Returns the bound address and the task running the listener.
    pub async fn run_http(
        &self,
        host: &str,
        port: u16,
    ) -> Result<(SocketAddr, JoinHandle<()>), pmcp::Error> {
        let socket_addr = listen_addr(host, port)?;

        tracing::info!(%socket_addr, "Starting MCP server in HTTP mode");
        StreamableHttpServer::new(socket_addr, self.server.clone())
            .start()
            .await
    }
}

/// Listen address for an IPv4 or IPv6 host; `[::1]` brackets are accepted
fn listen_addr(host: &str, port: u16) -> Result<SocketAddr, pmcp::Error> {
    let trimmed = host.trim();
    let ip = if trimmed.eq_ignore_ascii_case("localhost") {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    } else {
        trimmed
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .map_err(|e| Error::invalid_params(format!("Invalid host {}: {}", host, e)))?
    };
    Ok(SocketAddr::new(ip, port))
}

fn build_server(tools: &ToolRegistry) -> Result<Server, pmcp::Error> {
    let mut builder = Server::builder()
        .name(SERVICE_NAME)
        .version(env!("CARGO_PKG_VERSION"))
        .capabilities(ServerCapabilities::default());

    for tool in tools.all() {
        let wrapper = ToolWrapper {
            name: tool.name.clone(),
            description: Some(tool.description.clone()),
            input_schema: tool.input_schema.clone(),
            handler: tool.handler.clone(),
        };
        builder = builder.tool(wrapper.name.clone(), wrapper);
    }

    builder.build()
}

/// Adapts a registry tool to pmcp's ToolHandler
#[derive(Clone)]
struct ToolWrapper {
    name: String,
    description: Option<String>,
    input_schema: Value,
    handler: Arc<dyn GrantToolHandler>,
}

#[async_trait]
impl ToolHandler for ToolWrapper {
    async fn handle(&self, args: Value, _extra: RequestHandlerExtra) -> Result<Value, Error> {
        self.handler
            .execute(args)
            .await
            .map_err(|e| Error::internal(&e))
    }

    fn metadata(&self) -> Option<ToolInfo> {
        Some(ToolInfo::new(
            self.name.clone(),
            self.description.clone(),
            self.input_schema.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MockSource;
    use crate::utils::{AttachmentCache, Extractor};

    #[test]
    fn test_server_builds_with_all_tools() {
        let dir = tempfile::tempdir().unwrap();
        let service = GrantService::new(
            Arc::new(MockSource::new()),
            AttachmentCache::new(dir.path()),
            Extractor::new(),
        );
        assert!(McpServer::new(Arc::new(service)).is_ok());
    }

    #[test]
    fn test_listen_addr_ipv4_and_ipv6() {
        assert_eq!(listen_addr("127.0.0.1", 3000).unwrap().to_string(), "127.0.0.1:3000");
        assert_eq!(listen_addr("::1", 3000).unwrap().to_string(), "[::1]:3000");
        assert_eq!(listen_addr("[::]", 8080).unwrap().to_string(), "[::]:8080");
        assert_eq!(listen_addr("localhost", 80).unwrap().to_string(), "127.0.0.1:80");
        assert!(listen_addr("example.com", 80).is_err());
    }

    #[tokio::test]
    async fn test_run_http_rejects_bad_host() {
        let dir = tempfile::tempdir().unwrap();
        let service = GrantService::new(
            Arc::new(MockSource::new()),
            AttachmentCache::new(dir.path()),
            Extractor::new(),
        );
        let server = McpServer::new(Arc::new(service)).unwrap();
        assert!(server.run_http("not a host", 3000).await.is_err());
    }
}
