//! # jgrants-mcp
//!
//! Search and inspect Japanese government subsidies published on the jGrants
//! portal, from the command line or through a Model Context Protocol (MCP)
//! server.
//!
//! ## Architecture
//!
//! - [`models`]: grant records, search parameters and statistics
//! - [`sources`]: the jGrants API client behind the [`GrantSource`] trait
//! - [`service`]: operations shared by both front ends
//! - [`mcp`]: MCP tool server
//! - [`ui`]: Markdown and terminal rendering for the CLI
//! - [`utils`]: attachment cache, content extraction, aggregation, HTTP
//! - [`config`]: configuration management

pub mod config;
pub mod mcp;
pub mod models;
pub mod service;
pub mod sources;
pub mod ui;
pub mod utils;

// Re-export commonly used types
pub use models::{GrantDetail, GrantSummary, SearchParams};
pub use service::{GrantService, ServiceError};
pub use sources::{GrantSource, JGrantsSource};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
