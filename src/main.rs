use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use jgrants_mcp::config::{find_config_file, load_config, write_default_config, Config};
use jgrants_mcp::mcp::McpServer;
use jgrants_mcp::models::{AcceptanceFilter, SearchParams, SortKey, SortOrder};
use jgrants_mcp::print_status;
use jgrants_mcp::service::{ContentFormat, GrantService, OverviewFormat};
use jgrants_mcp::ui::{self, render, Status};
use jgrants_mcp::utils::is_terminal;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// jGrants MCP - Search Japanese government subsidies and read their attachments
#[derive(Parser, Debug)]
#[command(name = "jgrants-mcp")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Search jGrants subsidies from the command line or serve them over MCP", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, short, value_enum, global = true, default_value_t = OutputFormat::Auto)]
    output: OutputFormat,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Request timeout in seconds (overrides the configuration)
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Attachment cache directory (overrides the configuration)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Output format for results
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// Markdown on a terminal, JSON otherwise
    Auto,
    /// Markdown (human-readable)
    Markdown,
    /// JSON (machine-readable)
    Json,
    /// Table for search results, Markdown for everything else
    Table,
}

/// Log line format
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

/// Sort field for search results
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum SortField {
    /// End of the acceptance window
    End,
    /// Start of the acceptance window
    Start,
    /// Publication date
    Created,
}

/// Sort order
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Order {
    Asc,
    Desc,
}

/// Overview output format
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum StatsFormat {
    Json,
    Csv,
}

/// File content format
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum FileFormat {
    Markdown,
    Base64,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search subsidies
    #[command(alias = "s")]
    Search {
        /// Keyword (2 to 255 characters); omitted searches with the broad placeholder "事業"
        keyword: Option<String>,

        /// Industry filter
        #[arg(long)]
        industry: Option<String>,

        /// Target area filter (e.g. 東京都)
        #[arg(long)]
        area: Option<String>,

        /// Employee-count filter
        #[arg(long)]
        employees: Option<String>,

        /// Usage purpose filter
        #[arg(long)]
        purpose: Option<String>,

        /// Sort field
        #[arg(long, value_enum)]
        sort: Option<SortField>,

        /// Sort order
        #[arg(long, value_enum)]
        order: Option<Order>,

        /// Include grants that are not accepting applications
        #[arg(long)]
        all: bool,
    },

    /// Show a subsidy and cache its attachments
    #[command(alias = "d")]
    Detail {
        /// Subsidy ID
        id: String,

        /// Do not download attachments
        #[arg(long)]
        no_download: bool,
    },

    /// Statistics over the subsidies currently accepting applications
    Overview {
        #[arg(long, short, value_enum, default_value_t = StatsFormat::Json)]
        format: StatsFormat,
    },

    /// Show the content of a cached attachment
    File {
        /// Subsidy ID
        id: String,

        /// File name
        filename: String,

        #[arg(long, short, value_enum, default_value_t = FileFormat::Markdown)]
        format: FileFormat,
    },

    /// List cached attachments
    Files,

    /// Check that the service is up
    Ping,

    /// Run the MCP server
    Serve {
        /// Serve streamable HTTP instead of stdio
        #[arg(long)]
        http: bool,

        /// Host to bind to in HTTP mode
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to in HTTP mode
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Write a default configuration file
    Init {
        #[arg(long, default_value = "jgrants-mcp.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl From<SortField> for SortKey {
    fn from(field: SortField) -> Self {
        match field {
            SortField::End => SortKey::AcceptanceEnd,
            SortField::Start => SortKey::AcceptanceStart,
            SortField::Created => SortKey::CreatedDate,
        }
    }
}

impl From<Order> for SortOrder {
    fn from(order: Order) -> Self {
        match order {
            Order::Asc => SortOrder::Asc,
            Order::Desc => SortOrder::Desc,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = resolve_config(&cli)?;
    init_tracing(&cli, &config);

    if let Err(e) = run(cli, config).await {
        eprint!("{}", render::render_error(&format!("{:#}", e)));
        std::process::exit(1);
    }
    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<Config> {
    let path = cli.config.clone().or_else(find_config_file);
    let mut config = load_config(path.as_deref()).with_context(|| match &path {
        Some(p) => format!("Failed to load configuration from {}", p.display()),
        None => "Failed to load configuration from the environment".to_string(),
    })?;

    if let Some(timeout) = cli.timeout {
        config.api.timeout_seconds = timeout;
    }
    if let Some(dir) = &cli.cache_dir {
        config.cache.directory = Some(dir.clone());
    }
    Ok(config)
}

/// Logs always go to stderr; stdout carries results (or JSON-RPC in stdio mode).
fn init_tracing(cli: &Cli, config: &Config) {
    let level = if cli.quiet {
        "error".to_string()
    } else {
        match cli.verbose {
            0 => config.logging.level.clone(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("jgrants_mcp={}", level)));

    let json = match cli.log_format {
        Some(format) => format == LogFormat::Json,
        None => config.logging.format.as_deref() == Some("json"),
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    if let Commands::Config {
        action: ConfigAction::Init { path, force },
    } = &command
    {
        write_default_config(path, *force)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        if !cli.quiet {
            print_status!(Status::Success, format!("Wrote {}", path.display()));
        }
        return Ok(());
    }

    let service = GrantService::from_config(&config).context("Failed to create grant service")?;
    let format = resolve_format(cli.output);

    match command {
        Commands::Search {
            keyword,
            industry,
            area,
            employees,
            purpose,
            sort,
            order,
            all,
        } => {
            let params = SearchParams {
                keyword,
                industry,
                target_area: area,
                employees,
                use_purpose: purpose,
                sort: sort.map(SortKey::from),
                order: order.map(SortOrder::from),
                acceptance: all.then_some(AcceptanceFilter::All),
            };
            let outcome = service.search(&params).await?;

            if format == OutputFormat::Table {
                println!(
                    "検索結果: {}件（最初の{}件を表示）",
                    outcome.total_count,
                    outcome.summaries.len().min(render::MAX_SEARCH_ROWS)
                );
                let shown = &outcome.summaries[..outcome.summaries.len().min(render::MAX_SEARCH_ROWS)];
                println!("{}", ui::search_table(shown));
            } else {
                emit(&outcome, format, render::render_search)?;
            }
        }

        Commands::Detail { id, no_download } => {
            let service = service.with_download_on_detail(!no_download);
            let report = service.detail(&id).await?;
            emit(&report, format, render::render_detail)?;
            if !cli.quiet && format != OutputFormat::Json {
                ui::print_download_summary(&report);
            }
        }

        Commands::Overview { format: stats } => {
            let stats = match stats {
                StatsFormat::Json => OverviewFormat::Json,
                StatsFormat::Csv => OverviewFormat::Csv,
            };
            let overview = service.overview(stats).await?;
            emit(&overview, format, render::render_overview)?;
        }

        Commands::File {
            id,
            filename,
            format: content,
        } => {
            let content = match content {
                FileFormat::Markdown => ContentFormat::Markdown,
                FileFormat::Base64 => ContentFormat::Base64,
            };
            let file = service.file_content(&id, &filename, content).await?;
            emit(&file, format, render::render_file_content)?;
        }

        Commands::Files => {
            let inventory = service.list_cached_files().await?;
            emit(&inventory, format, render::render_inventory)?;
        }

        Commands::Ping => {
            emit(&service.ping(), format, render::render_ping)?;
        }

        Commands::Serve { http, host, port } => {
            let server = McpServer::new(Arc::new(service))?;

            if http {
                let host = host.unwrap_or(config.server.host);
                let port = port.unwrap_or(config.server.port);
                let (bound_addr, handle) = server.run_http(&host, port).await?;
                tracing::info!(%bound_addr, "MCP server listening");
                if !cli.quiet {
                    print_status!(Status::Info, format!("MCP server listening on http://{}", bound_addr));
                }

                tokio::select! {
                    result = handle => {
                        result.map_err(|e| anyhow::anyhow!("Server task failed: {}", e))?;
                    }
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Received Ctrl-C, shutting down");
                    }
                }
            } else {
                server.run_stdio().await?;
            }
        }

        Commands::Config { .. } => {}
    }

    Ok(())
}

fn resolve_format(format: OutputFormat) -> OutputFormat {
    match format {
        OutputFormat::Auto if is_terminal() => OutputFormat::Markdown,
        OutputFormat::Auto => OutputFormat::Json,
        other => other,
    }
}

fn emit<T: Serialize>(value: &T, format: OutputFormat, markdown: fn(&T) -> String) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        _ => {
            print!("{}", markdown(value));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::parse_from(["jgrants-mcp"]);
        assert_eq!(cli.verbose, 0);
        assert!(!cli.quiet);
        assert_eq!(cli.output, OutputFormat::Auto);
        assert!(cli.timeout.is_none());
        assert!(cli.cache_dir.is_none());
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_verbose_flag() {
        let cli = Cli::parse_from(["jgrants-mcp", "-vv"]);
        assert_eq!(cli.verbose, 2);

        let cli = Cli::parse_from(["jgrants-mcp", "ping", "--verbose"]);
        assert_eq!(cli.verbose, 1);
    }

    #[test]
    fn test_cli_output_format() {
        let cli = Cli::parse_from(["jgrants-mcp", "-o", "json", "ping"]);
        assert_eq!(cli.output, OutputFormat::Json);

        let cli = Cli::parse_from(["jgrants-mcp", "search", "--output", "table"]);
        assert_eq!(cli.output, OutputFormat::Table);
    }

    #[test]
    fn test_cli_global_overrides() {
        let cli = Cli::parse_from([
            "jgrants-mcp",
            "files",
            "--timeout",
            "60",
            "--cache-dir",
            "/tmp/grants",
            "--log-format",
            "json",
        ]);
        assert_eq!(cli.timeout, Some(60));
        assert_eq!(cli.cache_dir, Some(PathBuf::from("/tmp/grants")));
        assert_eq!(cli.log_format, Some(LogFormat::Json));
    }

    #[test]
    fn test_cli_search_command() {
        let cli = Cli::parse_from([
            "jgrants-mcp",
            "search",
            "IT導入",
            "--area",
            "東京都",
            "--sort",
            "created",
            "--order",
            "desc",
            "--all",
        ]);
        match cli.command {
            Some(Commands::Search {
                keyword,
                area,
                sort,
                order,
                all,
                ..
            }) => {
                assert_eq!(keyword.as_deref(), Some("IT導入"));
                assert_eq!(area.as_deref(), Some("東京都"));
                assert_eq!(sort.map(SortKey::from), Some(SortKey::CreatedDate));
                assert_eq!(order.map(SortOrder::from), Some(SortOrder::Desc));
                assert!(all);
            }
            _ => panic!("Expected Search command"),
        }
    }

    #[test]
    fn test_cli_search_without_keyword() {
        let cli = Cli::parse_from(["jgrants-mcp", "s"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Search { keyword: None, .. })
        ));
    }

    #[test]
    fn test_cli_file_command() {
        let cli = Cli::parse_from(["jgrants-mcp", "file", "a0W1", "公募要領.pdf", "-f", "base64"]);
        match cli.command {
            Some(Commands::File {
                id,
                filename,
                format,
            }) => {
                assert_eq!(id, "a0W1");
                assert_eq!(filename, "公募要領.pdf");
                assert_eq!(format, FileFormat::Base64);
            }
            _ => panic!("Expected File command"),
        }
    }

    #[test]
    fn test_cli_overview_csv() {
        let cli = Cli::parse_from(["jgrants-mcp", "overview", "--format", "csv"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Overview {
                format: StatsFormat::Csv
            })
        ));
    }

    #[test]
    fn test_cli_serve_command() {
        let cli = Cli::parse_from(["jgrants-mcp", "serve"]);
        match cli.command {
            Some(Commands::Serve { http, host, port }) => {
                assert!(!http);
                assert!(host.is_none());
                assert!(port.is_none());
            }
            _ => panic!("Expected Serve command"),
        }

        let cli = Cli::parse_from(["jgrants-mcp", "serve", "--http", "--port", "8080"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Serve {
                http: true,
                port: Some(8080),
                ..
            })
        ));
    }

    #[test]
    fn test_cli_config_init() {
        let cli = Cli::parse_from(["jgrants-mcp", "config", "init", "--force"]);
        match cli.command {
            Some(Commands::Config {
                action: ConfigAction::Init { path, force },
            }) => {
                assert_eq!(path, PathBuf::from("jgrants-mcp.toml"));
                assert!(force);
            }
            _ => panic!("Expected config init"),
        }
    }

    #[test]
    fn test_resolve_format_keeps_explicit_choice() {
        assert_eq!(resolve_format(OutputFormat::Json), OutputFormat::Json);
        assert_eq!(resolve_format(OutputFormat::Table), OutputFormat::Table);
    }
}
