//! Terminal output for the CLI.
//!
//! Colored status lines and a table view of search results. Markdown
//! rendering shared with the MCP tools lives in [`render`].

pub mod render;

use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use owo_colors::OwoColorize;

use crate::models::{GrantStatus, GrantSummary};
use crate::service::DetailReport;
use crate::utils::{format_date, format_yen, truncate_with_ellipsis};

/// Status types for colored output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Error,
    Warning,
    Info,
    Download,
    Search,
}

/// Status icons for different operations.
pub fn status_icon(status: Status) -> &'static str {
    match status {
        Status::Success => "✓",
        Status::Error => "✗",
        Status::Warning => "⚠",
        Status::Info => "ℹ",
        Status::Download => "↓",
        Status::Search => "🔍",
    }
}

/// Print a styled status message to stderr.
#[macro_export]
macro_rules! print_status {
    ($status:expr, $msg:expr) => {{
        use owo_colors::OwoColorize as _;
        use $crate::ui::{status_icon, Status};
        let status: Status = $status;
        let icon = status_icon(status);
        match status {
            Status::Success => eprintln!("{} {}", icon.green().bold(), $msg),
            Status::Error => eprintln!("{} {}", icon.red().bold(), $msg),
            Status::Warning => eprintln!("{} {}", icon.yellow().bold(), $msg),
            Status::Info => eprintln!("{} {}", icon.cyan().bold(), $msg),
            Status::Download => eprintln!("{} {}", icon.magenta(), $msg),
            Status::Search => eprintln!("{} {}", icon.yellow(), $msg),
        }
    }};
}

/// Get a human-readable file size.
pub fn format_file_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn status_cell(status: GrantStatus) -> Cell {
    let color = match status {
        GrantStatus::Open => Color::Green,
        GrantStatus::Closed => Color::DarkGrey,
        GrantStatus::Unknown => Color::Yellow,
    };
    Cell::new(status.label()).fg(color)
}

/// Table of search results for terminal display
pub fn search_table(grants: &[GrantSummary]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "ID",
            "タイトル",
            "受付開始",
            "受付終了",
            "補助上限額",
            "対象地域",
            "状態",
        ]);

    for grant in grants {
        table.add_row(vec![
            Cell::new(&grant.id),
            Cell::new(truncate_with_ellipsis(&grant.title, 48)).add_attribute(Attribute::Bold),
            Cell::new(format_date(grant.acceptance_start)),
            Cell::new(format_date(grant.acceptance_end)),
            Cell::new(format_yen(grant.subsidy_max_limit)),
            Cell::new(truncate_with_ellipsis(&grant.target_area_search, 24)),
            status_cell(grant.status),
        ]);
    }
    table
}

/// One-line summary of attachment downloads after a detail request
pub fn print_download_summary(report: &DetailReport) {
    let (cached, failed) = report.download_counts();
    if cached + failed == 0 {
        return;
    }
    let dir = report.save_directory.display();
    if failed == 0 {
        print_status!(
            Status::Download,
            format!("{} files cached in {}", cached.to_string().green(), dir)
        );
    } else {
        print_status!(
            Status::Warning,
            format!(
                "{} files cached, {} failed in {}",
                cached,
                failed.to_string().red(),
                dir
            )
        );
    }
}
