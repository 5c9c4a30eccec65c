//! Markdown rendering of service results.
//!
//! These renderers are the only place where result lists are shortened for
//! display; the service always returns complete data.

use std::fmt::Write as _;

use crate::models::{AttachmentCategory, DownloadOutcome, GrantSummary, StatisticsSnapshot};
use crate::service::{DetailReport, FileContent, Inventory, Overview, Ping, SearchOutcome};
use crate::ui::format_file_size;
use crate::utils::{
    format_date, format_datetime, format_yen, group_digits, truncate_chars, ExtractionMethod,
};

/// Search rows shown
pub const MAX_SEARCH_ROWS: usize = 50;
/// Urgent and high-value entries shown
pub const MAX_HIGHLIGHTS: usize = 10;
/// Description characters shown
pub const MAX_DESCRIPTION_CHARS: usize = 1000;
/// Base64 characters previewed
pub const MAX_BASE64_PREVIEW: usize = 500;

fn or_default<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

/// Search result summary with a Markdown table of the first rows
pub fn render_search(outcome: &SearchOutcome) -> String {
    if outcome.summaries.is_empty() {
        return "検索結果が見つかりませんでした。\n".to_string();
    }

    let shown = outcome.summaries.len().min(MAX_SEARCH_ROWS);
    let mut out = format!(
        "検索結果: {}件（最初の{}件を表示）\n\n",
        outcome.total_count, shown
    );
    let conditions = serde_json::to_string_pretty(&outcome.applied_query).unwrap_or_default();
    let _ = writeln!(out, "検索条件:\n```json\n{}\n```\n", conditions);

    out.push_str("| ID | タイトル | 受付開始 | 受付終了 | 補助上限額 | 対象地域 |\n");
    out.push_str("| --- | --- | --- | --- | --- | --- |\n");
    for grant in outcome.summaries.iter().take(MAX_SEARCH_ROWS) {
        out.push_str(&search_row(grant));
    }
    out
}

fn search_row(grant: &GrantSummary) -> String {
    format!(
        "| {} | {} | {} | {} | {} | {} |\n",
        cell(&grant.id),
        cell(&grant.title),
        format_date(grant.acceptance_start),
        format_date(grant.acceptance_end),
        format_yen(grant.subsidy_max_limit),
        cell(&grant.target_area_search),
    )
}

/// Detail page with per-attachment download results
pub fn render_detail(report: &DetailReport) -> String {
    let detail = &report.detail;
    let summary = &detail.summary;
    let mut out = String::new();

    let _ = writeln!(out, "# {}\n", or_default(&summary.title, "無題"));
    if !detail.catch_phrase.is_empty() {
        let _ = writeln!(out, "> {}\n", detail.catch_phrase);
    }
    let _ = writeln!(out, "**ID**: {}\n", summary.id);
    let _ = writeln!(out, "**ステータス**: {}\n", summary.status);
    let _ = writeln!(out, "**補助上限額**: {}\n", format_yen(summary.subsidy_max_limit));
    if !detail.subsidy_rate.is_empty() {
        let _ = writeln!(out, "**補助率**: {}\n", detail.subsidy_rate);
    }
    let _ = writeln!(
        out,
        "**受付期間**: {} 〜 {}\n",
        format_datetime(summary.acceptance_start),
        format_datetime(summary.acceptance_end)
    );
    if detail.project_end_deadline.is_some() {
        let _ = writeln!(
            out,
            "**事業完了期限**: {}\n",
            format_date(detail.project_end_deadline)
        );
    }

    out.push_str("## 対象条件\n\n");
    let area = if detail.target_area_detail.is_empty() {
        &summary.target_area_search
    } else {
        &detail.target_area_detail
    };
    let _ = writeln!(out, "- **地域**: {}", or_default(area, "指定なし"));
    let _ = writeln!(out, "- **業種**: {}", or_default(&summary.industry, "指定なし"));
    let _ = writeln!(
        out,
        "- **従業員数**: {}",
        or_default(&summary.target_number_of_employees, "指定なし")
    );
    let _ = writeln!(out, "- **利用目的**: {}\n", or_default(&detail.use_purpose, "指定なし"));

    if let Some(url) = &detail.application_url {
        let _ = writeln!(out, "**申請URL**: {}\n", url);
    }

    out.push_str("## 詳細説明\n\n");
    if detail.description.is_empty() {
        out.push_str("説明がありません。\n\n");
    } else {
        let _ = writeln!(
            out,
            "{}\n",
            truncate_chars(&detail.description, MAX_DESCRIPTION_CHARS)
        );
    }

    if detail.attachment_count() > 0 {
        out.push_str("## ダウンロードされたファイル\n\n");
        let _ = writeln!(out, "保存先: `{}`\n", report.save_directory.display());

        for category in AttachmentCategory::ALL {
            let Some(files) = detail.attachments.get(&category).filter(|f| !f.is_empty()) else {
                continue;
            };
            let _ = writeln!(out, "### {}\n", category.label());
            for file in files {
                match &file.outcome {
                    DownloadOutcome::Cached { size, .. } => {
                        let _ = writeln!(out, "- ✅ {} ({} bytes)", file.name, group_digits(*size));
                        let _ = writeln!(out, "  - ファイルID: `{}/{}`", summary.id, file.name);
                    }
                    DownloadOutcome::Failed { reason } => {
                        let _ = writeln!(out, "- ❌ {}: {}", file.name, reason);
                    }
                    DownloadOutcome::Pending => {
                        let _ = writeln!(out, "- ⏸ {} (未取得)", file.name);
                    }
                }
            }
            out.push('\n');
        }
    }

    let _ = writeln!(
        out,
        "\n**最終更新**: {}",
        format_datetime(Some(report.fetched_at))
    );
    out
}

/// Statistics in the chosen format
pub fn render_overview(overview: &Overview) -> String {
    match overview {
        Overview::Json(snapshot) => render_snapshot(snapshot),
        Overview::Csv {
            total_count,
            generated_at,
            deadline_csv,
            amount_csv,
        } => {
            let mut out = String::from("# 補助金統計情報（CSV形式）\n\n");
            let _ = writeln!(out, "総件数: {}", total_count);
            let _ = writeln!(out, "生成日時: {}\n", format_datetime(Some(*generated_at)));
            let _ = writeln!(out, "## 締切期間別統計\n```csv\n{}```\n", deadline_csv);
            let _ = writeln!(out, "## 金額規模別統計\n```csv\n{}```", amount_csv);
            out
        }
    }
}

fn render_snapshot(snapshot: &StatisticsSnapshot) -> String {
    let mut out = String::from("# 補助金統計情報\n\n");
    let _ = writeln!(out, "**総件数**: {}", snapshot.total_count);
    let _ = writeln!(
        out,
        "**生成日時**: {}\n",
        format_datetime(Some(snapshot.generated_at))
    );

    let d = &snapshot.by_deadline;
    out.push_str("## 締切期間別の分布\n\n");
    let _ = writeln!(out, "- 今月締切: {}件", d.this_month);
    let _ = writeln!(out, "- 来月締切: {}件", d.next_month);
    let _ = writeln!(out, "- 再来月以降: {}件\n", d.later);

    let a = &snapshot.by_amount;
    out.push_str("## 金額規模別の分布\n\n");
    let _ = writeln!(out, "- 100万円以下: {}件", a.under_1m);
    let _ = writeln!(out, "- 1000万円以下: {}件", a.under_10m);
    let _ = writeln!(out, "- 1億円以下: {}件", a.under_100m);
    let _ = writeln!(out, "- 1億円超: {}件", a.over_100m);
    let _ = writeln!(out, "- 金額未設定: {}件\n", a.unspecified);

    if !snapshot.urgent.is_empty() {
        let _ = writeln!(
            out,
            "## 緊急締切案件（14日以内: {}件）\n",
            snapshot.urgent.len()
        );
        for u in snapshot.urgent.iter().take(MAX_HIGHLIGHTS) {
            let _ = writeln!(
                out,
                "- **{}** (ID: {}, 残り{}日)",
                u.title, u.id, u.days_left
            );
        }
        out.push('\n');
    }

    if !snapshot.high_value.is_empty() {
        let _ = writeln!(
            out,
            "## 高額補助金（5000万円以上: {}件）\n",
            snapshot.high_value.len()
        );
        for h in snapshot.high_value.iter().take(MAX_HIGHLIGHTS) {
            let _ = writeln!(
                out,
                "- **{}** (ID: {}, 最大{})",
                h.title,
                h.id,
                format_yen(Some(h.max_amount))
            );
        }
        out.push('\n');
    }
    out
}

fn method_label(method: &ExtractionMethod) -> String {
    match method {
        ExtractionMethod::NativeText => "native_text".to_string(),
        ExtractionMethod::Converted { converter } => format!("converted ({})", converter),
        ExtractionMethod::RawFallback { reason } => format!("raw_fallback ({})", reason),
    }
}

/// File content page
pub fn render_file_content(content: &FileContent) -> String {
    match content {
        FileContent::Markdown {
            file_name,
            mime_type,
            size_bytes,
            extraction_method,
            content_markdown,
            content_base64,
        } => {
            let mut out = format!("# {}\n\n", file_name);
            let _ = writeln!(out, "**MIMEタイプ**: {}", mime_type);
            let _ = writeln!(out, "**サイズ**: {} bytes", group_digits(*size_bytes));
            let _ = writeln!(out, "**抽出方法**: {}\n", method_label(extraction_method));
            out.push_str("---\n\n");
            match (content_markdown, content_base64) {
                (Some(text), _) => out.push_str(text),
                (None, Some(b64)) => {
                    out.push_str("テキストを抽出できませんでした。BASE64データ:\n\n");
                    let _ = writeln!(out, "```\n{}\n```", truncate_chars(b64, MAX_BASE64_PREVIEW));
                }
                (None, None) => {}
            }
            out
        }
        FileContent::Base64 {
            file_name,
            mime_type,
            size_bytes,
            content_base64,
            data_uri,
        } => {
            let mut out = format!("# {}\n\n", file_name);
            let _ = writeln!(out, "**MIMEタイプ**: {}", mime_type);
            let _ = writeln!(out, "**サイズ**: {} bytes\n", group_digits(*size_bytes));
            out.push_str("## BASE64エンコードデータ\n\n");
            let _ = writeln!(
                out,
                "```\n{}\n```\n",
                truncate_chars(content_base64, MAX_BASE64_PREVIEW)
            );
            let _ = writeln!(
                out,
                "Data URI: `{}`",
                truncate_chars(data_uri, MAX_BASE64_PREVIEW)
            );
            out
        }
    }
}

/// Inventory of cached files
pub fn render_inventory(inventory: &Inventory) -> String {
    let mut out = String::from("# ダウンロード済みファイル一覧\n\n");
    let _ = writeln!(out, "保存先: `{}`\n", inventory.root.display());

    if inventory.grants.is_empty() {
        out.push_str("まだファイルがダウンロードされていません。\n");
        return out;
    }

    for grant in &inventory.grants {
        let _ = writeln!(out, "## 補助金ID: {}\n", grant.grant_id);
        for file in &grant.files {
            let _ = writeln!(out, "- `{}` ({})", file.name, format_file_size(file.size_bytes));
        }
        out.push('\n');
    }
    let _ = writeln!(
        out,
        "合計: {}ファイル, {}",
        inventory.total_files,
        format_file_size(inventory.total_bytes)
    );
    out
}

/// Error line shown in place of a result
pub fn render_error(error: &dyn std::fmt::Display) -> String {
    format!("エラー: {}\n", error)
}

/// Liveness response
pub fn render_ping(ping: &Ping) -> String {
    format!(
        "✅ サーバー稼働中\n\n{}\n",
        serde_json::to_string_pretty(ping).unwrap_or_default()
    )
}
