//! Display helpers for CLI and Markdown output.
//!
//! Widths are measured with unicode-width so that full-width Japanese text
//! lines up in terminal tables.

use chrono::{DateTime, Duration, Utc};
use std::io::{self, IsTerminal};
use unicode_width::UnicodeWidthChar;

/// Check if stdout is a terminal.
#[inline]
pub fn is_terminal() -> bool {
    io::stdout().is_terminal()
}

/// Truncate text to a display width, appending "..." if anything was cut.
///
/// # Examples
///
/// ```
/// use jgrants_mcp::utils::truncate_with_ellipsis;
///
/// assert_eq!(truncate_with_ellipsis("Hello World", 8), "Hello...");
/// assert_eq!(truncate_with_ellipsis("補助金の概要", 8), "補助...");
/// assert_eq!(truncate_with_ellipsis("Hi", 8), "Hi");
/// ```
pub fn truncate_with_ellipsis(text: &str, max_width: usize) -> String {
    if max_width == 0 {
        return String::new();
    }

    let char_widths: Vec<(char, usize)> = text
        .chars()
        .map(|c| (c, c.width().unwrap_or(1)))
        .collect();

    let total_width: usize = char_widths.iter().map(|(_, w)| *w).sum();
    if total_width <= max_width {
        return text.to_string();
    }

    let budget = max_width.saturating_sub(3);
    let mut current_width = 0;
    let mut end_idx = 0;
    for (i, (_, w)) in char_widths.iter().enumerate() {
        if current_width + w > budget {
            break;
        }
        current_width += w;
        end_idx = i + 1;
    }

    if end_idx == 0 {
        return "...".to_string();
    }

    let truncated: String = char_widths[..end_idx].iter().map(|(c, _)| *c).collect();
    format!("{}...", truncated)
}

/// Keep the first `max_chars` characters, appending "..." if anything was cut
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Group digits with commas (`4500000` becomes `4,500,000`)
pub fn group_digits(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Yen amount for display; missing or zero amounts are "未設定"
pub fn format_yen(amount: Option<u64>) -> String {
    match amount {
        Some(a) if a > 0 => format!("{}円", group_digits(a)),
        _ => "未設定".to_string(),
    }
}

/// Calendar date in portal local time (UTC+9), or an empty string
pub fn format_date(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| (t + Duration::hours(9)).format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Date and time in portal local time (UTC+9), or an empty string
pub fn format_datetime(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| (t + Duration::hours(9)).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_truncate_with_ellipsis_wide_chars() {
        assert_eq!(truncate_with_ellipsis("abc", 0), "");
        assert_eq!(truncate_with_ellipsis("補助金", 6), "補助金");
        assert_eq!(truncate_with_ellipsis("補助金です", 7), "補助...");
        assert_eq!(truncate_with_ellipsis("補助金", 4), "...");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("あいうえお", 3), "あいう...");
        assert_eq!(truncate_chars("あいう", 3), "あいう");
    }

    #[test]
    fn test_group_digits() {
        assert_eq!(group_digits(0), "0");
        assert_eq!(group_digits(999), "999");
        assert_eq!(group_digits(1000), "1,000");
        assert_eq!(group_digits(4_500_000), "4,500,000");
    }

    #[test]
    fn test_format_yen() {
        assert_eq!(format_yen(Some(15_000_000)), "15,000,000円");
        assert_eq!(format_yen(Some(0)), "未設定");
        assert_eq!(format_yen(None), "未設定");
    }

    #[test]
    fn test_format_date_uses_portal_time() {
        let t = Utc.with_ymd_and_hms(2025, 6, 30, 16, 0, 0).unwrap();
        assert_eq!(format_date(Some(t)), "2025-07-01");
        assert_eq!(format_datetime(Some(t)), "2025-07-01 01:00");
        assert_eq!(format_date(None), "");
    }
}
