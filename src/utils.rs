use std::fs;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::types::NOT_AVAILABLE;

static COMMA_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*,\s*").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Create an OSC8 hyperlink for terminal output
pub fn osc8_link(url: &str, text: &str) -> String {
    format!("\x1b]8;;{}\x1b\\{}\x1b]8;;\x1b\\", url, text)
}

/// Create an OSC8 file:// hyperlink for terminal output
pub fn osc8_file_link(path: &str, text: &str) -> String {
    let abs_path = fs::canonicalize(path)
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| path.to_string());
    format!("\x1b]8;;file://{}\x1b\\{}\x1b]8;;\x1b\\", abs_path, text)
}

/// Normalize "March 3, 2025" (or an already normalized "03-03-2025") to "03-03-2025".
///
/// Unparseable input is returned unchanged; missing input becomes "N/A".
pub fn format_date_mdy(date_str: &str) -> String {
    let trimmed = date_str.trim();
    if trimmed.is_empty() || trimmed == NOT_AVAILABLE {
        return NOT_AVAILABLE.to_string();
    }

    let cleaned = COMMA_RE.replace_all(trimmed, ", ");
    NaiveDate::parse_from_str(&cleaned, "%B %d, %Y")
        .or_else(|_| NaiveDate::parse_from_str(&cleaned, "%m-%d-%Y"))
        .map(|date| date.format("%m-%d-%Y").to_string())
        .unwrap_or_else(|_| date_str.to_string())
}

/// Parse a normalized "MM-DD-YYYY" date
pub fn parse_mdy(date_str: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date_str.trim(), "%m-%d-%Y").ok()
}

/// Collapse whitespace runs to single spaces and replace non-breaking spaces
pub fn collapse_whitespace(text: &str) -> String {
    let text = text.replace('\u{a0}', " ");
    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}

/// Join text fragments (a fragment of "\n" marks a line break) into one cleaned line.
///
/// Lines are trimmed and collapsed, empty lines dropped, and the remaining
/// lines joined with single spaces.
pub fn join_text_parts(parts: &[String]) -> String {
    parts
        .join(" ")
        .lines()
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
