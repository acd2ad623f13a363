//! Rules shared by posts and comments.

use time::{format_description::FormatItem, macros::format_description};

use super::error::DomainError;

/// Number of characters shown when a post or comment is summarized.
pub const SUMMARY_CHARS: usize = 15;

pub const HUMAN_DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[day padding:none] [month repr:long] [year]");
pub const HUMAN_DATETIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[day padding:none] [month repr:long] [year] [hour]:[minute]");

/// First [`SUMMARY_CHARS`] characters of `text`.
pub fn summarize(text: &str) -> String {
    text.chars().take(SUMMARY_CHARS).collect()
}

/// Trim post text and reject it when nothing remains.
pub fn normalize_post_text(text: &str) -> Result<String, DomainError> {
    normalize_required("text", text)
}

/// Trim comment text and reject it when nothing remains.
pub fn normalize_comment_text(text: &str) -> Result<String, DomainError> {
    normalize_required("text", text)
}

fn normalize_required(field: &'static str, text: &str) -> Result<String, DomainError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(field, "This field is required."));
    }
    Ok(trimmed.to_string())
}
