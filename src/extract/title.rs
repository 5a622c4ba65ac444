//! Explicit-title detection: a leading ATX level-1 heading (`# Title`),
//! level 2+ doesn't count.

/// Returns the first line's heading text if it is a level-1 ATX heading
/// (`# ` followed by non-empty text, not `##`).
pub fn explicit_title(text: &str) -> Option<String> {
    let first_line = text.lines().next()?.trim_end();
    let rest = first_line.strip_prefix("# ")?;
    if rest.starts_with('#') {
        return None;
    }
    let title = rest.trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

/// Fallback title: first 50 chars of `text`, trimmed, with an ellipsis if
/// truncated.
pub fn truncated_fallback(text: &str) -> String {
    let trimmed = text.trim();
    let char_count = trimmed.chars().count();
    if char_count <= 50 {
        trimmed.to_string()
    } else {
        let prefix: String = trimmed.chars().take(50).collect();
        format!("{prefix}...")
    }
}
