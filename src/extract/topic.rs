//! Short-topic detection: decides whether a free-text submission should be
//! routed to the topic (web-search) stage rather than treated as a note.

/// True iff `text` reads as a short topic query: trimmed length in
/// `[2, 50]`, one to three words, not a URL, no `?`, at least one letter,
/// and drawn only from letters, digits, `- . / + #` and whitespace.
pub fn is_short_topic(text: &str) -> bool {
    let trimmed = text.trim();
    let char_count = trimmed.chars().count();
    if !(2..=50).contains(&char_count) {
        return false;
    }

    let word_count = trimmed.split_whitespace().count();
    if !(1..=3).contains(&word_count) {
        return false;
    }

    if looks_like_url(trimmed) || trimmed.contains('?') {
        return false;
    }

    if !trimmed.chars().any(|c| c.is_alphabetic()) {
        return false;
    }

    trimmed
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '-' | '.' | '/' | '+' | '#') || c.is_whitespace())
}

fn looks_like_url(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("www.")
        || text.contains("://")
}
