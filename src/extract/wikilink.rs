//! `[[Target]]`, `[[Target|alias]]`, `[[Target#section]]` extraction.

use regex::Regex;
use std::sync::OnceLock;

fn wikilink_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[([^\[\]]+)\]\]").unwrap())
}

/// Canonicalizes a wiki-link body: strips `|alias` and `#section`, then
/// lowercases and collapses whitespace.
pub fn canonical_target(raw: &str) -> String {
    let base = raw.split(['|', '#']).next().unwrap_or("");
    base.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Returns the canonical target of every wiki-link found in `text`, in
/// order of appearance, not deduplicated.
pub fn extract_wikilinks(text: &str) -> Vec<String> {
    wikilink_re()
        .captures_iter(text)
        .map(|c| canonical_target(&c[1]))
        .filter(|t| !t.is_empty())
        .collect()
}
