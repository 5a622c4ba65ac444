//! `#tag` / `#tag/sub` extraction, distinct from URL fragments.

use regex::Regex;
use std::sync::OnceLock;

fn hashtag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|[\s(])#([\p{L}0-9][\p{L}0-9_/-]*)").unwrap())
}

/// Extracts hashtags from free text, lowercased, in order of first
/// appearance, deduplicated. A leading `#` inside a URL (e.g.
/// `https://x.y/page#section`) is not a hashtag because it isn't preceded
/// by whitespace or start-of-string.
pub fn extract_hashtags(text: &str) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    let mut out = Vec::new();
    for cap in hashtag_re().captures_iter(text) {
        let tag = cap[1].to_lowercase();
        if seen.insert(tag.clone()) {
            out.push(tag);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_simple_and_nested_tags() {
        let tags = extract_hashtags("Discuss #roadmap today, also #eng/backend stuff");
        assert_eq!(tags, vec!["roadmap", "eng/backend"]);
    }

    #[test]
    fn ignores_url_fragments() {
        let tags = extract_hashtags("see https://example.com/page#section for details");
        assert!(tags.is_empty());
    }

    #[test]
    fn dedupes_preserving_first_occurrence() {
        let tags = extract_hashtags("#rust is great, #Rust rules");
        assert_eq!(tags, vec!["rust"]);
    }
}
