//! Obsidian-style vault exporter: serializes a graph snapshot
//! to a zip archive of `notes/<sanitized-title>.md` files with YAML-ish
//! frontmatter, a body, and a `## Related` section built from outgoing
//! `link` edges (tag edges are excluded from export).

use std::collections::HashMap;
use std::io::Write;

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::error::{Error, Result};
use crate::model::{GraphSnapshot, Item};

const LINK_RELATION: &str = "link";

pub fn export_zip(snapshot: &GraphSnapshot) -> Result<Vec<u8>> {
    let titles_by_id: HashMap<&str, &str> =
        snapshot.items.iter().map(|i| (i.id.as_str(), i.title.as_str())).collect();

    let mut outgoing_links: HashMap<&str, Vec<&str>> = HashMap::new();
    for rel in &snapshot.relationships {
        if rel.relation_type != LINK_RELATION {
            continue;
        }
        outgoing_links.entry(rel.source_id.as_str()).or_default().push(rel.target_id.as_str());
    }

    let mut used_names: HashMap<String, usize> = HashMap::new();
    let mut buf = Vec::new();
    {
        let mut zip = ZipWriter::new(std::io::Cursor::new(&mut buf));
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        for item in &snapshot.items {
            let related_titles: Vec<&str> = outgoing_links
                .get(item.id.as_str())
                .into_iter()
                .flatten()
                .filter_map(|target_id| titles_by_id.get(target_id).copied())
                .collect();

            let body = render_note(item, &related_titles);
            let filename = unique_filename(&mut used_names, &item.title);

            zip.start_file(format!("notes/{filename}"), options)
                .map_err(|e| Error::InvalidInput(format!("zip write failed: {e}")))?;
            zip.write_all(body.as_bytes()).map_err(|e| Error::io("notes/*.md", e))?;
        }

        zip.finish().map_err(|e| Error::InvalidInput(format!("zip finalize failed: {e}")))?;
    }
    Ok(buf)
}

fn render_note(item: &Item, related_titles: &[&str]) -> String {
    let mut out = String::new();

    out.push_str("---\n");
    out.push_str(&format!("id: {}\n", item.id));
    out.push_str(&format!("type: {}\n", item.item_type.as_str()));
    if let Some(url) = &item.url {
        out.push_str(&format!("url: {url}\n"));
    }
    out.push_str(&format!("created: {}\n", item.created_at.to_rfc3339()));
    out.push_str("tags: [");
    out.push_str(&item.tags.iter().cloned().collect::<Vec<_>>().join(", "));
    out.push_str("]\n");
    out.push_str("---\n\n");

    out.push_str(&format!("# {}\n\n", item.title));

    if let Some(summary) = &item.summary {
        for line in summary.lines() {
            out.push_str(&format!("> {line}\n"));
        }
        out.push('\n');
    }

    if let Some(url) = &item.url {
        out.push_str(&format!("Source: {url}\n\n"));
    }

    if let Some(content) = &item.content {
        out.push_str("## Content\n\n");
        out.push_str(content);
        out.push_str("\n\n");
    }

    if !related_titles.is_empty() {
        out.push_str("## Related\n\n");
        for title in related_titles {
            out.push_str(&format!("- [[{title}]]\n"));
        }
    }

    out
}

/// Replaces filesystem-hostile characters, trims to 100 chars, defaults
/// to `untitled`, and disambiguates collisions with a numeric suffix.
fn unique_filename(used: &mut HashMap<String, usize>, title: &str) -> String {
    let sanitized = sanitize_title(title);
    let count = used.entry(sanitized.clone()).or_insert(0);
    *count += 1;
    if *count == 1 {
        format!("{sanitized}.md")
    } else {
        format!("{sanitized} {}.md", *count)
    }
}

fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\n' | '\r'))
        .collect();
    let trimmed = cleaned.trim();
    let truncated: String = trimmed.chars().take(100).collect();
    if truncated.trim().is_empty() {
        "untitled".to_string()
    } else {
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Item, ItemType, Relationship};
    use chrono::Utc;

    fn item(id: &str, title: &str) -> Item {
        let mut i = Item::draft(ItemType::Note, title);
        i.id = id.to_string();
        i
    }

    #[test]
    fn sanitizes_hostile_characters_and_defaults_to_untitled() {
        assert_eq!(sanitize_title("a/b:c*d?e\"f<g>h|i"), "abcdefghi");
        assert_eq!(sanitize_title("   "), "untitled");
        assert_eq!(sanitize_title(&"x".repeat(150)).chars().count(), 100);
    }

    #[test]
    fn export_includes_one_file_per_item_and_related_section() {
        let a = item("a", "Alpha");
        let b = item("b", "Beta");
        let snapshot = GraphSnapshot {
            items: vec![a.clone(), b.clone()],
            relationships: vec![Relationship {
                id: 1,
                source_id: "a".to_string(),
                target_id: "b".to_string(),
                relation_type: "link".to_string(),
                strength: 1.0,
                created_at: Utc::now(),
            }],
        };

        let bytes = export_zip(&snapshot).unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);

        let mut alpha_md = String::new();
        {
            use std::io::Read;
            let mut file = archive.by_name("notes/Alpha.md").unwrap();
            file.read_to_string(&mut alpha_md).unwrap();
        }
        assert!(alpha_md.contains("id: a"));
        assert!(alpha_md.contains("## Related"));
        assert!(alpha_md.contains("[[Beta]]"));
    }

    #[test]
    fn tag_edges_are_excluded_from_related_section() {
        let a = item("a", "Alpha");
        let b = item("b", "Beta");
        let snapshot = GraphSnapshot {
            items: vec![a, b],
            relationships: vec![Relationship {
                id: 1,
                source_id: "a".to_string(),
                target_id: "b".to_string(),
                relation_type: "tag".to_string(),
                strength: 0.5,
                created_at: Utc::now(),
            }],
        };

        let bytes = export_zip(&snapshot).unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        let mut alpha_md = String::new();
        {
            use std::io::Read;
            let mut file = archive.by_name("notes/Alpha.md").unwrap();
            file.read_to_string(&mut alpha_md).unwrap();
        }
        assert!(!alpha_md.contains("## Related"));
    }
}
