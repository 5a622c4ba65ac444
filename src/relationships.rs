//! Relationship inference: runs once, synchronously, immediately after a
//! new item is persisted. Two mechanisms compose and are both
//! capped by `max_recent_items_for_relationships`; failures anywhere in
//! here are logged and swallowed, never propagated to the ingestion
//! caller — the caller already has a persisted item.

use std::collections::HashSet;

use tracing::warn;

use crate::config::VaultManagerConfig;
use crate::extract::wikilink::extract_wikilinks;
use crate::model::Item;
use crate::vault::Vault;

const LINK_RELATION: &str = "link";
const TAG_RELATION: &str = "tag";

fn normalize_title(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Best-effort: never returns an error to the ingestion pipeline. Internal
/// failures are logged with `owner_id`/`item_id` and the step is skipped.
pub fn infer(vault: &Vault, new_item: &Item, cfg: &VaultManagerConfig) {
    let recent = match vault.list_items(cfg.max_recent_items_for_relationships, 0) {
        Ok(items) => items,
        Err(err) => {
            warn!(item_id = %new_item.id, %err, "relationship inference: failed to list recent items");
            return;
        }
    };
    let others: Vec<&Item> = recent.iter().filter(|i| i.id != new_item.id).collect();

    link_forward(vault, new_item, &others);
    link_backward(vault, new_item, &others);
    tag_overlap(vault, new_item, &others, cfg);
}

/// `[[Target]]` tokens in the new item's own content, resolved against
/// existing item titles.
fn link_forward(vault: &Vault, new_item: &Item, others: &[&Item]) {
    let Some(content) = new_item.content.as_deref() else { return };
    for target_key in extract_wikilinks(content) {
        let Some(target) = others.iter().find(|i| normalize_title(&i.title) == target_key) else {
            continue;
        };
        if let Err(err) = vault.create_relationship(&new_item.id, &target.id, LINK_RELATION, 1.0) {
            warn!(item_id = %new_item.id, target_id = %target.id, %err, "failed to write forward link edge");
        }
    }
}

/// Pre-existing items whose content already wiki-links the new item's
/// title get a back-edge now that the target exists.
fn link_backward(vault: &Vault, new_item: &Item, others: &[&Item]) {
    let new_title = normalize_title(&new_item.title);
    for other in others {
        let Some(content) = other.content.as_deref() else { continue };
        let links_to_new = extract_wikilinks(content).iter().any(|t| *t == new_title);
        if !links_to_new {
            continue;
        }
        if let Err(err) = vault.create_relationship(&other.id, &new_item.id, LINK_RELATION, 1.0) {
            warn!(item_id = %new_item.id, source_id = %other.id, %err, "failed to write back link edge");
        }
    }
}

/// Tag-overlap edges against items not already connected to the new item
/// by a `link` edge.
fn tag_overlap(vault: &Vault, new_item: &Item, others: &[&Item], cfg: &VaultManagerConfig) {
    let filtered: HashSet<&str> = new_item
        .tags
        .iter()
        .map(String::as_str)
        .filter(|t| !cfg.generic_tags.contains(*t))
        .collect();
    if filtered.is_empty() {
        return;
    }

    let already_linked: HashSet<String> = match vault.get_relationships(&new_item.id) {
        Ok(rels) => rels
            .iter()
            .filter(|r| r.relation_type == LINK_RELATION)
            .map(|r| if r.source_id == new_item.id { r.target_id.clone() } else { r.source_id.clone() })
            .collect(),
        Err(err) => {
            warn!(item_id = %new_item.id, %err, "failed to read existing relationships for tag-overlap pass");
            HashSet::new()
        }
    };

    for other in others {
        if already_linked.contains(&other.id) {
            continue;
        }
        let overlap = other
            .tags
            .iter()
            .map(String::as_str)
            .filter(|t| !cfg.generic_tags.contains(*t))
            .filter(|t| filtered.contains(t))
            .count();
        if overlap == 0 {
            continue;
        }

        let strength = (0.4 + 0.15 * overlap as f64).min(1.0);
        let (source, target) =
            if new_item.id <= other.id { (&new_item.id, &other.id) } else { (&other.id, &new_item.id) };
        if let Err(err) = vault.create_relationship(source, target, TAG_RELATION, strength) {
            warn!(item_id = %new_item.id, other_id = %other.id, %err, "failed to write tag-overlap edge");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemType;

    fn open_vault() -> (tempfile::TempDir, Vault) {
        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::open(dir.path().join("vault.db")).unwrap();
        (dir, vault)
    }

    #[test]
    fn wikilink_creates_directional_edge_and_suppresses_tag_edge() {
        let (_dir, vault) = open_vault();
        let cfg = VaultManagerConfig::default();

        let a = vault
            .create_item(
                Item::draft(ItemType::Note, "Alpha")
                    .with_content("See [[Beta]]")
                    .with_tags(["go".to_string(), "notes".to_string()]),
            )
            .unwrap();
        infer(&vault, &a, &cfg);

        let b = vault
            .create_item(Item::draft(ItemType::Note, "Beta").with_tags(["go".to_string()]))
            .unwrap();
        infer(&vault, &b, &cfg);

        let graph = vault.get_graph(100).unwrap();
        let rels: Vec<_> = graph
            .relationships
            .iter()
            .filter(|r| {
                (r.source_id == a.id && r.target_id == b.id)
                    || (r.source_id == b.id && r.target_id == a.id)
            })
            .collect();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].relation_type, "link");
        assert_eq!(rels[0].source_id, a.id);
        assert_eq!(rels[0].target_id, b.id);
    }

    #[test]
    fn backward_link_resolves_once_target_exists() {
        let (_dir, vault) = open_vault();
        let cfg = VaultManagerConfig::default();

        let source = vault
            .create_item(Item::draft(ItemType::Note, "Source").with_content("See [[Not Yet Created]]"))
            .unwrap();
        infer(&vault, &source, &cfg);

        let target = vault.create_item(Item::draft(ItemType::Note, "Not Yet Created")).unwrap();
        infer(&vault, &target, &cfg);

        let edges = vault.get_relationships(&target.id).unwrap();
        assert!(edges.iter().any(|r| r.source_id == source.id && r.target_id == target.id));
    }

    #[test]
    fn tag_overlap_strength_matches_formula() {
        let (_dir, vault) = open_vault();
        let cfg = VaultManagerConfig::default();

        let a = vault
            .create_item(Item::draft(ItemType::Note, "A").with_tags(["go".to_string(), "notes".to_string()]))
            .unwrap();
        infer(&vault, &a, &cfg);

        let b = vault
            .create_item(Item::draft(ItemType::Note, "B").with_tags(["go".to_string(), "dev".to_string()]))
            .unwrap();
        infer(&vault, &b, &cfg);

        let edges = vault.get_relationships(&b.id).unwrap();
        let tag_edge = edges.iter().find(|r| r.relation_type == "tag").unwrap();
        assert!((tag_edge.strength - 0.55).abs() < 1e-9);
        assert_eq!(tag_edge.source_id, a.id.min(b.id.clone()));
    }

    #[test]
    fn generic_tags_do_not_count_toward_overlap() {
        let (_dir, vault) = open_vault();
        let cfg = VaultManagerConfig::default();

        let a = vault
            .create_item(Item::draft(ItemType::Note, "A").with_tags(["uncategorized".to_string()]))
            .unwrap();
        infer(&vault, &a, &cfg);

        let b = vault
            .create_item(Item::draft(ItemType::Note, "B").with_tags(["uncategorized".to_string()]))
            .unwrap();
        infer(&vault, &b, &cfg);

        let edges = vault.get_relationships(&b.id).unwrap();
        assert!(edges.is_empty());
    }
}
