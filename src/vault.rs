//! A single owner's vault: one SQLite connection guarded by a mutex, plus
//! the relational+FTS+graph operations the rest of the crate is built on.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{
    normalize_tags, ByTypeCounts, GraphSnapshot, Item, ItemType, Relationship, SearchResult,
    VaultStats,
};
use crate::schema;

/// Runs a blocking `Vault` operation on the blocking thread pool, the same
/// way `VaultManager::get_vault` dispatches `Vault::open` — a
/// `rusqlite::Connection` is synchronous, so every call site that touches
/// one does this instead of blocking a tokio worker thread directly.
pub(crate) async fn run_blocking<F, T>(vault: Arc<Vault>, f: F) -> Result<T>
where
    F: FnOnce(&Vault) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&vault)).await.expect("vault blocking task panicked")
}

/// Owns the connection to one owner's `vault.db`. All access goes through
/// the mutex; a `rusqlite::Connection` is not `Sync`, so serializing
/// access this way is the simplest correct option for a single logical
/// handle shared across tasks.
pub struct Vault {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl Vault {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let _ = std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o755));
            }
        }
        let mut conn = Connection::open(&path)?;
        schema::migrate(&mut conn)?;
        Ok(Self { conn: Mutex::new(conn), path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes the WAL back into the main database file. Called when a
    /// vault is evicted from the manager's cache so an idle owner doesn't
    /// leave an unbounded `-wal` file behind.
    pub fn checkpoint(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }

    pub fn create_item(&self, mut item: Item) -> Result<Item> {
        if item.title.trim().is_empty() {
            return Err(Error::InvalidInput("item title must not be empty".into()));
        }
        item.id = Uuid::new_v4().to_string();
        item.tags = normalize_tags(item.tags);

        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO items(id, type, url, title, content, summary, raw_content, image_path, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                item.id,
                item.item_type.as_str(),
                item.url,
                item.title,
                item.content,
                item.summary,
                item.raw_content,
                item.image_path,
                item.created_at.to_rfc3339(),
                item.updated_at.to_rfc3339(),
            ],
        )?;

        for tag in &item.tags {
            tx.execute(
                "INSERT INTO tags(name) VALUES (?1) ON CONFLICT(name) DO NOTHING",
                params![tag],
            )?;
            tx.execute(
                "INSERT INTO item_tags(item_id, tag_id)
                 SELECT ?1, id FROM tags WHERE name = ?2",
                params![item.id, tag],
            )?;
        }

        tx.commit()?;
        Ok(item)
    }

    pub fn get_item(&self, id: &str) -> Result<Option<Item>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let item = query_item(&conn, id)?;
        Ok(item)
    }

    pub fn list_items(&self, limit: usize, offset: usize) -> Result<Vec<Item>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn.prepare(
            "SELECT id FROM items ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
        )?;
        let ids: Vec<String> = stmt
            .query_map(params![limit as i64, offset as i64], |r| r.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        drop(stmt);

        ids.into_iter()
            .map(|id| {
                query_item(&conn, &id)?
                    .ok_or_else(|| Error::Database(rusqlite::Error::QueryReturnedNoRows))
            })
            .collect()
    }

    pub fn list_items_by_tag(&self, tag: &str, limit: usize, offset: usize) -> Result<Vec<Item>> {
        let tag = tag.trim().to_lowercase();
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn.prepare(
            "SELECT i.id FROM items i
             JOIN item_tags it ON it.item_id = i.id
             JOIN tags t ON t.id = it.tag_id
             WHERE t.name = ?1
             ORDER BY i.created_at DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let ids: Vec<String> = stmt
            .query_map(params![tag, limit as i64, offset as i64], |r| r.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        drop(stmt);

        ids.into_iter()
            .map(|id| {
                query_item(&conn, &id)?
                    .ok_or_else(|| Error::Database(rusqlite::Error::QueryReturnedNoRows))
            })
            .collect()
    }

    /// Full-text search over title/content/summary, ranked by BM25 (lower
    /// is better, matching FTS5's own convention). `query` reaches the FTS
    /// engine verbatim — callers who need to sanitize an untrusted
    /// expression should run it through [`escape_fts5_query`] themselves;
    /// this method never applies that escaping implicitly.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());

        let mut stmt = conn.prepare(
            "SELECT i.id, bm25(items_fts) AS rank,
                    snippet(items_fts, -1, '<mark>', '</mark>', '...', 32) AS snip
             FROM items_fts
             JOIN items i ON i.rowid = items_fts.rowid
             WHERE items_fts MATCH ?1
             ORDER BY rank
             LIMIT ?2",
        )?;

        let rows: Vec<(String, f64, String)> = stmt
            .query_map(params![query, limit as i64], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?))
            })?
            .collect::<rusqlite::Result<_>>()?;
        drop(stmt);

        rows.into_iter()
            .map(|(id, score, snippet)| {
                let item = query_item(&conn, &id)?
                    .ok_or_else(|| Error::Database(rusqlite::Error::QueryReturnedNoRows))?;
                Ok(SearchResult { item, snippet, score })
            })
            .collect()
    }

    pub fn delete_item(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let affected = conn.execute("DELETE FROM items WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    pub fn get_all_tags(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn.prepare("SELECT name FROM tags ORDER BY name")?;
        let names = stmt
            .query_map([], |r| r.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(names)
    }

    pub fn item_count(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let n: i64 = conn.query_row("SELECT count(*) FROM items", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    pub fn stats(&self) -> Result<VaultStats> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let items: i64 = conn.query_row("SELECT count(*) FROM items", [], |r| r.get(0))?;
        let tags: i64 = conn.query_row("SELECT count(*) FROM tags", [], |r| r.get(0))?;

        let mut by_type = ByTypeCounts::default();
        let mut stmt = conn.prepare("SELECT type, count(*) FROM items GROUP BY type")?;
        let rows: Vec<(String, i64)> = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<rusqlite::Result<_>>()?;
        for (t, count) in rows {
            match ItemType::parse(&t) {
                Some(ItemType::Link) => by_type.link = count as usize,
                Some(ItemType::Note) => by_type.note = count as usize,
                Some(ItemType::Image) => by_type.image = count as usize,
                Some(ItemType::Topic) => by_type.topic = count as usize,
                None => {}
            }
        }

        Ok(VaultStats { items: items as usize, tags: tags as usize, by_type })
    }

    pub fn create_relationship(
        &self,
        source_id: &str,
        target_id: &str,
        relation_type: &str,
        strength: f64,
    ) -> Result<Relationship> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();
        conn.execute(
            "INSERT INTO relationships(source_id, target_id, relation_type, strength, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(source_id, target_id, relation_type)
             DO UPDATE SET strength = excluded.strength",
            params![source_id, target_id, relation_type, strength, now.to_rfc3339()],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM relationships WHERE source_id = ?1 AND target_id = ?2 AND relation_type = ?3",
            params![source_id, target_id, relation_type],
            |r| r.get(0),
        )?;
        Ok(Relationship {
            id,
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            relation_type: relation_type.to_string(),
            strength,
            created_at: now,
        })
    }

    pub fn get_relationships(&self, item_id: &str) -> Result<Vec<Relationship>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn.prepare(
            "SELECT id, source_id, target_id, relation_type, strength, created_at
             FROM relationships WHERE source_id = ?1 OR target_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![item_id], row_to_relationship)?
            .collect::<rusqlite::Result<_>>()?;
        Ok(rows)
    }

    /// Deletes every relationship row from `source_id` to `target_id`
    /// (any `relation_type`), matching spec's `DeleteRelationship(source,
    /// target)` signature. Returns the number of rows removed.
    pub fn delete_relationship(&self, source_id: &str, target_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let affected = conn.execute(
            "DELETE FROM relationships WHERE source_id = ?1 AND target_id = ?2",
            params![source_id, target_id],
        )?;
        Ok(affected)
    }

    /// Items plus relationships, with the dedup rule: when a `link` edge
    /// already connects a pair, a co-existing `tag` edge between the same
    /// pair is dropped from the snapshot (the link is the stronger signal).
    pub fn get_graph(&self, limit: usize) -> Result<GraphSnapshot> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());

        let mut stmt = conn.prepare("SELECT id FROM items ORDER BY created_at DESC LIMIT ?1")?;
        let ids: Vec<String> = stmt
            .query_map(params![limit as i64], |r| r.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        drop(stmt);

        let items = ids
            .iter()
            .map(|id| {
                query_item(&conn, id)?
                    .ok_or_else(|| Error::Database(rusqlite::Error::QueryReturnedNoRows))
            })
            .collect::<Result<Vec<_>>>()?;

        if ids.is_empty() {
            return Ok(GraphSnapshot { items, relationships: Vec::new() });
        }

        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT id, source_id, target_id, relation_type, strength, created_at
             FROM relationships
             WHERE source_id IN ({placeholders}) AND target_id IN ({placeholders})"
        );
        let mut stmt = conn.prepare(&sql)?;
        let id_params: Vec<&dyn rusqlite::ToSql> =
            ids.iter().chain(ids.iter()).map(|s| s as &dyn rusqlite::ToSql).collect();
        let all: Vec<Relationship> = stmt
            .query_map(id_params.as_slice(), row_to_relationship)?
            .collect::<rusqlite::Result<_>>()?;
        drop(stmt);

        let linked: std::collections::HashSet<(String, String)> = all
            .iter()
            .filter(|r| r.relation_type == "link")
            .map(|r| pair_key(&r.source_id, &r.target_id))
            .collect();

        let relationships = all
            .into_iter()
            .filter(|r| r.relation_type == "link" || !linked.contains(&pair_key(&r.source_id, &r.target_id)))
            .collect();

        Ok(GraphSnapshot { items, relationships })
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let value = conn
            .query_row("SELECT value FROM settings WHERE key = ?1", params![key], |r| r.get(0))
            .optional()?;
        Ok(value)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT INTO settings(key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

fn row_to_relationship(r: &rusqlite::Row) -> rusqlite::Result<Relationship> {
    let created_at: String = r.get(5)?;
    Ok(Relationship {
        id: r.get(0)?,
        source_id: r.get(1)?,
        target_id: r.get(2)?,
        relation_type: r.get(3)?,
        strength: r.get(4)?,
        created_at: parse_rfc3339(&created_at),
    })
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc.timestamp_opt(0, 0).single().unwrap())
}

fn query_item(conn: &Connection, id: &str) -> Result<Option<Item>> {
    let row = conn
        .query_row(
            "SELECT id, type, url, title, content, summary, raw_content, image_path, created_at, updated_at
             FROM items WHERE id = ?1",
            params![id],
            |r| {
                let type_str: String = r.get(1)?;
                let created_at: String = r.get(8)?;
                let updated_at: String = r.get(9)?;
                Ok((
                    r.get::<_, String>(0)?,
                    type_str,
                    r.get::<_, Option<String>>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, Option<String>>(4)?,
                    r.get::<_, Option<String>>(5)?,
                    r.get::<_, Option<String>>(6)?,
                    r.get::<_, Option<String>>(7)?,
                    created_at,
                    updated_at,
                ))
            },
        )
        .optional()?;

    let Some((id, type_str, url, title, content, summary, raw_content, image_path, created_at, updated_at)) = row
    else {
        return Ok(None);
    };

    let item_type = ItemType::parse(&type_str)
        .ok_or_else(|| Error::Database(rusqlite::Error::InvalidColumnType(
            1,
            "type".into(),
            rusqlite::types::Type::Text,
        )))?;

    let mut stmt = conn.prepare(
        "SELECT t.name FROM tags t JOIN item_tags it ON it.tag_id = t.id WHERE it.item_id = ?1",
    )?;
    let tags = stmt
        .query_map(params![id], |r| r.get(0))?
        .collect::<rusqlite::Result<_>>()?;

    Ok(Some(Item {
        id,
        item_type,
        url,
        title,
        content,
        summary,
        raw_content,
        image_path,
        created_at: parse_rfc3339(&created_at),
        updated_at: parse_rfc3339(&updated_at),
        tags: normalize_tags(tags),
    }))
}

/// Escapes a free-text query for safe use as an FTS5 MATCH argument: each
/// whitespace-separated term is individually quoted so characters with
/// special meaning to the FTS5 query grammar (`"`, `*`, `-`, `:`) are taken
/// literally rather than as operators.
pub fn escape_fts5_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_vault() -> (tempfile::TempDir, Vault) {
        let dir = tempdir().unwrap();
        let vault = Vault::open(dir.path().join("vault.db")).unwrap();
        (dir, vault)
    }

    #[test]
    fn create_and_get_item_round_trips_tags() {
        let (_dir, vault) = open_vault();
        let item = Item::draft(ItemType::Note, "Hello")
            .with_content("world")
            .with_tags(["Rust".to_string(), " rust ".to_string(), "".to_string()]);
        let created = vault.create_item(item).unwrap();
        assert_eq!(created.tags.len(), 1);
        assert!(created.tags.contains("rust"));

        let fetched = vault.get_item(&created.id).unwrap().unwrap();
        assert_eq!(fetched.title, "Hello");
        assert_eq!(fetched.content.as_deref(), Some("world"));
    }

    #[test]
    fn search_ranks_and_snippets() {
        let (_dir, vault) = open_vault();
        vault
            .create_item(Item::draft(ItemType::Note, "Rust ownership").with_content(
                "Ownership is Rust's central feature for memory safety without a garbage collector.",
            ))
            .unwrap();
        vault
            .create_item(Item::draft(ItemType::Note, "Unrelated").with_content("cooking pasta"))
            .unwrap();

        let hits = vault.search("ownership", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].snippet.contains("<mark>"));
    }

    #[test]
    fn graph_dedups_tag_edge_when_link_edge_present() {
        let (_dir, vault) = open_vault();
        let a = vault.create_item(Item::draft(ItemType::Note, "A")).unwrap();
        let b = vault.create_item(Item::draft(ItemType::Note, "B")).unwrap();

        vault.create_relationship(&a.id, &b.id, "tag", 0.5).unwrap();
        vault.create_relationship(&a.id, &b.id, "link", 1.0).unwrap();

        let graph = vault.get_graph(100).unwrap();
        assert_eq!(graph.relationships.len(), 1);
        assert_eq!(graph.relationships[0].relation_type, "link");
    }

    #[test]
    fn delete_relationship_removes_pair_regardless_of_type() {
        let (_dir, vault) = open_vault();
        let a = vault.create_item(Item::draft(ItemType::Note, "A")).unwrap();
        let b = vault.create_item(Item::draft(ItemType::Note, "B")).unwrap();
        vault.create_relationship(&a.id, &b.id, "tag", 0.5).unwrap();
        vault.create_relationship(&a.id, &b.id, "link", 1.0).unwrap();

        let removed = vault.delete_relationship(&a.id, &b.id).unwrap();
        assert_eq!(removed, 2);
        assert!(vault.get_relationships(&a.id).unwrap().is_empty());
    }

    #[test]
    fn settings_roundtrip() {
        let (_dir, vault) = open_vault();
        assert_eq!(vault.get_setting("theme").unwrap(), None);
        vault.set_setting("theme", "dark").unwrap();
        assert_eq!(vault.get_setting("theme").unwrap(), Some("dark".to_string()));
        vault.set_setting("theme", "light").unwrap();
        assert_eq!(vault.get_setting("theme").unwrap(), Some("light".to_string()));
    }
}
