//! Schema initialization and migrations for a single vault database.
//!
//! Migrations are idempotent and run in order every time a vault is opened.
//! The applied version is tracked in a `meta` table.

use rusqlite::{Connection, OptionalExtension};

use crate::error::{Error, Result};

const CURRENT_VERSION: i64 = 4;

pub(crate) fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;
    ensure_meta_table(conn)?;

    let mut version = schema_version(conn)?;

    if version < 1 {
        migration_001_init(conn)?;
        version = 1;
        set_schema_version(conn, version)?;
    }
    if version < 2 {
        migration_002_widen_item_type(conn)?;
        version = 2;
        set_schema_version(conn, version)?;
    }
    if version < 3 {
        migration_003_add_image_path(conn)?;
        version = 3;
        set_schema_version(conn, version)?;
    }
    if version < 4 {
        migration_004_add_raw_content(conn)?;
        version = 4;
        set_schema_version(conn, version)?;
    }

    debug_assert_eq!(version, CURRENT_VERSION);
    Ok(())
}

fn ensure_meta_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS meta(key TEXT PRIMARY KEY, value TEXT NOT NULL);",
    )?;
    Ok(())
}

fn schema_version(conn: &Connection) -> Result<i64> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |r| r.get(0),
        )
        .optional()?;
    Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO meta(key, value) VALUES ('schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        rusqlite::params![version.to_string()],
    )?;
    Ok(())
}

/// The original schema: only `link` and `note` items were known. Mirrors
/// what an early deployment of this vault format would have shipped with.
fn migration_001_init(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS items(
            id TEXT PRIMARY KEY,
            type TEXT NOT NULL CHECK(type IN ('link','note')),
            url TEXT,
            title TEXT NOT NULL,
            content TEXT,
            summary TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
         );

         CREATE TABLE IF NOT EXISTS tags(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL
         );

         CREATE TABLE IF NOT EXISTS item_tags(
            item_id TEXT NOT NULL REFERENCES items(id) ON DELETE CASCADE,
            tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
            PRIMARY KEY(item_id, tag_id)
         );
         CREATE INDEX IF NOT EXISTS idx_item_tags_tag ON item_tags(tag_id);

         CREATE TABLE IF NOT EXISTS relationships(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id TEXT NOT NULL REFERENCES items(id) ON DELETE CASCADE,
            target_id TEXT NOT NULL REFERENCES items(id) ON DELETE CASCADE,
            relation_type TEXT NOT NULL,
            strength REAL NOT NULL DEFAULT 1.0,
            created_at TEXT NOT NULL,
            UNIQUE(source_id, target_id, relation_type)
         );
         CREATE INDEX IF NOT EXISTS idx_rel_source ON relationships(source_id);
         CREATE INDEX IF NOT EXISTS idx_rel_target ON relationships(target_id);

         CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
         );

         CREATE VIRTUAL TABLE IF NOT EXISTS items_fts USING fts5(
            title, content, summary,
            content=items, content_rowid=rowid
         );

         CREATE TRIGGER IF NOT EXISTS items_ai AFTER INSERT ON items BEGIN
            INSERT INTO items_fts(rowid, title, content, summary)
            VALUES (new.rowid, new.title, new.content, new.summary);
         END;
         CREATE TRIGGER IF NOT EXISTS items_ad AFTER DELETE ON items BEGIN
            INSERT INTO items_fts(items_fts, rowid, title, content, summary)
            VALUES ('delete', old.rowid, old.title, old.content, old.summary);
         END;
         CREATE TRIGGER IF NOT EXISTS items_au AFTER UPDATE ON items BEGIN
            INSERT INTO items_fts(items_fts, rowid, title, content, summary)
            VALUES ('delete', old.rowid, old.title, old.content, old.summary);
            INSERT INTO items_fts(rowid, title, content, summary)
            VALUES (new.rowid, new.title, new.content, new.summary);
         END;",
    )?;
    tx.commit()?;
    Ok(())
}

/// Widens the `items.type` CHECK constraint to admit `image` and `topic`.
///
/// Probes with a disposable insert first so a vault created after the
/// constraint was already widened pays no table-copy cost.
fn migration_002_widen_item_type(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;

    let probe = tx.execute(
        "INSERT INTO items(id, type, title, created_at, updated_at)
         VALUES ('__schema_probe__', 'topic', 'probe', '1970-01-01', '1970-01-01')",
        [],
    );
    match probe {
        Ok(_) => {
            tx.execute("DELETE FROM items WHERE id = '__schema_probe__'", [])?;
            tx.commit()?;
            return Ok(());
        }
        Err(rusqlite::Error::SqliteFailure(_, _)) => {
            // Constraint rejected the probe row; fall through to the table copy.
        }
        Err(other) => return Err(other.into()),
    }

    tx.execute_batch(
        "CREATE TABLE items_new(
            id TEXT PRIMARY KEY,
            type TEXT NOT NULL CHECK(type IN ('link','note','image','topic')),
            url TEXT,
            title TEXT NOT NULL,
            content TEXT,
            summary TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
         );
         INSERT INTO items_new(id, type, url, title, content, summary, created_at, updated_at)
            SELECT id, type, url, title, content, summary, created_at, updated_at FROM items;
         DROP TABLE items;
         ALTER TABLE items_new RENAME TO items;

         DROP TABLE IF EXISTS items_fts;
         CREATE VIRTUAL TABLE items_fts USING fts5(
            title, content, summary,
            content=items, content_rowid=rowid
         );
         INSERT INTO items_fts(rowid, title, content, summary)
            SELECT rowid, title, content, summary FROM items;

         DROP TRIGGER IF EXISTS items_ai;
         DROP TRIGGER IF EXISTS items_ad;
         DROP TRIGGER IF EXISTS items_au;
         CREATE TRIGGER items_ai AFTER INSERT ON items BEGIN
            INSERT INTO items_fts(rowid, title, content, summary)
            VALUES (new.rowid, new.title, new.content, new.summary);
         END;
         CREATE TRIGGER items_ad AFTER DELETE ON items BEGIN
            INSERT INTO items_fts(items_fts, rowid, title, content, summary)
            VALUES ('delete', old.rowid, old.title, old.content, old.summary);
         END;
         CREATE TRIGGER items_au AFTER UPDATE ON items BEGIN
            INSERT INTO items_fts(items_fts, rowid, title, content, summary)
            VALUES ('delete', old.rowid, old.title, old.content, old.summary);
            INSERT INTO items_fts(rowid, title, content, summary)
            VALUES (new.rowid, new.title, new.content, new.summary);
         END;",
    )?;

    tx.commit()?;
    Ok(())
}

/// Additive column; guarded because a vault created fresh after this
/// migration was folded into the base schema would already have it.
fn migration_003_add_image_path(conn: &mut Connection) -> Result<()> {
    match conn.execute("ALTER TABLE items ADD COLUMN image_path TEXT", []) {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(_, Some(msg))) if msg.contains("duplicate column name") => {
            Ok(())
        }
        Err(e) => Err(Error::Migration(format!("add image_path column: {e}"))),
    }
}

fn migration_004_add_raw_content(conn: &mut Connection) -> Result<()> {
    match conn.execute("ALTER TABLE items ADD COLUMN raw_content TEXT", []) {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(_, Some(msg))) if msg.contains("duplicate column name") => {
            Ok(())
        }
        Err(e) => Err(Error::Migration(format!("add raw_content column: {e}"))),
    }
}
