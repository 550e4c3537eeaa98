//! Journal entry store backed by SQLite.
//!
//! Entries, tags and media are written by the ingestion side; retrieval
//! reads a consistent snapshot. Embeddings are stored as little-endian f32
//! BLOBs, and the lexical representation is an FTS5 external-content table
//! kept in sync with entry text by triggers.

use std::path::Path;

use chrono::DateTime;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;
use uuid::Uuid;

use crate::core::entry::{JournalEntry, MediaItem};
use crate::core::error::Result;
use crate::core::filter::CompiledFilter;

pub struct JournalStore {
    conn: Connection,
}

/// Store-level counts for status reporting.
#[derive(Debug, Serialize)]
pub struct StoreStats {
    pub entry_count: usize,
    pub embedded_count: usize,
    pub tag_count: usize,
    pub media_count: usize,
}

impl JournalStore {
    /// Open or create a database at `path`.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS entries (
                uuid TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                city TEXT,
                weather TEXT,
                starred INTEGER NOT NULL DEFAULT 0,
                embedding BLOB
            );

            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS entry_tags (
                entry_uuid TEXT NOT NULL REFERENCES entries(uuid) ON DELETE CASCADE,
                tag_id INTEGER NOT NULL REFERENCES tags(id),
                PRIMARY KEY (entry_uuid, tag_id)
            );

            CREATE TABLE IF NOT EXISTS media (
                id INTEGER PRIMARY KEY,
                entry_uuid TEXT NOT NULL REFERENCES entries(uuid) ON DELETE CASCADE,
                media_type TEXT NOT NULL,
                access_ref TEXT,
                width INTEGER,
                height INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_entries_created ON entries(created_at);
            CREATE INDEX IF NOT EXISTS idx_entries_city ON entries(city);
            CREATE INDEX IF NOT EXISTS idx_media_entry ON media(entry_uuid);

            -- Lexical representation, derived from entry text.
            CREATE VIRTUAL TABLE IF NOT EXISTS entries_fts USING fts5(
                text,
                content='entries',
                content_rowid='rowid'
            );

            CREATE TRIGGER IF NOT EXISTS entries_fts_insert
            AFTER INSERT ON entries BEGIN
                INSERT INTO entries_fts (rowid, text) VALUES (new.rowid, new.text);
            END;

            CREATE TRIGGER IF NOT EXISTS entries_fts_delete
            AFTER DELETE ON entries BEGIN
                INSERT INTO entries_fts (entries_fts, rowid, text)
                VALUES ('delete', old.rowid, old.text);
            END;

            CREATE TRIGGER IF NOT EXISTS entries_fts_update
            AFTER UPDATE OF text ON entries BEGIN
                INSERT INTO entries_fts (entries_fts, rowid, text)
                VALUES ('delete', old.rowid, old.text);
                INSERT INTO entries_fts (rowid, text) VALUES (new.rowid, new.text);
            END;
            "#,
        )?;

        Ok(())
    }

    /// Insert or update an entry. The FTS row follows via triggers.
    pub fn upsert_entry(&self, entry: &JournalEntry) -> Result<()> {
        let embedding_blob = entry.embedding.as_deref().map(embedding_to_blob);

        self.conn.execute(
            r#"
            INSERT INTO entries (uuid, text, created_at, city, weather, starred, embedding)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(uuid) DO UPDATE SET
                text = excluded.text,
                created_at = excluded.created_at,
                city = excluded.city,
                weather = excluded.weather,
                starred = excluded.starred,
                embedding = excluded.embedding
            "#,
            params![
                entry.uuid.to_string(),
                entry.text,
                entry.created_at.timestamp(),
                entry.city,
                entry.weather,
                entry.starred,
                embedding_blob,
            ],
        )?;

        Ok(())
    }

    /// Replace an entry's tag set.
    pub fn replace_tags(&self, uuid: Uuid, tags: &[String]) -> Result<()> {
        let id = uuid.to_string();
        self.conn
            .execute("DELETE FROM entry_tags WHERE entry_uuid = ?1", params![id])?;

        for tag in tags {
            self.conn
                .execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", params![tag])?;
            self.conn.execute(
                "INSERT OR IGNORE INTO entry_tags (entry_uuid, tag_id)
                 SELECT ?1, id FROM tags WHERE name = ?2",
                params![id, tag],
            )?;
        }

        Ok(())
    }

    /// Replace an entry's media rows, preserving input order.
    pub fn replace_media(&self, uuid: Uuid, media: &[MediaItem]) -> Result<()> {
        let id = uuid.to_string();
        self.conn
            .execute("DELETE FROM media WHERE entry_uuid = ?1", params![id])?;

        for item in media {
            self.conn.execute(
                "INSERT INTO media (entry_uuid, media_type, access_ref, width, height)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, item.media_type, item.access_ref, item.width, item.height],
            )?;
        }

        Ok(())
    }

    /// Set or clear an entry's embedding without touching its text.
    pub fn set_embedding(&self, uuid: Uuid, embedding: Option<&[f32]>) -> Result<()> {
        self.conn.execute(
            "UPDATE entries SET embedding = ?1 WHERE uuid = ?2",
            params![embedding.map(embedding_to_blob), uuid.to_string()],
        )?;
        Ok(())
    }

    pub fn get_entry(&self, uuid: Uuid) -> Result<Option<JournalEntry>> {
        let entry = self
            .conn
            .query_row(
                "SELECT uuid, text, created_at, city, weather, starred, embedding
                 FROM entries WHERE uuid = ?1",
                params![uuid.to_string()],
                read_entry,
            )
            .optional()?;

        Ok(entry)
    }

    /// Entries eligible for the semantic channel: non-null vector plus the
    /// compiled filter. Ranking happens in the caller; no cap is applied
    /// here so filtering always precedes ranking.
    pub fn embedded_entries(&self, filter: &CompiledFilter) -> Result<Vec<(Uuid, Vec<f32>)>> {
        let mut sql = String::from(
            "SELECT e.uuid, e.embedding FROM entries e WHERE e.embedding IS NOT NULL",
        );
        let mut params: Vec<Value> = Vec::new();
        filter.render("e", &mut sql, &mut params);

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
            let uuid = read_uuid(row, 0)?;
            let blob: Vec<u8> = row.get(1)?;
            Ok((uuid, blob_to_embedding(&blob)))
        })?;

        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// All embedded entries except `source`, for the similarity path.
    pub fn embedded_peers(&self, source: Uuid) -> Result<Vec<(Uuid, Vec<f32>)>> {
        let mut stmt = self.conn.prepare(
            "SELECT uuid, embedding FROM entries
             WHERE embedding IS NOT NULL AND uuid <> ?1",
        )?;
        let rows = stmt.query_map(params![source.to_string()], |row| {
            let uuid = read_uuid(row, 0)?;
            let blob: Vec<u8> = row.get(1)?;
            Ok((uuid, blob_to_embedding(&blob)))
        })?;

        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Lexical channel: filter first, then rank by bm25 and cap at `pool`.
    /// `match_expr` must already be a valid FTS5 MATCH expression.
    pub fn lexical_ranked(
        &self,
        match_expr: &str,
        filter: &CompiledFilter,
        pool: usize,
    ) -> Result<Vec<Uuid>> {
        let mut sql = String::from(
            "SELECT e.uuid FROM entries_fts
             JOIN entries e ON e.rowid = entries_fts.rowid
             WHERE entries_fts MATCH ?",
        );
        let mut params: Vec<Value> = vec![Value::Text(match_expr.to_string())];
        filter.render("e", &mut sql, &mut params);
        sql.push_str(" ORDER BY entries_fts.rank LIMIT ?");
        params.push(Value::Integer(pool as i64));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| read_uuid(row, 0))?;

        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let entry_count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        let embedded_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE embedding IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        let tag_count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))?;
        let media_count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM media", [], |row| row.get(0))?;

        Ok(StoreStats {
            entry_count: entry_count as usize,
            embedded_count: embedded_count as usize,
            tag_count: tag_count as usize,
            media_count: media_count as usize,
        })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

fn read_entry(row: &Row<'_>) -> rusqlite::Result<JournalEntry> {
    let uuid = read_uuid(row, 0)?;
    let ts: i64 = row.get(2)?;
    let created_at = DateTime::from_timestamp(ts, 0)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(2, ts))?;
    let embedding_blob: Option<Vec<u8>> = row.get(6)?;

    Ok(JournalEntry {
        uuid,
        text: row.get(1)?,
        created_at,
        city: row.get(3)?,
        weather: row.get(4)?,
        starred: row.get(5)?,
        embedding: embedding_blob.map(|blob| blob_to_embedding(&blob)),
    })
}

fn read_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Convert an f32 embedding to a little-endian BLOB.
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for &val in embedding {
        blob.extend_from_slice(&val.to_le_bytes());
    }
    blob
}

/// Convert a BLOB back to an f32 embedding.
fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
