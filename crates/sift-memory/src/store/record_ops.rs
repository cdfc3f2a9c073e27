//! Record CRUD operations.
//!
//! Writes run in one transaction together with the index synchronizer, so a
//! failed index write rolls back the record write too.

use chrono::Utc;
use rusqlite::{Connection, params};
use tracing::debug;

use crate::error::{MemoryError, Result};
use crate::types::{ContentType, MemoryId, MemoryRecord};
use crate::validation::validate_record;
use crate::vector::{blob_to_embedding, embedding_to_blob};

use super::{MemoryStore, format_timestamp, parse_timestamp};

/// Column list matching [`row_to_record`].
const RECORD_COLUMNS: &str = "id, content, content_type, embedding, relevance_score, \
     access_count, last_accessed_at, created_at, updated_at";

impl MemoryStore {
    /// Insert a new record and project it into both indexes.
    pub fn insert_record(&self, record: &MemoryRecord) -> Result<()> {
        validate_record(record)?;
        let sync = self.synchronizer();

        self.with_transaction(|conn| {
            conn.execute(
                r#"
                INSERT INTO memories (id, content, content_type, embedding, relevance_score,
                                      access_count, last_accessed_at, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    record.id.to_string(),
                    record.content,
                    record.content_type.as_str(),
                    record.embedding.as_deref().map(embedding_to_blob),
                    record.relevance_score,
                    record.access_count,
                    record.last_accessed_at.as_ref().map(format_timestamp),
                    format_timestamp(&record.created_at),
                    format_timestamp(&record.updated_at),
                ],
            )?;
            sync.on_write(conn, record)
        })?;

        debug!("Inserted record {}", record.id);
        Ok(())
    }

    /// Get a record by ID.
    pub fn get_record(&self, id: MemoryId) -> Result<Option<MemoryRecord>> {
        let conn = self.conn.lock();
        get_record(&conn, id)
    }

    /// Get several records by ID. Missing ids are skipped; order is unspecified.
    pub fn get_records(&self, ids: &[MemoryId]) -> Result<Vec<MemoryRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM memories WHERE id IN ({})",
            placeholders.join(", ")
        );
        let id_strings: Vec<String> = ids.iter().map(|id| id.to_string()).collect();

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(id_strings.iter()))?;

        let mut records = Vec::with_capacity(ids.len());
        while let Some(row) = rows.next()? {
            records.push(row_to_record(row)?);
        }
        Ok(records)
    }

    /// Replace a stored record and re-project it into both indexes.
    ///
    /// Access statistics are left alone; they only change through
    /// [`MemoryStore::touch_records`].
    pub fn update_record(&self, record: &MemoryRecord) -> Result<()> {
        validate_record(record)?;
        let sync = self.synchronizer();

        self.with_transaction(|conn| {
            let rows_affected = conn.execute(
                r#"
                UPDATE memories
                SET content = ?2, content_type = ?3, embedding = ?4, relevance_score = ?5,
                    updated_at = ?6
                WHERE id = ?1
                "#,
                params![
                    record.id.to_string(),
                    record.content,
                    record.content_type.as_str(),
                    record.embedding.as_deref().map(embedding_to_blob),
                    record.relevance_score,
                    format_timestamp(&record.updated_at),
                ],
            )?;

            if rows_affected == 0 {
                return Err(MemoryError::NotFound(format!("Record {}", record.id)));
            }
            sync.on_write(conn, record)
        })?;

        debug!("Updated record {}", record.id);
        Ok(())
    }

    /// Delete a record and its index entries.
    ///
    /// Returns `false` when the record did not exist.
    pub fn delete_record(&self, id: MemoryId) -> Result<bool> {
        let sync = self.synchronizer();

        let deleted = self.with_transaction(|conn| {
            let rows_affected =
                conn.execute("DELETE FROM memories WHERE id = ?1", params![id.to_string()])?;
            if rows_affected > 0 {
                sync.on_delete(conn, id)?;
            }
            Ok(rows_affected > 0)
        })?;

        if deleted {
            debug!("Deleted record {}", id);
        }
        Ok(deleted)
    }

    /// List records, newest first, with optional type filtering.
    pub fn list_records(
        &self,
        content_type: Option<ContentType>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MemoryRecord>> {
        let conn = self.conn.lock();

        let (sql, params_vec): (String, Vec<Box<dyn rusqlite::ToSql>>) = match content_type {
            Some(ct) => (
                format!(
                    "SELECT {RECORD_COLUMNS} FROM memories WHERE content_type = ?1 \
                     ORDER BY created_at DESC, id LIMIT ?2 OFFSET ?3"
                ),
                vec![
                    Box::new(ct.as_str().to_string()),
                    Box::new(limit as i64),
                    Box::new(offset as i64),
                ],
            ),
            None => (
                format!(
                    "SELECT {RECORD_COLUMNS} FROM memories \
                     ORDER BY created_at DESC, id LIMIT ?1 OFFSET ?2"
                ),
                vec![Box::new(limit as i64), Box::new(offset as i64)],
            ),
        };

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|b| b.as_ref()).collect();
        let mut rows = stmt.query(params_refs.as_slice())?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(row_to_record(row)?);
        }
        Ok(records)
    }

    /// Count records with optional filtering.
    pub fn count_records(&self, content_type: Option<ContentType>) -> Result<usize> {
        let conn = self.conn.lock();

        let count: i64 = if let Some(ct) = content_type {
            conn.query_row(
                "SELECT COUNT(*) FROM memories WHERE content_type = ?1",
                params![ct.as_str()],
                |row| row.get(0),
            )?
        } else {
            conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?
        };

        Ok(count as usize)
    }

    /// Record that these records were surfaced by a search.
    ///
    /// Returns how many records were updated; unknown ids are ignored.
    pub fn touch_records(&self, ids: &[MemoryId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let now = format_timestamp(&Utc::now());

        self.with_transaction(|conn| {
            let mut stmt = conn.prepare(
                r#"
                UPDATE memories
                SET access_count = access_count + 1, last_accessed_at = ?2
                WHERE id = ?1
                "#,
            )?;
            let mut touched = 0;
            for id in ids {
                touched += stmt.execute(params![id.to_string(), now])?;
            }
            Ok(touched)
        })
    }
}

pub(crate) fn get_record(conn: &Connection, id: MemoryId) -> Result<Option<MemoryRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RECORD_COLUMNS} FROM memories WHERE id = ?1"
    ))?;
    let mut rows = stmt.query(params![id.to_string()])?;

    match rows.next()? {
        Some(row) => Ok(Some(row_to_record(row)?)),
        None => Ok(None),
    }
}

/// Convert a database row to a record.
///
/// Expected column order: see [`RECORD_COLUMNS`].
pub(crate) fn row_to_record(row: &rusqlite::Row) -> Result<MemoryRecord> {
    let id_str: String = row.get(0)?;
    let content: String = row.get(1)?;
    let content_type_str: String = row.get(2)?;
    let embedding_blob: Option<Vec<u8>> = row.get(3)?;
    let relevance_score: f64 = row.get(4)?;
    let access_count: u32 = row.get(5)?;
    let last_accessed_str: Option<String> = row.get(6)?;
    let created_at_str: String = row.get(7)?;
    let updated_at_str: String = row.get(8)?;

    Ok(MemoryRecord {
        id: MemoryId::parse(&id_str)?,
        content,
        content_type: content_type_str.parse()?,
        embedding: embedding_blob
            .as_deref()
            .map(blob_to_embedding)
            .transpose()?,
        relevance_score,
        access_count,
        last_accessed_at: last_accessed_str
            .as_deref()
            .map(parse_timestamp)
            .transpose()?,
        created_at: parse_timestamp(&created_at_str)?,
        updated_at: parse_timestamp(&updated_at_str)?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
