//! Vector index over record embeddings using sqlite-vec.
//!
//! Entries live in a `vec0` virtual table with `content_type` as partition
//! key, so a filtered k-NN query only scans vectors of the requested type.
//! The table is a projection of `memories.embedding` and can be rebuilt from it.

use std::collections::HashMap;
use std::sync::Once;

use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};
use zerocopy::IntoBytes;

use crate::error::{MemoryError, Result};
use crate::types::{ContentType, MemoryId};

/// Name of the vec0 virtual table.
pub const VECTOR_TABLE: &str = "memory_vectors";

static REGISTER: Once = Once::new();

/// Register sqlite-vec as an auto extension for every connection opened afterwards.
///
/// Safe to call repeatedly; registration happens once per process.
pub fn init_vector_extension() {
    REGISTER.call_once(|| {
        use rusqlite::ffi::sqlite3_auto_extension;
        use sqlite_vec::sqlite3_vec_init;

        unsafe {
            #[allow(clippy::missing_transmute_annotations)]
            sqlite3_auto_extension(Some(std::mem::transmute(sqlite3_vec_init as *const ())));
        }
    });
}

/// Check if the sqlite-vec extension is loaded on this connection.
pub fn check_vector_extension(conn: &Connection) -> Result<String> {
    let version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
    Ok(version)
}

/// Create the vector table with the given dimensions, if it doesn't exist.
pub fn create_vector_table(conn: &Connection, dims: usize) -> Result<()> {
    let sql = format!(
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS {VECTOR_TABLE} USING vec0(
            record_id TEXT PRIMARY KEY,
            content_type TEXT partition key,
            embedding float[{dims}]
        )
        "#
    );
    conn.execute_batch(&sql)?;

    info!("Created {} table with {} dimensions", VECTOR_TABLE, dims);
    Ok(())
}

/// Drop the vector table. Used when dimensions change.
pub fn drop_vector_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!("DROP TABLE IF EXISTS {VECTOR_TABLE}"))?;
    info!("Dropped {} table", VECTOR_TABLE);
    Ok(())
}

/// Whether the vector table has been created in this database.
pub fn vector_table_exists(conn: &Connection) -> Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![VECTOR_TABLE],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Insert or replace the vector entry for a record.
pub fn upsert_vector(
    conn: &Connection,
    record_id: MemoryId,
    content_type: ContentType,
    embedding: &[f32],
) -> Result<()> {
    // vec0 doesn't support INSERT OR REPLACE
    remove_vector(conn, record_id)?;

    conn.execute(
        &format!(
            "INSERT INTO {VECTOR_TABLE} (record_id, content_type, embedding) VALUES (?1, ?2, ?3)"
        ),
        params![
            record_id.to_string(),
            content_type.as_str(),
            embedding.as_bytes()
        ],
    )?;

    debug!("Stored vector for record {}", record_id);
    Ok(())
}

/// Remove the vector entry for a record.
pub fn remove_vector(conn: &Connection, record_id: MemoryId) -> Result<bool> {
    let rows = conn.execute(
        &format!("DELETE FROM {VECTOR_TABLE} WHERE record_id = ?1"),
        params![record_id.to_string()],
    )?;
    Ok(rows > 0)
}

/// One k-NN hit.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub record_id: MemoryId,
    /// Distance from the query vector (lower = more similar).
    pub distance: f32,
}

/// k-nearest-neighbour search, ascending by distance.
///
/// A `content_type` filter is pushed into the vec0 partition constraint, so
/// ranks are computed over that partition only.
pub fn knn(
    conn: &Connection,
    query: &[f32],
    k: usize,
    content_type: Option<ContentType>,
) -> Result<Vec<VectorHit>> {
    if k == 0 {
        return Ok(Vec::new());
    }

    let base = format!(
        "SELECT record_id, distance FROM {VECTOR_TABLE} WHERE embedding MATCH ?1 AND k = ?2"
    );
    let mut results = Vec::new();
    let mut push_row = |row: &rusqlite::Row<'_>| -> Result<()> {
        let id: String = row.get(0)?;
        let distance: f64 = row.get(1)?;
        results.push(VectorHit {
            record_id: MemoryId::parse(&id)?,
            distance: distance as f32,
        });
        Ok(())
    };

    match content_type {
        Some(ct) => {
            let mut stmt =
                conn.prepare(&format!("{base} AND content_type = ?3 ORDER BY distance"))?;
            let mut rows = stmt.query(params![query.as_bytes(), k as i64, ct.as_str()])?;
            while let Some(row) = rows.next()? {
                push_row(row)?;
            }
        }
        None => {
            let mut stmt = conn.prepare(&format!("{base} ORDER BY distance"))?;
            let mut rows = stmt.query(params![query.as_bytes(), k as i64])?;
            while let Some(row) = rows.next()? {
                push_row(row)?;
            }
        }
    }

    debug!(hits = results.len(), k, "vector knn");
    Ok(results)
}

/// Get the count of stored vectors.
pub fn count_vectors(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {VECTOR_TABLE}"), [], |row| {
        row.get(0)
    })?;
    Ok(count as usize)
}

/// Check if a vector exists for a record.
pub fn has_vector(conn: &Connection, record_id: MemoryId) -> Result<bool> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {VECTOR_TABLE} WHERE record_id = ?1"),
        params![record_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Every record id in the vector table, mapped to the partition it sits in.
pub fn vector_partitions(conn: &Connection) -> Result<HashMap<String, String>> {
    let mut stmt = conn.prepare(&format!("SELECT record_id, content_type FROM {VECTOR_TABLE}"))?;
    let entries = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<std::result::Result<HashMap<_, _>, _>>()?;
    Ok(entries)
}

// ─────────────────────────────────────────────────────────────────────────────
// Blob encoding
// ─────────────────────────────────────────────────────────────────────────────

/// Encode an embedding as little-endian f32 bytes, the layout vec0 expects.
pub fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.as_bytes().to_vec()
}

/// Decode an embedding stored by [`embedding_to_blob`].
pub fn blob_to_embedding(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(MemoryError::InvalidData(format!(
            "embedding blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
