//! Full-text keyword index using SQLite FTS5.
//!
//! Tokenizer: `unicode61 remove_diacritics 2`. Matching is case-insensitive
//! and ignores diacritics, so "cafe" finds "Café". The tokenizer is part of
//! the on-disk format; changing it requires `rebuild_keyword_index`.
//!
//! `record_id` is an UNINDEXED FTS column, so writes find a record's entry
//! through `memory_fts_rowids` and touch the FTS table by rowid only.

use std::collections::HashSet;

use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::error::Result;
use crate::types::{ContentType, MemoryId, MemoryRecord};

/// Name of the FTS5 table.
pub const KEYWORD_TABLE: &str = "memory_fts";

/// DDL for the keyword table and its rowid map.
pub(crate) const CREATE_KEYWORD_TABLE: &str = r#"
    CREATE VIRTUAL TABLE IF NOT EXISTS memory_fts USING fts5(
        record_id UNINDEXED,
        content_type UNINDEXED,
        created_at UNINDEXED,
        content,
        tokenize = 'unicode61 remove_diacritics 2'
    );

    CREATE TABLE IF NOT EXISTS memory_fts_rowids (
        record_id TEXT PRIMARY KEY,
        fts_rowid INTEGER NOT NULL
    ) WITHOUT ROWID;
"#;

/// Rebuild the rowid map from the entries currently in `memory_fts`.
pub(crate) const REFILL_KEYWORD_ROWIDS: &str = r#"
    DELETE FROM memory_fts_rowids;
    INSERT OR REPLACE INTO memory_fts_rowids (record_id, fts_rowid)
    SELECT record_id, rowid FROM memory_fts;
"#;

fn keyword_rowid(conn: &Connection, record_id: MemoryId) -> Result<Option<i64>> {
    let rowid = conn
        .query_row(
            "SELECT fts_rowid FROM memory_fts_rowids WHERE record_id = ?1",
            params![record_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(rowid)
}

/// Insert or replace the keyword entry for a record.
pub fn upsert_keyword(conn: &Connection, record: &MemoryRecord) -> Result<()> {
    if let Some(rowid) = keyword_rowid(conn, record.id)? {
        conn.execute("DELETE FROM memory_fts WHERE rowid = ?1", params![rowid])?;
    }

    // A fresh rowid each time, so a stale map entry can never collide.
    conn.execute(
        "INSERT INTO memory_fts (record_id, content_type, created_at, content) VALUES (?1, ?2, ?3, ?4)",
        params![
            record.id.to_string(),
            record.content_type.as_str(),
            crate::store::format_timestamp(&record.created_at),
            record.content,
        ],
    )?;
    conn.execute(
        "INSERT OR REPLACE INTO memory_fts_rowids (record_id, fts_rowid) VALUES (?1, ?2)",
        params![record.id.to_string(), conn.last_insert_rowid()],
    )?;
    Ok(())
}

/// Remove the keyword entry for a record.
pub fn remove_keyword(conn: &Connection, record_id: MemoryId) -> Result<bool> {
    let Some(rowid) = keyword_rowid(conn, record_id)? else {
        return Ok(false);
    };
    let rows = conn.execute("DELETE FROM memory_fts WHERE rowid = ?1", params![rowid])?;
    conn.execute(
        "DELETE FROM memory_fts_rowids WHERE record_id = ?1",
        params![record_id.to_string()],
    )?;
    Ok(rows > 0)
}

/// One keyword hit.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordHit {
    pub record_id: MemoryId,
    /// Relevance (negated BM25; higher = better).
    pub score: f64,
}

/// Turn free text into an FTS5 MATCH expression.
///
/// Each alphanumeric run becomes a quoted term and terms are OR-ed, so user
/// input can never inject FTS syntax. Returns `None` when nothing searchable
/// remains.
pub fn build_match_query(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

/// Match query text against the index, best first.
///
/// Ties in BM25 are broken by record id so ordering is deterministic.
pub fn match_keywords(
    conn: &Connection,
    text: &str,
    k: usize,
    content_type: Option<ContentType>,
) -> Result<Vec<KeywordHit>> {
    let Some(match_query) = build_match_query(text) else {
        return Ok(Vec::new());
    };
    if k == 0 {
        return Ok(Vec::new());
    }

    let mut results = Vec::new();
    let mut push_row = |row: &rusqlite::Row<'_>| -> Result<()> {
        let id: String = row.get(0)?;
        let rank: f64 = row.get(1)?;
        results.push(KeywordHit {
            record_id: MemoryId::parse(&id)?,
            score: -rank,
        });
        Ok(())
    };

    match content_type {
        Some(ct) => {
            let mut stmt = conn.prepare(
                r#"
                SELECT record_id, bm25(memory_fts) AS rank
                FROM memory_fts
                WHERE memory_fts MATCH ?1 AND content_type = ?3
                ORDER BY rank, record_id
                LIMIT ?2
                "#,
            )?;
            let mut rows = stmt.query(params![match_query, k as i64, ct.as_str()])?;
            while let Some(row) = rows.next()? {
                push_row(row)?;
            }
        }
        None => {
            let mut stmt = conn.prepare(
                r#"
                SELECT record_id, bm25(memory_fts) AS rank
                FROM memory_fts
                WHERE memory_fts MATCH ?1
                ORDER BY rank, record_id
                LIMIT ?2
                "#,
            )?;
            let mut rows = stmt.query(params![match_query, k as i64])?;
            while let Some(row) = rows.next()? {
                push_row(row)?;
            }
        }
    }

    debug!(hits = results.len(), k, "keyword match");
    Ok(results)
}

/// Number of entries in the keyword index.
pub fn count_keywords(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM memory_fts", [], |row| row.get(0))?;
    Ok(count as usize)
}

/// All record ids present in the keyword index.
pub fn keyword_ids(conn: &Connection) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT record_id FROM memory_fts")?;
    let ids = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<HashSet<_>, _>>()?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CREATE_KEYWORD_TABLE).unwrap();
        conn
    }

    fn index(conn: &Connection, ct: ContentType, content: &str) -> MemoryId {
        let record = MemoryRecord::new(ct, content);
        upsert_keyword(conn, &record).unwrap();
        record.id
    }

    #[test]
    fn test_build_match_query() {
        assert_eq!(
            build_match_query("approximate nearest-neighbor").as_deref(),
            Some("\"approximate\" OR \"nearest\" OR \"neighbor\"")
        );
        assert_eq!(build_match_query("  ?!*  "), None);
        // FTS operators are quoted away.
        assert_eq!(
            build_match_query("NOT content:x").as_deref(),
            Some("\"NOT\" OR \"content\" OR \"x\"")
        );
    }

    #[test]
    fn test_match_ranks_best_first() {
        let conn = create_test_connection();
        let full = index(
            &conn,
            ContentType::Documentation,
            "vector search using approximate nearest neighbor",
        );
        let partial = index(&conn, ContentType::Documentation, "nearest coffee shop");
        index(&conn, ContentType::Code, "unrelated text entirely");

        let hits = match_keywords(&conn, "approximate nearest neighbor", 10, None).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record_id, full);
        assert_eq!(hits[1].record_id, partial);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_match_filters_inside_query() {
        let conn = create_test_connection();
        index(&conn, ContentType::Code, "parser error recovery");
        let doc = index(&conn, ContentType::Documentation, "parser overview");

        let hits = match_keywords(&conn, "parser", 10, Some(ContentType::Documentation)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record_id, doc);
    }

    #[test]
    fn test_diacritics_and_case_insensitive() {
        let conn = create_test_connection();
        let id = index(&conn, ContentType::Context, "Meeting at the Café Über");

        let hits = match_keywords(&conn, "cafe uber", 10, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record_id, id);
    }

    #[test]
    fn test_upsert_replaces_and_remove() {
        let conn = create_test_connection();
        let mut record = MemoryRecord::new(ContentType::Code, "first version");
        upsert_keyword(&conn, &record).unwrap();
        record.content = "second revision".to_string();
        upsert_keyword(&conn, &record).unwrap();

        assert_eq!(count_keywords(&conn).unwrap(), 1);
        assert!(match_keywords(&conn, "first", 10, None).unwrap().is_empty());
        assert_eq!(match_keywords(&conn, "revision", 10, None).unwrap().len(), 1);

        assert!(remove_keyword(&conn, record.id).unwrap());
        assert_eq!(count_keywords(&conn).unwrap(), 0);
        assert!(keyword_ids(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_writes_address_entries_by_rowid() {
        let conn = create_test_connection();
        let keep = index(&conn, ContentType::Code, "alpha beta");
        let mut record = MemoryRecord::new(ContentType::Code, "gamma delta");
        upsert_keyword(&conn, &record).unwrap();
        let first = keyword_rowid(&conn, record.id).unwrap().unwrap();

        record.content = "epsilon".to_string();
        upsert_keyword(&conn, &record).unwrap();
        let second = keyword_rowid(&conn, record.id).unwrap().unwrap();
        assert_ne!(first, second);
        assert_eq!(count_keywords(&conn).unwrap(), 2);

        assert!(remove_keyword(&conn, record.id).unwrap());
        assert!(!remove_keyword(&conn, record.id).unwrap());
        assert_eq!(keyword_rowid(&conn, record.id).unwrap(), None);
        assert_eq!(match_keywords(&conn, "alpha", 10, None).unwrap()[0].record_id, keep);

        // The lookups go through the primary key of the map, not a scan of the FTS table.
        let plan: Vec<String> = conn
            .prepare("EXPLAIN QUERY PLAN SELECT fts_rowid FROM memory_fts_rowids WHERE record_id = ?1")
            .unwrap()
            .query_map(["x"], |row| row.get::<_, String>(3))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert!(plan.iter().any(|step| step.contains("PRIMARY KEY")), "{plan:?}");
    }

    #[test]
    fn test_refill_rowids_from_index() {
        let conn = create_test_connection();
        let id = index(&conn, ContentType::Context, "needs a map entry");
        conn.execute("DELETE FROM memory_fts_rowids", []).unwrap();

        conn.execute_batch(REFILL_KEYWORD_ROWIDS).unwrap();
        assert!(remove_keyword(&conn, id).unwrap());
        assert_eq!(count_keywords(&conn).unwrap(), 0);
    }

    #[test]
    fn test_k_limits_results() {
        let conn = create_test_connection();
        for i in 0..5 {
            index(&conn, ContentType::Output, &format!("build log line {i}"));
        }
        assert_eq!(match_keywords(&conn, "build", 3, None).unwrap().len(), 3);
        assert!(match_keywords(&conn, "build", 0, None).unwrap().is_empty());
        assert!(match_keywords(&conn, "", 3, None).unwrap().is_empty());
    }
}
