//! Record store implementation using SQLite.
//!
//! The `memories` table is the single source of truth. Two derived
//! projections live in the same database file:
//!
//! - `memory_fts`: FTS5 keyword index (always present), with
//!   `memory_fts_rowids` mapping record ids to its rowids
//! - `memory_vectors`: sqlite-vec k-NN index, partitioned by content type
//!   (present once [`MemoryStore::init_vectors`] succeeds)
//!
//! Every mutation writes the record and both projections in one transaction
//! via [`IndexSynchronizer`].

mod keyword_ops;
mod maintenance;
pub mod query;
mod record_ops;
mod vector_ops;

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OpenFlags, params};
use tracing::{debug, info, warn};

use crate::error::{MemoryError, Result};
use crate::sync::IndexSynchronizer;

pub use query::{ConsistencyReport, Diagnostics, ReindexDryRun, ReindexReport, StoreStats};

// ─────────────────────────────────────────────────────────────────────────────
// Schema Version
// ─────────────────────────────────────────────────────────────────────────────

/// Current schema version for migrations.
const SCHEMA_VERSION: i32 = 3;

/// Meta key holding the dimensions of stored vectors.
pub(crate) const META_EMBEDDING_DIMS: &str = "embedding.dimensions";
/// Meta key holding the name of the provider that produced stored vectors.
pub(crate) const META_EMBEDDING_PROVIDER: &str = "embedding.provider";

// ─────────────────────────────────────────────────────────────────────────────
// Memory Store
// ─────────────────────────────────────────────────────────────────────────────

/// Vector index lifecycle for one store instance.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct VectorState {
    /// sqlite-vec answered `vec_version()` on the writer connection.
    pub extension_loaded: bool,
    /// `init_vectors` has run.
    pub initialized: bool,
    /// A vec0 table exists in the database, whether or not it is served.
    pub table_exists: bool,
    /// Stored vectors have different dimensions than configured.
    pub stale: bool,
    /// Configured dimensions.
    pub dims: Option<usize>,
}

impl VectorState {
    fn available(&self) -> bool {
        self.extension_loaded && self.initialized && !self.stale
    }
}

/// Dedicated read connections for file-backed stores.
struct Readers {
    vector: Mutex<Connection>,
    keyword: Mutex<Connection>,
}

/// Record store backed by SQLite.
///
/// Uses WAL mode so the two read connections can serve vector and keyword
/// lookups in parallel with each other and with the writer.
pub struct MemoryStore {
    /// The writer connection.
    pub(crate) conn: Mutex<Connection>,
    /// Read connections; `None` for in-memory stores.
    readers: Option<Readers>,
    pub(crate) vectors: Mutex<VectorState>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("has_readers", &self.readers.is_some())
            .field("vectors", &*self.vectors.lock())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Initialization
// ─────────────────────────────────────────────────────────────────────────────

impl MemoryStore {
    /// Open or create a store at the given path.
    ///
    /// Creates the database file and initializes the schema if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|_| {
                MemoryError::Database(rusqlite::Error::InvalidPath(path.to_path_buf()))
            })?;
        }

        crate::vector::init_vector_extension();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let mut store = Self::with_connection(conn)?;

        // Readers are opened after the schema exists so they see it immediately.
        store.readers = Some(Readers {
            vector: Mutex::new(Self::open_reader(path)?),
            keyword: Mutex::new(Self::open_reader(path)?),
        });

        info!("Memory store opened at {:?}", path);
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    ///
    /// All lookups share the writer connection.
    pub fn open_in_memory() -> Result<Self> {
        crate::vector::init_vector_extension();
        let conn = Connection::open_in_memory()?;
        let store = Self::with_connection(conn)?;

        info!("In-memory store created");
        Ok(store)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let extension_loaded = match crate::vector::check_vector_extension(&conn) {
            Ok(version) => {
                debug!("sqlite-vec {} loaded", version);
                true
            }
            Err(e) => {
                warn!("sqlite-vec unavailable, running keyword-only: {}", e);
                false
            }
        };

        let store = Self {
            conn: Mutex::new(conn),
            readers: None,
            vectors: Mutex::new(VectorState {
                extension_loaded,
                ..Default::default()
            }),
        };
        store.initialize()?;

        // Entries written by an earlier session must be maintained even when
        // this session never serves vectors.
        if extension_loaded {
            let exists = crate::vector::vector_table_exists(&store.conn.lock())?;
            store.vectors.lock().table_exists = exists;
        }
        Ok(store)
    }

    fn open_reader(path: &Path) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.pragma_update(None, "query_only", "ON")?;
        Ok(conn)
    }

    /// Initialize the database with schema and pragmas.
    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        self.create_schema(&conn)
    }

    /// Create or migrate the database schema.
    fn create_schema(&self, conn: &Connection) -> Result<()> {
        let current_version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if current_version > SCHEMA_VERSION {
            return Err(MemoryError::Migration(format!(
                "database schema version {current_version} is newer than supported version {SCHEMA_VERSION}"
            )));
        }
        if current_version == SCHEMA_VERSION {
            debug!("Schema up to date (version {})", current_version);
            return Ok(());
        }

        info!(
            "Migrating schema from version {} to {}",
            current_version, SCHEMA_VERSION
        );

        conn.execute_batch(
            r#"
            -- Records: the source of truth
            CREATE TABLE IF NOT EXISTS memories (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                content_type TEXT NOT NULL,
                embedding BLOB,
                relevance_score REAL NOT NULL DEFAULT 0.5,
                access_count INTEGER NOT NULL DEFAULT 0,
                last_accessed_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_memories_content_type
                ON memories(content_type);

            CREATE INDEX IF NOT EXISTS idx_memories_created_at
                ON memories(created_at);

            -- Schema metadata
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;

        if current_version < 2 {
            self.migrate_v2(conn)?;
        }
        if current_version < 3 {
            self.migrate_v3(conn)?;
        }

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        info!("Schema created (version {})", SCHEMA_VERSION);
        Ok(())
    }

    /// Migration v2: add the FTS5 keyword index and backfill it.
    fn migrate_v2(&self, conn: &Connection) -> Result<()> {
        info!("Running migration v2: adding keyword index");
        conn.execute_batch(crate::keyword::CREATE_KEYWORD_TABLE)
            .map_err(|e| MemoryError::Migration(format!("creating keyword index: {e}")))?;

        let backfilled = conn.execute(
            r#"
            INSERT INTO memory_fts (record_id, content_type, created_at, content)
            SELECT m.id, m.content_type, m.created_at, m.content
            FROM memories m
            WHERE NOT EXISTS (SELECT 1 FROM memory_fts f WHERE f.record_id = m.id)
            "#,
            [],
        )?;

        info!("Migration v2 complete ({} records indexed)", backfilled);
        Ok(())
    }

    /// Migration v3: map record ids to keyword rowids so writes skip the FTS scan.
    fn migrate_v3(&self, conn: &Connection) -> Result<()> {
        info!("Running migration v3: adding keyword rowid map");
        conn.execute_batch(crate::keyword::CREATE_KEYWORD_TABLE)
            .and_then(|_| conn.execute_batch(crate::keyword::REFILL_KEYWORD_ROWIDS))
            .map_err(|e| MemoryError::Migration(format!("mapping keyword rowids: {e}")))?;
        Ok(())
    }

    /// Current schema version of the open database.
    pub fn schema_version(&self) -> Result<i32> {
        let conn = self.conn.lock();
        Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connections and Transactions
// ─────────────────────────────────────────────────────────────────────────────

impl MemoryStore {
    /// Execute a function within a transaction on the writer connection.
    ///
    /// If the closure returns an error, all changes are rolled back.
    ///
    /// ```ignore
    /// store.with_transaction(|conn| {
    ///     // Multiple operations here are atomic
    ///     Ok(())
    /// })?;
    /// ```
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        // Dropping the transaction on error rolls it back.
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Connection for vector lookups.
    pub(crate) fn vector_reader(&self) -> MutexGuard<'_, Connection> {
        match &self.readers {
            Some(readers) => readers.vector.lock(),
            None => self.conn.lock(),
        }
    }

    /// Connection for keyword lookups.
    pub(crate) fn keyword_reader(&self) -> MutexGuard<'_, Connection> {
        match &self.readers {
            Some(readers) => readers.keyword.lock(),
            None => self.conn.lock(),
        }
    }

    /// Synchronizer matching the current vector state.
    ///
    /// While vectors are not served, an existing vec0 table still has entries
    /// removed on every write so none can survive in a stale partition.
    pub(crate) fn synchronizer(&self) -> IndexSynchronizer {
        let state = *self.vectors.lock();
        let write_dims = if state.available() { state.dims } else { None };
        IndexSynchronizer::new(write_dims, state.extension_loaded && state.table_exists)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Utility Operations
// ─────────────────────────────────────────────────────────────────────────────

impl MemoryStore {
    /// Get a metadata value.
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        get_meta(&conn, key)
    }

    /// Set a metadata value.
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        set_meta(&conn, key, value)
    }

    /// Get database statistics.
    pub fn stats(&self) -> Result<StoreStats> {
        let state = *self.vectors.lock();
        let conn = self.conn.lock();

        let record_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
        let embedded_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memories WHERE embedding IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        let keyword_count = crate::keyword::count_keywords(&conn)?;

        let vector_count = if state.extension_loaded && crate::vector::vector_table_exists(&conn)? {
            crate::vector::count_vectors(&conn)?
        } else {
            0
        };

        let mut stmt = conn.prepare(
            "SELECT content_type, COUNT(*) FROM memories GROUP BY content_type ORDER BY content_type",
        )?;
        let by_content_type = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(StoreStats {
            record_count: record_count as usize,
            embedded_count: embedded_count as usize,
            keyword_count,
            vector_count,
            by_content_type,
            embedding_provider: get_meta(&conn, META_EMBEDDING_PROVIDER)?,
            embedding_dimensions: get_meta(&conn, META_EMBEDDING_DIMS)?
                .and_then(|s| s.parse().ok()),
            vectors_available: state.available(),
            vectors_stale: state.stale,
            schema_version: SCHEMA_VERSION,
        })
    }

    /// Index sizes and vector availability.
    pub fn diagnostics(&self) -> Result<Diagnostics> {
        let stats = self.stats()?;
        Ok(Diagnostics {
            vector_index_available: stats.vectors_available,
            vector_index_size: stats.vector_count,
            keyword_index_size: stats.keyword_count,
            total_records: stats.record_count,
            records_with_embeddings: stats.embedded_count,
        })
    }
}

pub(crate) fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT value FROM meta WHERE key = ?1")?;
    let mut rows = stmt.query(params![key])?;

    if let Some(row) = rows.next()? {
        Ok(Some(row.get(0)?))
    } else {
        Ok(None)
    }
}

pub(crate) fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

/// Fixed-width RFC 3339 so that text order equals time order.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MemoryError::InvalidData(format!("invalid timestamp '{s}': {e}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
