//! Write-through synchronisation of the keyword and vector projections.
//!
//! Every record mutation calls into [`IndexSynchronizer`] with the same
//! connection (inside the same transaction) that wrote the `memories` row, so
//! a reader can never observe a record that is missing from an index.

use rusqlite::Connection;
use tracing::debug;

use crate::error::Result;
use crate::types::{MemoryId, MemoryRecord};
use crate::validation::validate_embedding;
use crate::{keyword, vector};

/// Fans one logical write out to the derived indexes.
#[derive(Debug, Clone, Copy)]
pub struct IndexSynchronizer {
    /// Dimensions to write vectors with; `None` while vectors are unavailable or stale.
    write_dims: Option<usize>,
    /// Whether a vec0 table exists that stale entries can be removed from.
    vector_table: bool,
}

impl IndexSynchronizer {
    pub(crate) fn new(write_dims: Option<usize>, vector_table: bool) -> Self {
        Self {
            write_dims,
            vector_table,
        }
    }

    /// Whether this synchronizer maintains vector entries.
    pub fn writes_vectors(&self) -> bool {
        self.write_dims.is_some()
    }

    /// Project an inserted or updated record into both indexes.
    ///
    /// A wrong-sized embedding fails the write rather than leaving the record
    /// without its vector entry.
    pub fn on_write(&self, conn: &Connection, record: &MemoryRecord) -> Result<()> {
        keyword::upsert_keyword(conn, record)?;

        match (self.write_dims, record.embedding.as_deref()) {
            (Some(dims), Some(embedding)) => {
                validate_embedding(embedding, dims)?;
                vector::upsert_vector(conn, record.id, record.content_type, embedding)?;
            }
            _ if self.vector_table => {
                vector::remove_vector(conn, record.id)?;
            }
            _ => {}
        }

        debug!(
            record_id = %record.id,
            vector = self.writes_vectors() && record.has_embedding(),
            "indexes synchronised"
        );
        Ok(())
    }

    /// Remove a deleted record from both indexes.
    pub fn on_delete(&self, conn: &Connection, record_id: MemoryId) -> Result<()> {
        keyword::remove_keyword(conn, record_id)?;
        if self.vector_table {
            vector::remove_vector(conn, record_id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MemoryError;
    use crate::types::ContentType;
    use crate::validation::ValidationError;

    fn connection() -> Connection {
        vector::init_vector_extension();
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(keyword::CREATE_KEYWORD_TABLE).unwrap();
        vector::create_vector_table(&conn, 3).unwrap();
        conn
    }

    #[test]
    fn test_write_projects_both_indexes() {
        let conn = connection();
        let sync = IndexSynchronizer::new(Some(3), true);
        let record =
            MemoryRecord::new(ContentType::Code, "hash map insert").with_embedding(vec![1.0, 0.0, 0.0]);

        sync.on_write(&conn, &record).unwrap();
        assert!(vector::has_vector(&conn, record.id).unwrap());
        assert_eq!(keyword::count_keywords(&conn).unwrap(), 1);

        sync.on_delete(&conn, record.id).unwrap();
        assert!(!vector::has_vector(&conn, record.id).unwrap());
        assert_eq!(keyword::count_keywords(&conn).unwrap(), 0);
    }

    #[test]
    fn test_dropping_embedding_removes_vector() {
        let conn = connection();
        let sync = IndexSynchronizer::new(Some(3), true);
        let mut record =
            MemoryRecord::new(ContentType::Code, "text").with_embedding(vec![0.0, 1.0, 0.0]);
        sync.on_write(&conn, &record).unwrap();

        record.embedding = None;
        sync.on_write(&conn, &record).unwrap();
        assert!(!vector::has_vector(&conn, record.id).unwrap());
    }

    #[test]
    fn test_dimension_mismatch_fails_write() {
        let conn = connection();
        let sync = IndexSynchronizer::new(Some(3), true);
        let record = MemoryRecord::new(ContentType::Code, "text").with_embedding(vec![1.0, 0.0]);

        let err = sync.on_write(&conn, &record).unwrap_err();
        assert!(matches!(
            err,
            MemoryError::Validation(ValidationError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_unserved_vectors_are_removed_on_write() {
        let conn = connection();
        let record =
            MemoryRecord::new(ContentType::Code, "text").with_embedding(vec![1.0, 0.0, 0.0]);
        IndexSynchronizer::new(Some(3), true).on_write(&conn, &record).unwrap();

        // Vectors not served, but the table exists: the entry must not linger.
        let mut moved = record.clone();
        moved.content_type = ContentType::Documentation;
        IndexSynchronizer::new(None, true).on_write(&conn, &moved).unwrap();
        assert!(!vector::has_vector(&conn, record.id).unwrap());
    }

    #[test]
    fn test_keyword_only_mode_skips_vectors() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(keyword::CREATE_KEYWORD_TABLE).unwrap();
        let sync = IndexSynchronizer::new(None, false);
        let record =
            MemoryRecord::new(ContentType::Code, "text").with_embedding(vec![1.0, 0.0, 0.0]);

        sync.on_write(&conn, &record).unwrap();
        sync.on_delete(&conn, record.id).unwrap();
        assert!(!sync.writes_vectors());
    }
}
