//! Keyword index lookups.

use crate::error::Result;
use crate::keyword::{self, KeywordHit};
use crate::types::ContentType;

use super::MemoryStore;

impl MemoryStore {
    /// Full-text match against the keyword index, best first.
    ///
    /// Runs on the keyword read connection for file-backed stores.
    pub fn search_keywords(
        &self,
        text: &str,
        k: usize,
        content_type: Option<ContentType>,
    ) -> Result<Vec<KeywordHit>> {
        let conn = self.keyword_reader();
        keyword::match_keywords(&conn, text, k, content_type)
    }
}
