use std::sync::Arc;

use async_trait::async_trait;
use deepqa_core::Searcher;
use deepqa_shared::{Passage, Result};
use deepqa_storage::Storage;
use tracing::{debug, warn};

/// Serves repeated queries from the storage search cache.
///
/// Keyed by the wrapped searcher's name and the query text. Backend failures
/// are passed through and never cached.
pub struct CachingSearcher {
    inner: Arc<dyn Searcher>,
    storage: Arc<Storage>,
}

impl CachingSearcher {
    pub fn new(inner: Arc<dyn Searcher>, storage: Arc<Storage>) -> Self {
        Self { inner, storage }
    }
}

#[async_trait]
impl Searcher for CachingSearcher {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn query(&self, text: &str) -> Result<Vec<Passage>> {
        let engine = self.inner.name();
        match self.storage.get_cached_results(engine, text).await {
            Ok(Some(passages)) => {
                debug!(engine, count = passages.len(), "search cache hit");
                return Ok(passages);
            }
            Ok(None) => {}
            Err(e) => warn!(engine, error = %e, "search cache read failed"),
        }

        let passages = self.inner.query(text).await?;
        if let Err(e) = self.storage.set_cached_results(engine, text, &passages).await {
            warn!(engine, error = %e, "search cache write failed");
        }
        Ok(passages)
    }
}
