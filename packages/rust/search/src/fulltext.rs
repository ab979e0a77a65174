use std::sync::Arc;

use async_trait::async_trait;
use deepqa_core::Searcher;
use deepqa_shared::{Passage, Result};
use deepqa_storage::Storage;

/// Engine name stamped on full-text passages.
pub const ENGINE: &str = "fulltext";

/// Searches the stored passage corpus through its FTS5 index.
pub struct FullTextSearcher {
    storage: Arc<Storage>,
    max_results: u32,
}

impl FullTextSearcher {
    pub fn new(storage: Arc<Storage>, max_results: u32) -> Self {
        Self {
            storage,
            max_results,
        }
    }
}

#[async_trait]
impl Searcher for FullTextSearcher {
    fn name(&self) -> &str {
        ENGINE
    }

    async fn query(&self, text: &str) -> Result<Vec<Passage>> {
        let hits = self.storage.search_passages(text, self.max_results).await?;
        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(i, hit)| {
                Passage::new(ENGINE, hit.title, hit.body, hit.source)
                    .with_rank(i as u32 + 1)
                    .with_engine_score(hit.score)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn corpus() -> (Arc<Storage>, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!("deepqa_fts_{}.db", uuid::Uuid::now_v7()));
        let storage = Storage::open(&path).await.expect("open");
        storage
            .insert_passage(
                "Magna Carta",
                "The Magna Carta was sealed by King John at Runnymede in 1215.",
                "wiki:magna-carta",
            )
            .await
            .unwrap();
        storage
            .insert_passage(
                "Runnymede",
                "Runnymede is a water-meadow alongside the River Thames.",
                "wiki:runnymede",
            )
            .await
            .unwrap();
        (Arc::new(storage), path)
    }

    #[tokio::test]
    async fn ranked_hits_carry_provenance() {
        let (storage, path) = corpus().await;
        let searcher = FullTextSearcher::new(storage, 10);

        let passages = searcher.query("Who sealed the Magna Carta?").await.unwrap();
        assert!(!passages.is_empty());
        assert_eq!(passages[0].title, "Magna Carta");
        assert_eq!(passages[0].engine, "fulltext");
        assert_eq!(passages[0].rank, Some(1));
        assert!(passages[0].engine_score.is_some());
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn no_match_is_empty_not_error() {
        let (storage, path) = corpus().await;
        let searcher = FullTextSearcher::new(storage, 10);
        assert!(searcher.query("zyzzyva").await.unwrap().is_empty());
        assert!(searcher.query("?!").await.unwrap().is_empty());
        let _ = std::fs::remove_file(&path);
    }
}
