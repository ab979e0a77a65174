//! Concrete searchers for deepqa.
//!
//! - [`FullTextSearcher`] queries the local FTS5 passage corpus.
//! - [`WebSearcher`] calls a web search API over HTTP.
//! - [`CachingSearcher`] wraps any searcher with the storage search cache.

mod caching;
mod fulltext;
mod web;

use std::sync::Arc;

use deepqa_core::Searcher;
use deepqa_shared::{AppConfig, PipelineSettings, Result, web_api_key};
use deepqa_storage::Storage;
use tracing::info;

pub use caching::CachingSearcher;
pub use fulltext::FullTextSearcher;
pub use web::WebSearcher;

/// Build the configured searchers, in the order they run.
///
/// With `cache_all`, every searcher is wrapped in the search cache; otherwise
/// only the web searcher is, and only when `[search.web] cache` is set.
pub fn build_searchers(
    config: &AppConfig,
    storage: &Arc<Storage>,
    cache_all: bool,
) -> Result<Vec<Arc<dyn Searcher>>> {
    let settings = PipelineSettings::from(config);
    let mut searchers: Vec<Arc<dyn Searcher>> = Vec::new();

    if config.search.full_text {
        let searcher: Arc<dyn Searcher> =
            Arc::new(FullTextSearcher::new(Arc::clone(storage), settings.max_results));
        searchers.push(if cache_all {
            Arc::new(CachingSearcher::new(searcher, Arc::clone(storage))) as Arc<dyn Searcher>
        } else {
            searcher
        });
    }

    if let Some(web) = &config.search.web {
        let key = web_api_key(web)?;
        let searcher: Arc<dyn Searcher> = Arc::new(WebSearcher::new(
            &web.endpoint,
            key,
            settings.max_results,
            settings.search_timeout,
        )?);
        searchers.push(if web.cache || cache_all {
            Arc::new(CachingSearcher::new(searcher, Arc::clone(storage))) as Arc<dyn Searcher>
        } else {
            searcher
        });
    }

    info!(
        searchers = ?searchers.iter().map(|s| s.name()).collect::<Vec<_>>(),
        "searchers configured"
    );
    Ok(searchers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use deepqa_core::{SilentProgress, generate_search_results};
    use deepqa_shared::{DeepQaError, Passage, WebSearchSection};

    async fn storage() -> (Arc<Storage>, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!("deepqa_build_{}.db", uuid::Uuid::now_v7()));
        (Arc::new(Storage::open(&path).await.expect("open")), path)
    }

    #[tokio::test]
    async fn default_config_has_full_text_only() {
        let (storage, path) = storage().await;
        let searchers = build_searchers(&AppConfig::default(), &storage, false).unwrap();
        let names: Vec<&str> = searchers.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["fulltext"]);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn web_search_needs_its_key() {
        let (storage, path) = storage().await;
        let mut config = AppConfig::default();
        config.search.web = Some(WebSearchSection {
            endpoint: "https://search.example.com/v7.0/search".into(),
            api_key_env: "DEEPQA_TEST_KEY_THAT_IS_NEVER_SET".into(),
            cache: true,
        });
        let err = build_searchers(&config, &storage, false).err().unwrap();
        assert!(matches!(err, DeepQaError::Config { .. }));
        let _ = std::fs::remove_file(&path);
    }

    /// Returns one passage, or fails every call when `up` is false.
    struct Stub {
        name: &'static str,
        up: bool,
    }

    #[async_trait]
    impl Searcher for Stub {
        fn name(&self) -> &str {
            self.name
        }

        async fn query(&self, text: &str) -> Result<Vec<Passage>> {
            if !self.up {
                return Err(DeepQaError::backend(self.name, "connection refused"));
            }
            Ok(vec![Passage::new(self.name, "1215", text, "s:1").with_rank(1)])
        }
    }

    #[tokio::test]
    async fn partially_searched_questions_are_retried() {
        let (storage, path) = storage().await;
        storage
            .insert_question("When was the Magna Carta signed?", Some("1215"), "HISTORY")
            .await
            .unwrap();

        let searchers = |web_up: bool| -> Vec<Arc<dyn Searcher>> {
            vec![
                Arc::new(CachingSearcher::new(
                    Arc::new(Stub { name: "fulltext", up: true }),
                    Arc::clone(&storage),
                )) as Arc<dyn Searcher>,
                Arc::new(CachingSearcher::new(
                    Arc::new(Stub { name: "web", up: web_up }),
                    Arc::clone(&storage),
                )) as Arc<dyn Searcher>,
            ]
        };
        let engines = ["fulltext", "web"];

        let pending = storage.fetch_questions_without_results(&engines, 10, 0).await.unwrap();
        let summary = generate_search_results(
            pending,
            searchers(false),
            2,
            Duration::from_secs(1),
            Arc::new(SilentProgress),
        )
        .await
        .unwrap();
        assert_eq!(summary.failures, 1);
        let web_cached = storage
            .get_cached_results("web", "When was the Magna Carta signed?")
            .await
            .unwrap();
        assert!(web_cached.is_none());

        let pending = storage.fetch_questions_without_results(&engines, 10, 0).await.unwrap();
        assert_eq!(pending.len(), 1);

        let summary = generate_search_results(
            pending,
            searchers(true),
            2,
            Duration::from_secs(1),
            Arc::new(SilentProgress),
        )
        .await
        .unwrap();
        assert_eq!(summary.failures, 0);
        let pending = storage.fetch_questions_without_results(&engines, 10, 0).await.unwrap();
        assert!(pending.is_empty());
        let _ = std::fs::remove_file(&path);
    }
}
