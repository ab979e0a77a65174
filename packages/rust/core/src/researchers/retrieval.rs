use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deepqa_shared::{Passage, Question, Result};
use futures::future::join_all;

use crate::analysis::Analyzer;
use crate::pipeline::run_searcher;
use crate::traits::{Researcher, Searcher};

/// Secondary retrieval: queries each searcher with the question text plus the
/// candidate, attaching the hits to that candidate as supporting evidence.
///
/// Hits never create new answers. Their rank and engine score are cleared, so
/// per-engine features keep describing the primary search only.
pub struct PassageRetrieval {
    searchers: Vec<Arc<dyn Searcher>>,
    timeout: Duration,
}

impl PassageRetrieval {
    pub fn new(searchers: Vec<Arc<dyn Searcher>>, timeout: Duration) -> Self {
        Self { searchers, timeout }
    }
}

#[async_trait]
impl Researcher for PassageRetrieval {
    fn name(&self) -> &str {
        "passage_retrieval"
    }

    async fn process(&self, question: &mut Question, _analyzer: &mut Analyzer) -> Result<()> {
        if self.searchers.is_empty() {
            return Ok(());
        }
        let mut attached = 0usize;
        for answer in &mut question.answers {
            let query = format!("{} {}", question.text, answer.text);
            let batches: Vec<Vec<Passage>> = join_all(
                self.searchers
                    .iter()
                    .map(|searcher| run_searcher(searcher.as_ref(), &query, self.timeout)),
            )
            .await;
            for mut passage in batches.into_iter().flatten() {
                passage.rank = None;
                passage.engine_score = None;
                if answer.add_passage(passage) {
                    attached += 1;
                }
            }
        }
        tracing::debug!(attached, "secondary passages attached");
        Ok(())
    }
}
