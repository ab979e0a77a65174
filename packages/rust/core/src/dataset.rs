//! Bulk search-result generation for stored questions.
//!
//! Runs every searcher over a batch of questions so that caching searchers
//! fill the search cache ahead of training runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use deepqa_shared::{Question, Result};
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use crate::pipeline::query_with_timeout;
use crate::traits::Searcher;

/// Outcome of a generation run.
#[derive(Debug, Clone, Default)]
pub struct GenerateSummary {
    /// Questions processed.
    pub questions: usize,
    /// Passages returned across all searchers.
    pub passages: usize,
    /// Questions where at least one searcher failed.
    pub failures: usize,
    pub elapsed: Duration,
}

/// Progress callback for generation runs.
pub trait ProgressReporter: Send + Sync {
    /// Called once before any question is searched.
    fn started(&self, total: usize);
    /// Called after each question, in completion order.
    fn question_done(&self, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, summary: &GenerateSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn started(&self, _total: usize) {}
    fn question_done(&self, _current: usize, _total: usize) {}
    fn done(&self, _summary: &GenerateSummary) {}
}

/// Query every searcher for every question, at most `concurrency` questions
/// at a time, each call bounded by `timeout`. Per-question failures are
/// logged and counted, never fatal.
#[instrument(skip_all, fields(questions = questions.len(), searchers = searchers.len()))]
pub async fn generate_search_results(
    questions: Vec<Question>,
    searchers: Vec<Arc<dyn Searcher>>,
    concurrency: usize,
    timeout: Duration,
    progress: Arc<dyn ProgressReporter>,
) -> Result<GenerateSummary> {
    let start = Instant::now();
    let total = questions.len();
    progress.started(total);

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let searchers = Arc::new(searchers);
    let completed = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::with_capacity(total);
    for question in questions {
        let sem = Arc::clone(&semaphore);
        let searchers = Arc::clone(&searchers);
        let completed = Arc::clone(&completed);
        let progress = Arc::clone(&progress);

        handles.push(tokio::spawn(async move {
            let _permit = sem.acquire_owned().await.ok();
            let mut passages = 0;
            let mut failed = false;
            for searcher in searchers.iter() {
                match query_with_timeout(searcher.as_ref(), &question.text, timeout).await {
                    Ok(found) => passages += found.len(),
                    Err(e) => {
                        warn!(searcher = searcher.name(), question = %question.id, error = %e, "search failed");
                        failed = true;
                    }
                }
            }
            let current = completed.fetch_add(1, Ordering::SeqCst) + 1;
            progress.question_done(current, total);
            (passages, failed)
        }));
    }

    let mut summary = GenerateSummary {
        questions: total,
        ..GenerateSummary::default()
    };
    for handle in handles {
        match handle.await {
            Ok((passages, failed)) => {
                summary.passages += passages;
                if failed {
                    summary.failures += 1;
                }
            }
            Err(e) => {
                warn!(error = %e, "generation task panicked");
                summary.failures += 1;
            }
        }
    }
    summary.elapsed = start.elapsed();

    info!(
        questions = summary.questions,
        passages = summary.passages,
        failures = summary.failures,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "search results generated"
    );
    progress.done(&summary);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use deepqa_shared::{DeepQaError, Passage};

    /// Fails for questions mentioning "fail"; tracks peak concurrency.
    struct Counting {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Searcher for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn query(&self, text: &str) -> Result<Vec<Passage>> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            if text.contains("fail") {
                return Err(DeepQaError::backend("counting", "refused"));
            }
            Ok(vec![Passage::new("counting", "t", text, "c:1")])
        }
    }

    struct Tally(AtomicUsize);

    impl ProgressReporter for Tally {
        fn started(&self, _total: usize) {}
        fn question_done(&self, _current: usize, _total: usize) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn done(&self, _summary: &GenerateSummary) {}
    }

    #[tokio::test]
    async fn bounded_concurrency_and_failures_counted() {
        let searcher = Arc::new(Counting {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let questions: Vec<Question> = ["one", "two", "please fail", "four", "five", "six"]
            .into_iter()
            .map(Question::new)
            .collect();
        let tally = Arc::new(Tally(AtomicUsize::new(0)));

        let summary = generate_search_results(
            questions,
            vec![searcher.clone() as Arc<dyn Searcher>],
            2,
            Duration::from_secs(5),
            tally.clone(),
        )
        .await
        .unwrap();

        assert_eq!(summary.questions, 6);
        assert_eq!(summary.passages, 5);
        assert_eq!(summary.failures, 1);
        assert!(searcher.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(tally.0.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn empty_batch_is_fine() {
        let summary = generate_search_results(
            Vec::new(),
            Vec::new(),
            4,
            Duration::from_secs(1),
            Arc::new(SilentProgress),
        )
        .await
        .unwrap();
        assert_eq!(summary.questions, 0);
    }

    struct Hung;

    #[async_trait]
    impl Searcher for Hung {
        fn name(&self) -> &str {
            "hung"
        }

        async fn query(&self, _text: &str) -> Result<Vec<Passage>> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn hung_searcher_times_out_as_failure() {
        let questions = vec![Question::new("one"), Question::new("two")];
        let summary = tokio::time::timeout(
            Duration::from_secs(5),
            generate_search_results(
                questions,
                vec![Arc::new(Hung) as Arc<dyn Searcher>],
                1,
                Duration::from_millis(20),
                Arc::new(SilentProgress),
            ),
        )
        .await
        .expect("generation finishes despite a hung backend")
        .unwrap();

        assert_eq!(summary.questions, 2);
        assert_eq!(summary.failures, 2);
        assert_eq!(summary.passages, 0);
    }
}
