//! Fixed-size pool of pipeline instances.
//!
//! Every instance owns its own [`Analyzer`], which is costly to build and can
//! serve only one question at a time. The pool hands instances out one per
//! request behind a fair semaphore: waiters are served in arrival order and a
//! released instance goes straight to the next waiter.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use deepqa_shared::{DeepQaError, PipelineSettings, Result};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, instrument};

use crate::analysis::Analyzer;
use crate::pipeline::{Pipeline, Stages};

/// Bounded set of ready-to-use pipeline instances.
pub struct PipelinePool {
    permits: Arc<Semaphore>,
    idle: Arc<Mutex<Vec<Pipeline>>>,
    size: usize,
}

impl PipelinePool {
    /// Pool over already constructed instances.
    pub fn new(pipelines: Vec<Pipeline>) -> Result<Self> {
        if pipelines.is_empty() {
            return Err(DeepQaError::validation("pipeline pool needs at least one instance"));
        }
        let size = pipelines.len();
        Ok(Self {
            permits: Arc::new(Semaphore::new(size)),
            idle: Arc::new(Mutex::new(pipelines)),
            size,
        })
    }

    /// Build `size` instances over the shared stages, each with its own analyzer.
    #[instrument(skip_all, fields(size = size))]
    pub fn build(size: usize, stages: Arc<Stages>, settings: &PipelineSettings) -> Result<Self> {
        let mut pipelines = Vec::with_capacity(size);
        for _ in 0..size {
            let analyzer = Analyzer::new(settings.names_file.as_deref())?;
            pipelines.push(Pipeline::new(Arc::clone(&stages), analyzer));
        }
        info!(size, "pipeline pool ready");
        Self::new(pipelines)
    }

    /// Number of instances, fixed for the pool's lifetime.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Instances not currently leased.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait up to `timeout` for a free instance.
    ///
    /// Returns [`DeepQaError::PoolExhausted`] if none frees up in time.
    pub async fn acquire(&self, timeout: Duration) -> Result<PipelineLease> {
        let permit = match tokio::time::timeout(timeout, Arc::clone(&self.permits).acquire_owned())
            .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) | Err(_) => return Err(DeepQaError::PoolExhausted { waited: timeout }),
        };

        let pipeline = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .ok_or(DeepQaError::PoolExhausted { waited: timeout })?;

        debug!(available = self.available(), "pipeline acquired");
        Ok(PipelineLease {
            pipeline: Some(pipeline),
            idle: Arc::clone(&self.idle),
            _permit: permit,
        })
    }
}

/// Exclusive use of one pipeline instance.
///
/// The instance returns to the pool when the lease is dropped, on every path.
pub struct PipelineLease {
    pipeline: Option<Pipeline>,
    idle: Arc<Mutex<Vec<Pipeline>>>,
    // Dropped after `Drop::drop` has put the instance back.
    _permit: OwnedSemaphorePermit,
}

impl PipelineLease {
    /// Return the instance to the pool.
    pub fn release(self) {
        drop(self);
    }
}

impl Deref for PipelineLease {
    type Target = Pipeline;

    fn deref(&self) -> &Pipeline {
        self.pipeline.as_ref().expect("lease holds a pipeline until dropped")
    }
}

impl DerefMut for PipelineLease {
    fn deref_mut(&mut self) -> &mut Pipeline {
        self.pipeline.as_mut().expect("lease holds a pipeline until dropped")
    }
}

impl Drop for PipelineLease {
    fn drop(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            self.idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(pipeline);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(size: usize) -> PipelinePool {
        PipelinePool::build(size, Arc::new(Stages::default()), &PipelineSettings::default())
            .expect("pool")
    }

    #[test]
    fn empty_pool_is_rejected() {
        assert!(matches!(
            PipelinePool::new(Vec::new()),
            Err(DeepQaError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn lease_returns_on_drop() {
        let pool = pool(2);
        let a = pool.acquire(Duration::from_millis(10)).await.unwrap();
        let b = pool.acquire(Duration::from_millis(10)).await.unwrap();
        assert_eq!(pool.available(), 0);

        a.release();
        assert_eq!(pool.available(), 1);
        drop(b);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn exhausted_pool_times_out() {
        let pool = pool(1);
        let _held = pool.acquire(Duration::from_millis(10)).await.unwrap();
        let err = pool.acquire(Duration::from_millis(20)).await.err().unwrap();
        assert!(matches!(err, DeepQaError::PoolExhausted { .. }));
    }

    #[tokio::test]
    async fn extra_request_waits_for_a_release() {
        let pool = Arc::new(pool(2));
        let first = pool.acquire(Duration::from_millis(10)).await.unwrap();
        let _second = pool.acquire(Duration::from_millis(10)).await.unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                let mut lease = pool.acquire(Duration::from_secs(5)).await.unwrap();
                lease.ask_text("q").await.map(|q| q.answers.len())
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(first);
        let answered = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be released")
            .unwrap()
            .unwrap();
        assert_eq!(answered, 0);
    }

    #[tokio::test]
    async fn waiters_are_served_in_arrival_order() {
        let pool = Arc::new(pool(1));
        let held = pool.acquire(Duration::from_millis(10)).await.unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..3 {
            let pool = Arc::clone(&pool);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                let lease = pool.acquire(Duration::from_secs(5)).await.unwrap();
                order.lock().unwrap().push(i);
                tokio::time::sleep(Duration::from_millis(5)).await;
                drop(lease);
            }));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        drop(held);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }
}
