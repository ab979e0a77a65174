use std::sync::Arc;

use async_trait::async_trait;
use deepqa_shared::{Question, Result};
use deepqa_storage::{Storage, TrainingRow};
use tokio::sync::Mutex;

use crate::analysis::Analyzer;
use crate::traits::Researcher;

/// Tees one feature row per answer into storage for model training.
///
/// Rows are buffered by `process` and written in one batch by `complete`.
/// A single instance is shared by every pipeline instance; the buffer is
/// guarded by its own lock.
pub struct TrainingTee {
    storage: Arc<Storage>,
    buffer: Mutex<Vec<TrainingRow>>,
}

impl TrainingTee {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            buffer: Mutex::new(Vec::new()),
        }
    }

    /// Rows waiting for the next flush.
    pub async fn pending(&self) -> usize {
        self.buffer.lock().await.len()
    }
}

#[async_trait]
impl Researcher for TrainingTee {
    fn name(&self) -> &str {
        "training_tee"
    }

    async fn process(&self, question: &mut Question, _analyzer: &mut Analyzer) -> Result<()> {
        let mut rows = Vec::with_capacity(question.answers.len());
        for answer in &question.answers {
            rows.push(TrainingRow {
                question_id: question.id.to_string(),
                question: question.text.clone(),
                candidate: answer.text.clone(),
                is_correct: question
                    .answer
                    .as_deref()
                    .map(|known| known.trim().eq_ignore_ascii_case(answer.text.trim())),
                scores_json: serde_json::to_string(&answer.scores)?,
            });
        }
        self.buffer.lock().await.extend(rows);
        Ok(())
    }

    async fn complete(&self) -> Result<()> {
        let rows = std::mem::take(&mut *self.buffer.lock().await);
        if rows.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.storage.insert_training_rows(&rows).await {
            // Put the batch back ahead of rows buffered since the take.
            let mut buffer = self.buffer.lock().await;
            let newer = std::mem::replace(&mut *buffer, rows);
            buffer.extend(newer);
            tracing::warn!(rows = buffer.len(), error = %e, "training row flush failed, rows kept");
            return Err(e);
        }
        tracing::debug!(rows = rows.len(), "flushed training rows");
        Ok(())
    }
}
