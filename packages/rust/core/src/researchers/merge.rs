use async_trait::async_trait;
use deepqa_shared::{Question, Result};

use super::merge_answers;
use crate::analysis::Analyzer;
use crate::traits::Researcher;

/// Merges answers whose candidates differ only in case, spacing or punctuation.
pub struct Merge;

impl Merge {
    /// Comparison key: lowercase alphanumeric words joined by single spaces.
    pub fn key(text: &str) -> String {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl Researcher for Merge {
    fn name(&self) -> &str {
        "merge"
    }

    async fn process(&self, question: &mut Question, _analyzer: &mut Analyzer) -> Result<()> {
        let folded = merge_answers(question, Self::key);
        if folded > 0 {
            tracing::debug!(folded, remaining = question.answers.len(), "merged answers");
        }
        Ok(())
    }
}
