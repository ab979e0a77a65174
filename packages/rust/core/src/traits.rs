//! Capability contracts for pipeline stages.
//!
//! Stage lists are ordered collections of these trait objects, configured once
//! at startup and shared by every pipeline instance.

use std::sync::Arc;

use async_trait::async_trait;
use deepqa_shared::{Answer, Passage, Question, Result};

use crate::analysis::Analyzer;

/// Produces passages for a text query against one backend.
///
/// Must be callable concurrently with other searchers. Returns `Ok(vec![])`
/// for "no results"; errors are reserved for backend failures.
#[async_trait]
pub trait Searcher: Send + Sync {
    /// Name used for provenance (`Passage::engine`) and logging.
    fn name(&self) -> &str;

    /// Run the query.
    async fn query(&self, text: &str) -> Result<Vec<Passage>>;
}

/// An ordered, possibly stateful transformation of a question.
///
/// Researchers run one at a time per question, in configured order, with
/// exclusive access to the question. One instance is shared by every pipeline
/// instance, so any state it keeps must be internally synchronized.
#[async_trait]
pub trait Researcher: Send + Sync {
    /// Name used in stage failures and logging.
    fn name(&self) -> &str;

    /// Transform the question in place.
    async fn process(&self, question: &mut Question, analyzer: &mut Analyzer) -> Result<()>;

    /// Called after `process` has run for the current question, for
    /// researchers that batch work (flushing buffers, model runs).
    async fn complete(&self) -> Result<()> {
        Ok(())
    }
}

/// Contributes one named score per answer.
///
/// Returning `Ok(None)` withholds the value (recorded as absent, not zero).
pub trait AnswerScorer: Send + Sync {
    /// Score slot this scorer writes.
    fn name(&self) -> &str;

    fn score_answer(&self, question: &Question, answer: &Answer) -> Result<Option<f64>>;
}

/// Contributes one named score per passage.
pub trait PassageScorer: Send + Sync {
    /// Score slot this scorer writes.
    fn name(&self) -> &str;

    fn score_passage(
        &self,
        question: &Question,
        answer: &Answer,
        passage: &Passage,
    ) -> Result<Option<f64>>;
}

/// A configured scorer: answer-level or passage-level.
#[derive(Clone)]
pub enum Scorer {
    Answer(Arc<dyn AnswerScorer>),
    Passage(Arc<dyn PassageScorer>),
}

impl Scorer {
    /// Wrap an answer scorer.
    pub fn answer(scorer: impl AnswerScorer + 'static) -> Self {
        Self::Answer(Arc::new(scorer))
    }

    /// Wrap a passage scorer.
    pub fn passage(scorer: impl PassageScorer + 'static) -> Self {
        Self::Passage(Arc::new(scorer))
    }

    /// The score slot this scorer writes.
    pub fn name(&self) -> &str {
        match self {
            Self::Answer(s) => s.name(),
            Self::Passage(s) => s.name(),
        }
    }

    /// Score every answer (or every passage) of the question.
    ///
    /// Each target is scored independently: a failure on one answer does not
    /// stop the others from being scored. Scores are computed against a
    /// read-only view first and written afterwards, touching only this
    /// scorer's own slot. The first failure, if any, is returned after all
    /// successful scores are written.
    pub fn score_question(&self, question: &mut Question) -> Result<()> {
        match self {
            Self::Answer(scorer) => {
                let results: Vec<Result<Option<f64>>> = question
                    .answers
                    .iter()
                    .map(|answer| scorer.score_answer(question, answer))
                    .collect();

                let mut first_error = None;
                for (answer, result) in question.answers.iter_mut().zip(results) {
                    match result {
                        Ok(value) => answer.put_score(scorer.name(), value),
                        Err(e) => {
                            tracing::warn!(scorer = scorer.name(), answer = %answer.text, error = %e, "answer scorer failed");
                            first_error.get_or_insert(e);
                        }
                    }
                }
                first_error.map_or(Ok(()), Err)
            }
            Self::Passage(scorer) => {
                let results: Vec<Vec<Result<Option<f64>>>> = question
                    .answers
                    .iter()
                    .map(|answer| {
                        answer
                            .passages
                            .iter()
                            .map(|passage| scorer.score_passage(question, answer, passage))
                            .collect()
                    })
                    .collect();

                let mut first_error = None;
                for (answer, per_passage) in question.answers.iter_mut().zip(results) {
                    for (passage, result) in answer.passages.iter_mut().zip(per_passage) {
                        match result {
                            Ok(Some(value)) => passage.set_score(scorer.name(), value),
                            Ok(None) => passage.withhold_score(scorer.name()),
                            Err(e) => {
                                tracing::warn!(scorer = scorer.name(), source = %passage.source, error = %e, "passage scorer failed");
                                first_error.get_or_insert(e);
                            }
                        }
                    }
                }
                first_error.map_or(Ok(()), Err)
            }
        }
    }
}

impl std::fmt::Debug for Scorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Answer(s) => write!(f, "Scorer::Answer({})", s.name()),
            Self::Passage(s) => write!(f, "Scorer::Passage({})", s.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepqa_shared::DeepQaError;

    struct Length;

    impl AnswerScorer for Length {
        fn name(&self) -> &str {
            "length"
        }

        fn score_answer(&self, _q: &Question, a: &Answer) -> Result<Option<f64>> {
            Ok(Some(a.text.len() as f64))
        }
    }

    /// Fails on one specific candidate.
    struct Picky;

    impl AnswerScorer for Picky {
        fn name(&self) -> &str {
            "picky"
        }

        fn score_answer(&self, _q: &Question, a: &Answer) -> Result<Option<f64>> {
            if a.text == "A" {
                return Err(DeepQaError::stage("picky", "cannot score A"));
            }
            Ok(Some(1.0))
        }
    }

    struct BodyWords;

    impl PassageScorer for BodyWords {
        fn name(&self) -> &str {
            "body_words"
        }

        fn score_passage(&self, _q: &Question, _a: &Answer, p: &Passage) -> Result<Option<f64>> {
            Ok(Some(p.body.split_whitespace().count() as f64))
        }
    }

    fn question() -> Question {
        let mut q = Question::new("q");
        q.add_passages(vec![
            Passage::new("t", "A", "one two", "s1"),
            Passage::new("t", "B", "one two three", "s2"),
        ]);
        q
    }

    #[test]
    fn answer_scorer_writes_only_its_slot() {
        let mut q = question();
        q.answers[0].set_score("x", 7.0);

        Scorer::answer(Length).score_question(&mut q).expect("score");
        assert_eq!(q.answers[0].score("length"), Some(1.0));
        assert_eq!(q.answers[0].score("x"), Some(7.0));
    }

    #[test]
    fn failure_on_one_answer_still_scores_the_others() {
        let mut q = question();
        let err = Scorer::answer(Picky).score_question(&mut q).unwrap_err();

        assert!(matches!(err, DeepQaError::StageFailure { .. }));
        assert!(!q.answers[0].scores.contains_key("picky"));
        assert_eq!(q.answers[1].score("picky"), Some(1.0));
    }

    #[test]
    fn passage_scorer_writes_to_passages() {
        let mut q = question();
        Scorer::passage(BodyWords).score_question(&mut q).expect("score");
        assert_eq!(q.answers[1].passages[0].score("body_words"), Some(3.0));
        assert!(q.answers[1].scores.is_empty());
    }

    #[test]
    fn scorer_name_and_debug() {
        let s = Scorer::passage(BodyWords);
        assert_eq!(s.name(), "body_words");
        assert_eq!(format!("{s:?}"), "Scorer::Passage(body_words)");
    }
}
