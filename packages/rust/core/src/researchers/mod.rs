//! Built-in researchers.
//!
//! Early researchers normalize candidates and gather more evidence; late
//! researchers tee out training rows and combine scores into the ranking score.

mod annotate;
mod combine;
mod fitb;
mod merge;
mod retrieval;
mod tee;
mod trim;

use std::collections::HashMap;

use deepqa_shared::{Answer, Question};

pub use annotate::{PersonRecognition, QuestionAnalysis};
pub use combine::CombineScores;
pub use fitb::FitbAnswerExtractor;
pub use merge::Merge;
pub use retrieval::PassageRetrieval;
pub use tee::TrainingTee;
pub use trim::{HyphenTrimmer, MarkupTrimmer};

/// Fold together answers whose texts map to the same key, keeping the first
/// answer's text and position. Returns how many answers were folded away.
pub(crate) fn merge_answers(question: &mut Question, key: impl Fn(&str) -> String) -> usize {
    let before = question.answers.len();
    let mut merged: Vec<Answer> = Vec::with_capacity(before);
    let mut index: HashMap<String, usize> = HashMap::with_capacity(before);

    for answer in question.answers.drain(..) {
        let k = key(&answer.text);
        match index.get(&k) {
            Some(&i) => merged[i].absorb(answer),
            None => {
                index.insert(k, merged.len());
                merged.push(answer);
            }
        }
    }

    question.answers = merged;
    before - question.answers.len()
}

/// Rewrite every candidate text with `rewrite`, dropping candidates that
/// become empty and folding any that collide.
pub(crate) fn rewrite_candidates(question: &mut Question, rewrite: impl Fn(&str) -> String) {
    for answer in &mut question.answers {
        answer.text = rewrite(&answer.text);
    }
    question.answers.retain(|a| !a.text.is_empty());
    merge_answers(question, str::to_string);
}
