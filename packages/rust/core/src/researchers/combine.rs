use std::collections::BTreeMap;

use async_trait::async_trait;
use deepqa_shared::{Answer, COMBINED_SCORE, Question, Result};

use crate::analysis::Analyzer;
use crate::traits::Researcher;

/// Score that is never a feature of the combination.
const LABEL_SCORE: &str = "correct";

/// Combines the named scores of each answer into the `combined` ranking score
/// with a logistic model: `1 / (1 + e^-(bias + Σ wᵢ·sᵢ))`.
///
/// Withheld and unweighted scores contribute nothing. A passage-level score
/// enters as its maximum over the answer's passages.
pub struct CombineScores {
    bias: f64,
    weights: BTreeMap<String, f64>,
}

impl CombineScores {
    pub fn new(bias: f64, weights: BTreeMap<String, f64>) -> Self {
        Self { bias, weights }
    }

    /// Combined score for one answer.
    pub fn combine(&self, answer: &Answer) -> f64 {
        let mut features: BTreeMap<&str, f64> = BTreeMap::new();
        for passage in &answer.passages {
            for (name, value) in &passage.scores {
                if let Some(v) = value {
                    features
                        .entry(name.as_str())
                        .and_modify(|best| *best = best.max(*v))
                        .or_insert(*v);
                }
            }
        }
        for (name, value) in &answer.scores {
            if let Some(v) = value {
                features.insert(name.as_str(), *v);
            }
        }

        let z = features
            .iter()
            .filter(|(name, _)| **name != LABEL_SCORE && **name != COMBINED_SCORE)
            .filter_map(|(name, v)| self.weights.get(*name).map(|w| w * v))
            .fold(self.bias, |acc, x| acc + x);
        1.0 / (1.0 + (-z).exp())
    }
}

#[async_trait]
impl Researcher for CombineScores {
    fn name(&self) -> &str {
        "combine_scores"
    }

    async fn process(&self, question: &mut Question, _analyzer: &mut Analyzer) -> Result<()> {
        for answer in &mut question.answers {
            let combined = self.combine(answer);
            answer.set_score(COMBINED_SCORE, combined);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepqa_shared::Passage;

    fn combiner() -> CombineScores {
        let weights = BTreeMap::from([
            ("a".to_string(), 1.0),
            ("term".to_string(), 2.0),
            ("correct".to_string(), 100.0),
        ]);
        CombineScores::new(-1.0, weights)
    }

    #[test]
    fn logistic_over_weighted_scores() {
        let q = Question::new("q");
        let mut answer = Answer::new(q.id, "x");
        answer.set_score("a", 1.0);
        answer.set_score("unweighted", 50.0);
        answer.withhold_score("term");
        answer.set_score("correct", 1.0);
        assert!((combiner().combine(&answer) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn passage_scores_enter_as_their_maximum() {
        let q = Question::new("q");
        let mut answer = Answer::new(q.id, "x");
        let mut p1 = Passage::new("web", "x", "a", "s1");
        p1.set_score("term", 0.25);
        let mut p2 = Passage::new("web", "x", "b", "s2");
        p2.set_score("term", 0.5);
        answer.add_passage(p1);
        answer.add_passage(p2);

        let expected = 1.0 / (1.0 + (-(-1.0 + 2.0 * 0.5_f64)).exp());
        assert!((combiner().combine(&answer) - expected).abs() < 1e-12);
    }

    #[tokio::test]
    async fn higher_evidence_ranks_first() {
        let mut analyzer = Analyzer::with_builtin_names();
        let mut q = Question::new("q");
        q.add_passages(vec![
            Passage::new("web", "weak", "a", "s1"),
            Passage::new("web", "strong", "b", "s2"),
        ]);
        q.answers[0].set_score("a", 0.1);
        q.answers[1].set_score("a", 3.0);

        combiner().process(&mut q, &mut analyzer).await.unwrap();

        let ranked = q.ranked_answers();
        assert_eq!(ranked[0].text, "strong");
        assert!(ranked[0].score(COMBINED_SCORE).unwrap() > ranked[1].score(COMBINED_SCORE).unwrap());
    }
}
