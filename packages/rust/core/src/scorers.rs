//! Built-in answer and passage scorers.
//!
//! Each scorer writes exactly one named slot. Scorers that have nothing to say
//! about a target return `Ok(None)` so the slot is recorded as withheld.

use std::collections::HashSet;
use std::sync::LazyLock;

use deepqa_shared::{Answer, Passage, Question, Result};
use regex::Regex;

use crate::traits::{AnswerScorer, PassageScorer};

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\d{2}|\d{4})$").expect("valid regex"));

static DAY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{1,2}$").expect("valid regex"));

static MONTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)\.?\w*|\d{1,2})$")
        .expect("valid regex")
});

/// Words too common to count as question content.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "did", "do", "does", "for", "from", "had",
    "has", "have", "he", "her", "his", "in", "is", "it", "its", "of", "on", "or", "she", "that",
    "the", "their", "this", "to", "was", "were", "what", "when", "where", "which", "who", "whom",
    "why", "with",
];

// ---------------------------------------------------------------------------
// Answer scorers
// ---------------------------------------------------------------------------

/// 1 when the candidate matches the known answer, 0 when it does not.
/// Withheld when the question carries no known answer.
pub struct Correct;

impl AnswerScorer for Correct {
    fn name(&self) -> &str {
        "correct"
    }

    fn score_answer(&self, question: &Question, answer: &Answer) -> Result<Option<f64>> {
        Ok(question.answer.as_deref().map(|known| {
            if known.trim().eq_ignore_ascii_case(answer.text.trim()) {
                1.0
            } else {
                0.0
            }
        }))
    }
}

/// Whether the question asks for a date and the candidate looks like one.
pub struct DateMatches;

impl DateMatches {
    fn maybe_year(text: &str) -> bool {
        YEAR_RE.is_match(text)
    }

    /// Up to three parts separated by spaces, hyphens or commas: month and
    /// day, or year and month.
    fn maybe_date(text: &str) -> bool {
        let parts: Vec<&str> = text
            .split(|c: char| c == ' ' || c == '-' || c == ',')
            .filter(|p| !p.is_empty())
            .take(3)
            .collect();
        if parts.len() < 2 {
            return false;
        }
        let years = parts.iter().any(|p| Self::maybe_year(p));
        let months = parts.iter().any(|p| MONTH_RE.is_match(p));
        let days = parts.iter().any(|p| DAY_RE.is_match(p));
        (months && days) || (years && months)
    }
}

impl AnswerScorer for DateMatches {
    fn name(&self) -> &str {
        "date_matches"
    }

    fn score_answer(&self, question: &Question, answer: &Answer) -> Result<Option<f64>> {
        let text = answer.text.trim();
        let hit = match question.simple_lat.to_lowercase().as_str() {
            "year" => Self::maybe_year(text),
            "date" | "day" => Self::maybe_date(text),
            _ => false,
        };
        Ok(Some(if hit { 1.0 } else { 0.0 }))
    }
}

/// Number of supporting passages.
pub struct PassageCount;

impl AnswerScorer for PassageCount {
    fn name(&self) -> &str {
        "passage_count"
    }

    fn score_answer(&self, _question: &Question, answer: &Answer) -> Result<Option<f64>> {
        Ok(Some(answer.passages.len() as f64))
    }
}

/// Best (lowest) 1-based rank among passages from one engine.
pub struct EngineRank {
    engine: String,
    slot: String,
}

impl EngineRank {
    pub fn new(engine: impl Into<String>) -> Self {
        let engine = engine.into();
        let slot = format!("{engine}_rank");
        Self { engine, slot }
    }
}

impl AnswerScorer for EngineRank {
    fn name(&self) -> &str {
        &self.slot
    }

    fn score_answer(&self, _question: &Question, answer: &Answer) -> Result<Option<f64>> {
        Ok(answer
            .passages
            .iter()
            .filter(|p| p.engine == self.engine)
            .filter_map(|p| p.rank)
            .min()
            .map(f64::from))
    }
}

/// Best backend relevance score among passages from one engine.
pub struct EngineScore {
    engine: String,
    slot: String,
}

impl EngineScore {
    pub fn new(engine: impl Into<String>) -> Self {
        let engine = engine.into();
        let slot = format!("{engine}_score");
        Self { engine, slot }
    }
}

impl AnswerScorer for EngineScore {
    fn name(&self) -> &str {
        &self.slot
    }

    fn score_answer(&self, _question: &Question, answer: &Answer) -> Result<Option<f64>> {
        Ok(answer
            .passages
            .iter()
            .filter(|p| p.engine == self.engine)
            .filter_map(|p| p.engine_score)
            .reduce(f64::max))
    }
}

/// 1 when the question wants a person and the candidate was tagged as one.
pub struct LatTypeMatch;

impl AnswerScorer for LatTypeMatch {
    fn name(&self) -> &str {
        "lat_type_match"
    }

    fn score_answer(&self, question: &Question, answer: &Answer) -> Result<Option<f64>> {
        let hit = question.simple_lat == "person" && answer.entity.as_deref() == Some("person");
        Ok(Some(if hit { 1.0 } else { 0.0 }))
    }
}

// ---------------------------------------------------------------------------
// Passage scorers
// ---------------------------------------------------------------------------

/// Fraction of distinct question content words present in the passage body.
pub struct PassageTermMatch;

impl PassageScorer for PassageTermMatch {
    fn name(&self) -> &str {
        "passage_term_match"
    }

    fn score_passage(
        &self,
        question: &Question,
        _answer: &Answer,
        passage: &Passage,
    ) -> Result<Option<f64>> {
        let wanted = content_words(&question.text);
        if wanted.is_empty() {
            return Ok(None);
        }
        let body = content_words(&passage.body);
        let found = wanted.iter().filter(|w| body.contains(*w)).count();
        Ok(Some(found as f64 / wanted.len() as f64))
    }
}

/// Distinct lowercased words of `text`, minus stopwords.
pub(crate) fn content_words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Scorer;

    fn question_with(lat: &str, candidates: &[&str]) -> Question {
        let mut q = Question::new("When was the Magna Carta signed?");
        q.simple_lat = lat.to_string();
        for (i, c) in candidates.iter().enumerate() {
            q.add_passages(vec![Passage::new("stub", *c, "body", format!("s{i}"))]);
        }
        q
    }

    #[test]
    fn correct_is_withheld_without_known_answer() {
        let mut q = question_with("", &["1215"]);
        Scorer::answer(Correct).score_question(&mut q).unwrap();
        assert!(q.answers[0].scores.contains_key("correct"));
        assert_eq!(q.answers[0].score("correct"), None);

        q.answer = Some(" 1215".into());
        Scorer::answer(Correct).score_question(&mut q).unwrap();
        assert_eq!(q.answers[0].score("correct"), Some(1.0));
    }

    #[test]
    fn date_matches_follows_the_lat() {
        let q = question_with("year", &[]);
        let a = Answer::new(q.id, "1215");
        assert_eq!(DateMatches.score_answer(&q, &a).unwrap(), Some(1.0));
        let a = Answer::new(q.id, "King John");
        assert_eq!(DateMatches.score_answer(&q, &a).unwrap(), Some(0.0));

        let q = question_with("date", &[]);
        for (text, want) in [
            ("June 15, 1215", 1.0),
            ("15 June", 1.0),
            ("Jun 1215", 1.0),
            ("1215", 0.0),
            ("Runnymede meadow", 0.0),
        ] {
            let a = Answer::new(q.id, text);
            assert_eq!(DateMatches.score_answer(&q, &a).unwrap(), Some(want), "{text}");
        }

        let q = question_with("", &[]);
        let a = Answer::new(q.id, "1215");
        assert_eq!(DateMatches.score_answer(&q, &a).unwrap(), Some(0.0));
    }

    #[test]
    fn engine_rank_and_score_pick_the_best_passage() {
        let mut q = Question::new("q");
        q.add_passages(vec![
            Passage::new("fulltext", "1215", "a", "s1").with_rank(3).with_engine_score(2.5),
            Passage::new("fulltext", "1215", "b", "s2").with_rank(1).with_engine_score(4.0),
            Passage::new("web", "1215", "c", "s3").with_rank(2),
        ]);
        let a = &q.answers[0];

        let rank = EngineRank::new("fulltext");
        assert_eq!(rank.name(), "fulltext_rank");
        assert_eq!(rank.score_answer(&q, a).unwrap(), Some(1.0));
        assert_eq!(EngineScore::new("fulltext").score_answer(&q, a).unwrap(), Some(4.0));
        assert_eq!(EngineScore::new("web").score_answer(&q, a).unwrap(), None);
        assert_eq!(EngineRank::new("bing").score_answer(&q, a).unwrap(), None);
    }

    #[test]
    fn passage_count_and_lat_type() {
        let mut q = question_with("person", &["George Washington", "George Washington"]);
        q.answers[0].entity = Some("person".into());
        let a = &q.answers[0];
        assert_eq!(PassageCount.score_answer(&q, a).unwrap(), Some(2.0));
        assert_eq!(LatTypeMatch.score_answer(&q, a).unwrap(), Some(1.0));

        q.simple_lat = "year".into();
        assert_eq!(LatTypeMatch.score_answer(&q, &q.answers[0]).unwrap(), Some(0.0));
    }

    #[test]
    fn term_match_counts_content_words() {
        let q = Question::new("When was the Magna Carta signed?");
        let a = Answer::new(q.id, "1215");
        let p = Passage::new("stub", "1215", "The Magna Carta was sealed in 1215.", "s");
        let score = PassageTermMatch.score_passage(&q, &a, &p).unwrap().unwrap();
        assert!((score - 2.0 / 3.0).abs() < 1e-9);

        let empty = Question::new("what is the");
        assert_eq!(PassageTermMatch.score_passage(&empty, &a, &p).unwrap(), None);
    }
}
