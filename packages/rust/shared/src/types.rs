//! Core domain types: questions, candidate answers, and supporting passages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of the composite score used to rank answers.
pub const COMBINED_SCORE: &str = "combined";

/// Named scores. `None` marks a withheld value, which is not the same as zero.
pub type ScoreMap = BTreeMap<String, Option<f64>>;

// ---------------------------------------------------------------------------
// QuestionId
// ---------------------------------------------------------------------------

/// A UUID v7 handle identifying a question (time-sortable).
///
/// Answers keep this as their back-reference; it never owns anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(pub Uuid);

impl QuestionId {
    /// Generate a new question identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for QuestionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for QuestionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Passage
// ---------------------------------------------------------------------------

/// A retrieved span of source text with provenance and its own scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Title or summary; becomes the candidate text when promoted.
    pub title: String,
    /// Retrieved text.
    pub body: String,
    /// Source identifier (document id or URL).
    pub source: String,
    /// Name of the searcher that produced this passage.
    pub engine: String,
    /// 1-based position in the producing searcher's results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
    /// Backend relevance score, when the backend reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_score: Option<f64>,
    /// Per-passage scores written by passage scorers.
    #[serde(default)]
    pub scores: ScoreMap,
}

impl Passage {
    /// Create an unscored passage.
    pub fn new(
        engine: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            source: source.into(),
            engine: engine.into(),
            rank: None,
            engine_score: None,
            scores: ScoreMap::new(),
        }
    }

    /// Set the position in the producing searcher's result list.
    pub fn with_rank(mut self, rank: u32) -> Self {
        self.rank = Some(rank);
        self
    }

    /// Set the backend relevance score.
    pub fn with_engine_score(mut self, score: f64) -> Self {
        self.engine_score = Some(score);
        self
    }

    /// Two passages carry the same evidence when text and source match.
    pub fn same_evidence(&self, other: &Passage) -> bool {
        self.body == other.body && self.source == other.source
    }

    /// Write (or overwrite) a named score.
    pub fn set_score(&mut self, name: &str, value: f64) {
        self.scores.insert(name.to_string(), Some(value));
    }

    /// Record that a scorer ran but withheld its value.
    pub fn withhold_score(&mut self, name: &str) {
        self.scores.insert(name.to_string(), None);
    }

    /// Read a named score; missing and withheld both read as `None`.
    pub fn score(&self, name: &str) -> Option<f64> {
        self.scores.get(name).copied().flatten()
    }
}

// ---------------------------------------------------------------------------
// Answer
// ---------------------------------------------------------------------------

/// A candidate answer aggregating supporting passages and named scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    /// Back-reference to the owning question.
    pub question_id: QuestionId,
    /// Candidate answer text.
    pub text: String,
    /// Named scores.
    #[serde(default)]
    pub scores: ScoreMap,
    /// Supporting evidence, possibly from several searchers.
    #[serde(default)]
    pub passages: Vec<Passage>,
    /// Entity tag set by researchers (e.g. `person`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl Answer {
    /// Create an answer with no passages or scores.
    pub fn new(question_id: QuestionId, text: impl Into<String>) -> Self {
        Self {
            question_id,
            text: text.into(),
            scores: ScoreMap::new(),
            passages: Vec::new(),
            entity: None,
        }
    }

    /// Write (or overwrite) a named score. Other entries are untouched.
    pub fn set_score(&mut self, name: &str, value: f64) {
        self.scores.insert(name.to_string(), Some(value));
    }

    /// Record that a scorer ran but withheld its value.
    pub fn withhold_score(&mut self, name: &str) {
        self.scores.insert(name.to_string(), None);
    }

    /// Write a score that may be withheld.
    pub fn put_score(&mut self, name: &str, value: Option<f64>) {
        self.scores.insert(name.to_string(), value);
    }

    /// Read a named score; missing and withheld both read as `None`.
    pub fn score(&self, name: &str) -> Option<f64> {
        self.scores.get(name).copied().flatten()
    }

    /// Attach a passage unless the same evidence is already attached.
    /// Returns whether the passage was added.
    pub fn add_passage(&mut self, passage: Passage) -> bool {
        if self.passages.iter().any(|p| p.same_evidence(&passage)) {
            return false;
        }
        self.passages.push(passage);
        true
    }

    /// Fold another answer for the same candidate into this one.
    ///
    /// Passages are deduplicated; scores already present here win.
    pub fn absorb(&mut self, other: Answer) {
        for passage in other.passages {
            self.add_passage(passage);
        }
        for (name, value) in other.scores {
            self.scores.entry(name).or_insert(value);
        }
        if self.entity.is_none() {
            self.entity = other.entity;
        }
    }

    /// Borrowed view used for the outbound JSON response.
    pub fn view(&self) -> AnswerView<'_> {
        AnswerView {
            text: &self.text,
            scores: &self.scores,
        }
    }
}

/// Outbound JSON shape of an answer: text plus named scores (withheld → `null`).
#[derive(Debug, Serialize)]
pub struct AnswerView<'a> {
    pub text: &'a str,
    pub scores: &'a ScoreMap,
}

// ---------------------------------------------------------------------------
// Question classification
// ---------------------------------------------------------------------------

/// Question class, detected from the clue text and category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QType {
    #[default]
    Factoid,
    Fitb,
    CommonBonds,
    Anagram,
    BeforeAndAfter,
    Quotation,
}

/// Byte span of one run of underscores in the raw text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlankSpan {
    pub begin: usize,
    pub end: usize,
}

/// Fill-in-the-blank annotations: blanks and the text on either side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitbAnnotations {
    pub blanks: Vec<BlankSpan>,
    /// Byte range of the text leading up to the first blank.
    pub section1: (usize, usize),
    /// Byte range of the text following the last blank.
    pub section2: (usize, usize),
}

impl FitbAnnotations {
    /// Text before the first blank, without quotes or surrounding whitespace.
    pub fn section1_text<'a>(&self, raw: &'a str) -> &'a str {
        slice_clean(raw, self.section1)
    }

    /// Text after the last blank, without quotes or surrounding whitespace.
    pub fn section2_text<'a>(&self, raw: &'a str) -> &'a str {
        slice_clean(raw, self.section2)
    }
}

fn slice_clean(raw: &str, (begin, end): (usize, usize)) -> &str {
    raw.get(begin..end)
        .unwrap_or("")
        .trim_matches(|c: char| c == '"' || c.is_whitespace())
}

// ---------------------------------------------------------------------------
// Question
// ---------------------------------------------------------------------------

/// The in-flight unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    /// Handle that answers point back to.
    pub id: QuestionId,
    /// Text as received.
    pub raw_text: String,
    /// Working text; researchers may rewrite it.
    pub text: String,
    /// Known correct answer, when reconstituted for training or evaluation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    /// Category label.
    #[serde(default)]
    pub category: String,
    /// Simple lexical answer type (`year`, `date`, `person`, ... or empty).
    #[serde(default)]
    pub simple_lat: String,
    /// Detected question class.
    #[serde(default)]
    pub qtype: QType,
    /// Blank annotations (empty unless the question is FITB).
    #[serde(default)]
    pub fitb: FitbAnnotations,
    /// Candidate answers, unique by text.
    #[serde(default)]
    pub answers: Vec<Answer>,
}

impl Question {
    /// Create a question from raw request text.
    pub fn new(text: impl Into<String>) -> Self {
        let raw_text: String = text.into();
        Self {
            id: QuestionId::new(),
            text: raw_text.clone(),
            raw_text,
            answer: None,
            category: String::new(),
            simple_lat: String::new(),
            qtype: QType::default(),
            fitb: FitbAnnotations::default(),
            answers: Vec::new(),
        }
    }

    /// Reconstitute a stored question with its known answer and category.
    pub fn known(
        text: impl Into<String>,
        answer: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        let mut question = Self::new(text);
        question.answer = Some(answer.into());
        question.category = category.into();
        question
    }

    /// Promote searcher passages into answers.
    ///
    /// A passage joins the answer whose text equals its title, or creates a new
    /// one. Passages already attached (same text and source) are dropped.
    /// Returns the number of passages actually attached.
    pub fn add_passages(&mut self, passages: impl IntoIterator<Item = Passage>) -> usize {
        let mut attached = 0;
        for passage in passages {
            let candidate = passage.title.trim();
            if candidate.is_empty() {
                tracing::trace!(source = %passage.source, "passage without title, not promoted");
                continue;
            }
            match self.answers.iter_mut().find(|a| a.text == candidate) {
                Some(answer) => {
                    if answer.add_passage(passage) {
                        attached += 1;
                    }
                }
                None => {
                    let mut answer = Answer::new(self.id, candidate);
                    answer.add_passage(passage);
                    self.answers.push(answer);
                    attached += 1;
                }
            }
        }
        attached
    }

    /// Find an answer by exact candidate text.
    pub fn answer_by_text(&self, text: &str) -> Option<&Answer> {
        self.answers.iter().find(|a| a.text == text)
    }

    /// Total number of passages across all answers.
    pub fn passage_count(&self) -> usize {
        self.answers.iter().map(|a| a.passages.len()).sum()
    }

    /// Answers ordered by the composite score, best first.
    ///
    /// Answers without a composite score go last; ties keep insertion order.
    pub fn ranked_answers(&self) -> Vec<&Answer> {
        let mut ranked: Vec<&Answer> = self.answers.iter().collect();
        ranked.sort_by(|a, b| {
            match (a.score(COMBINED_SCORE), b.score(COMBINED_SCORE)) {
                (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(std::cmp::Ordering::Equal),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }
        });
        ranked
    }

    /// Serialize the ranked answers as the outbound JSON array.
    pub fn ranked_json(&self) -> serde_json::Result<String> {
        let views: Vec<AnswerView<'_>> = self.ranked_answers().into_iter().map(Answer::view).collect();
        serde_json::to_string(&views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(title: &str, body: &str, source: &str) -> Passage {
        Passage::new("stub", title, body, source)
    }

    #[test]
    fn duplicate_passage_yields_one_answer_with_one_passage() {
        let mut q = Question::new("When was the Magna Carta signed?");
        let p = passage("1215", "Signed at Runnymede in 1215.", "doc-1");
        assert_eq!(q.add_passages(vec![p.clone(), p.clone()]), 1);
        assert_eq!(q.add_passages(vec![p]), 0);

        assert_eq!(q.answers.len(), 1);
        assert_eq!(q.answers[0].passages.len(), 1);
    }

    #[test]
    fn same_title_different_evidence_merges_into_one_answer() {
        let mut q = Question::new("When was the Magna Carta signed?");
        q.add_passages(vec![
            passage("1215", "Runnymede, June 1215.", "fulltext:1"),
            passage("1215", "King John sealed it in 1215.", "web:2"),
        ]);

        assert_eq!(q.answers.len(), 1);
        assert_eq!(q.answers[0].text, "1215");
        assert_eq!(q.answers[0].passages.len(), 2);
        assert_eq!(q.answers[0].question_id, q.id);
    }

    #[test]
    fn untitled_passages_are_not_promoted() {
        let mut q = Question::new("x");
        assert_eq!(q.add_passages(vec![passage("  ", "body", "s")]), 0);
        assert!(q.answers.is_empty());
    }

    #[test]
    fn set_score_leaves_other_entries_alone() {
        let mut a = Answer::new(QuestionId::new(), "1215");
        a.set_score("y", 0.25);
        a.withhold_score("correct");
        a.set_score("x", 1.0);
        a.set_score("x", 2.0);

        assert_eq!(a.score("x"), Some(2.0));
        assert_eq!(a.score("y"), Some(0.25));
        assert_eq!(a.score("correct"), None);
        assert!(a.scores.contains_key("correct"));
        assert_eq!(a.score("missing"), None);
    }

    #[test]
    fn ranked_answers_order_by_combined_with_unscored_last() {
        let mut q = Question::new("q");
        for text in ["a", "b", "c", "d"] {
            q.answers.push(Answer::new(q.id, text));
        }
        q.answers[0].set_score(COMBINED_SCORE, 0.2);
        q.answers[2].set_score(COMBINED_SCORE, 0.9);
        q.answers[3].set_score(COMBINED_SCORE, 0.2);

        let order: Vec<&str> = q.ranked_answers().iter().map(|a| a.text.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "d", "b"]);
    }

    #[test]
    fn ranked_json_renders_withheld_as_null() {
        let mut q = Question::new("q");
        q.add_passages(vec![passage("1215", "b", "s")]);
        q.answers[0].withhold_score("correct");
        q.answers[0].set_score(COMBINED_SCORE, 0.5);

        let json = q.ranked_json().expect("serialize");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(value[0]["text"], "1215");
        assert!(value[0]["scores"]["correct"].is_null());
        assert_eq!(value[0]["scores"]["combined"], 0.5);
    }

    #[test]
    fn absorb_keeps_existing_scores() {
        let id = QuestionId::new();
        let mut a = Answer::new(id, "Paris");
        a.set_score("x", 1.0);
        a.add_passage(passage("Paris", "one", "s1"));

        let mut b = Answer::new(id, "paris");
        b.set_score("x", 5.0);
        b.set_score("y", 2.0);
        b.add_passage(passage("paris", "one", "s1"));
        b.add_passage(passage("paris", "two", "s2"));

        a.absorb(b);
        assert_eq!(a.score("x"), Some(1.0));
        assert_eq!(a.score("y"), Some(2.0));
        assert_eq!(a.passages.len(), 2);
    }

    #[test]
    fn known_question_carries_answer_and_category() {
        let q = Question::known("This charter was sealed in 1215", "Magna Carta", "HISTORY");
        assert_eq!(q.answer.as_deref(), Some("Magna Carta"));
        assert_eq!(q.category, "HISTORY");
        assert_eq!(q.text, q.raw_text);
    }

    #[test]
    fn fitb_sections_strip_quotes() {
        let raw = "\"A stitch in ___ saves nine\"";
        let fitb = FitbAnnotations {
            blanks: vec![BlankSpan { begin: 13, end: 16 }],
            section1: (0, 13),
            section2: (16, raw.len()),
        };
        assert_eq!(fitb.section1_text(raw), "A stitch in");
        assert_eq!(fitb.section2_text(raw), "saves nine");
    }
}
