//! Per-instance question analysis resource.
//!
//! An [`Analyzer`] is built once per pipeline instance: it loads the given-name
//! gazetteer and keeps a token scratch buffer that every call reuses. All
//! analysis methods take `&mut self`, so an analyzer can only ever serve one
//! question at a time.

use std::collections::HashSet;
use std::path::Path;

use deepqa_shared::{DeepQaError, Question, Result};
use tracing::debug;

use crate::qclass;

/// Given names recognized even without a gazetteer file.
const BUILTIN_GIVEN_NAMES: &[&str] = &[
    "abraham", "adam", "albert", "alexander", "anne", "benjamin", "carl", "catherine",
    "charles", "charlotte", "david", "edward", "elizabeth", "emily", "ernest", "francis",
    "franklin", "frederick", "george", "harry", "helen", "henry", "isaac", "jack", "james",
    "jane", "john", "joseph", "leonardo", "louis", "margaret", "maria", "marie", "mark",
    "martin", "mary", "michael", "napoleon", "oscar", "paul", "peter", "richard", "robert",
    "samuel", "sarah", "thomas", "victoria", "virginia", "walter", "william", "winston",
];

/// Nouns that, after "this"/"what"/"which", ask for a person.
const PERSON_NOUNS: &[&str] = &[
    "man", "woman", "person", "king", "queen", "president", "author", "writer", "poet",
    "composer", "painter", "artist", "actor", "actress", "scientist", "inventor", "explorer",
    "emperor", "general", "singer", "playwright", "philosopher",
];

/// Linguistic analysis resource owned by exactly one pipeline instance.
pub struct Analyzer {
    given_names: HashSet<String>,
    scratch: Vec<String>,
    analyses: u64,
}

impl Analyzer {
    /// Build an analyzer, extending the built-in names with `names_file` if given.
    pub fn new(names_file: Option<&Path>) -> Result<Self> {
        let mut analyzer = Self::with_builtin_names();
        if let Some(path) = names_file {
            let content =
                std::fs::read_to_string(path).map_err(|e| DeepQaError::io(path, e))?;
            let before = analyzer.given_names.len();
            analyzer.given_names.extend(
                content
                    .lines()
                    .map(|l| l.trim().to_lowercase())
                    .filter(|l| !l.is_empty() && !l.starts_with('#')),
            );
            debug!(
                path = %path.display(),
                added = analyzer.given_names.len() - before,
                "loaded given-name gazetteer"
            );
        }
        Ok(analyzer)
    }

    /// Analyzer with only the built-in name list.
    pub fn with_builtin_names() -> Self {
        Self {
            given_names: BUILTIN_GIVEN_NAMES.iter().map(|s| s.to_string()).collect(),
            scratch: Vec::with_capacity(32),
            analyses: 0,
        }
    }

    /// Number of questions this instance has analyzed.
    pub fn analyses(&self) -> u64 {
        self.analyses
    }

    /// Classify the question and detect its simple lexical answer type.
    pub fn analyze(&mut self, question: &mut Question) {
        let (qtype, fitb) = qclass::classify(&question.raw_text, &question.category);
        question.qtype = qtype;
        question.fitb = fitb;
        question.simple_lat = self.detect_lat(&question.text).to_string();
        self.analyses += 1;
    }

    /// Detect a simple LAT: `year`, `date`, `day`, `person`, or empty.
    pub fn detect_lat(&mut self, text: &str) -> &'static str {
        self.tokenize(text);
        let tokens = &self.scratch;

        for pair in tokens.windows(2) {
            let (head, noun) = (pair[0].as_str(), pair[1].as_str());
            if matches!(head, "what" | "which" | "this") {
                match noun {
                    "year" => return "year",
                    "date" => return "date",
                    "day" => return "day",
                    n if PERSON_NOUNS.contains(&n) => return "person",
                    _ => {}
                }
            }
        }

        if tokens.iter().any(|t| t == "when") {
            return "date";
        }
        if tokens
            .iter()
            .any(|t| matches!(t.as_str(), "who" | "whom" | "whose"))
        {
            return "person";
        }
        ""
    }

    /// Whether a candidate text looks like a person's name: two to four
    /// capitalized words, the first a known given name.
    pub fn is_person(&mut self, text: &str) -> bool {
        let words: Vec<&str> = text.split_whitespace().collect();
        if !(2..=4).contains(&words.len()) {
            return false;
        }
        let capitalized = words
            .iter()
            .all(|w| w.chars().next().is_some_and(char::is_uppercase));
        if !capitalized {
            return false;
        }
        self.tokenize(words[0]);
        self.scratch
            .first()
            .is_some_and(|first| self.given_names.contains(first))
    }

    /// Lowercased alphanumeric tokens of `text`, written into the scratch buffer.
    fn tokenize(&mut self, text: &str) {
        self.scratch.clear();
        self.scratch.extend(
            text.split(|c: char| !c.is_alphanumeric())
                .filter(|t| !t.is_empty())
                .map(str::to_lowercase),
        );
    }
}
