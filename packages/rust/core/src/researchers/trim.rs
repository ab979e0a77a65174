//! Candidate text cleanup.

use std::sync::LazyLock;

use async_trait::async_trait;
use deepqa_shared::{Question, Result};
use regex::Regex;

use super::rewrite_candidates;
use crate::analysis::Analyzer;
use crate::traits::Researcher;

/// `[[target|label]]` or `[[target]]`.
static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[(?:[^\]|]*\|)?([^\]]*)\]\]").expect("valid regex"));

static TEMPLATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{[^}]*\}\}").expect("valid regex"));

static EMPHASIS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"'{2,}").expect("valid regex"));

static TRAILING_PAREN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([^()]*\)\s*$").expect("valid regex"));

static SPACES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Strips wiki markup from candidate text.
pub struct MarkupTrimmer;

impl MarkupTrimmer {
    pub fn trim(text: &str) -> String {
        let text = LINK_RE.replace_all(text, "$1");
        let text = TEMPLATE_RE.replace_all(&text, "");
        let text = EMPHASIS_RE.replace_all(&text, "");
        let text = TRAILING_PAREN_RE.replace(&text, "");
        SPACES_RE.replace_all(text.trim(), " ").into_owned()
    }
}

#[async_trait]
impl Researcher for MarkupTrimmer {
    fn name(&self) -> &str {
        "markup_trimmer"
    }

    async fn process(&self, question: &mut Question, _analyzer: &mut Analyzer) -> Result<()> {
        rewrite_candidates(question, Self::trim);
        Ok(())
    }
}

/// Drops the site-name suffix web results carry in their titles.
pub struct HyphenTrimmer;

impl HyphenTrimmer {
    pub fn trim(text: &str) -> String {
        let mut text = text;
        for sep in [" - ", " | "] {
            if let Some((head, _)) = text.rsplit_once(sep) {
                if !head.trim().is_empty() {
                    text = head;
                }
            }
        }
        text.trim().to_string()
    }
}

#[async_trait]
impl Researcher for HyphenTrimmer {
    fn name(&self) -> &str {
        "hyphen_trimmer"
    }

    async fn process(&self, question: &mut Question, _analyzer: &mut Analyzer) -> Result<()> {
        rewrite_candidates(question, Self::trim);
        Ok(())
    }
}
