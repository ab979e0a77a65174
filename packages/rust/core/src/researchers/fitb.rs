use async_trait::async_trait;
use deepqa_shared::{QType, Question, Result};

use super::merge_answers;
use crate::analysis::Analyzer;
use crate::traits::Researcher;

/// Longest fill, in words, accepted as a blank's answer.
const MAX_FILL_WORDS: usize = 5;

/// For fill-in-the-blank questions, rewrites each candidate to the words that
/// fill the blank, found between the text on either side of the blank in the
/// candidate itself or in one of its passages.
pub struct FitbAnswerExtractor;

impl FitbAnswerExtractor {
    /// Text between `before` and `after` in `haystack`, matched
    /// case-insensitively. An empty `after` runs to the next clause break.
    pub fn extract_between(haystack: &str, before: &str, after: &str) -> Option<String> {
        if before.is_empty() && after.is_empty() {
            return None;
        }
        let lower = haystack.to_ascii_lowercase();
        let start = if before.is_empty() {
            0
        } else {
            lower.find(&before.to_ascii_lowercase())? + before.len()
        };
        let rest = &lower[start..];
        let len = if after.is_empty() {
            rest.find(['.', ',', ';', '!', '?', '"']).unwrap_or(rest.len())
        } else {
            rest.find(&after.to_ascii_lowercase())?
        };

        let fill = haystack[start..start + len].trim();
        let words = fill.split_whitespace().count();
        (1..=MAX_FILL_WORDS)
            .contains(&words)
            .then(|| fill.to_string())
    }
}

#[async_trait]
impl Researcher for FitbAnswerExtractor {
    fn name(&self) -> &str {
        "fitb_answer_extractor"
    }

    async fn process(&self, question: &mut Question, _analyzer: &mut Analyzer) -> Result<()> {
        if question.qtype != QType::Fitb {
            return Ok(());
        }
        let before = question.fitb.section1_text(&question.raw_text).to_string();
        let after = question.fitb.section2_text(&question.raw_text).to_string();

        let mut rewritten = 0;
        for answer in &mut question.answers {
            let fill = std::iter::once(answer.text.as_str())
                .chain(answer.passages.iter().map(|p| p.body.as_str()))
                .find_map(|text| Self::extract_between(text, &before, &after));
            if let Some(fill) = fill {
                answer.text = fill;
                rewritten += 1;
            }
        }
        merge_answers(question, str::to_lowercase);
        tracing::debug!(rewritten, "extracted blank fills");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepqa_shared::Passage;

    #[test]
    fn fill_between_sections() {
        assert_eq!(
            FitbAnswerExtractor::extract_between(
                "A stitch in time saves nine, they say",
                "a stitch in",
                "saves nine"
            ),
            Some("time".to_string())
        );
        assert_eq!(
            FitbAnswerExtractor::extract_between("Tom and Jerry, the cartoon", "", "and jerry"),
            Some("Tom".to_string())
        );
        assert_eq!(
            FitbAnswerExtractor::extract_between("Salt and pepper.", "salt and", ""),
            Some("pepper".to_string())
        );
        assert_eq!(FitbAnswerExtractor::extract_between("unrelated", "a stitch in", ""), None);
        assert_eq!(FitbAnswerExtractor::extract_between("anything", "", ""), None);
    }

    #[tokio::test]
    async fn fitb_candidates_are_rewritten_and_merged() {
        let mut analyzer = Analyzer::with_builtin_names();
        let mut q = Question::new(r#"Proverbially, "a stitch in ___ saves nine""#);
        analyzer.analyze(&mut q);
        q.add_passages(vec![
            Passage::new("web", "Proverb", "A stitch in time saves nine.", "s1"),
            Passage::new("web", "Time", "Time and tide wait for no man.", "s2"),
            Passage::new("web", "Sewing", "Needles and thread.", "s3"),
        ]);

        FitbAnswerExtractor.process(&mut q, &mut analyzer).await.unwrap();

        let texts: Vec<&str> = q.answers.iter().map(|a| a.text.as_str()).collect();
        assert_eq!(texts, vec!["time", "Sewing"]);
        assert_eq!(q.answers[0].passages.len(), 2);
    }

    #[tokio::test]
    async fn other_questions_are_untouched() {
        let mut analyzer = Analyzer::with_builtin_names();
        let mut q = Question::new("Who sealed the charter?");
        analyzer.analyze(&mut q);
        q.add_passages(vec![Passage::new("web", "King John", "x", "s1")]);
        FitbAnswerExtractor.process(&mut q, &mut analyzer).await.unwrap();
        assert_eq!(q.answers[0].text, "King John");
    }
}
