use async_trait::async_trait;
use deepqa_shared::{Question, Result};

use crate::analysis::Analyzer;
use crate::traits::Researcher;

/// Classifies the question and detects its lexical answer type.
pub struct QuestionAnalysis;

#[async_trait]
impl Researcher for QuestionAnalysis {
    fn name(&self) -> &str {
        "question_analysis"
    }

    async fn process(&self, question: &mut Question, analyzer: &mut Analyzer) -> Result<()> {
        analyzer.analyze(question);
        tracing::debug!(qtype = ?question.qtype, lat = %question.simple_lat, "question analyzed");
        Ok(())
    }
}

/// Tags candidates that look like people's names with the `person` entity.
pub struct PersonRecognition;

#[async_trait]
impl Researcher for PersonRecognition {
    fn name(&self) -> &str {
        "person_recognition"
    }

    async fn process(&self, question: &mut Question, analyzer: &mut Analyzer) -> Result<()> {
        for answer in &mut question.answers {
            if analyzer.is_person(&answer.text) {
                answer.entity = Some("person".to_string());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepqa_shared::{Passage, QType};

    #[tokio::test]
    async fn analysis_then_person_tagging() {
        let mut analyzer = Analyzer::with_builtin_names();
        let mut q = Question::new("Who was the first US president?");
        q.add_passages(vec![
            Passage::new("stub", "George Washington", "b", "s1"),
            Passage::new("stub", "Mount Vernon", "b", "s2"),
        ]);

        QuestionAnalysis.process(&mut q, &mut analyzer).await.unwrap();
        PersonRecognition.process(&mut q, &mut analyzer).await.unwrap();

        assert_eq!(q.qtype, QType::Factoid);
        assert_eq!(q.simple_lat, "person");
        assert_eq!(q.answers[0].entity.as_deref(), Some("person"));
        assert_eq!(q.answers[1].entity, None);
    }
}
