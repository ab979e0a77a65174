//! Pipeline engine: search → early researchers → scorers → late researchers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use deepqa_shared::{DeepQaError, Passage, PipelineSettings, Question, Result};
use deepqa_storage::Storage;
use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use crate::analysis::Analyzer;
use crate::researchers::{
    CombineScores, FitbAnswerExtractor, HyphenTrimmer, MarkupTrimmer, Merge, PassageRetrieval,
    PersonRecognition, QuestionAnalysis, TrainingTee,
};
use crate::scorers::{
    Correct, DateMatches, EngineRank, EngineScore, LatTypeMatch, PassageCount, PassageTermMatch,
};
use crate::traits::{Researcher, Scorer, Searcher};

// ---------------------------------------------------------------------------
// Stage configuration
// ---------------------------------------------------------------------------

/// Ordered stage lists, built once at startup and shared by every instance.
pub struct Stages {
    pub searchers: Vec<Arc<dyn Searcher>>,
    pub early: Vec<Arc<dyn Researcher>>,
    pub scorers: Vec<Scorer>,
    pub late: Vec<Arc<dyn Researcher>>,
    /// Per-call bound on each searcher.
    pub search_timeout: Duration,
}

impl Default for Stages {
    fn default() -> Self {
        Self {
            searchers: Vec::new(),
            early: Vec::new(),
            scorers: Vec::new(),
            late: Vec::new(),
            search_timeout: PipelineSettings::default().search_timeout,
        }
    }
}

impl Stages {
    /// The standard question-answering stage set.
    ///
    /// `training` is the storage that training rows are teed into; the tee is
    /// only configured when `settings.tee` is set and storage is given.
    pub fn standard(
        settings: &PipelineSettings,
        searchers: Vec<Arc<dyn Searcher>>,
        training: Option<Arc<Storage>>,
    ) -> Self {
        let mut early: Vec<Arc<dyn Researcher>> = vec![
            Arc::new(QuestionAnalysis),
            Arc::new(MarkupTrimmer),
            Arc::new(HyphenTrimmer),
            Arc::new(Merge),
            Arc::new(FitbAnswerExtractor),
        ];
        if settings.passage_retrieval && !searchers.is_empty() {
            early.push(Arc::new(PassageRetrieval::new(
                searchers.clone(),
                settings.search_timeout,
            )));
        }
        early.push(Arc::new(MarkupTrimmer));
        early.push(Arc::new(PersonRecognition));

        let mut scorers = vec![
            Scorer::answer(Correct),
            Scorer::answer(DateMatches),
            Scorer::answer(PassageCount),
        ];
        for searcher in &searchers {
            scorers.push(Scorer::answer(EngineRank::new(searcher.name())));
            scorers.push(Scorer::answer(EngineScore::new(searcher.name())));
        }
        scorers.push(Scorer::answer(LatTypeMatch));
        scorers.push(Scorer::passage(PassageTermMatch));

        let mut late: Vec<Arc<dyn Researcher>> = Vec::new();
        if let (true, Some(storage)) = (settings.tee, training) {
            late.push(Arc::new(TrainingTee::new(storage)));
        }
        late.push(Arc::new(CombineScores::new(
            settings.bias,
            settings.weights.clone(),
        )));

        Self {
            searchers,
            early,
            scorers,
            late,
            search_timeout: settings.search_timeout,
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline instance
// ---------------------------------------------------------------------------

/// One pipeline instance: the shared stage lists plus an analyzer of its own.
///
/// `ask` takes `&mut self`, so an instance serves one question at a time.
pub struct Pipeline {
    stages: Arc<Stages>,
    analyzer: Analyzer,
}

impl Pipeline {
    pub fn new(stages: Arc<Stages>, analyzer: Analyzer) -> Self {
        Self { stages, analyzer }
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// Answer a question given as raw text.
    pub async fn ask_text(&mut self, text: &str) -> Result<Question> {
        self.ask(Question::new(text)).await
    }

    /// Run every stage over the question, in order.
    ///
    /// Searcher failures degrade to zero passages. Researcher and scorer
    /// failures are returned as [`DeepQaError::StageFailure`].
    #[instrument(skip_all, fields(question = %question.id))]
    pub async fn ask(&mut self, mut question: Question) -> Result<Question> {
        let start = Instant::now();
        debug!(text = %question.text, "asking");

        self.search(&mut question).await;
        debug!(answers = question.answers.len(), "search complete");

        run_researchers(&self.stages.early, &mut question, &mut self.analyzer).await?;
        debug!(answers = question.answers.len(), "early research complete");

        for scorer in &self.stages.scorers {
            scorer
                .score_question(&mut question)
                .map_err(|e| as_stage_failure(scorer.name(), e))?;
        }
        debug!("scoring complete");

        run_researchers(&self.stages.late, &mut question, &mut self.analyzer).await?;

        info!(
            answers = question.answers.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "question answered"
        );
        Ok(question)
    }

    /// Fan out to every searcher and promote the results, in configured order.
    async fn search(&self, question: &mut Question) {
        let timeout = self.stages.search_timeout;
        let text = question.text.clone();
        let batches = join_all(
            self.stages
                .searchers
                .iter()
                .map(|searcher| run_searcher(searcher.as_ref(), &text, timeout)),
        )
        .await;
        for batch in batches {
            question.add_passages(batch);
        }
    }
}

/// Query one searcher under a timeout. Failures are logged and yield nothing.
pub(crate) async fn run_searcher(
    searcher: &dyn Searcher,
    text: &str,
    timeout: Duration,
) -> Vec<Passage> {
    match query_with_timeout(searcher, text, timeout).await {
        Ok(passages) => {
            debug!(searcher = searcher.name(), count = passages.len(), "searcher returned");
            passages
        }
        Err(e) => {
            warn!(searcher = searcher.name(), error = %e, "searcher failed");
            Vec::new()
        }
    }
}

/// One searcher call bounded by `timeout`; running out of time counts as
/// the backend being unavailable.
pub(crate) async fn query_with_timeout(
    searcher: &dyn Searcher,
    text: &str,
    timeout: Duration,
) -> Result<Vec<Passage>> {
    match tokio::time::timeout(timeout, searcher.query(text)).await {
        Ok(result) => result,
        Err(_) => Err(DeepQaError::backend(
            searcher.name(),
            format!("timed out after {}ms", timeout.as_millis()),
        )),
    }
}

/// Run `process` for every researcher in order, then `complete` in order.
async fn run_researchers(
    researchers: &[Arc<dyn Researcher>],
    question: &mut Question,
    analyzer: &mut Analyzer,
) -> Result<()> {
    for researcher in researchers {
        researcher
            .process(question, analyzer)
            .await
            .map_err(|e| as_stage_failure(researcher.name(), e))?;
    }
    for researcher in researchers {
        researcher
            .complete()
            .await
            .map_err(|e| as_stage_failure(researcher.name(), e))?;
    }
    Ok(())
}

fn as_stage_failure(stage: &str, err: DeepQaError) -> DeepQaError {
    match err {
        e @ DeepQaError::StageFailure { .. } => e,
        other => DeepQaError::stage(stage, other.to_string()),
    }
}
