//! Question-answering engine for deepqa.
//!
//! This crate holds the stage contracts ([`Searcher`], [`Researcher`],
//! [`Scorer`]), the built-in researchers and scorers, the [`Pipeline`] that
//! sequences them, the [`PipelinePool`] of instances, and the [`Dispatcher`]
//! that serves requests from the pool.

pub mod analysis;
pub mod dataset;
pub mod dispatcher;
pub mod pipeline;
pub mod pool;
pub mod qclass;
pub mod researchers;
pub mod scorers;
pub mod traits;

pub use analysis::Analyzer;
pub use dataset::{GenerateSummary, ProgressReporter, SilentProgress, generate_search_results};
pub use dispatcher::{Dispatcher, Request, Response};
pub use pipeline::{Pipeline, Stages};
pub use pool::{PipelineLease, PipelinePool};
pub use traits::{AnswerScorer, PassageScorer, Researcher, Scorer, Searcher};
