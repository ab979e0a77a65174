//! Shared types, error model, and configuration for deepqa.
//!
//! This crate is the foundation depended on by all other deepqa crates.
//! It provides:
//! - [`DeepQaError`]: the unified error type
//! - Domain types ([`Question`], [`Answer`], [`Passage`], [`QType`])
//! - Configuration ([`AppConfig`], [`ServerConfig`], [`PipelineSettings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AnalysisSection, AppConfig, PipelineSettings, ScoringSection, SearchSection, ServerConfig,
    ServerSection, StorageSection, TrainingSection, WebSearchSection, config_dir,
    config_file_path, expand_home, init_config, load_config, load_config_from,
    resolve_pool_size, validate_config, web_api_key,
};
pub use error::{DeepQaError, Result};
pub use types::{
    Answer, AnswerView, BlankSpan, COMBINED_SCORE, FitbAnnotations, Passage, QType, Question,
    QuestionId, ScoreMap,
};
