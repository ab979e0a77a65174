//! Application configuration for deepqa.
//!
//! User config lives at `~/.deepqa/deepqa.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DeepQaError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "deepqa.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".deepqa";

// ---------------------------------------------------------------------------
// Config structs (matching deepqa.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Front door and pipeline pool.
    #[serde(default)]
    pub server: ServerSection,

    /// Search backends.
    #[serde(default)]
    pub search: SearchSection,

    /// Database location.
    #[serde(default)]
    pub storage: StorageSection,

    /// Score combination weights.
    #[serde(default)]
    pub scoring: ScoringSection,

    /// Training data generation.
    #[serde(default)]
    pub training: TrainingSection,

    /// Question analysis resources.
    #[serde(default)]
    pub analysis: AnalysisSection,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Address the WebSocket front door listens on.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Number of pipeline instances. 0 means one per available processing unit.
    #[serde(default)]
    pub pool_size: usize,

    /// How long a request may wait for a free pipeline instance.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Maximum number of accepted requests waiting or running at once.
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            pool_size: 0,
            acquire_timeout_secs: default_acquire_timeout(),
            max_pending: default_max_pending(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8887".into()
}
fn default_acquire_timeout() -> u64 {
    60
}
fn default_max_pending() -> usize {
    1024
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSection {
    /// Per-call timeout applied to every searcher.
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,

    /// Maximum passages requested from each searcher.
    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// Query the local full-text passage corpus.
    #[serde(default = "default_true")]
    pub full_text: bool,

    /// Run secondary passage retrieval for every candidate.
    #[serde(default = "default_true")]
    pub passage_retrieval: bool,

    /// Optional web search API backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web: Option<WebSearchSection>,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_search_timeout(),
            max_results: default_max_results(),
            full_text: true,
            passage_retrieval: true,
            web: None,
        }
    }
}

fn default_search_timeout() -> u64 {
    10
}
fn default_max_results() -> u32 {
    20
}
fn default_true() -> bool {
    true
}

/// `[search.web]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchSection {
    /// Search API endpoint.
    pub endpoint: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Cache results in the local database.
    #[serde(default = "default_true")]
    pub cache: bool,
}

fn default_api_key_env() -> String {
    "DEEPQA_WEB_SEARCH_KEY".into()
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    /// Path to the libSQL database file. `~/` is expanded.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.deepqa/deepqa.db".into()
}

/// `[scoring]` section: weights for the logistic score combiner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringSection {
    /// Intercept term.
    #[serde(default = "default_bias")]
    pub bias: f64,

    /// Score name to weight. Scores without a weight do not contribute.
    #[serde(default = "default_weights")]
    pub weights: BTreeMap<String, f64>,
}

impl Default for ScoringSection {
    fn default() -> Self {
        Self {
            bias: default_bias(),
            weights: default_weights(),
        }
    }
}

fn default_bias() -> f64 {
    -2.0
}

fn default_weights() -> BTreeMap<String, f64> {
    [
        ("passage_count", 0.35),
        ("date_matches", 1.5),
        ("lat_type_match", 1.2),
        ("passage_term_match", 2.0),
        ("fulltext_rank", -0.08),
        ("fulltext_score", 0.05),
        ("web_rank", -0.1),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// `[training]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingSection {
    /// Persist one feature row per scored answer.
    #[serde(default)]
    pub tee: bool,
}

/// `[analysis]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisSection {
    /// Gazetteer of given names, one per line. `~/` is expanded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names_file: Option<String>,
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime front door configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address.
    pub bind: String,
    /// Resolved number of pipeline instances (always > 0).
    pub pool_size: usize,
    /// Bound on waiting for a pipeline instance.
    pub acquire_timeout: Duration,
    /// Bound on accepted-but-unfinished requests.
    pub max_pending: usize,
}

impl From<&AppConfig> for ServerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            bind: config.server.bind.clone(),
            pool_size: resolve_pool_size(config.server.pool_size),
            acquire_timeout: Duration::from_secs(config.server.acquire_timeout_secs),
            max_pending: config.server.max_pending.max(1),
        }
    }
}

/// Runtime settings consumed when assembling pipeline stages.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Per-searcher call timeout.
    pub search_timeout: Duration,
    /// Maximum passages per searcher call.
    pub max_results: u32,
    /// Enable secondary passage retrieval.
    pub passage_retrieval: bool,
    /// Combiner intercept.
    pub bias: f64,
    /// Combiner weights.
    pub weights: BTreeMap<String, f64>,
    /// Persist training rows.
    pub tee: bool,
    /// Gazetteer location, already expanded.
    pub names_file: Option<PathBuf>,
}

impl From<&AppConfig> for PipelineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            search_timeout: Duration::from_secs(config.search.timeout_secs.max(1)),
            max_results: config.search.max_results,
            passage_retrieval: config.search.passage_retrieval,
            bias: config.scoring.bias,
            weights: config.scoring.weights.clone(),
            tee: config.training.tee,
            names_file: config.analysis.names_file.as_deref().map(expand_home),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

/// Resolve a configured pool size; 0 means one instance per processing unit.
pub fn resolve_pool_size(configured: usize) -> usize {
    if configured > 0 {
        return configured;
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.deepqa/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DeepQaError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.deepqa/deepqa.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DeepQaError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| DeepQaError::config(format!("failed to parse {}: {e}", path.display())))?;
    validate_config(&config)?;
    Ok(config)
}

/// Reject configurations the server cannot run with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.server.acquire_timeout_secs == 0 {
        return Err(DeepQaError::config("server.acquire_timeout_secs must be > 0"));
    }
    if config.search.max_results == 0 {
        return Err(DeepQaError::config("search.max_results must be > 0"));
    }
    if let Some(web) = &config.search.web {
        if web.endpoint.trim().is_empty() {
            return Err(DeepQaError::config("search.web.endpoint must not be empty"));
        }
    }
    if config.scoring.weights.values().any(|w| !w.is_finite()) {
        return Err(DeepQaError::config("scoring.weights must be finite numbers"));
    }
    Ok(())
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DeepQaError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DeepQaError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DeepQaError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the web search API key from the env var named in the config.
pub fn web_api_key(web: &WebSearchSection) -> Result<String> {
    let var_name = &web.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(DeepQaError::config(format!(
            "web search API key not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("acquire_timeout_secs"));
        assert!(toml_str.contains("date_matches"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.server.acquire_timeout_secs, 60);
        assert_eq!(parsed.server.bind, "127.0.0.1:8887");
        assert!(parsed.search.web.is_none());
    }

    #[test]
    fn config_with_web_backend() {
        let toml_str = r#"
[server]
pool_size = 3

[search.web]
endpoint = "https://api.example.com/search"

[scoring]
bias = 0.5
weights = { passage_count = 1.0 }
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        let web = config.search.web.as_ref().expect("web section");
        assert_eq!(web.api_key_env, "DEEPQA_WEB_SEARCH_KEY");
        assert!(web.cache);
        assert_eq!(config.scoring.weights.len(), 1);
        assert!(validate_config(&config).is_ok());

        let server = ServerConfig::from(&config);
        assert_eq!(server.pool_size, 3);
    }

    #[test]
    fn zero_pool_size_resolves_to_processing_units() {
        assert!(resolve_pool_size(0) >= 1);
        assert_eq!(resolve_pool_size(7), 7);
    }

    #[test]
    fn validation_rejects_zero_timeout() {
        let mut config = AppConfig::default();
        config.server.acquire_timeout_secs = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("acquire_timeout_secs"));
    }

    #[test]
    fn pipeline_settings_from_app_config() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.search_timeout, Duration::from_secs(10));
        assert_eq!(settings.max_results, 20);
        assert!(!settings.tee);
        assert!(settings.weights.contains_key("passage_count"));
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        assert_eq!(expand_home("/tmp/x.db"), PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn api_key_validation() {
        let web = WebSearchSection {
            endpoint: "https://api.example.com".into(),
            api_key_env: "DEEPQA_TEST_NONEXISTENT_KEY_12345".into(),
            cache: false,
        };
        let result = web_api_key(&web);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
