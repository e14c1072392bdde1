use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable holding the OpenAI API key (extraction and embeddings).
pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";
/// Environment variable holding the Google Maps Platform key (place lookup).
pub const GOOGLE_MAPS_KEY_ENV: &str = "GOOGLE_MAPS_API_KEY";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_city")]
    pub city: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_days_back")]
    pub days_back: u32,
    #[serde(default = "default_max_groups")]
    pub max_groups: usize,
    #[serde(default = "default_raw_text_max_chars")]
    pub raw_text_max_chars: usize,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_finalize_concurrency")]
    pub finalize_concurrency: usize,
    /// Fall back to the bundled sample posts when every source comes back empty.
    #[serde(default)]
    pub sample_fallback: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            city: default_city(),
            limit: default_limit(),
            days_back: default_days_back(),
            max_groups: default_max_groups(),
            raw_text_max_chars: default_raw_text_max_chars(),
            call_timeout_secs: default_call_timeout_secs(),
            finalize_concurrency: default_finalize_concurrency(),
            sample_fallback: false,
        }
    }
}

fn default_city() -> String {
    "Toronto".to_string()
}
fn default_limit() -> usize {
    50
}
fn default_days_back() -> u32 {
    7
}
fn default_max_groups() -> usize {
    500
}
fn default_raw_text_max_chars() -> usize {
    5000
}
fn default_call_timeout_secs() -> u64 {
    20
}
fn default_finalize_concurrency() -> usize {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_extraction_provider")]
    pub provider: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_openai_url")]
    pub url: String,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            provider: default_extraction_provider(),
            model: default_chat_model(),
            url: default_openai_url(),
            max_input_chars: default_max_input_chars(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_extraction_provider() -> String {
    "heuristic".to_string()
}
fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_openai_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_max_input_chars() -> usize {
    1800
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnrichmentConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_bias_latitude")]
    pub bias_latitude: f64,
    #[serde(default = "default_bias_longitude")]
    pub bias_longitude: f64,
    #[serde(default = "default_bias_radius_m")]
    pub bias_radius_m: f64,
    #[serde(default = "default_places_timeout_secs")]
    pub timeout_secs: u64,
    /// Remember successful lookups in the database between runs.
    #[serde(default = "default_true")]
    pub cache: bool,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            bias_latitude: default_bias_latitude(),
            bias_longitude: default_bias_longitude(),
            bias_radius_m: default_bias_radius_m(),
            timeout_secs: default_places_timeout_secs(),
            cache: true,
        }
    }
}

impl EnrichmentConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_bias_latitude() -> f64 {
    43.6532
}
fn default_bias_longitude() -> f64 {
    -79.3832
}
fn default_bias_radius_m() -> f64 {
    10000.0
}
fn default_places_timeout_secs() -> u64 {
    10
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_openai_url")]
    pub url: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: default_embedding_model(),
            url: default_openai_url(),
            dims: default_dims(),
            timeout_secs: default_timeout_secs(),
            max_retries: 0,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    belly_buzz_core::traits::EMBEDDING_DIMENSIONS
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourcesConfig {
    #[serde(default)]
    pub subreddits: Vec<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            subreddits: Vec::new(),
            user_agent: default_user_agent(),
            feeds: Vec::new(),
        }
    }
}

fn default_user_agent() -> String {
    crate::http::USER_AGENT.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    #[serde(default = "default_export_output")]
    pub output: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output: default_export_output(),
        }
    }
}

fn default_export_output() -> PathBuf {
    PathBuf::from("./frontend/public/data.json")
}

/// Read a secret from the environment; blank values count as unset.
pub fn secret(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let p = &config.pipeline;
    if p.city.trim().is_empty() {
        anyhow::bail!("pipeline.city must not be empty");
    }
    if p.max_groups == 0 {
        anyhow::bail!("pipeline.max_groups must be > 0");
    }
    if p.finalize_concurrency == 0 {
        anyhow::bail!("pipeline.finalize_concurrency must be >= 1");
    }
    if p.call_timeout_secs == 0 {
        anyhow::bail!("pipeline.call_timeout_secs must be > 0");
    }
    if p.raw_text_max_chars == 0 {
        anyhow::bail!("pipeline.raw_text_max_chars must be > 0");
    }

    match config.extraction.provider.as_str() {
        "heuristic" | "openai" => {}
        other => anyhow::bail!(
            "Unknown extraction provider: '{}'. Must be heuristic or openai.",
            other
        ),
    }
    if config.extraction.max_input_chars == 0 {
        anyhow::bail!("extraction.max_input_chars must be > 0");
    }

    match config.enrichment.provider.as_str() {
        "disabled" | "google" => {}
        other => anyhow::bail!(
            "Unknown enrichment provider: '{}'. Must be disabled or google.",
            other
        ),
    }
    if config.enrichment.bias_radius_m <= 0.0 {
        anyhow::bail!("enrichment.bias_radius_m must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims == 0 {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.trim().is_empty() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    for feed in &config.sources.feeds {
        if !feed.url.starts_with("http://") && !feed.url.starts_with("https://") {
            anyhow::bail!("sources.feeds '{}' has a non-http url: {}", feed.name, feed.url);
        }
    }

    Ok(())
}
