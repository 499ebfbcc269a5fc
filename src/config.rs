use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub paths: PathsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub spell: SpellConfig,
    #[serde(default)]
    pub sorting: SortingConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Directory layout: files land in `incoming` and are relocated under
/// `sorted/<category>/[<department>/<year>/]` after classification.
#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    pub incoming: PathBuf,
    pub sorted: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: default_chunk_size(),
            overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    600
}
fn default_chunk_overlap() -> usize {
    150
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    /// Heuristic score above which the generative fallback is skipped.
    /// An empirically chosen cutoff, not a calibrated probability.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

fn default_confidence_threshold() -> f64 {
    15.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Candidates with a cosine distance above this are discarded before
    /// ranking. Tunable; carries no precision/recall guarantee.
    #[serde(default = "default_max_distance")]
    pub max_distance: f64,
    /// Ask the index for `top_k × oversample` candidates to allow local
    /// re-filtering.
    #[serde(default = "default_oversample")]
    pub oversample: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_distance: default_max_distance(),
            oversample: default_oversample(),
        }
    }
}

fn default_top_k() -> usize {
    4
}
fn default_max_distance() -> f64 {
    1.2
}
fn default_oversample() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

/// Generative model settings (classification fallback + answer generation).
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// `"ollama"` or `"disabled"`.
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_answer_temperature")]
    pub answer_temperature: f64,
    #[serde(default = "default_answer_max_tokens")]
    pub answer_max_tokens: u32,
    #[serde(default = "default_context_window")]
    pub context_window: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            answer_temperature: default_answer_temperature(),
            answer_max_tokens: default_answer_max_tokens(),
            context_window: default_context_window(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_llm_base_url() -> String {
    "http://127.0.0.1:11434".to_string()
}
fn default_llm_model() -> String {
    "llama3.2".to_string()
}
fn default_answer_temperature() -> f64 {
    0.3
}
fn default_answer_max_tokens() -> u32 {
    350
}
fn default_context_window() -> u32 {
    3072
}
fn default_llm_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct SpellConfig {
    #[serde(default = "default_spell_enabled")]
    pub enabled: bool,
    /// Minimum string-similarity ratio for a fuzzy correction.
    #[serde(default = "default_spell_threshold")]
    pub threshold: f64,
}

impl Default for SpellConfig {
    fn default() -> Self {
        Self {
            enabled: default_spell_enabled(),
            threshold: default_spell_threshold(),
        }
    }
}

fn default_spell_enabled() -> bool {
    true
}
fn default_spell_threshold() -> f64 {
    0.80
}

/// Destination-tree taxonomy below the category directory.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SortingConfig {
    #[serde(default)]
    pub use_department_year: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatcherConfig {
    /// Settle window before a created file is hashed, and before a removed
    /// path is treated as gone (a move can race its matching create).
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            queue_depth: default_queue_depth(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    1000
}
fn default_queue_depth() -> usize {
    256
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.size == 0 {
        anyhow::bail!("chunking.size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.size {
        anyhow::bail!("chunking.overlap must be < chunking.size");
    }

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.oversample < 1 {
        anyhow::bail!("retrieval.oversample must be >= 1");
    }
    if !(0.0..=2.0).contains(&config.retrieval.max_distance) {
        anyhow::bail!("retrieval.max_distance must be in [0.0, 2.0]");
    }

    if !(0.0..=1.0).contains(&config.spell.threshold) {
        anyhow::bail!("spell.threshold must be in [0.0, 1.0]");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    match config.llm.provider.as_str() {
        "disabled" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled or ollama.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn minimal_config_loads_with_defaults() {
        let f = write_config(
            r#"
[db]
path = "/tmp/docsift.sqlite"

[paths]
incoming = "/tmp/incoming"
sorted = "/tmp/sorted"
"#,
        );
        let config = load_config(f.path()).unwrap();
        assert_eq!(config.chunking.size, 600);
        assert_eq!(config.chunking.overlap, 150);
        assert_eq!(config.retrieval.top_k, 4);
        assert!((config.retrieval.max_distance - 1.2).abs() < 1e-9);
        assert!((config.classifier.confidence_threshold - 15.0).abs() < 1e-9);
        assert!(!config.embedding.is_enabled());
        assert!(!config.llm.is_enabled());
        assert!(config.spell.enabled);
    }

    #[test]
    fn overlap_must_be_less_than_size() {
        let f = write_config(
            r#"
[db]
path = "/tmp/docsift.sqlite"

[paths]
incoming = "/tmp/incoming"
sorted = "/tmp/sorted"

[chunking]
size = 100
overlap = 100
"#,
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn enabled_embedding_requires_model_and_dims() {
        let f = write_config(
            r#"
[db]
path = "/tmp/docsift.sqlite"

[paths]
incoming = "/tmp/incoming"
sorted = "/tmp/sorted"

[embedding]
provider = "openai"
"#,
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn unknown_llm_provider_rejected() {
        let f = write_config(
            r#"
[db]
path = "/tmp/docsift.sqlite"

[paths]
incoming = "/tmp/incoming"
sorted = "/tmp/sorted"

[llm]
provider = "bard"
"#,
        );
        assert!(load_config(f.path()).is_err());
    }
}
