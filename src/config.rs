//! Configuration loading and validation.
//!
//! Settings live in a TOML file (default `./config/raia.toml`). Every field
//! has a default so a minimal or missing section still produces a usable
//! config; [`load_config`] validates the result and rejects values that
//! would fail later in a less obvious place.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub chunk: ChunkConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Directory holding raw fetch artifacts (`NNN_slug_hash.html` / `.txt`).
    pub fn raw_dir(&self) -> PathBuf {
        self.workspace.dir.join("raw")
    }

    /// Directory holding the front-matter corpus documents.
    pub fn corpus_dir(&self) -> PathBuf {
        self.workspace.dir.join("corpus")
    }

    /// Directory holding the vector index artifacts.
    pub fn index_dir(&self) -> PathBuf {
        self.workspace.dir.join("index")
    }

    /// Path of the fetch manifest written by the crawl driver.
    pub fn fetch_manifest_path(&self) -> PathBuf {
        self.raw_dir().join("fetch_manifest.json")
    }

    /// Path of the robots compliance report (JSON form).
    pub fn robots_report_path(&self) -> PathBuf {
        self.workspace.dir.join("robots_report.json")
    }
}

/// Workspace layout. All pipeline artifacts live under this directory.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default = "default_workspace_dir")]
    pub dir: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            dir: default_workspace_dir(),
        }
    }
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from("./data")
}

/// SQLite database holding processing jobs.
#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/raia.db")
}

/// Crawling politeness settings shared by the fetcher and the robots gate.
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// Identifying user-agent sent with every robots and page request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Per-request timeout for page fetches, in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    /// Minimum delay between consecutive page fetches, in milliseconds.
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,
    /// Per-request timeout for robots.txt fetches, in seconds.
    #[serde(default = "default_robots_timeout")]
    pub robots_timeout_secs: u64,
    /// Delay between robots.txt fetches of distinct domains, in milliseconds.
    #[serde(default = "default_robots_delay_ms")]
    pub robots_delay_ms: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_fetch_timeout(),
            rate_limit_ms: default_rate_limit_ms(),
            robots_timeout_secs: default_robots_timeout(),
            robots_delay_ms: default_robots_delay_ms(),
        }
    }
}

fn default_user_agent() -> String {
    "RaiaAssistBot/1.0 (Educational; Contact: support@raiaassist.or.ke)".to_string()
}

fn default_fetch_timeout() -> u64 {
    10
}

fn default_rate_limit_ms() -> u64 {
    1500
}

fn default_robots_timeout() -> u64 {
    8
}

fn default_robots_delay_ms() -> u64 {
    1000
}

/// Chunking settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkConfig {
    /// Target chunk size in words. Chunks never split mid-paragraph, so a
    /// single oversized paragraph may exceed this.
    #[serde(default = "default_target_words")]
    pub target_words: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            target_words: default_target_words(),
        }
    }
}

fn default_target_words() -> usize {
    200
}

/// Constants stamped into every corpus document's front-matter.
#[derive(Debug, Clone, Deserialize)]
pub struct CorpusConfig {
    #[serde(default = "default_jurisdiction")]
    pub jurisdiction: String,
    #[serde(default = "default_lang")]
    pub lang: String,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            jurisdiction: default_jurisdiction(),
            lang: default_lang(),
        }
    }
}

fn default_jurisdiction() -> String {
    "Kenya".to_string()
}

fn default_lang() -> String {
    "en".to_string()
}

/// Embedding backend selection and parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    /// Backend: "remote", "local", or "pseudo".
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// Remote embedding endpoint. Required when provider = "remote".
    #[serde(default)]
    pub endpoint: String,
    /// Local model name (provider = "local").
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Vector dimension. Every stored and query vector must match this.
    #[serde(default = "default_embedding_dims")]
    pub dims: usize,
    /// Batch size for local encoding.
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
    /// Per-request timeout for the remote backend, in seconds.
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            endpoint: String::new(),
            model: default_embedding_model(),
            dims: default_embedding_dims(),
            batch_size: default_embedding_batch_size(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_embedding_provider() -> String {
    "pseudo".to_string()
}

fn default_embedding_model() -> String {
    "all-minilm-l6-v2".to_string()
}

fn default_embedding_dims() -> usize {
    384
}

fn default_embedding_batch_size() -> usize {
    32
}

fn default_embedding_timeout() -> u64 {
    30
}

/// Vector index settings.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    /// Artifact the build step writes: "packed" (normalized binary
    /// snapshot) or "scan" (raw JSON vectors searched by linear scan).
    #[serde(default = "default_index_backend")]
    pub backend: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: default_index_backend(),
        }
    }
}

fn default_index_backend() -> String {
    "packed".to_string()
}

/// Retrieval and answer assembly settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AnswerConfig {
    /// Hits retrieved for the extractive answer path.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Hits retrieved as grounding context for the generation path.
    #[serde(default = "default_llm_top_k")]
    pub llm_top_k: usize,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            llm_top_k: default_llm_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    3
}

fn default_llm_top_k() -> usize {
    5
}

/// Optional generation service. Disabled when the endpoint is empty.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Chat-completions style endpoint URL. Empty = extractive answers only.
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        !self.endpoint.is_empty()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            model: String::new(),
            temperature: default_llm_temperature(),
            max_tokens: default_llm_max_tokens(),
            timeout_secs: default_llm_timeout(),
            system_prompt: default_system_prompt(),
        }
    }
}

fn default_llm_temperature() -> f32 {
    0.7
}

fn default_llm_max_tokens() -> u32 {
    1000
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_system_prompt() -> String {
    "You are Raia Assist, a helpful assistant for Kenyan government services. \
     Answer in simple Swahili unless requested otherwise. Ground your answers \
     in the provided documents and always cite sources. If you don't know the \
     answer, say so clearly."
        .to_string()
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

/// Load and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&raw)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    if config.chunk.target_words == 0 {
        bail!("chunk.target_words must be greater than 0");
    }
    if config.embedding.dims == 0 {
        bail!("embedding.dims must be greater than 0");
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be greater than 0");
    }
    if config.crawl.timeout_secs == 0 {
        bail!("crawl.timeout_secs must be greater than 0");
    }
    if config.answer.top_k == 0 || config.answer.llm_top_k == 0 {
        bail!("answer.top_k and answer.llm_top_k must be greater than 0");
    }

    match config.embedding.provider.as_str() {
        "remote" => {
            if config.embedding.endpoint.is_empty() {
                bail!("embedding.provider = \"remote\" requires embedding.endpoint");
            }
        }
        "local" | "pseudo" => {}
        other => bail!(
            "unknown embedding provider: {} (expected remote, local, or pseudo)",
            other
        ),
    }

    match config.index.backend.as_str() {
        "packed" | "scan" => {}
        other => bail!(
            "unknown index backend: {} (expected packed or scan)",
            other
        ),
    }

    Ok(config)
}

/// Starter config written by `raia init`.
pub fn starter_config_toml() -> String {
    r#"# Raia Assist configuration.

[workspace]
# All pipeline artifacts (raw fetches, corpus, index) live under this directory.
dir = "./data"

[db]
path = "./data/raia.db"

[crawl]
user_agent = "RaiaAssistBot/1.0 (Educational; Contact: support@raiaassist.or.ke)"
timeout_secs = 10
rate_limit_ms = 1500
robots_timeout_secs = 8
robots_delay_ms = 1000

[chunk]
target_words = 200

[corpus]
jurisdiction = "Kenya"
lang = "en"

[embedding]
# "remote" posts to `endpoint`; "local" runs a sentence-embedding model
# in-process; "pseudo" is a deterministic offline fallback.
provider = "pseudo"
endpoint = ""
model = "all-minilm-l6-v2"
dims = 384
batch_size = 32
timeout_secs = 30

[index]
# "packed" writes a normalized binary snapshot; "scan" writes raw JSON
# vectors searched by linear scan.
backend = "packed"

[answer]
top_k = 3
llm_top_k = 5

[llm]
# Leave the endpoint empty for extractive answers without a model call.
endpoint = ""
model = ""
temperature = 0.7
max_tokens = 1000
timeout_secs = 60

[server]
bind = "127.0.0.1:8080"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raia.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn empty_config_uses_defaults() {
        let (_dir, path) = write_config("");
        let config = load_config(&path).unwrap();
        assert_eq!(config.embedding.provider, "pseudo");
        assert_eq!(config.embedding.dims, 384);
        assert_eq!(config.chunk.target_words, 200);
        assert_eq!(config.corpus.jurisdiction, "Kenya");
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert!(!config.llm.is_enabled());
    }

    #[test]
    fn starter_config_parses_and_validates() {
        let (_dir, path) = write_config(&starter_config_toml());
        let config = load_config(&path).unwrap();
        assert_eq!(config.index.backend, "packed");
        assert_eq!(config.answer.top_k, 3);
    }

    #[test]
    fn rejects_unknown_provider() {
        let (_dir, path) = write_config("[embedding]\nprovider = \"quantum\"\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("unknown embedding provider"));
    }

    #[test]
    fn remote_provider_requires_endpoint() {
        let (_dir, path) = write_config("[embedding]\nprovider = \"remote\"\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("requires embedding.endpoint"));
    }

    #[test]
    fn rejects_zero_target_words() {
        let (_dir, path) = write_config("[chunk]\ntarget_words = 0\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn rejects_unknown_index_backend() {
        let (_dir, path) = write_config("[index]\nbackend = \"kdtree\"\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("unknown index backend"));
    }

    #[test]
    fn workspace_paths_derive_from_dir() {
        let (_dir, path) = write_config("[workspace]\ndir = \"/tmp/raia-ws\"\n");
        let config = load_config(&path).unwrap();
        assert_eq!(config.raw_dir(), PathBuf::from("/tmp/raia-ws/raw"));
        assert_eq!(config.corpus_dir(), PathBuf::from("/tmp/raia-ws/corpus"));
        assert_eq!(
            config.fetch_manifest_path(),
            PathBuf::from("/tmp/raia-ws/raw/fetch_manifest.json")
        );
    }
}
