
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::chunking::ChunkingConfig;
use crate::index::RetrievalConfig;
use crate::models::GenerationParams;

pub const DEFAULT_FUNCTION_NAME: &str = "docs-rag-chat-handler";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationParams,
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory holding one sub-directory per bucket
    pub root: PathBuf,
    pub bucket: String,
    pub raw_docs_prefix: String,
    pub index_prefix: String,
    /// Local scratch space for index builds and downloads
    pub scratch_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("storage"),
            bucket: "docs-rag".to_string(),
            raw_docs_prefix: "raw".to_string(),
            index_prefix: "vector-db".to_string(),
            scratch_dir: std::env::temp_dir().join("docs-rag"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelsConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub embedding_model: String,
    pub chat_model: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
    pub batch_size: u32,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            embedding_model: "nomic-embed-text:latest".to_string(),
            chat_model: "llama3.1:8b".to_string(),
            api_key: None,
            timeout_seconds: 120,
            batch_size: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UiConfig {
    /// Replace every invocation with a canned response
    pub mock: bool,
    pub function_name: String,
    /// Remote invocation endpoint; the handler runs in-process when unset
    pub endpoint: Option<Url>,
    pub api_key: Option<String>,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            mock: false,
            function_name: DEFAULT_FUNCTION_NAME.to_string(),
            endpoint: None,
            api_key: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid bucket name: {0:?} (cannot be empty or contain '/')")]
    InvalidBucket(String),
    #[error("Invalid storage prefix: {0:?} (cannot be empty or start with '/')")]
    InvalidPrefix(String),
    #[error("Invalid chunk size: {0} (must be greater than 0)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid retrieval k: {0} (must be greater than 0)")]
    InvalidRetrievalK(usize),
    #[error("fetch_k ({0}) must be at least k ({1})")]
    FetchKTooSmall(usize, usize),
    #[error("Invalid MMR lambda: {0} (must be between 0.0 and 1.0)")]
    InvalidLambda(f32),
    #[error("Invalid temperature: {0} (must be between 0.0 and 2.0)")]
    InvalidTemperature(f32),
    #[error("Invalid function name: {0:?} (cannot be empty)")]
    InvalidFunctionName(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidEnv(&'static str, String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".docs-rag"))
            .or({
                #[cfg(windows)]
                {
                    dirs::data_dir().map(|data| data.join("docs-rag"))
                }
                #[cfg(not(windows))]
                {
                    None
                }
            })
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load `config.toml` from `config_dir`, falling back to defaults, then
    /// apply process environment overrides.
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let mut config = Self::load_file(config_dir)?;
        config
            .apply_env(|name| std::env::var(name).ok())
            .context("Failed to apply environment overrides")?;
        config
            .validate()
            .context("Configuration validation failed")?;
        Ok(config)
    }

    /// Load `config.toml` from `config_dir` without looking at the environment
    #[inline]
    pub fn load_file<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Overlay recognized environment variables, read through `lookup`
    #[inline]
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bucket) = lookup("BUCKET_NAME") {
            self.storage.bucket = bucket;
        }
        if let Some(prefix) = lookup("RAW_DOCS_PREFIX") {
            self.storage.raw_docs_prefix = prefix;
        }
        if let Some(prefix) = lookup("VECTOR_DB_PREFIX") {
            self.storage.index_prefix = prefix;
        }
        if let Some(root) = lookup("STORAGE_ROOT") {
            self.storage.root = PathBuf::from(root);
        }
        if let Some(scratch) = lookup("SCRATCH_DIR") {
            self.storage.scratch_dir = PathBuf::from(scratch);
        }
        if let Some(model) = lookup("EMBEDDING_MODEL_ID") {
            self.models.embedding_model = model;
        }
        if let Some(model) = lookup("CHAT_MODEL_ID") {
            self.models.chat_model = model;
        }
        if let Some(host) = lookup("MODEL_HOST") {
            self.models.host = host;
        }
        if let Some(port) = lookup("MODEL_PORT") {
            self.models.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv("MODEL_PORT", port))?;
        }
        if let Some(key) = lookup("MODEL_API_KEY") {
            self.models.api_key = Some(key).filter(|k| !k.is_empty());
        }
        if let Some(endpoint) = lookup("INVOKE_ENDPOINT") {
            self.ui.endpoint = if endpoint.trim().is_empty() {
                None
            } else {
                Some(
                    Url::parse(endpoint.trim())
                        .map_err(|_| ConfigError::InvalidEnv("INVOKE_ENDPOINT", endpoint))?,
                )
            };
        }
        if let Some(key) = lookup("INVOKE_API_KEY") {
            self.ui.api_key = Some(key).filter(|k| !k.is_empty());
        }
        if let Some(mock) = lookup("MOCK_INVOCATIONS") {
            self.ui.mock = mock.trim().eq_ignore_ascii_case("true");
        }
        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.storage.validate()?;
        self.models.validate()?;
        self.validate_pipeline()?;
        if self.ui.function_name.trim().is_empty() {
            return Err(ConfigError::InvalidFunctionName(
                self.ui.function_name.clone(),
            ));
        }
        Ok(())
    }

    fn validate_pipeline(&self) -> Result<(), ConfigError> {
        let chunking = &self.chunking;
        if chunking.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize(chunking.chunk_size));
        }
        if chunking.chunk_overlap >= chunking.chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                chunking.chunk_overlap,
                chunking.chunk_size,
            ));
        }

        let retrieval = &self.retrieval;
        if retrieval.k == 0 {
            return Err(ConfigError::InvalidRetrievalK(retrieval.k));
        }
        if retrieval.fetch_k < retrieval.k {
            return Err(ConfigError::FetchKTooSmall(retrieval.fetch_k, retrieval.k));
        }
        if !(0.0..=1.0).contains(&retrieval.lambda) {
            return Err(ConfigError::InvalidLambda(retrieval.lambda));
        }

        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(ConfigError::InvalidTemperature(
                self.generation.temperature,
            ));
        }

        Ok(())
    }

    #[inline]
    pub fn model_url(&self) -> Result<Url, ConfigError> {
        self.models.base_url()
    }

    /// Directory the query handler downloads the persisted index into
    #[inline]
    pub fn index_cache_dir(&self) -> PathBuf {
        self.storage.scratch_dir.join("index")
    }

    /// Directory the ingestion job writes a fresh index into before upload
    #[inline]
    pub fn index_build_dir(&self) -> PathBuf {
        self.storage.scratch_dir.join("index-build")
    }
}

impl StorageConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.trim().is_empty() || self.bucket.contains('/') {
            return Err(ConfigError::InvalidBucket(self.bucket.clone()));
        }
        validate_prefix(&self.raw_docs_prefix)?;
        validate_prefix(&self.index_prefix)?;
        Ok(())
    }

    /// Raw documents prefix as a folder, e.g. `raw/`
    #[inline]
    pub fn raw_docs_folder(&self) -> String {
        as_folder(&self.raw_docs_prefix)
    }

    /// Index prefix as a folder, e.g. `vector-db/`
    #[inline]
    pub fn index_folder(&self) -> String {
        as_folder(&self.index_prefix)
    }
}

fn validate_prefix(prefix: &str) -> Result<(), ConfigError> {
    if prefix.trim_matches('/').trim().is_empty() || prefix.starts_with('/') {
        return Err(ConfigError::InvalidPrefix(prefix.to_string()));
    }
    Ok(())
}

fn as_folder(prefix: &str) -> String {
    format!("{}/", prefix.trim_end_matches('/'))
}

impl ModelsConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        self.base_url()?;

        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }

        if self.chat_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.chat_model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(1..=600).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        Ok(())
    }

    #[inline]
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    #[inline]
    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    #[inline]
    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = Self {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.base_url()?;
        self.host = host;
        Ok(())
    }

    #[inline]
    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    #[inline]
    pub fn set_embedding_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.embedding_model = model;
        Ok(())
    }

    #[inline]
    pub fn set_chat_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.chat_model = model;
        Ok(())
    }
}
