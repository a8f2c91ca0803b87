//! Configuration surface: all recognized options from spec.md §6, plus the
//! ambient additions SPEC_FULL.md §6 adds (bus URL, engine family, uint8
//! quantization params, the position/token-type input binding choice).
//!
//! Loaded the way the teacher loads config (`toml` file at a fixed path +
//! typed sub-structs with `#[serde(default = "...")]`), generalized with
//! environment-variable overrides for the credentials a networked service
//! cannot keep in a checked-in file the way a local CLI config can.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_MAX_TOKEN_LENGTH_CAP: usize = 512;
pub const DEFAULT_MIN_TOKEN_LENGTH_CAP: usize = 64;
pub const DEFAULT_VEC_DIM: usize = 384;

/// Top-level configuration for the indexing/retrieval core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub padding: PaddingConfig,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub bus: BusConfig,

    /// Directory the process-singleton `Tokenizer` loads from (spec.md
    /// §4.1), independent of which `EmbeddingConfig` variant is active —
    /// the remote provider still needs `count`/`decode` for its
    /// context-length truncation retry (spec.md §4.2b, §9).
    #[serde(default = "default_model_dir")]
    pub tokenizer_model_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig::default(),
            engine: EngineConfig::default(),
            padding: PaddingConfig::default(),
            data_dir: default_data_dir(),
            bus: BusConfig::default(),
            tokenizer_model_dir: default_model_dir(),
        }
    }
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("indexcore").join("config.toml"))
    }

    /// Load from the fixed config path, falling back to defaults if absent,
    /// then apply environment-variable overrides for secrets and the bus URL.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = Self::config_path()
            && path.exists()
        {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path()
            .ok_or_else(|| ConfigError::Invalid("could not determine config directory".into()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Env vars override secrets and the bus connection string: a deployed
    /// service cannot keep the engine key, HF key, or AMQP URL in a
    /// checked-in TOML file the way a local CLI config can.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("OPENSEARCH_KEY") {
            self.engine.key = v;
        }
        if let Ok(v) = std::env::var("OPENSEARCH_URL") {
            self.engine.url = v;
        }
        if let Ok(v) = std::env::var("BUS_URL") {
            self.bus.url = v;
        }
        if let EmbeddingConfig::Api(ref mut remote) = self.embedding
            && let Ok(v) = std::env::var("LLM_HF_KEY")
        {
            remote.hf_key = v;
        }
    }

    pub fn pad_length_registry_dir(&self) -> PathBuf {
        self.data_dir.join("index_config")
    }
}

/// Which embedding provider variant is active (spec.md §6 `embeddingProvider`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum EmbeddingConfig {
    Local(LocalProviderConfig),
    Api(RemoteProviderConfig),
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig::Local(LocalProviderConfig::default())
    }
}

impl EmbeddingConfig {
    /// Output vector dimension, regardless of which provider variant is active.
    pub fn vec_dim(&self) -> usize {
        match self {
            EmbeddingConfig::Local(c) => c.vec_dim,
            EmbeddingConfig::Api(c) => c.vec_dim,
        }
    }
}

/// Quantization parameters for uint8 ONNX outputs. Required config per
/// spec.md §9 — never a model-specific literal in the dequantization code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuantizationParams {
    pub scale: f32,
    pub zero_point: i32,
}

/// Which model input name carries the per-token index array. §9 documents a
/// source variant that aliased `token_type_ids` to positional indices; this
/// crate keeps both bindings explicit and independently optional instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalProviderConfig {
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    #[serde(default = "default_vec_dim")]
    pub vec_dim: usize,

    #[serde(default = "default_threads")]
    pub threads: usize,

    #[serde(default = "default_position_ids_input_name")]
    pub position_ids_input_name: Option<String>,

    #[serde(default)]
    pub token_type_ids_input_name: Option<String>,

    #[serde(default)]
    pub quantization: Option<QuantizationParams>,
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("./models/embedding")
}

fn default_vec_dim() -> usize {
    DEFAULT_VEC_DIM
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_position_ids_input_name() -> Option<String> {
    Some("position_ids".to_string())
}

impl Default for LocalProviderConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            vec_dim: default_vec_dim(),
            threads: default_threads(),
            position_ids_input_name: default_position_ids_input_name(),
            token_type_ids_input_name: None,
            quantization: None,
        }
    }
}

/// Remote HTTP (OpenAI-compatible) embedding provider target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteProviderConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_api_model")]
    pub api_model: String,

    #[serde(default)]
    pub hf_key: String,

    #[serde(default = "default_vec_dim")]
    pub vec_dim: usize,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1/embeddings".to_string()
}

fn default_api_model() -> String {
    "text-embedding-3-small".to_string()
}

impl Default for RemoteProviderConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_model: default_api_model(),
            hf_key: String::new(),
            vec_dim: default_vec_dim(),
        }
    }
}

/// Which HNSW backend the deployed engine runs. §9: must be config, not a
/// hard-coded literal in the mapping builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineFamily {
    Nmslib,
    Faiss,
}

impl Default for EngineFamily {
    fn default() -> Self {
        EngineFamily::Nmslib
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_engine_url")]
    pub url: String,

    #[serde(default = "default_engine_user")]
    pub user: String,

    #[serde(default)]
    pub key: String,

    #[serde(default = "default_index")]
    pub default_index: String,

    #[serde(default)]
    pub engine_family: EngineFamily,
}

fn default_engine_url() -> String {
    "https://localhost:9200".to_string()
}

fn default_engine_user() -> String {
    "admin".to_string()
}

fn default_index() -> String {
    "documents".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: default_engine_url(),
            user: default_engine_user(),
            key: String::new(),
            default_index: default_index(),
            engine_family: EngineFamily::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PaddingConfig {
    #[serde(default = "default_max_cap")]
    pub max_token_length_cap: usize,

    #[serde(default = "default_min_cap")]
    pub min_token_length_cap: usize,
}

fn default_max_cap() -> usize {
    DEFAULT_MAX_TOKEN_LENGTH_CAP
}

fn default_min_cap() -> usize {
    DEFAULT_MIN_TOKEN_LENGTH_CAP
}

impl Default for PaddingConfig {
    fn default() -> Self {
        Self {
            max_token_length_cap: default_max_cap(),
            min_token_length_cap: default_min_cap(),
        }
    }
}

/// AMQP connection string. Consumed only by the binary's startup wiring
/// (`src/main.rs`); establishing/supervising the channel is out of scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default = "default_bus_url")]
    pub url: String,
}

fn default_bus_url() -> String {
    "amqp://127.0.0.1:5672/%2f".to_string()
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: default_bus_url(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_respects_padding_clamp_bounds() {
        let config = Config::default();
        assert!(config.padding.min_token_length_cap <= config.padding.max_token_length_cap);
    }

    #[test]
    fn default_embedding_provider_is_local() {
        let config = Config::default();
        assert!(matches!(config.embedding, EmbeddingConfig::Local(_)));
    }

    #[test]
    fn toml_round_trip_preserves_engine_family() {
        let mut config = Config::default();
        config.engine.engine_family = EngineFamily::Faiss;
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let reloaded: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reloaded.engine.engine_family, EngineFamily::Faiss);
    }
}
