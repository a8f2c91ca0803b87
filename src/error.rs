//! Error types for the indexing and retrieval core.

use thiserror::Error;

use crate::utils::retry::Retryable;

/// Errors raised while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("toml parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("toml serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised while loading or using the tokenizer.
#[derive(Debug, Error)]
pub enum TokenizerError {
    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("tokenization failed: {0}")]
    EncodeFailed(String),
}

/// Errors raised by either embedding provider variant.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("tokenizer error: {0}")]
    Tokenizer(#[from] TokenizerError),

    #[error("onnx inference failed: {0}")]
    Inference(String),

    #[error("unsupported output element type: {0}")]
    UnsupportedOutput(String),

    #[error("embedding request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("embedding provider returned an empty vector")]
    EmbeddingFailed,
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::Request(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// Errors raised while deserializing or mutating an artefact via its strategy.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("no strategy registered for index '{0}'")]
    UnknownIndex(String),

    #[error("deserialization failed: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("embedding failed for field '{field}': {source}")]
    EmbeddingFailed {
        field: &'static str,
        #[source]
        source: EmbeddingError,
    },
}

/// Errors raised by the pad-length registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("pad length for index '{0}' is not known")]
    PadLengthUnknown(String),
}

/// Errors raised by the external search-engine client.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("engine rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl Retryable for EngineError {
    fn is_retryable(&self) -> bool {
        match self {
            EngineError::Request(e) => e.is_timeout() || e.is_connect(),
            EngineError::Rejected { status, .. } => {
                *status == 429 || *status == 502 || *status == 503 || *status == 504
            }
        }
    }
}

/// Errors raised by the orchestrators.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raised when the external auth-key check rejects a bus request.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unauthorized")]
    Unauthorized,
}

/// Errors raised by the bus adapter itself (decoding, publishing, acking).
#[derive(Debug, Error)]
pub enum BusError {
    #[error("lapin error: {0}")]
    Lapin(#[from] lapin::Error),

    #[error("invalid request payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Top-level error, convertible from every component error.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized")]
    Unauthorized,

    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Other(String),
}

impl From<AuthError> for AppError {
    fn from(_: AuthError) -> Self {
        AppError::Unauthorized
    }
}

/// Outcome of a single item within a bulk-index run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ItemFailure {
    pub id: String,
    pub reason: String,
}

/// Wire-level result envelope returned on the bus for every request kind.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResultObj {
    pub success: bool,
    pub message: String,
}

impl ResultObj {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }

    /// Summarize a bulk run: success iff no item failed, per the
    /// "per-item failures never abort a bulk run" policy.
    pub fn from_item_failures(failures: &[ItemFailure]) -> Self {
        if failures.is_empty() {
            ResultObj::ok("indexed successfully")
        } else {
            let summary = failures
                .iter()
                .map(|f| format!("{}: {}", f.id, f.reason))
                .collect::<Vec<_>>()
                .join("; ");
            ResultObj::failed(format!("{} item(s) failed: {}", failures.len(), summary))
        }
    }
}

impl From<&AppError> for ResultObj {
    fn from(err: &AppError) -> Self {
        ResultObj::failed(err.to_string())
    }
}
