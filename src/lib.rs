//! Semantic indexing and retrieval core for a network-monitoring platform.
//!
//! Library crate wired by the `indexcored` binary: loads configuration,
//! builds the component singletons (tokenizer, embedding provider,
//! pad-length registry, search-engine client), binds the bus adapter, and
//! runs until shutdown. The message-bus transport's connection lifecycle,
//! the auth-key check's own implementation, persistent storage of the
//! search engine, and process hosting are treated as external collaborators
//! whose interfaces this crate defines but does not supply.

pub mod auth;
pub mod bus;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod pad_registry;
pub mod rate_limiter;
pub mod strategy;
pub mod tokenizer;
pub mod utils;

pub use auth::{AuthChecker, StaticAuthChecker};
pub use bus::BusAdapter;
pub use embedding::{Embedding, EmbeddingProvider, LocalEmbeddingProvider, RemoteEmbeddingProvider};
pub use engine::SearchEngineClient;
pub use error::AppError;
pub use models::Config;
pub use orchestrator::{IndexingOrchestrator, QueryOrchestrator};
pub use pad_registry::PadLengthRegistry;
pub use rate_limiter::RateLimiter;
pub use strategy::StrategyRegistry;
pub use tokenizer::Tokenizer;
