mod artefact;
mod config;
mod wire;

pub use artefact::{Artefact, Document, Mitre, SecurityBook};
pub use config::{
    BusConfig, Config, EmbeddingConfig, EngineConfig, EngineFamily, LocalProviderConfig,
    PaddingConfig, QuantizationParams, RemoteProviderConfig,
};
pub use wire::{
    CreateIndexRequest, CreateSnapshotRequest, QueryIndexRequest, QueryIndexResponse,
    QueryResultItem, VectorSearchMode,
};
