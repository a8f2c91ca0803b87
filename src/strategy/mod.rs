//! IndexStrategy (C4, spec.md §4.4): one implementation per artefact kind,
//! dispatched through a uniform polymorphic contract so pipeline code never
//! branches on artefact shape.
//!
//! Implemented as a capability-set trait rather than a class hierarchy
//! (spec.md §9): shared logic (SHA-256 id, L2-HNSW mapping assembly, field
//! enumeration, padding estimation) lives in the free functions below,
//! parameterized by each concrete strategy's `FieldSpec` list, mirroring the
//! teacher's descriptor-not-inheritance style in `models/tag.rs` and the
//! builder-style request assembly in `services/vector_store.rs` (retargeted
//! from Qdrant gRPC builders to `serde_json::json!` mapping bodies).

pub mod document;
pub mod mitre;
pub mod security_book;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::embedding::EmbeddingProvider;
use crate::error::StrategyError;
use crate::models::{Artefact, EngineFamily, VectorSearchMode};
use crate::tokenizer::Tokenizer;

pub use document::DocumentStrategy;
pub use mitre::MitreStrategy;
pub use security_book::SecurityBookStrategy;

/// One text field paired with the embedding field it feeds.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub text_field: &'static str,
    pub embedding_field: &'static str,
}

/// Per-artefact-kind implementation of indexing, embedding, and mapping
/// logic (spec.md §4.4).
#[async_trait]
pub trait IndexStrategy: Send + Sync {
    /// Static string; unique across strategies.
    fn index_name(&self) -> &'static str;

    /// Name discrimination, used by the orchestrator to pick a strategy for
    /// a data directory.
    fn can_handle_index(&self, index_name: &str) -> bool {
        self.index_name() == index_name
    }

    /// Type discrimination, used when an `Artefact` is already in hand.
    fn can_handle(&self, item: &Artefact) -> bool;

    /// Failure degrades to an empty list (spec.md §4.4), never propagated.
    fn deserialize(&self, json_text: &str) -> Vec<Artefact>;

    /// Text fields to be embedded, used by padding estimation.
    fn fields(&self, item: &Artefact) -> Vec<&'static str>;

    /// For each missing embedding field, call the provider on its
    /// corresponding text field. Raises `EmbeddingFailed` on an empty-vector
    /// return (spec.md §4.4).
    async fn ensure_embeddings(
        &self,
        item: &mut Artefact,
        provider: &dyn EmbeddingProvider,
        pad_to_tokens: usize,
    ) -> Result<(), StrategyError>;

    /// SHA-256 over the `output` text field — the deterministic source field
    /// for every present variant (spec.md §4.4).
    fn compute_id(&self, item: &Artefact) -> String;

    /// Structured body containing text fields and all vector fields under
    /// their engine names.
    fn build_index_document(&self, item: &Artefact) -> serde_json::Value;

    /// Unknown mode degrades to `content` (spec.md §4.4).
    fn vector_field(&self, mode: VectorSearchMode) -> &'static str;

    /// Fallback weights for multi-field search; all `1.0` by default.
    fn default_field_weights(&self) -> Vec<(&'static str, f32)>;

    /// Declares text fields and `knn_vector` fields of dimension `D`, HNSW
    /// method, L2 space, against the strategy's own configured
    /// `engine_family` (spec.md §9: a config field, never a literal).
    fn engine_mapping(&self, dimension: usize) -> serde_json::Value;

    /// Scans the corpus; tokenizes every embedding-bearing field; tracks the
    /// running max; short-circuits if it reaches `max_cap` (early-exit
    /// invariant, spec.md §8). Returns `(clamp(observedMax, min, max),
    /// observedMax)`.
    fn estimate_padding(
        &self,
        files: &[PathBuf],
        tokenizer: &Tokenizer,
        max_cap: usize,
        min_cap: usize,
    ) -> (usize, usize);
}

/// Fills one embedding slot if empty: calls the provider on `text`, raises
/// `EmbeddingFailed` on an empty-vector return. Shared across every concrete
/// strategy's `ensure_embeddings` so each only lists its own field pairs.
pub async fn ensure_embedding_field(
    slot: &mut Option<Vec<f32>>,
    text: &str,
    field_name: &'static str,
    provider: &dyn EmbeddingProvider,
    pad_to_tokens: usize,
) -> Result<(), StrategyError> {
    if slot.is_some() {
        return Ok(());
    }
    let vector = provider
        .embed(text, pad_to_tokens, true)
        .await
        .map_err(|source| StrategyError::EmbeddingFailed {
            field: field_name,
            source,
        })?;
    if vector.is_empty() {
        return Err(StrategyError::EmbeddingFailed {
            field: field_name,
            source: crate::error::EmbeddingError::EmbeddingFailed,
        });
    }
    *slot = Some(vector);
    Ok(())
}

/// SHA-256 hex digest of `source`, the shared id-derivation helper every
/// strategy's `compute_id` delegates to.
pub fn sha256_hex(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hex::encode(hasher.finalize())
}

fn engine_name(family: EngineFamily) -> &'static str {
    match family {
        EngineFamily::Nmslib => "nmslib",
        EngineFamily::Faiss => "faiss",
    }
}

/// Assembles a valid engine index mapping: lexical `text` fields plus one or
/// more `knn_vector` fields of dimension `D`, HNSW/L2. Built with
/// `serde_json::json!` exclusively, so the missing-comma defect documented
/// in spec.md §9 cannot recur structurally.
pub fn build_engine_mapping(
    text_fields: &[&str],
    vector_field_names: &[&str],
    dimension: usize,
    engine_family: EngineFamily,
) -> serde_json::Value {
    let mut properties = serde_json::Map::new();
    for field in text_fields {
        properties.insert((*field).to_string(), json!({ "type": "text" }));
    }
    for field in vector_field_names {
        properties.insert(
            (*field).to_string(),
            json!({
                "type": "knn_vector",
                "dimension": dimension,
                "method": {
                    "name": "hnsw",
                    "space_type": "l2",
                    "engine": engine_name(engine_family),
                }
            }),
        );
    }
    json!({ "mappings": { "properties": serde_json::Value::Object(properties) } })
}

/// Shared padding-estimation walk: opens files in the order given, tokenizes
/// each text field `extract_texts` reports for each deserialized item,
/// tracks the running max, and returns as soon as it reaches `max_cap`.
pub fn estimate_padding_over<F, T>(
    files: &[PathBuf],
    tokenizer: &Tokenizer,
    max_cap: usize,
    min_cap: usize,
    deserialize: F,
    extract_texts: T,
) -> (usize, usize)
where
    F: Fn(&str) -> Vec<Artefact>,
    T: Fn(&Artefact) -> Vec<String>,
{
    let mut observed_max = 0usize;

    'files: for file in files {
        let content = match std::fs::read_to_string(file) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %file.display(), error = %e, "skipping unreadable file during padding estimation");
                continue;
            }
        };
        let items = deserialize(&content);
        for item in &items {
            for text in extract_texts(item) {
                let n = tokenizer.count(&text).unwrap_or(0);
                if n > observed_max {
                    observed_max = n;
                }
                if observed_max >= max_cap {
                    break 'files;
                }
            }
        }
    }

    let pad = observed_max.clamp(min_cap, max_cap);
    (pad, observed_max)
}

/// Resolves strategies by index name or by artefact value, replacing the
/// original spec's implicit global registry (SPEC_FULL.md §4.4).
#[derive(Clone)]
pub struct StrategyRegistry {
    strategies: Vec<Arc<dyn IndexStrategy>>,
}

impl StrategyRegistry {
    pub fn new(strategies: Vec<Arc<dyn IndexStrategy>>) -> Self {
        Self { strategies }
    }

    /// Default registry wiring the three shipped artefact strategies.
    pub fn with_defaults(engine_family: EngineFamily) -> Self {
        Self::new(vec![
            Arc::new(DocumentStrategy::new(engine_family)),
            Arc::new(SecurityBookStrategy::new(engine_family)),
            Arc::new(MitreStrategy::new(engine_family)),
        ])
    }

    pub fn by_index_name(&self, index_name: &str) -> Option<Arc<dyn IndexStrategy>> {
        self.strategies
            .iter()
            .find(|s| s.can_handle_index(index_name))
            .cloned()
    }

    pub fn by_item(&self, item: &Artefact) -> Option<Arc<dyn IndexStrategy>> {
        self.strategies.iter().find(|s| s.can_handle(item)).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn IndexStrategy>> {
        self.strategies.iter()
    }
}
