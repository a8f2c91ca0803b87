//! EmbeddingProvider (C2): text -> fixed-dim vector, local ONNX or remote
//! HTTP variant, behind one contract so orchestrator code never branches on
//! which is active (spec.md §4.2).

pub mod local;
pub mod remote;

use async_trait::async_trait;

use crate::error::EmbeddingError;

pub use local::LocalEmbeddingProvider;
pub use remote::RemoteEmbeddingProvider;

/// Fixed-length `float32` vector, dimension *D* per deployment.
pub type Embedding = Vec<f32>;

/// `embed(text, padToTokens, pad?) -> Embedding`, shared by both provider
/// variants (spec.md §4.2).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(
        &self,
        text: &str,
        pad_to_tokens: usize,
        pad: bool,
    ) -> Result<Embedding, EmbeddingError>;
}
