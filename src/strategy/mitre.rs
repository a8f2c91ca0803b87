//! `Mitre` strategy: a single combined embedding field over `input`/`output`
//! (spec.md §3). The source field for that single embedding is an Open
//! Question the distilled spec leaves unresolved (§9); this crate resolves
//! it to `output`, matching the id-derivation convention that treats
//! `output` as the canonical source text across every variant, recorded in
//! DESIGN.md.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::json;

use crate::embedding::EmbeddingProvider;
use crate::error::StrategyError;
use crate::models::{Artefact, EngineFamily, Mitre, VectorSearchMode};
use crate::tokenizer::Tokenizer;

use super::{
    IndexStrategy, build_engine_mapping, ensure_embedding_field, estimate_padding_over, sha256_hex,
};

const TEXT_FIELDS: [&str; 2] = ["input", "output"];
const VECTOR_FIELDS: [&str; 1] = ["embedding"];

pub struct MitreStrategy {
    engine_family: EngineFamily,
}

impl MitreStrategy {
    pub fn new(engine_family: EngineFamily) -> Self {
        Self { engine_family }
    }
}

#[async_trait]
impl IndexStrategy for MitreStrategy {
    fn index_name(&self) -> &'static str {
        "mitre"
    }

    fn can_handle(&self, item: &Artefact) -> bool {
        matches!(item, Artefact::Mitre(_))
    }

    fn deserialize(&self, json_text: &str) -> Vec<Artefact> {
        serde_json::from_str::<Vec<Mitre>>(json_text)
            .map(|items| items.into_iter().map(Artefact::Mitre).collect())
            .unwrap_or_default()
    }

    fn fields(&self, item: &Artefact) -> Vec<&'static str> {
        match item {
            // Only `output` feeds the single `embedding` field; `input` is
            // stored as a lexical field but never tokenized for padding.
            Artefact::Mitre(_) => vec!["output"],
            _ => Vec::new(),
        }
    }

    async fn ensure_embeddings(
        &self,
        item: &mut Artefact,
        provider: &dyn EmbeddingProvider,
        pad_to_tokens: usize,
    ) -> Result<(), StrategyError> {
        let Artefact::Mitre(mitre) = item else {
            return Ok(());
        };

        ensure_embedding_field(
            &mut mitre.embedding,
            &mitre.output,
            "embedding",
            provider,
            pad_to_tokens,
        )
        .await
    }

    fn compute_id(&self, item: &Artefact) -> String {
        match item {
            Artefact::Mitre(mitre) => sha256_hex(&mitre.output),
            _ => sha256_hex(""),
        }
    }

    fn build_index_document(&self, item: &Artefact) -> serde_json::Value {
        match item {
            Artefact::Mitre(mitre) => json!({
                "input": mitre.input,
                "output": mitre.output,
                "embedding": mitre.embedding,
            }),
            _ => serde_json::Value::Null,
        }
    }

    fn vector_field(&self, _mode: VectorSearchMode) -> &'static str {
        "embedding"
    }

    fn default_field_weights(&self) -> Vec<(&'static str, f32)> {
        vec![("embedding", 1.0)]
    }

    fn engine_mapping(&self, dimension: usize) -> serde_json::Value {
        build_engine_mapping(&TEXT_FIELDS, &VECTOR_FIELDS, dimension, self.engine_family)
    }

    fn estimate_padding(
        &self,
        files: &[PathBuf],
        tokenizer: &Tokenizer,
        max_cap: usize,
        min_cap: usize,
    ) -> (usize, usize) {
        estimate_padding_over(
            files,
            tokenizer,
            max_cap,
            min_cap,
            |text| self.deserialize(text),
            |item| match item {
                Artefact::Mitre(mitre) => vec![mitre.output.clone()],
                _ => Vec::new(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_mode_resolves_to_the_single_embedding_field() {
        let strategy = MitreStrategy::new(EngineFamily::Faiss);
        assert_eq!(strategy.vector_field(VectorSearchMode::Content), "embedding");
        assert_eq!(strategy.vector_field(VectorSearchMode::Question), "embedding");
        assert_eq!(strategy.vector_field(VectorSearchMode::Summary), "embedding");
    }
}
