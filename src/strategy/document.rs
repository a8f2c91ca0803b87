//! `Document` strategy: question/answer pairs with two independent vector
//! fields (spec.md §3).

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::json;

use crate::embedding::EmbeddingProvider;
use crate::error::StrategyError;
use crate::models::{Artefact, Document, EngineFamily, VectorSearchMode};
use crate::tokenizer::Tokenizer;

use super::{
    IndexStrategy, build_engine_mapping, ensure_embedding_field, estimate_padding_over, sha256_hex,
};

const TEXT_FIELDS: [&str; 2] = ["input", "output"];
const VECTOR_FIELDS: [&str; 2] = ["input_embedding", "output_embedding"];

pub struct DocumentStrategy {
    engine_family: EngineFamily,
}

impl DocumentStrategy {
    pub fn new(engine_family: EngineFamily) -> Self {
        Self { engine_family }
    }
}

#[async_trait]
impl IndexStrategy for DocumentStrategy {
    fn index_name(&self) -> &'static str {
        "documents"
    }

    fn can_handle(&self, item: &Artefact) -> bool {
        matches!(item, Artefact::Document(_))
    }

    fn deserialize(&self, json_text: &str) -> Vec<Artefact> {
        serde_json::from_str::<Vec<Document>>(json_text)
            .map(|items| items.into_iter().map(Artefact::Document).collect())
            .unwrap_or_default()
    }

    fn fields(&self, item: &Artefact) -> Vec<&'static str> {
        match item {
            Artefact::Document(_) => TEXT_FIELDS.to_vec(),
            _ => Vec::new(),
        }
    }

    async fn ensure_embeddings(
        &self,
        item: &mut Artefact,
        provider: &dyn EmbeddingProvider,
        pad_to_tokens: usize,
    ) -> Result<(), StrategyError> {
        let Artefact::Document(doc) = item else {
            return Ok(());
        };

        ensure_embedding_field(
            &mut doc.input_embedding,
            &doc.input,
            "input_embedding",
            provider,
            pad_to_tokens,
        )
        .await?;
        ensure_embedding_field(
            &mut doc.output_embedding,
            &doc.output,
            "output_embedding",
            provider,
            pad_to_tokens,
        )
        .await?;

        Ok(())
    }

    fn compute_id(&self, item: &Artefact) -> String {
        match item {
            Artefact::Document(doc) => sha256_hex(&doc.output),
            _ => sha256_hex(""),
        }
    }

    fn build_index_document(&self, item: &Artefact) -> serde_json::Value {
        match item {
            Artefact::Document(doc) => json!({
                "input": doc.input,
                "output": doc.output,
                "input_embedding": doc.input_embedding,
                "output_embedding": doc.output_embedding,
            }),
            _ => serde_json::Value::Null,
        }
    }

    fn vector_field(&self, mode: VectorSearchMode) -> &'static str {
        match mode {
            VectorSearchMode::Question => "input_embedding",
            VectorSearchMode::Content | VectorSearchMode::Summary => "output_embedding",
        }
    }

    fn default_field_weights(&self) -> Vec<(&'static str, f32)> {
        vec![("input_embedding", 1.0), ("output_embedding", 1.0)]
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
                Artefact::Document(doc) => vec![doc.input.clone(), doc.output.clone()],
                _ => Vec::new(),
            },
        )
    }
}
