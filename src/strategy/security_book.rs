//! `SecurityBook` strategy: input/output/summary triples, the only artefact
//! that exercises the multi-field weighted search path end to end (spec.md
//! §8 scenario 4).

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::json;

use crate::embedding::EmbeddingProvider;
use crate::error::StrategyError;
use crate::models::{Artefact, EngineFamily, SecurityBook, VectorSearchMode};
use crate::tokenizer::Tokenizer;

use super::{
    IndexStrategy, build_engine_mapping, ensure_embedding_field, estimate_padding_over, sha256_hex,
};

const TEXT_FIELDS: [&str; 3] = ["input", "output", "summary"];
const VECTOR_FIELDS: [&str; 3] = ["input_embedding", "output_embedding", "summary_embedding"];

pub struct SecurityBookStrategy {
    engine_family: EngineFamily,
}

impl SecurityBookStrategy {
    pub fn new(engine_family: EngineFamily) -> Self {
        Self { engine_family }
    }
}

#[async_trait]
impl IndexStrategy for SecurityBookStrategy {
    fn index_name(&self) -> &'static str {
        "securitybooks"
    }

    fn can_handle(&self, item: &Artefact) -> bool {
        matches!(item, Artefact::SecurityBook(_))
    }

    fn deserialize(&self, json_text: &str) -> Vec<Artefact> {
        serde_json::from_str::<Vec<SecurityBook>>(json_text)
            .map(|items| items.into_iter().map(Artefact::SecurityBook).collect())
            .unwrap_or_default()
    }

    fn fields(&self, item: &Artefact) -> Vec<&'static str> {
        match item {
            Artefact::SecurityBook(_) => TEXT_FIELDS.to_vec(),
            _ => Vec::new(),
        }
    }

    async fn ensure_embeddings(
        &self,
        item: &mut Artefact,
        provider: &dyn EmbeddingProvider,
        pad_to_tokens: usize,
    ) -> Result<(), StrategyError> {
        let Artefact::SecurityBook(book) = item else {
            return Ok(());
        };

        ensure_embedding_field(
            &mut book.input_embedding,
            &book.input,
            "input_embedding",
            provider,
            pad_to_tokens,
        )
        .await?;
        ensure_embedding_field(
            &mut book.output_embedding,
            &book.output,
            "output_embedding",
            provider,
            pad_to_tokens,
        )
        .await?;
        ensure_embedding_field(
            &mut book.summary_embedding,
            &book.summary,
            "summary_embedding",
            provider,
            pad_to_tokens,
        )
        .await?;

        Ok(())
    }

    fn compute_id(&self, item: &Artefact) -> String {
        match item {
            Artefact::SecurityBook(book) => sha256_hex(&book.output),
            _ => sha256_hex(""),
        }
    }

    fn build_index_document(&self, item: &Artefact) -> serde_json::Value {
        match item {
            Artefact::SecurityBook(book) => json!({
                "input": book.input,
                "output": book.output,
                "summary": book.summary,
                "input_embedding": book.input_embedding,
                "output_embedding": book.output_embedding,
                "summary_embedding": book.summary_embedding,
            }),
            _ => serde_json::Value::Null,
        }
    }

    fn vector_field(&self, mode: VectorSearchMode) -> &'static str {
        match mode {
            VectorSearchMode::Question => "input_embedding",
            VectorSearchMode::Summary => "summary_embedding",
            VectorSearchMode::Content => "output_embedding",
        }
    }

    fn default_field_weights(&self) -> Vec<(&'static str, f32)> {
        vec![
            ("input_embedding", 1.0),
            ("output_embedding", 1.0),
            ("summary_embedding", 1.0),
        ]
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
                Artefact::SecurityBook(book) => {
                    vec![book.input.clone(), book.output.clone(), book.summary.clone()]
                }
                _ => Vec::new(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_three_modes_resolve_to_distinct_fields() {
        let strategy = SecurityBookStrategy::new(EngineFamily::Nmslib);
        let content = strategy.vector_field(VectorSearchMode::Content);
        let question = strategy.vector_field(VectorSearchMode::Question);
        let summary = strategy.vector_field(VectorSearchMode::Summary);
        assert_ne!(content, question);
        assert_ne!(content, summary);
        assert_ne!(question, summary);
    }

    #[test]
    fn default_weights_are_all_one() {
        let strategy = SecurityBookStrategy::new(EngineFamily::Nmslib);
        assert!(strategy.default_field_weights().iter().all(|(_, w)| *w == 1.0));
    }
}
