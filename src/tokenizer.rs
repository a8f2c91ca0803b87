//! Text tokenization (C1): text -> token id sequence, pad/truncate, count-only mode.
//!
//! Wraps a `tokenizers::Tokenizer` fast-tokenizer runtime loaded from a
//! model directory: a tokenizer manifest (`tokenizer.json`), a
//! tokenizer-config file (`tokenizer_config.json`) yielding the pad-token
//! symbol and optional declared max length, and a vocabulary embedded in
//! the manifest (or a standalone `vocab.json`/`vocab.txt`).

use std::path::Path;

use serde::Deserialize;
use tokenizers::Tokenizer as HfTokenizer;

use crate::error::TokenizerError;

/// Three equal-length sequences ready to feed a model, per spec.md §3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizedInput {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub token_type_ids: Vec<i64>,
}

impl TokenizedInput {
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct TokenizerConfigFile {
    #[serde(default)]
    pad_token: Option<String>,
    #[serde(default)]
    model_max_length: Option<f64>,
}

/// Loads from a model directory and exposes encode/tokenize/count/decode.
pub struct Tokenizer {
    inner: HfTokenizer,
    pad_id: u32,
    #[allow(dead_code)]
    declared_max_length: Option<usize>,
}

impl Tokenizer {
    /// Load from `{model_dir}/tokenizer.json` + `{model_dir}/tokenizer_config.json`.
    ///
    /// Fails with `InvalidModel` if either file is missing or the configured
    /// pad symbol is not present in the vocabulary.
    pub fn load(model_dir: &Path) -> Result<Self, TokenizerError> {
        let tokenizer_path = model_dir.join("tokenizer.json");
        let config_path = model_dir.join("tokenizer_config.json");

        if !tokenizer_path.exists() {
            return Err(TokenizerError::InvalidModel(format!(
                "tokenizer manifest not found: {}",
                tokenizer_path.display()
            )));
        }
        if !config_path.exists() {
            return Err(TokenizerError::InvalidModel(format!(
                "tokenizer config not found: {}",
                config_path.display()
            )));
        }

        let inner = HfTokenizer::from_file(&tokenizer_path)
            .map_err(|e| TokenizerError::InvalidModel(e.to_string()))?;

        let config_raw = std::fs::read_to_string(&config_path)
            .map_err(|e| TokenizerError::InvalidModel(e.to_string()))?;
        let config: TokenizerConfigFile = serde_json::from_str(&config_raw)
            .map_err(|e| TokenizerError::InvalidModel(e.to_string()))?;

        let pad_token = config.pad_token.unwrap_or_else(|| "[PAD]".to_string());
        let pad_id = inner.token_to_id(&pad_token).ok_or_else(|| {
            TokenizerError::InvalidModel(format!(
                "pad symbol '{pad_token}' is not present in the vocabulary"
            ))
        })?;

        Ok(Self {
            inner,
            pad_id,
            declared_max_length: config.model_max_length.map(|n| n as usize),
        })
    }

    /// Natural id sequence, no padding, no truncation.
    pub fn encode(&self, text: &str) -> Result<Vec<u32>, TokenizerError> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| TokenizerError::EncodeFailed(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    /// Pad-mode tokenization: truncate to `len`, pad tail with `pad_id`/mask 0.
    /// Output lengths are exactly `len`.
    pub fn tokenize(&self, text: &str, len: usize) -> Result<TokenizedInput, TokenizerError> {
        let ids = self.encode(text)?;
        let take = ids.len().min(len);

        let mut input_ids = Vec::with_capacity(len);
        let mut attention_mask = Vec::with_capacity(len);

        for &id in &ids[..take] {
            input_ids.push(id as i64);
            attention_mask.push(1);
        }
        while input_ids.len() < len {
            input_ids.push(self.pad_id as i64);
            attention_mask.push(0);
        }

        Ok(TokenizedInput {
            token_type_ids: vec![0; len],
            input_ids,
            attention_mask,
        })
    }

    /// No-pad tokenization: natural length, attention-mask all 1.
    pub fn tokenize_no_pad(&self, text: &str) -> Result<TokenizedInput, TokenizerError> {
        let ids = self.encode(text)?;
        let len = ids.len();
        Ok(TokenizedInput {
            input_ids: ids.into_iter().map(|id| id as i64).collect(),
            attention_mask: vec![1; len],
            token_type_ids: vec![0; len],
        })
    }

    /// Token count only; does not build any downstream tensor.
    pub fn count(&self, text: &str) -> Result<usize, TokenizerError> {
        Ok(self.encode(text)?.len())
    }

    /// Inverse mapping, required by the remote provider's context-length
    /// truncation retry (spec.md §9: "remote provider truncation requires decode").
    pub fn decode(&self, ids: &[u32]) -> Result<String, TokenizerError> {
        self.inner
            .decode(ids, true)
            .map_err(|e| TokenizerError::EncodeFailed(e.to_string()))
    }

    pub fn pad_id(&self) -> u32 {
        self.pad_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_minimal_tokenizer(dir: &Path) {
        let manifest = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [],
            "normalizer": null,
            "pre_tokenizer": { "type": "Whitespace" },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": {
                    "[PAD]": 0,
                    "[UNK]": 1,
                    "hello": 2,
                    "world": 3
                },
                "unk_token": "[UNK]"
            }
        });
        let mut f = std::fs::File::create(dir.join("tokenizer.json")).unwrap();
        f.write_all(serde_json::to_vec(&manifest).unwrap().as_slice())
            .unwrap();

        let config = serde_json::json!({ "pad_token": "[PAD]", "model_max_length": 512.0 });
        std::fs::write(
            dir.join("tokenizer_config.json"),
            serde_json::to_vec(&config).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn pad_mode_produces_exact_length() {
        let dir = tempfile::tempdir().unwrap();
        write_minimal_tokenizer(dir.path());
        let tok = Tokenizer::load(dir.path()).unwrap();

        let out = tok.tokenize("hello world", 8).unwrap();
        assert_eq!(out.len(), 8);
        assert_eq!(out.attention_mask, vec![1, 1, 0, 0, 0, 0, 0, 0]);
        assert_eq!(out.token_type_ids, vec![0; 8]);
    }

    #[test]
    fn no_pad_mode_matches_natural_length() {
        let dir = tempfile::tempdir().unwrap();
        write_minimal_tokenizer(dir.path());
        let tok = Tokenizer::load(dir.path()).unwrap();

        let ids = tok.encode("hello world").unwrap();
        let out = tok.tokenize_no_pad("hello world").unwrap();
        assert_eq!(out.len(), ids.len());
        assert!(out.attention_mask.iter().all(|&m| m == 1));
    }

    #[test]
    fn count_matches_encode_length() {
        let dir = tempfile::tempdir().unwrap();
        write_minimal_tokenizer(dir.path());
        let tok = Tokenizer::load(dir.path()).unwrap();

        assert_eq!(tok.count("hello world").unwrap(), tok.encode("hello world").unwrap().len());
    }

    #[test]
    fn missing_pad_symbol_is_invalid_model() {
        let dir = tempfile::tempdir().unwrap();
        write_minimal_tokenizer(dir.path());
        // Overwrite with a pad token absent from the vocabulary.
        let config = serde_json::json!({ "pad_token": "<not-in-vocab>" });
        std::fs::write(
            dir.path().join("tokenizer_config.json"),
            serde_json::to_vec(&config).unwrap(),
        )
        .unwrap();

        let err = Tokenizer::load(dir.path()).unwrap_err();
        assert!(matches!(err, TokenizerError::InvalidModel(_)));
    }

    #[test]
    fn missing_files_are_invalid_model() {
        let dir = tempfile::tempdir().unwrap();
        let err = Tokenizer::load(dir.path()).unwrap_err();
        assert!(matches!(err, TokenizerError::InvalidModel(_)));
    }
}
