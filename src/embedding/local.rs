//! Local ONNX embedding provider (C2a, spec.md §4.2a).
//!
//! Owns a shared `ort::Session` and a `Tokenizer`. The session is not safe
//! for concurrent use, so every call passes through a `tokio::sync::Mutex`
//! gate — FIFO-fair and cancel-safe under `tokio::select!`, matching the
//! teacher's `Mutex<Session>` in `src/server/embedding.rs`, generalized from
//! a std `Mutex` (blocking, CLI-appropriate) to a tokio one (a bus consumer
//! must not block its worker thread while waiting on the gate).

use std::path::Path;

use async_trait::async_trait;
use half::f16;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::{DynValue, Tensor};
use tokio::sync::Mutex;

use crate::error::EmbeddingError;
use crate::models::{LocalProviderConfig, QuantizationParams};
use crate::tokenizer::{TokenizedInput, Tokenizer};

use super::{Embedding, EmbeddingProvider};

pub struct LocalEmbeddingProvider {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dimension: usize,
    position_ids_input_name: Option<String>,
    token_type_ids_input_name: Option<String>,
    quantization: Option<QuantizationParams>,
}

impl LocalEmbeddingProvider {
    pub fn load(config: &LocalProviderConfig) -> Result<Self, EmbeddingError> {
        let model_path = config.model_dir.join("model.onnx");
        Self::load_from(&model_path, &config.model_dir, config)
    }

    fn load_from(
        model_path: &Path,
        tokenizer_dir: &Path,
        config: &LocalProviderConfig,
    ) -> Result<Self, EmbeddingError> {
        let tokenizer = Tokenizer::load(tokenizer_dir)?;

        let session = Session::builder()
            .map_err(onnx_err)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(onnx_err)?
            .with_intra_threads(config.threads)
            .map_err(onnx_err)?
            .commit_from_file(model_path)
            .map_err(onnx_err)?;

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimension: config.vec_dim,
            position_ids_input_name: config.position_ids_input_name.clone(),
            token_type_ids_input_name: config.token_type_ids_input_name.clone(),
            quantization: config.quantization,
        })
    }

    /// Batch variant (spec.md §4.2a "Batch variant"): one ONNX call for `B`
    /// texts, each padded or truncated to the same `pad_to_tokens`/natural
    /// length depending on `pad`.
    pub async fn embed_batch(
        &self,
        texts: &[String],
        pad_to_tokens: usize,
        pad: bool,
    ) -> Result<Vec<Embedding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let tokenized: Vec<TokenizedInput> = texts
            .iter()
            .map(|t| self.tokenize(t, pad_to_tokens, pad))
            .collect::<Result<_, _>>()?;

        let max_len = tokenized.iter().map(|t| t.len()).max().unwrap_or(0);
        let batch = tokenized.len();

        let mut input_ids = vec![0i64; batch * max_len];
        let mut attention_mask = vec![0i64; batch * max_len];
        let mut position_ids = vec![0i64; batch * max_len];
        let mut token_type_ids = vec![0i64; batch * max_len];

        for (b, t) in tokenized.iter().enumerate() {
            for (i, (&id, &m)) in t.input_ids.iter().zip(t.attention_mask.iter()).enumerate() {
                input_ids[b * max_len + i] = id;
                attention_mask[b * max_len + i] = m;
                position_ids[b * max_len + i] = i as i64;
                token_type_ids[b * max_len + i] = t.token_type_ids[i];
            }
        }

        let outputs = self
            .run_session(batch, max_len, input_ids, attention_mask, position_ids, token_type_ids)
            .await?;

        let masks: Vec<&[i64]> = tokenized
            .iter()
            .map(|t| t.attention_mask.as_slice())
            .collect();
        dispatch_pool(&outputs, batch, max_len, self.dimension, &masks, self.quantization)
    }

    fn tokenize(
        &self,
        text: &str,
        pad_to_tokens: usize,
        pad: bool,
    ) -> Result<TokenizedInput, EmbeddingError> {
        Ok(if pad {
            self.tokenizer.tokenize(text, pad_to_tokens)?
        } else {
            self.tokenizer.tokenize_no_pad(text)?
        })
    }

    async fn run_session(
        &self,
        batch: usize,
        len: usize,
        input_ids: Vec<i64>,
        attention_mask: Vec<i64>,
        position_ids: Vec<i64>,
        token_type_ids: Vec<i64>,
    ) -> Result<Vec<ort::value::Value>, EmbeddingError> {
        let input_ids_tensor = Tensor::from_array(([batch, len], input_ids)).map_err(onnx_err)?;
        let attention_mask_tensor =
            Tensor::from_array(([batch, len], attention_mask)).map_err(onnx_err)?;

        let mut inputs: Vec<(String, DynValue)> = vec![
            ("input_ids".to_string(), input_ids_tensor.into_dyn()),
            ("attention_mask".to_string(), attention_mask_tensor.into_dyn()),
        ];

        // Both bindings are independently configurable (spec.md §9):
        // a model that wants `position_ids` gets the positional index array,
        // one that wants `token_type_ids` gets the (separately tracked)
        // all-zero array, never one array silently aliased under both names.
        if let Some(name) = &self.position_ids_input_name {
            let tensor = Tensor::from_array(([batch, len], position_ids)).map_err(onnx_err)?;
            inputs.push((name.clone(), tensor.into_dyn()));
        }
        if let Some(name) = &self.token_type_ids_input_name {
            let tensor = Tensor::from_array(([batch, len], token_type_ids)).map_err(onnx_err)?;
            inputs.push((name.clone(), tensor.into_dyn()));
        }

        // Acquire the single-lane gate. Held only across the synchronous
        // `session.run` call; the async wrapper still lets other tasks queue
        // up FIFO behind it while this one runs.
        let mut session = self.session.lock().await;
        let outputs = session.run(inputs).map_err(onnx_err)?;
        Ok(outputs.into_iter().map(|(_, v)| v).collect())
    }
}

fn onnx_err(e: ort::Error) -> EmbeddingError {
    EmbeddingError::Inference(e.to_string())
}

/// Pick the first output (in declaration order) whose element type is
/// `float32`; failing that, the first `float16`; failing that, the first
/// `uint8`; fail `UnsupportedOutput` otherwise (spec.md §4.2a step 3). Scans
/// every output rather than assuming the pooled tensor is at index 0, since
/// a model may emit an aux output (e.g. `pooler_output`) before or after the
/// per-token hidden states this spec pools over.
fn dispatch_pool(
    outputs: &[ort::value::Value],
    batch: usize,
    seq_len: usize,
    dim: usize,
    masks: &[&[i64]],
    quantization: Option<QuantizationParams>,
) -> Result<Vec<Embedding>, EmbeddingError> {
    for output in outputs {
        if let Ok((shape, data)) = output.try_extract_raw_tensor::<f32>() {
            let widened: Vec<f32> = data.to_vec();
            return Ok(pool_batches(&widened, &shape, batch, seq_len, dim, masks));
        }
    }
    for output in outputs {
        if let Ok((shape, data)) = output.try_extract_raw_tensor::<f16>() {
            let widened: Vec<f32> = data.iter().map(|v| v.to_f32()).collect();
            return Ok(pool_batches(&widened, &shape, batch, seq_len, dim, masks));
        }
    }
    for output in outputs {
        if let Ok((shape, data)) = output.try_extract_raw_tensor::<u8>() {
            let params = quantization.ok_or_else(|| {
                EmbeddingError::UnsupportedOutput(
                    "uint8 model output requires scale/zero_point quantization config".to_string(),
                )
            })?;
            let widened: Vec<f32> = data
                .iter()
                .map(|&q| (q as f32 - params.zero_point as f32) * params.scale)
                .collect();
            return Ok(pool_batches(&widened, &shape, batch, seq_len, dim, masks));
        }
    }
    Err(EmbeddingError::UnsupportedOutput(
        "onnx output element type is none of float32, float16, uint8".to_string(),
    ))
}

/// Attention-masked mean pooling over `[B, L, D]`-shaped hidden states
/// (spec.md §4.2a step 4). `sum_i mask[i]*hidden[i,d] / sum_i mask[i]`, 0/0
/// defined as 0.
fn pool_batches(
    data: &[f32],
    shape: &[i64],
    batch: usize,
    seq_len: usize,
    dim: usize,
    masks: &[&[i64]],
) -> Vec<Embedding> {
    let hidden_dim = *shape.last().unwrap_or(&(dim as i64)) as usize;
    let mut out = Vec::with_capacity(batch);
    for b in 0..batch {
        let mask = masks.get(b).copied().unwrap_or(&[]);
        let mut sum = vec![0f32; hidden_dim];
        let mut count = 0f32;
        for i in 0..seq_len {
            let m = mask.get(i).copied().unwrap_or(0);
            if m == 1 {
                count += 1.0;
                let base = (b * seq_len + i) * hidden_dim;
                for d in 0..hidden_dim {
                    sum[d] += data[base + d];
                }
            }
        }
        if count > 0.0 {
            for v in sum.iter_mut() {
                *v /= count;
            }
        }
        out.push(sum);
    }
    out
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    async fn embed(
        &self,
        text: &str,
        pad_to_tokens: usize,
        pad: bool,
    ) -> Result<Embedding, EmbeddingError> {
        let mut results = self.embed_batch(&[text.to_string()], pad_to_tokens, pad).await?;
        results
            .pop()
            .ok_or(EmbeddingError::EmbeddingFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_pool_is_zero_vector_when_mask_is_all_zero() {
        let data = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]; // [1, 2, 3]
        let shape = [1i64, 2, 3];
        let masks: Vec<&[i64]> = vec![&[0, 0]];
        let pooled = pool_batches(&data, &shape, 1, 2, 3, &masks);
        assert_eq!(pooled[0], vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn mean_pool_matches_hand_computed_average() {
        // two positions, dim 2: [ [1,2], [3,4] ], mask = [1,1]
        let data = vec![1.0f32, 2.0, 3.0, 4.0];
        let shape = [1i64, 2, 2];
        let masks: Vec<&[i64]> = vec![&[1, 1]];
        let pooled = pool_batches(&data, &shape, 1, 2, 2, &masks);
        assert_eq!(pooled[0], vec![2.0, 3.0]);
    }

    #[test]
    fn mean_pool_ignores_padded_positions() {
        // three positions, dim 1: values 10, 20, 999(padded); mask = [1,1,0]
        let data = vec![10.0f32, 20.0, 999.0];
        let shape = [1i64, 3, 1];
        let masks: Vec<&[i64]> = vec![&[1, 1, 0]];
        let pooled = pool_batches(&data, &shape, 1, 3, 1, &masks);
        assert_eq!(pooled[0], vec![15.0]);
    }

    #[test]
    fn uint8_dequantization_arithmetic() {
        let q: u8 = 130;
        let params = QuantizationParams {
            scale: 0.5,
            zero_point: 128,
        };
        let value = (q as f32 - params.zero_point as f32) * params.scale;
        assert_eq!(value, 1.0);
    }
}
