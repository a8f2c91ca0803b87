//! IndexingOrchestrator (C7, spec.md §4.7): end-to-end bulk-index and
//! single-file index flows, grounded on the teacher's embed-then-upsert
//! pipeline shape (`services/batch.rs`) and directory-walk-then-process
//! control flow (`cli/commands/index.rs`), generalized from a one-shot CLI
//! command into a reusable orchestrator invoked by the bus adapter.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::embedding::EmbeddingProvider;
use crate::engine::SearchEngineClient;
use crate::error::{AppError, ItemFailure, OrchestratorError, ResultObj};
use crate::models::{CreateIndexRequest, PaddingConfig};
use crate::pad_registry::{PadLengthRecord, PadLengthRegistry};
use crate::strategy::{IndexStrategy, StrategyRegistry};
use crate::tokenizer::Tokenizer;

const INDEX_CONFIG_DIR: &str = "index_config";

pub struct IndexingOrchestrator {
    strategies: Arc<StrategyRegistry>,
    provider: Arc<dyn EmbeddingProvider>,
    tokenizer: Arc<Tokenizer>,
    pad_registry: Arc<PadLengthRegistry>,
    engine: Arc<SearchEngineClient>,
    padding: PaddingConfig,
    vec_dim: usize,
    data_dir: PathBuf,
}

impl IndexingOrchestrator {
    pub fn new(
        strategies: Arc<StrategyRegistry>,
        provider: Arc<dyn EmbeddingProvider>,
        tokenizer: Arc<Tokenizer>,
        pad_registry: Arc<PadLengthRegistry>,
        engine: Arc<SearchEngineClient>,
        padding: PaddingConfig,
        vec_dim: usize,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            strategies,
            provider,
            tokenizer,
            pad_registry,
            engine,
            padding,
            vec_dim,
            data_dir,
        }
    }

    /// Dispatches a bus-facing `CreateIndexRequest` to the bulk or
    /// single-file flow depending on `createFromJsonDataDir`.
    #[instrument(skip(self, request), fields(index = %request.index_name))]
    pub async fn handle_create_index(&self, request: &CreateIndexRequest) -> ResultObj {
        if request.index_name.trim().is_empty() {
            return ResultObj::failed("indexName must not be empty");
        }

        let outcome = if request.create_from_json_data_dir {
            self.bulk_index(request.recreate_index).await
        } else {
            self.single_file_index(request).await
        };

        match outcome {
            Ok(result) => result,
            Err(err) => ResultObj::from(&AppError::from(err)),
        }
    }

    /// Step 1-7 of spec.md §4.7: walk `{dataDir}/{indexName}/*.json` for
    /// every subdirectory with a registered strategy.
    async fn bulk_index(&self, recreate_index: bool) -> Result<ResultObj, OrchestratorError> {
        let mut failures = Vec::new();
        let mut indexed_any = false;

        for entry in std::fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let dir_name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            if dir_name == INDEX_CONFIG_DIR {
                continue;
            }

            let files = json_files_in(&path)?;
            if files.is_empty() {
                continue;
            }

            let Some(strategy) = self.strategies.by_index_name(&dir_name) else {
                warn!(index = dir_name, "no strategy registered for index, skipping");
                continue;
            };

            let pad_to_tokens = self.ensure_pad_length(&dir_name, &files, strategy.as_ref()).await?;
            self.ensure_index(&dir_name, strategy.as_ref(), recreate_index).await?;

            for file in &files {
                let content = std::fs::read_to_string(file)?;
                let items = strategy.deserialize(&content);
                for mut item in items {
                    match strategy
                        .ensure_embeddings(&mut item, self.provider.as_ref(), pad_to_tokens)
                        .await
                    {
                        Ok(()) => {}
                        Err(e) => {
                            let id = strategy.compute_id(&item);
                            warn!(id, error = %e, "skipping item: embedding failed");
                            failures.push(ItemFailure {
                                id,
                                reason: e.to_string(),
                            });
                            continue;
                        }
                    }

                    let id = strategy.compute_id(&item);
                    if self.engine.exists_doc(&dir_name, &id).await? {
                        continue;
                    }

                    let body = strategy.build_index_document(&item);
                    if let Err(e) = self.engine.index_doc(&dir_name, &id, &body).await {
                        warn!(id, error = %e, "skipping item: engine rejected");
                        failures.push(ItemFailure {
                            id,
                            reason: e.to_string(),
                        });
                        continue;
                    }
                }
            }
            indexed_any = true;
        }

        if !indexed_any && failures.is_empty() {
            return Ok(ResultObj::ok("no indexable data found"));
        }
        Ok(ResultObj::from_item_failures(&failures))
    }

    /// Single-file flow (spec.md §4.7): pad length must already be known, or
    /// the operation fails with `PadLengthUnknown`.
    async fn single_file_index(
        &self,
        request: &CreateIndexRequest,
    ) -> Result<ResultObj, OrchestratorError> {
        let Some(strategy) = self.strategies.by_index_name(&request.index_name) else {
            return Err(OrchestratorError::InvalidRequest(format!(
                "no strategy registered for index '{}'",
                request.index_name
            )));
        };

        let record = self.pad_registry.require(&request.index_name).await?;

        self.ensure_index(&request.index_name, strategy.as_ref(), request.recreate_index)
            .await?;

        // The data source is either a file on disk or an inline JSON payload
        // (spec.md §4.7/§6: "explicit indexName + jsonFile (or inline
        // mapping)"); `jsonFile` takes precedence when both are present.
        let content = if let Some(json_file) = &request.json_file {
            std::fs::read_to_string(json_file)?
        } else if let Some(json_mapping) = &request.json_mapping {
            serde_json::to_string(json_mapping).map_err(|e| {
                OrchestratorError::InvalidRequest(format!("invalid jsonMapping: {e}"))
            })?
        } else {
            return Err(OrchestratorError::InvalidRequest(
                "either jsonFile or jsonMapping is required for single-file index".into(),
            ));
        };
        let items = strategy.deserialize(&content);

        let mut failures = Vec::new();
        for mut item in items {
            match strategy
                .ensure_embeddings(&mut item, self.provider.as_ref(), record.pad_to_tokens)
                .await
            {
                Ok(()) => {}
                Err(e) => {
                    let id = strategy.compute_id(&item);
                    failures.push(ItemFailure {
                        id,
                        reason: e.to_string(),
                    });
                    continue;
                }
            }

            let id = strategy.compute_id(&item);
            if self.engine.exists_doc(&request.index_name, &id).await? {
                continue;
            }
            let body = strategy.build_index_document(&item);
            if let Err(e) = self.engine.index_doc(&request.index_name, &id, &body).await {
                failures.push(ItemFailure {
                    id,
                    reason: e.to_string(),
                });
            }
        }

        Ok(ResultObj::from_item_failures(&failures))
    }

    async fn ensure_pad_length(
        &self,
        index_name: &str,
        files: &[PathBuf],
        strategy: &dyn IndexStrategy,
    ) -> Result<usize, OrchestratorError> {
        if let Some(record) = self.pad_registry.get(index_name).await? {
            return Ok(record.pad_to_tokens);
        }

        let (pad_to_tokens, actual_max_tokens) = strategy.estimate_padding(
            files,
            &self.tokenizer,
            self.padding.max_token_length_cap,
            self.padding.min_token_length_cap,
        );
        let record = PadLengthRecord {
            pad_to_tokens,
            actual_max_tokens,
        };
        self.pad_registry.put(index_name, record).await?;
        Ok(pad_to_tokens)
    }

    async fn ensure_index(
        &self,
        index_name: &str,
        strategy: &dyn IndexStrategy,
        recreate_index: bool,
    ) -> Result<(), OrchestratorError> {
        if recreate_index {
            self.engine.delete(index_name).await?;
            info!(index = index_name, "recreating index");
            self.engine
                .create(index_name, &strategy.engine_mapping(self.vec_dim))
                .await?;
        } else if !self.engine.exists(index_name).await? {
            info!(index = index_name, "creating index");
            self.engine
                .create(index_name, &strategy.engine_mapping(self.vec_dim))
                .await?;
        }
        Ok(())
    }
}

fn json_files_in(dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            files.push(path);
        }
    }
    Ok(files)
}
