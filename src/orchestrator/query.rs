//! QueryOrchestrator (C8, spec.md §4.8): validate -> cache -> pad-lookup ->
//! embed -> dispatch -> project. Grounded on the teacher's
//! `services/search.rs` query pipeline shape, generalized from a single
//! Qdrant collection search into a per-strategy single- or multi-field k-NN
//! dispatch, with an added ageless result cache (SPEC_FULL.md §4.8).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::embedding::EmbeddingProvider;
use crate::engine::SearchEngineClient;
use crate::error::{AppError, OrchestratorError};
use crate::models::{QueryIndexRequest, QueryIndexResponse, QueryResultItem};
use crate::pad_registry::PadLengthRegistry;
use crate::strategy::StrategyRegistry;

/// k per k-NN call, both single- and multi-field (spec.md §4.8 step 5).
const DEFAULT_K: usize = 3;

type CacheKey = (String, String);
type CacheValue = Vec<(String, String)>;

pub struct QueryOrchestrator {
    strategies: Arc<StrategyRegistry>,
    provider: Arc<dyn EmbeddingProvider>,
    pad_registry: Arc<PadLengthRegistry>,
    engine: Arc<SearchEngineClient>,
    min_token_length_cap: usize,
    cache: RwLock<HashMap<CacheKey, CacheValue>>,
}

impl QueryOrchestrator {
    pub fn new(
        strategies: Arc<StrategyRegistry>,
        provider: Arc<dyn EmbeddingProvider>,
        pad_registry: Arc<PadLengthRegistry>,
        engine: Arc<SearchEngineClient>,
        min_token_length_cap: usize,
    ) -> Self {
        Self {
            strategies,
            provider,
            pad_registry,
            engine,
            min_token_length_cap,
            cache: RwLock::new(HashMap::new()),
        }
    }

    #[instrument(skip(self, request), fields(index = %request.index_name))]
    pub async fn handle_query(&self, request: &QueryIndexRequest) -> QueryIndexResponse {
        match self.query(request).await {
            Ok(response) => response,
            Err(err) => QueryIndexResponse {
                success: false,
                message: AppError::from(err).to_string(),
                query_results: Vec::new(),
            },
        }
    }

    async fn query(
        &self,
        request: &QueryIndexRequest,
    ) -> Result<QueryIndexResponse, OrchestratorError> {
        if request.index_name.trim().is_empty() || request.query_text.trim().is_empty() {
            return Err(OrchestratorError::InvalidRequest(
                "indexName and queryText must not be empty".into(),
            ));
        }

        let cache_key = (request.index_name.clone(), request.query_text.clone());
        if let Some(cached) = self.cache.read().await.get(&cache_key) {
            debug!(index = request.index_name, "query cache hit");
            return Ok(project(cached));
        }

        let strategy = self.strategies.by_index_name(&request.index_name).ok_or_else(|| {
            OrchestratorError::InvalidRequest(format!(
                "no strategy registered for index '{}'",
                request.index_name
            ))
        })?;

        // Pad length falls back to `minTokenLengthCap` when unknown (spec.md
        // §4.8 step 3) — unlike the indexing path, a missing record here is
        // not a hard error.
        let pad_to_tokens = match self.pad_registry.get(&request.index_name).await? {
            Some(record) => record.pad_to_tokens,
            None => self.min_token_length_cap,
        };

        // The query is embedded without padding (spec.md §4.8 step 4).
        let vector = self
            .provider
            .embed(&request.query_text, pad_to_tokens, false)
            .await?;

        let hits = match request.vector_search_mode {
            Some(mode) => {
                let field = strategy.vector_field(mode);
                self.engine
                    .knn_search(&request.index_name, field, &vector, DEFAULT_K)
                    .await?
            }
            None => {
                self.engine
                    .multi_field_knn_search(
                        &request.index_name,
                        &strategy.default_field_weights(),
                        &vector,
                        DEFAULT_K,
                    )
                    .await?
            }
        };

        let projected: CacheValue = hits
            .iter()
            .map(|hit| {
                let input = hit.source["input"].as_str().unwrap_or_default().to_string();
                let output = hit.source["output"].as_str().unwrap_or_default().to_string();
                (input, output)
            })
            .collect();

        self.cache.write().await.insert(cache_key, projected.clone());

        Ok(project(&projected))
    }
}

fn project(pairs: &[(String, String)]) -> QueryIndexResponse {
    QueryIndexResponse {
        success: true,
        message: "query succeeded".to_string(),
        query_results: pairs
            .iter()
            .map(|(input, output)| QueryResultItem {
                input: input.clone(),
                output: output.clone(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{Embedding, EmbeddingProvider};
    use crate::error::EmbeddingError;
    use crate::models::{EngineConfig, EngineFamily, VectorSearchMode};
    use crate::pad_registry::PadLengthRecord;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn project_maps_pairs_to_query_result_items() {
        let pairs = vec![("q1".to_string(), "a1".to_string())];
        let response = project(&pairs);
        assert!(response.success);
        assert_eq!(response.query_results.len(), 1);
        assert_eq!(response.query_results[0].input, "q1");
        assert_eq!(response.query_results[0].output, "a1");
    }

    /// Records every `padToTokens`/`pad` pair it was called with so the
    /// "query embeds without padding" law can be asserted directly.
    struct RecordingProvider {
        calls: std::sync::Mutex<Vec<(usize, bool)>>,
    }

    impl RecordingProvider {
        fn new() -> Self {
            Self {
                calls: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for RecordingProvider {
        async fn embed(
            &self,
            _text: &str,
            pad_to_tokens: usize,
            pad: bool,
        ) -> Result<Embedding, EmbeddingError> {
            self.calls.lock().unwrap().push((pad_to_tokens, pad));
            Ok(vec![1.0, 0.0])
        }
    }

    fn test_engine_config(uri: &str) -> EngineConfig {
        EngineConfig {
            url: uri.to_string(),
            user: "admin".to_string(),
            key: "secret".to_string(),
            default_index: "documents".to_string(),
            engine_family: EngineFamily::Nmslib,
        }
    }

    /// spec.md §8 scenario 3 and §4.8 step 4: the query embeds without
    /// padding, and with `minTokenLengthCap` when no pad length is on file.
    #[tokio::test]
    async fn query_embeds_without_padding_and_falls_back_to_min_cap() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "hits": { "hits": [
                    { "_id": "x", "_score": 1.0, "_source": { "input": "q1", "output": "a1" } }
                ] }
            })))
            .mount(&server)
            .await;

        let provider = Arc::new(RecordingProvider::new());
        let tmp = tempfile::tempdir().unwrap();
        let pad_registry = Arc::new(PadLengthRegistry::new(tmp.path()));
        let strategies = Arc::new(StrategyRegistry::with_defaults(EngineFamily::Nmslib));
        let engine = Arc::new(SearchEngineClient::new(&test_engine_config(&server.uri())).unwrap());

        let orchestrator = QueryOrchestrator::new(
            strategies,
            provider.clone(),
            pad_registry,
            engine,
            64,
        );

        let request = QueryIndexRequest {
            index_name: "documents".to_string(),
            query_text: "q1".to_string(),
            vector_search_mode: Some(VectorSearchMode::Content),
            app_id: "app-1".to_string(),
            auth_key: "secret".to_string(),
            routing_key: None,
        };

        let response = orchestrator.handle_query(&request).await;
        assert!(response.success, "{}", response.message);
        assert_eq!(response.query_results.len(), 1);
        assert_eq!(response.query_results[0].output, "a1");

        let calls = provider.calls.lock().unwrap();
        assert_eq!(calls.as_slice(), &[(64, false)]);
    }

    /// The result cache is consulted before any engine or provider call —
    /// a second identical query never re-embeds or re-searches.
    #[tokio::test]
    async fn repeated_query_hits_the_cache_and_calls_the_engine_once() {
        let server = MockServer::start().await;
        let call_count = Arc::new(AtomicUsize::new(0));
        let counted = call_count.clone();
        Mock::given(method("POST"))
            .respond_with(move |_: &wiremock::Request| {
                counted.fetch_add(1, Ordering::SeqCst);
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "hits": { "hits": [
                        { "_id": "x", "_score": 1.0, "_source": { "input": "q1", "output": "a1" } }
                    ] }
                }))
            })
            .mount(&server)
            .await;

        let provider = Arc::new(RecordingProvider::new());
        let tmp = tempfile::tempdir().unwrap();
        let pad_registry = Arc::new(PadLengthRegistry::new(tmp.path()));
        pad_registry
            .put(
                "documents",
                PadLengthRecord {
                    pad_to_tokens: 128,
                    actual_max_tokens: 100,
                },
            )
            .await
            .unwrap();
        let strategies = Arc::new(StrategyRegistry::with_defaults(EngineFamily::Nmslib));
        let engine = Arc::new(SearchEngineClient::new(&test_engine_config(&server.uri())).unwrap());

        let orchestrator = QueryOrchestrator::new(strategies, provider, pad_registry, engine, 64);

        let request = QueryIndexRequest {
            index_name: "documents".to_string(),
            query_text: "q1".to_string(),
            vector_search_mode: None,
            app_id: "app-1".to_string(),
            auth_key: "secret".to_string(),
            routing_key: None,
        };

        let first = orchestrator.handle_query(&request).await;
        let second = orchestrator.handle_query(&request).await;
        assert!(first.success && second.success);
        assert_eq!(first.query_results, second.query_results);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_query_text_is_rejected_before_any_engine_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let provider = Arc::new(RecordingProvider::new());
        let tmp = tempfile::tempdir().unwrap();
        let pad_registry = Arc::new(PadLengthRegistry::new(tmp.path()));
        let strategies = Arc::new(StrategyRegistry::with_defaults(EngineFamily::Nmslib));
        let engine = Arc::new(SearchEngineClient::new(&test_engine_config(&server.uri())).unwrap());
        let orchestrator = QueryOrchestrator::new(strategies, provider, pad_registry, engine, 64);

        let request = QueryIndexRequest {
            index_name: "documents".to_string(),
            query_text: "   ".to_string(),
            vector_search_mode: None,
            app_id: "app-1".to_string(),
            auth_key: "secret".to_string(),
            routing_key: None,
        };

        let response = orchestrator.handle_query(&request).await;
        assert!(!response.success);
        server.verify().await;
    }
}
