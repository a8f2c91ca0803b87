//! SearchEngineClient (C6, spec.md §4.6): a thin HTTP adapter over the
//! external k-NN–capable search engine. Reimplemented over raw `reqwest` +
//! `serde_json` bodies instead of the teacher's Qdrant gRPC client
//! (`services/vector_store.rs`), because the spec's wire surface is a plain
//! HTTPS JSON k-NN engine with basic auth (§4.6, §6), not Qdrant's protocol
//! — the per-operation method shape (`exists`, `create`, `search`, `delete`)
//! is kept directly from that teacher file.

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tracing::debug;

use crate::error::EngineError;
use crate::models::EngineConfig;
use crate::utils::retry::{RetryConfig, with_retry, RetryResult};

fn read_retry_config() -> RetryConfig {
    RetryConfig::new(3)
        .with_initial_delay(std::time::Duration::from_millis(100))
        .with_max_delay(std::time::Duration::from_secs(2))
}

/// One k-NN search hit: the document `_source` plus its score.
#[derive(Debug, Clone)]
pub struct Hit {
    pub id: String,
    pub score: f32,
    pub source: Value,
}

pub struct SearchEngineClient {
    client: Client,
    base_url: String,
    user: String,
    key: String,
}

impl SearchEngineClient {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        // Intra-cluster deployment with a self-signed certificate (spec.md
        // §4.6): TLS verification is intentionally permissive on this
        // client only, not a blanket process-wide override.
        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            user: config.user.clone(),
            key: config.key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn check_status(
        &self,
        method: &str,
        path: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, EngineError> {
        let status = response.status();
        debug!(method, path, status = status.as_u16(), "engine call");
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Idempotent read-only probes get the ambient retry treatment (timeout
    /// / connection-refused, per `EngineError::is_retryable`) on top of the
    /// spec's own per-item failure handling; writes are not retried here so
    /// a transient error surfaces straight to the orchestrator's per-item
    /// failure path instead of silently doubling a side effect.
    async fn with_read_retry<T, F, Fut>(&self, operation: F) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, EngineError>>,
    {
        match with_retry(&read_retry_config(), operation).await {
            RetryResult::Success(value) => Ok(value),
            RetryResult::Failed { last_error, .. } => Err(last_error),
        }
    }

    pub async fn exists(&self, index: &str) -> Result<bool, EngineError> {
        self.with_read_retry(|| async {
            let response = self
                .client
                .head(self.url(index))
                .basic_auth(&self.user, Some(&self.key))
                .send()
                .await?;
            Ok(response.status().is_success())
        })
        .await
    }

    pub async fn create(&self, index: &str, mapping: &Value) -> Result<(), EngineError> {
        let response = self
            .client
            .put(self.url(index))
            .basic_auth(&self.user, Some(&self.key))
            .json(mapping)
            .send()
            .await?;
        self.check_status("PUT", index, response).await?;
        Ok(())
    }

    /// Ok/absent/fail: a 404 is treated as "already absent", not an error.
    pub async fn delete(&self, index: &str) -> Result<bool, EngineError> {
        let response = self
            .client
            .delete(self.url(index))
            .basic_auth(&self.user, Some(&self.key))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        self.check_status("DELETE", index, response).await?;
        Ok(true)
    }

    pub async fn exists_doc(&self, index: &str, id: &str) -> Result<bool, EngineError> {
        self.with_read_retry(|| async {
            let response = self
                .client
                .head(self.url(&format!("{index}/_doc/{id}")))
                .basic_auth(&self.user, Some(&self.key))
                .send()
                .await?;
            Ok(response.status().is_success())
        })
        .await
    }

    pub async fn index_doc(&self, index: &str, id: &str, body: &Value) -> Result<(), EngineError> {
        let path = format!("{index}/_doc/{id}");
        let response = self
            .client
            .put(self.url(&path))
            .basic_auth(&self.user, Some(&self.key))
            .json(body)
            .send()
            .await?;
        self.check_status("PUT", &path, response).await?;
        Ok(())
    }

    /// Single-field k-NN search: `{size, query:{knn:{<field>:{vector, k}}}}`.
    pub async fn knn_search(
        &self,
        index: &str,
        vector_field: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<Hit>, EngineError> {
        let body = json!({
            "size": k,
            "query": {
                "knn": {
                    vector_field: { "vector": vector, "k": k }
                }
            }
        });
        self.search(index, &body).await
    }

    /// Multi-field weighted search: a boolean-should of weighted
    /// function-score k-NN clauses, one per field.
    pub async fn multi_field_knn_search(
        &self,
        index: &str,
        field_weights: &[(&str, f32)],
        vector: &[f32],
        k_per_field: usize,
    ) -> Result<Vec<Hit>, EngineError> {
        let should: Vec<Value> = field_weights
            .iter()
            .map(|(field, weight)| {
                json!({
                    "function_score": {
                        "knn": {
                            *field: { "vector": vector, "k": k_per_field }
                        },
                        "weight": weight
                    }
                })
            })
            .collect();

        let body = json!({
            "size": k_per_field,
            "query": { "bool": { "should": should } }
        });
        self.search(index, &body).await
    }

    async fn search(&self, index: &str, body: &Value) -> Result<Vec<Hit>, EngineError> {
        let path = format!("{index}/_search");
        self.with_read_retry(|| async {
            let response = self
                .client
                .post(self.url(&path))
                .basic_auth(&self.user, Some(&self.key))
                .json(body)
                .send()
                .await?;
            let response = self.check_status("POST", &path, response).await?;
            let payload: Value = response.json().await?;

            let hits = payload["hits"]["hits"]
                .as_array()
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|hit| Hit {
                    id: hit["_id"].as_str().unwrap_or_default().to_string(),
                    score: hit["_score"].as_f64().unwrap_or(0.0) as f32,
                    source: hit["_source"].clone(),
                })
                .collect();

            Ok(hits)
        })
        .await
    }

    pub async fn snapshot_create(
        &self,
        repo: &str,
        name: &str,
        indices: &[String],
    ) -> Result<(), EngineError> {
        let path = format!("_snapshot/{repo}/{name}");
        let body = json!({ "indices": indices.join(",") });
        let response = self
            .client
            .put(self.url(&path))
            .basic_auth(&self.user, Some(&self.key))
            .json(&body)
            .send()
            .await?;
        self.check_status("PUT", &path, response).await?;
        Ok(())
    }

    pub async fn snapshot_restore(
        &self,
        repo: &str,
        name: &str,
        indices: &[String],
    ) -> Result<(), EngineError> {
        let path = format!("_snapshot/{repo}/{name}/_restore");
        let body = json!({ "indices": indices.join(",") });
        let response = self
            .client
            .post(self.url(&path))
            .basic_auth(&self.user, Some(&self.key))
            .json(&body)
            .send()
            .await?;
        self.check_status("POST", &path, response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(uri: &str) -> EngineConfig {
        EngineConfig {
            url: uri.to_string(),
            user: "admin".to_string(),
            key: "secret".to_string(),
            default_index: "documents".to_string(),
            engine_family: crate::models::EngineFamily::Nmslib,
        }
    }

    #[tokio::test]
    async fn single_field_knn_search_sends_exact_request_body() {
        let server = MockServer::start().await;
        let expected = json!({
            "size": 3,
            "query": { "knn": { "output_embedding": { "vector": [0.1, 0.2], "k": 3 } } }
        });
        Mock::given(method("POST"))
            .and(path("/documents/_search"))
            .and(body_json(&expected))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": { "hits": [] }
            })))
            .mount(&server)
            .await;

        let client = SearchEngineClient::new(&test_config(&server.uri())).unwrap();
        let hits = client
            .knn_search("documents", "output_embedding", &[0.1, 0.2], 3)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn delete_missing_index_returns_absent_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = SearchEngineClient::new(&test_config(&server.uri())).unwrap();
        let existed = client.delete("missing").await.unwrap();
        assert!(!existed);
    }

    #[tokio::test]
    async fn rejected_request_surfaces_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/documents"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad mapping"))
            .mount(&server)
            .await;

        let client = SearchEngineClient::new(&test_config(&server.uri())).unwrap();
        let err = client.create("documents", &json!({})).await.unwrap_err();
        match err {
            EngineError::Rejected { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "bad mapping");
            }
            _ => panic!("expected Rejected"),
        }
    }
}
