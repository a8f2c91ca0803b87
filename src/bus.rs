//! BusAdapter (C9, spec.md §4.9): binds the `createIndex`, `queryIndex`, and
//! `createSnapshot` consumers over an already-open `lapin::Channel` per
//! endpoint. Establishing and supervising the AMQP connection itself is out
//! of scope (spec.md §1) — each `serve_*` method is handed a channel the
//! caller already opened and keeps it at prefetch=1 for the lifetime of the
//! consumer loop (spec.md §5: one independent `tokio::spawn` task per
//! endpoint so a long bulk-index never blocks the other two).

use std::sync::Arc;

use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    BasicRejectOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel};
use tracing::{info, warn};

use crate::auth::AuthChecker;
use crate::engine::SearchEngineClient;
use crate::error::{BusError, ResultObj};
use crate::models::{CreateIndexRequest, CreateSnapshotRequest, QueryIndexRequest};
use crate::orchestrator::{IndexingOrchestrator, QueryOrchestrator};

const CREATE_INDEX_QUEUE: &str = "createIndex";
const QUERY_INDEX_QUEUE: &str = "queryIndex";
const CREATE_SNAPSHOT_QUEUE: &str = "createSnapshot";

pub struct BusAdapter {
    auth: Arc<dyn AuthChecker>,
    indexing: Arc<IndexingOrchestrator>,
    query: Arc<QueryOrchestrator>,
    engine: Arc<SearchEngineClient>,
}

impl BusAdapter {
    pub fn new(
        auth: Arc<dyn AuthChecker>,
        indexing: Arc<IndexingOrchestrator>,
        query: Arc<QueryOrchestrator>,
        engine: Arc<SearchEngineClient>,
    ) -> Self {
        Self {
            auth,
            indexing,
            query,
            engine,
        }
    }

    pub async fn serve_create_index(&self, channel: Channel) -> Result<(), BusError> {
        let mut consumer = open_consumer(&channel, CREATE_INDEX_QUEUE).await?;
        while let Some(delivery) = consumer.next().await {
            let delivery = delivery?;
            let encrypt_key = header_str(&delivery.properties, "encryptKey");

            let request: CreateIndexRequest = match serde_json::from_slice(&delivery.data) {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "createIndex: decode failed, rejecting without requeue");
                    delivery.reject(BasicRejectOptions { requeue: false }).await?;
                    continue;
                }
            };

            if let Err(e) = self
                .auth
                .check(&encrypt_key, &request.auth_key, &request.app_id)
                .await
            {
                warn!(app_id = request.app_id, error = %e, "createIndex: unauthorized");
                delivery.ack(BasicAckOptions::default()).await?;
                self.reply(&channel, "createIndexResult", &request.app_id, &ResultObj::failed("unauthorized"))
                    .await?;
                continue;
            }

            info!(index = request.index_name, app_id = request.app_id, "createIndex: dispatching");
            let result = self.indexing.handle_create_index(&request).await;
            delivery.ack(BasicAckOptions::default()).await?;
            self.reply(&channel, "createIndexResult", &request.app_id, &result).await?;
        }
        Ok(())
    }

    pub async fn serve_query_index(&self, channel: Channel) -> Result<(), BusError> {
        let mut consumer = open_consumer(&channel, QUERY_INDEX_QUEUE).await?;
        while let Some(delivery) = consumer.next().await {
            let delivery = delivery?;
            let encrypt_key = header_str(&delivery.properties, "encryptKey");

            let request: QueryIndexRequest = match serde_json::from_slice(&delivery.data) {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "queryIndex: decode failed, rejecting without requeue");
                    delivery.reject(BasicRejectOptions { requeue: false }).await?;
                    continue;
                }
            };

            if let Err(e) = self
                .auth
                .check(&encrypt_key, &request.auth_key, &request.app_id)
                .await
            {
                warn!(app_id = request.app_id, error = %e, "queryIndex: unauthorized");
                delivery.ack(BasicAckOptions::default()).await?;
                let unauthorized = crate::models::QueryIndexResponse {
                    success: false,
                    message: "unauthorized".to_string(),
                    query_results: Vec::new(),
                };
                self.reply(&channel, "queryIndexResult", &request.app_id, &unauthorized)
                    .await?;
                continue;
            }

            info!(index = request.index_name, app_id = request.app_id, "queryIndex: dispatching");
            let response = self.query.handle_query(&request).await;
            delivery.ack(BasicAckOptions::default()).await?;
            self.reply(&channel, "queryIndexResult", &request.app_id, &response)
                .await?;
        }
        Ok(())
    }

    pub async fn serve_create_snapshot(&self, channel: Channel) -> Result<(), BusError> {
        let mut consumer = open_consumer(&channel, CREATE_SNAPSHOT_QUEUE).await?;
        while let Some(delivery) = consumer.next().await {
            let delivery = delivery?;

            let request: CreateSnapshotRequest = match serde_json::from_slice(&delivery.data) {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "createSnapshot: decode failed, rejecting without requeue");
                    delivery.reject(BasicRejectOptions { requeue: false }).await?;
                    continue;
                }
            };

            // Snapshot requests carry no per-request auth fields in the wire
            // shape (spec.md §6); the queue itself is assumed to be
            // access-controlled at the transport layer.
            info!(repo = request.snapshot_repo, name = request.snapshot_name, "createSnapshot: dispatching");
            let result = match self
                .engine
                .snapshot_create(&request.snapshot_repo, &request.snapshot_name, &request.indices)
                .await
            {
                Ok(()) => ResultObj::ok("snapshot created"),
                Err(e) => ResultObj::failed(e.to_string()),
            };
            delivery.ack(BasicAckOptions::default()).await?;

            let payload = serde_json::to_vec(&result).unwrap_or_default();
            channel
                .basic_publish(
                    "",
                    "createSnapshotResult",
                    BasicPublishOptions::default(),
                    &payload,
                    BasicProperties::default(),
                )
                .await?
                .await?;
        }
        Ok(())
    }

    async fn reply<T: serde::Serialize>(
        &self,
        channel: &Channel,
        result_prefix: &str,
        app_id: &str,
        body: &T,
    ) -> Result<(), BusError> {
        let routing_key = format!("{result_prefix}{app_id}");
        let payload = serde_json::to_vec(body)?;
        channel
            .basic_publish(
                "",
                &routing_key,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default(),
            )
            .await?
            .await?;
        Ok(())
    }
}

async fn open_consumer(channel: &Channel, queue: &str) -> Result<lapin::Consumer, BusError> {
    channel.basic_qos(1, BasicQosOptions::default()).await?;
    let consumer = channel
        .basic_consume(
            queue,
            queue,
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;
    Ok(consumer)
}

fn header_str(props: &BasicProperties, key: &str) -> String {
    use lapin::types::AMQPValue;
    let Some(headers) = props.headers() else {
        return String::new();
    };
    match headers.inner().get(key) {
        Some(AMQPValue::LongString(s)) => String::from_utf8_lossy(s.as_bytes()).to_string(),
        Some(AMQPValue::ShortString(s)) => s.as_str().to_string(),
        _ => String::new(),
    }
}
