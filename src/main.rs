//! `indexcored`: thin process entry point. Loads configuration, builds the
//! component singletons, binds the bus adapter's three consumers, and runs
//! until a shutdown signal arrives (spec.md §1). Establishing the AMQP
//! connection itself stays minimal here — reconnection/supervision is out
//! of scope (spec.md §1); this binary opens one connection and one channel
//! per endpoint and exits if it drops.

use std::sync::Arc;

use indexcore::models::EmbeddingConfig;
use indexcore::{
    AuthChecker, BusAdapter, Config, EmbeddingProvider, IndexingOrchestrator,
    LocalEmbeddingProvider, PadLengthRegistry, QueryOrchestrator, RemoteEmbeddingProvider,
    SearchEngineClient, StaticAuthChecker, StrategyRegistry, Tokenizer,
};
use lapin::{Connection, ConnectionProperties};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load().unwrap_or_else(|e| {
        error!(error = %e, "failed to load configuration, using defaults");
        Config::default()
    });

    let tokenizer = Arc::new(Tokenizer::load(&config.tokenizer_model_dir)?);

    let provider: Arc<dyn EmbeddingProvider> = match &config.embedding {
        EmbeddingConfig::Local(local) => Arc::new(LocalEmbeddingProvider::load(local)?),
        EmbeddingConfig::Api(remote) => {
            let remote_tokenizer = Tokenizer::load(&config.tokenizer_model_dir)?;
            Arc::new(RemoteEmbeddingProvider::new(remote, remote_tokenizer)?)
        }
    };

    let pad_registry = Arc::new(PadLengthRegistry::new(config.pad_length_registry_dir()));
    let strategies = Arc::new(StrategyRegistry::with_defaults(config.engine.engine_family));
    let engine = Arc::new(SearchEngineClient::new(&config.engine)?);

    let indexing = Arc::new(IndexingOrchestrator::new(
        strategies.clone(),
        provider.clone(),
        tokenizer.clone(),
        pad_registry.clone(),
        engine.clone(),
        config.padding,
        config.embedding.vec_dim(),
        config.data_dir.clone(),
    ));
    let query = Arc::new(QueryOrchestrator::new(
        strategies.clone(),
        provider.clone(),
        pad_registry.clone(),
        engine.clone(),
        config.padding.min_token_length_cap,
    ));

    let auth: Arc<dyn AuthChecker> = Arc::new(StaticAuthChecker::new(
        std::env::var("AUTH_SHARED_SECRET").unwrap_or_default(),
    ));

    let bus = Arc::new(BusAdapter::new(auth, indexing, query, engine));

    let connection =
        Connection::connect(&config.bus.url, ConnectionProperties::default()).await?;

    let create_index_channel = connection.create_channel().await?;
    let query_index_channel = connection.create_channel().await?;
    let create_snapshot_channel = connection.create_channel().await?;

    let create_index_bus = bus.clone();
    let create_index_task = tokio::spawn(async move {
        if let Err(e) = create_index_bus.serve_create_index(create_index_channel).await {
            error!(error = %e, "createIndex consumer exited");
        }
    });

    let query_index_bus = bus.clone();
    let query_index_task = tokio::spawn(async move {
        if let Err(e) = query_index_bus.serve_query_index(query_index_channel).await {
            error!(error = %e, "queryIndex consumer exited");
        }
    });

    let create_snapshot_bus = bus.clone();
    let create_snapshot_task = tokio::spawn(async move {
        if let Err(e) = create_snapshot_bus.serve_create_snapshot(create_snapshot_channel).await {
            error!(error = %e, "createSnapshot consumer exited");
        }
    });

    info!("indexcored: all consumers bound, running until shutdown");

    tokio::select! {
        _ = shutdown_signal() => {
            info!("shutdown signal received, stopping");
        }
        _ = create_index_task => {}
        _ = query_index_task => {}
        _ = create_snapshot_task => {}
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
