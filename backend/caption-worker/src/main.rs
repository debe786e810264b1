//! Caption Worker - Main entry point
//!
//! Subscribes to the configured Redis channel and captions every photo record
//! that arrives without a caption.

use anyhow::Result;
use caption_worker::{
    config, CaptionApiClient, Config, DispatcherConfig, Enricher, MessageDispatcher, RedisBroker,
    RedisStore, SharedCaptioner, SharedPublisher, SharedStore,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing, JSON lines when WORKER_LOG_FORMAT=json
    let json_logs = config::json_logs_from_env();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "caption_worker=debug,info".into()),
        )
        .with(json_logs.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(true)
        }))
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer()))
        .init();

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Couldn't create worker: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    info!(
        "Configuration loaded: redis_addr={}, db={}, channel={}, output_channel={}, max_in_flight={}",
        config.redis_addr,
        config.redis_db,
        config.redis_channel,
        config.output_channel(),
        config.max_in_flight
    );

    let broker = RedisBroker::connect(config.redis_connection_info()?)
        .await
        .map_err(|e| {
            error!("Failed to connect to Redis: {}", e);
            anyhow::anyhow!("Redis connection error: {}", e)
        })?;

    match broker.ping().await {
        Ok(pong) => info!("Got {} from Redis", pong),
        Err(e) => warn!("Couldn't ping Redis server: {}", e),
    }

    let captioner: SharedCaptioner = Arc::new(CaptionApiClient::new(
        config.caption_url.clone(),
        config.caption_key.clone(),
        config.fetch_timeout(),
        config.caption_timeout(),
    )?);
    let store: SharedStore = Arc::new(RedisStore::new(broker.connection()));
    let publisher: SharedPublisher = Arc::new(broker.clone());

    info!("Caption API client initialized for {}", config.caption_url);

    let enricher = Arc::new(Enricher::new(
        captioner,
        store,
        Arc::clone(&publisher),
        config.output_channel(),
    ));

    let dispatcher = MessageDispatcher::new(
        DispatcherConfig {
            channel: config.redis_channel.clone(),
            max_in_flight: config.max_in_flight,
            dead_letter_channel: config.dead_letter_channel().map(str::to_string),
        },
        enricher,
        publisher,
    );

    let messages = broker
        .subscribe(&config.redis_channel, config.subscribe_timeout())
        .await
        .map_err(|e| {
            error!(
                "Couldn't subscribe to Redis channel {}: {}",
                config.redis_channel, e
            );
            anyhow::anyhow!("Subscription error: {}", e)
        })?;

    info!("Listening for photos on channel: {}", config.redis_channel);

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        _ = dispatcher.run(messages) => {
            error!("Subscription ended unexpectedly");
        }
    }

    dispatcher.shutdown().await;

    let stats = serde_json::to_string(&dispatcher.stats())?;
    info!(stats = %stats, "Shutting down Caption Worker");

    Ok(())
}
