//! Mirror server.
//!
//! Serves the read API and, in the same process, runs the event applier
//! that keeps the Redis cache in step with upstream lifecycle events.
//!
//! Configuration is described in [`mirror::config`].

use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

use mirror::api::{self, AppState};
use mirror::config::MirrorConfig;
use mirror::queue::RedisStreamSource;
use mirror::shutdown::ShutdownSignal;
use mirror::store::RedisRecordStore;
use mirror::{EventApplier, MessagesService};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    mirror::init_tracing();

    let config = MirrorConfig::load()?;

    // Record store
    let store = Arc::new(RedisRecordStore::from_url(&config.redis.connection_url())?);
    store.ping().await?;

    // Event source shares the store's pool unless a separate broker is configured
    let mut source = match &config.queue.url {
        Some(url) => RedisStreamSource::from_url(
            url,
            &config.queue.stream,
            &config.queue.consumer_group,
            config.queue.consumer_name(),
        )?,
        None => RedisStreamSource::new(
            store.pool().clone(),
            &config.queue.stream,
            &config.queue.consumer_group,
            config.queue.consumer_name(),
        ),
    };

    let shutdown = ShutdownSignal::new();

    let signal = shutdown.clone();
    tokio::spawn(async move { signal.wait().await });

    // Background applier
    let applier = EventApplier::new(store.clone());
    let applier_shutdown = shutdown.clone();
    let applier_task = tokio::spawn(async move {
        info!(stream = %source.stream(), "Starting event applier");
        let result = applier.run(&mut source, &applier_shutdown).await;
        if let Err(e) = &result {
            error!(error = %e, "Event applier failed to start, shutting down");
            applier_shutdown.trigger();
        }
        result
    });

    // HTTP API
    let service = Arc::new(MessagesService::new(store));
    let app = api::router(AppState::new(service));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Mirror listening on {}", addr);

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await?;

    match tokio::time::timeout(shutdown.timeout(), applier_task).await {
        Ok(joined) => {
            joined??;
        }
        Err(_) => warn!("Event applier did not stop within the shutdown timeout"),
    }

    info!("Mirror shutdown complete");
    Ok(())
}
