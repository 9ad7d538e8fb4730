//! Mirror Worker - standalone event applier.
//!
//! Runs only the consumer side: reads lifecycle events from the Redis Stream
//! and applies them to the record store, without serving HTTP. Useful for
//! running extra consumers in the same consumer group.
//!
//! Uses the same configuration as the `mirror` server, see
//! [`mirror::config`]. `RUST_LOG` controls the log level (default: "info").

use std::sync::Arc;
use tracing::info;

use mirror::config::MirrorConfig;
use mirror::queue::RedisStreamSource;
use mirror::shutdown::ShutdownSignal;
use mirror::store::RedisRecordStore;
use mirror::EventApplier;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    mirror::init_tracing();

    let config = MirrorConfig::load()?;
    let consumer_name = config.queue.consumer_name();

    info!(
        worker_name = %consumer_name,
        consumer_group = %config.queue.consumer_group,
        "Mirror worker starting"
    );

    let store = Arc::new(RedisRecordStore::from_url(&config.redis.connection_url())?);
    store.ping().await?;

    let mut source = RedisStreamSource::from_url(
        &config.queue_url(),
        &config.queue.stream,
        &config.queue.consumer_group,
        consumer_name,
    )?;

    let shutdown = ShutdownSignal::new();
    let signal = shutdown.clone();
    tokio::spawn(async move { signal.wait().await });

    let stats = EventApplier::new(store).run(&mut source, &shutdown).await?;

    info!(
        applied = stats.applied,
        dropped = stats.dropped,
        "Worker shutdown complete"
    );
    Ok(())
}
