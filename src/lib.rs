//! # Mirror
//!
//! A read-only lookup service for message records, kept eventually consistent
//! with an upstream system of record through lifecycle events.
//!
//! ## Architecture
//!
//! ```text
//! Upstream -> Redis Stream -> EventApplier -> RecordStore (Redis)
//!                                                  ^
//! Client   -> HTTP API -> QueryService ------------+
//! ```
//!
//! ## Modules
//!
//! - [`message`]: The cached record type and its key naming
//! - [`event`]: Lifecycle events consumed from the queue
//! - [`store`]: Record store trait and backends
//! - [`queue`]: Event sources the applier consumes from
//! - [`applier`]: Applies lifecycle events to the store
//! - [`service`]: Read-path facade used by the HTTP layer
//! - [`api`]: HTTP routes and JSON error rendering

pub mod api;
pub mod applier;
pub mod config;
pub mod event;
pub mod message;
pub mod queue;
pub mod service;
pub mod shutdown;
pub mod store;

// Re-export commonly used types at crate root
pub use applier::{ApplierStats, ApplyOutcome, EventApplier};
pub use event::{EventKind, LifecycleEvent};
pub use message::Message;
pub use service::{MessagesService, QueryService, ServiceError};
pub use store::{RecordStore, StoreError};

/// Default Redis stream the upstream system publishes lifecycle events to
pub const DEFAULT_EVENT_STREAM: &str = "messages:events";

/// Default consumer group name
pub const DEFAULT_CONSUMER_GROUP: &str = "mirror";

/// Install the global tracing subscriber.
///
/// Honors `RUST_LOG`, falling back to `info`.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
