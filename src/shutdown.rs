//! Graceful shutdown coordination.
//!
//! A [`ShutdownSignal`] is shared by the HTTP server and the event applier.
//! It fires once, either on SIGTERM/SIGINT via [`ShutdownSignal::wait`] or
//! programmatically via [`ShutdownSignal::trigger`].
//!
//! # Example
//!
//! ```rust,ignore
//! use mirror::shutdown::ShutdownSignal;
//!
//! let shutdown = ShutdownSignal::new();
//!
//! let applier_shutdown = shutdown.clone();
//! tokio::spawn(async move {
//!     applier.run(&mut source, &applier_shutdown).await
//! });
//!
//! shutdown.wait().await;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Default shutdown timeout in seconds.
const DEFAULT_SHUTDOWN_TIMEOUT: u64 = 30;

/// A one-shot signal for coordinating shutdown across components.
#[derive(Clone)]
pub struct ShutdownSignal {
    /// Broadcast sender for shutdown notification
    sender: broadcast::Sender<()>,
    /// Set once the signal has fired
    fired: Arc<AtomicBool>,
    /// How long components get to wind down
    timeout: Duration,
}

impl ShutdownSignal {
    /// Create a new shutdown signal with default timeout (30 seconds).
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT))
    }

    /// Create a new shutdown signal with custom timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender,
            fired: Arc::new(AtomicBool::new(false)),
            timeout,
        }
    }

    /// Get the shutdown timeout duration.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait for SIGTERM or SIGINT, then notify every component.
    pub async fn wait(&self) {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C, initiating graceful shutdown...");
            }
            _ = terminate => {
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
            _ = self.cancelled() => return,
        }

        self.fire();
    }

    /// Whether shutdown has been triggered.
    pub fn is_shutdown(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Trigger shutdown manually (for testing or programmatic shutdown).
    pub fn trigger(&self) {
        info!("Shutdown triggered programmatically");
        self.fire();
    }

    /// Resolve once shutdown has been triggered, including before this call.
    pub async fn cancelled(&self) {
        // Subscribe before checking the flag so a concurrent fire is not missed
        let mut receiver = self.sender.subscribe();
        if self.is_shutdown() {
            return;
        }
        let _ = receiver.recv().await;
    }

    fn fire(&self) {
        self.fired.store(true, Ordering::SeqCst);
        let _ = self.sender.send(());
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_signal_creation() {
        let signal = ShutdownSignal::new();
        assert_eq!(signal.timeout(), Duration::from_secs(30));
        assert!(!signal.is_shutdown());
    }

    #[tokio::test]
    async fn test_custom_timeout() {
        let signal = ShutdownSignal::with_timeout(Duration::from_secs(60));
        assert_eq!(signal.timeout(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_manual_trigger() {
        let signal = ShutdownSignal::new();

        let trigger_signal = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger_signal.trigger();
        });

        let result = tokio::time::timeout(Duration::from_millis(100), signal.cancelled()).await;
        assert!(result.is_ok());
        assert!(signal.is_shutdown());
    }

    #[tokio::test]
    async fn test_cancelled_after_trigger_resolves() {
        let signal = ShutdownSignal::new();
        signal.trigger();

        let result = tokio::time::timeout(Duration::from_millis(50), signal.cancelled()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let signal = ShutdownSignal::new();
        let signal2 = signal.clone();

        signal2.trigger();

        assert!(signal.is_shutdown());
    }

    #[tokio::test]
    async fn test_cancelled_pending_until_trigger() {
        let signal = ShutdownSignal::new();
        let result = tokio::time::timeout(Duration::from_millis(10), signal.cancelled()).await;
        assert!(result.is_err());
    }
}
