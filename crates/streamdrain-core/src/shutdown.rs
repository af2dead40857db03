//! Operator interrupt handling.
//!
//! A [`ShutdownHandle`] is a cloneable flag backed by a `watch` channel. The
//! harness checks it at every state boundary and races it against in-flight
//! reads, so an interrupted run still closes its stream handle.
//!
//! ```ignore
//! let shutdown = ShutdownHandle::new();
//! let trigger = shutdown.clone();
//! tokio::spawn(async move {
//!     let signal = shutdown_signal().await;
//!     trigger.trigger(signal);
//! });
//! ```

use tokio::sync::watch;

/// Why the run is being stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Received SIGINT (Ctrl+C)
    SigInt,
    /// Received SIGTERM
    SigTerm,
    /// Requested programmatically
    Manual,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SigInt => write!(f, "SIGINT (Ctrl+C)"),
            Self::SigTerm => write!(f, "SIGTERM"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Handle for triggering and observing a shutdown.
#[derive(Clone)]
pub struct ShutdownHandle {
    sender: watch::Sender<Option<ShutdownSignal>>,
    receiver: watch::Receiver<Option<ShutdownSignal>>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(None);
        Self { sender, receiver }
    }

    /// Trigger a manual shutdown
    pub fn shutdown(&self) {
        self.trigger(ShutdownSignal::Manual);
    }

    /// Record that `signal` arrived. The first signal wins.
    pub fn trigger(&self, signal: ShutdownSignal) {
        self.sender.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(signal);
                true
            } else {
                false
            }
        });
    }

    /// The signal that stopped the run, if any.
    pub fn signal(&self) -> Option<ShutdownSignal> {
        *self.receiver.borrow()
    }

    pub fn is_shutdown(&self) -> bool {
        self.signal().is_some()
    }

    /// Wait for a shutdown signal.
    pub async fn wait(&self) -> ShutdownSignal {
        let mut receiver = self.receiver.clone();
        loop {
            if let Some(signal) = *receiver.borrow_and_update() {
                return signal;
            }
            if receiver.changed().await.is_err() {
                return ShutdownSignal::Manual;
            }
        }
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Complete when SIGINT or SIGTERM arrives.
pub async fn shutdown_signal() -> ShutdownSignal {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => ShutdownSignal::SigInt,
            Err(e) => {
                tracing::warn!(error = %e, "failed to install Ctrl+C handler");
                std::future::pending::<ShutdownSignal>().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                ShutdownSignal::SigTerm
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<ShutdownSignal>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<ShutdownSignal>();

    tokio::select! {
        signal = ctrl_c => signal,
        signal = terminate => signal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_signal_display() {
        assert_eq!(ShutdownSignal::SigInt.to_string(), "SIGINT (Ctrl+C)");
        assert_eq!(ShutdownSignal::SigTerm.to_string(), "SIGTERM");
        assert_eq!(ShutdownSignal::Manual.to_string(), "manual");
    }

    #[test]
    fn test_manual_shutdown_is_visible_to_clones() {
        let handle = ShutdownHandle::new();
        let clone = handle.clone();
        assert!(!clone.is_shutdown());

        handle.shutdown();
        assert!(clone.is_shutdown());
        assert_eq!(clone.signal(), Some(ShutdownSignal::Manual));
    }

    #[test]
    fn test_first_signal_wins() {
        let handle = ShutdownHandle::default();
        handle.trigger(ShutdownSignal::SigTerm);
        handle.trigger(ShutdownSignal::SigInt);
        assert_eq!(handle.signal(), Some(ShutdownSignal::SigTerm));
    }

    #[tokio::test]
    async fn test_wait_returns_after_trigger() {
        let handle = ShutdownHandle::new();
        let trigger = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.trigger(ShutdownSignal::SigInt);
        });

        let signal = tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .expect("wait should complete");
        assert_eq!(signal, ShutdownSignal::SigInt);
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_already_shut_down() {
        let handle = ShutdownHandle::new();
        handle.shutdown();
        assert_eq!(handle.wait().await, ShutdownSignal::Manual);
    }
}
