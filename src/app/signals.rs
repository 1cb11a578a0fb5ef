//! Invalidation channels and shutdown signal handling
//!
//! Any part of the application may emit a named invalidation signal; every
//! session subscribed to that name receives the occurrence. Signals carry
//! no payload. The module also provides the shutdown future the CLI waits
//! on for graceful shutdown (Ctrl+C, SIGTERM).

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::signal;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, trace};

use crate::constants::debounce;

/// Receiving end of a named invalidation signal
#[derive(Debug)]
pub struct Subscription {
    signal: String,
    receiver: broadcast::Receiver<()>,
}

impl Subscription {
    pub fn new(signal: impl Into<String>, receiver: broadcast::Receiver<()>) -> Self {
        Self {
            signal: signal.into(),
            receiver,
        }
    }

    /// Name of the subscribed signal
    pub fn signal(&self) -> &str {
        &self.signal
    }

    /// Wait for the next occurrence
    ///
    /// Returns `None` once the channel is closed. Occurrences dropped
    /// because the receiver lagged collapse into a single one.
    pub async fn recv(&mut self) -> Option<()> {
        match self.receiver.recv().await {
            Ok(()) => Some(()),
            Err(RecvError::Lagged(skipped)) => {
                trace!("Subscription to '{}' skipped {} signals", self.signal, skipped);
                Some(())
            }
            Err(RecvError::Closed) => None,
        }
    }
}

/// Publish/subscribe channel for invalidation signals
pub trait InvalidationChannel: Send + Sync + fmt::Debug {
    /// Subscribe to a named signal
    fn subscribe(&self, signal: &str) -> Subscription;

    /// Emit a named signal, returning how many subscribers received it
    fn emit(&self, signal: &str) -> usize;
}

/// In-process invalidation channel backed by tokio broadcast channels
#[derive(Debug, Clone, Default)]
pub struct InvalidationBus {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<()>>>>,
}

impl InvalidationBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, signal: &str) -> broadcast::Sender<()> {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(signal.to_string())
            .or_insert_with(|| broadcast::channel(debounce::SIGNAL_CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl InvalidationChannel for InvalidationBus {
    fn subscribe(&self, signal: &str) -> Subscription {
        Subscription::new(signal, self.sender(signal).subscribe())
    }

    fn emit(&self, signal: &str) -> usize {
        let delivered = self.sender(signal).send(()).unwrap_or(0);
        debug!("Emitted '{}' to {} subscribers", signal, delivered);
        delivered
    }
}

/// Process signal that asked the application to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
}

impl fmt::Display for Shutdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shutdown::Interrupt => f.write_str("Ctrl+C"),
            Shutdown::Terminate => f.write_str("terminate signal"),
        }
    }
}

/// Wait for the first shutdown request
///
/// Meant to be pinned and polled as one arm of a `select!` loop. A signal
/// whose handler cannot be installed is logged and never fires.
pub async fn shutdown_signal() -> Shutdown {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let reason = tokio::select! {
        _ = interrupt => Shutdown::Interrupt,
        _ = terminate => Shutdown::Terminate,
    };
    info!("Received {}, shutting down", reason);
    reason
}
