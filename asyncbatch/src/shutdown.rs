//! Shutdown signaling shared between the aggregator and its workers.
//!
//! A single broadcast channel lets the lifecycle controller stop every worker
//! at once: the aggregator holds the transmitter and each worker a receiver.
//! The signal carries no payload, it only flips from "running" to "stopped".

use tokio::sync::watch;

/// Transmitter half of the shutdown signal, held by the aggregator.
#[derive(Debug, Clone)]
pub(crate) struct ShutdownTx(watch::Sender<bool>);

/// Receiver half of the shutdown signal, one clone per worker.
#[derive(Debug, Clone)]
pub(crate) struct ShutdownRx(watch::Receiver<bool>);

/// Creates a connected shutdown channel in the "running" state.
pub(crate) fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}

impl ShutdownTx {
    /// Broadcasts the shutdown signal to all receivers.
    pub(crate) fn signal(&self) {
        let _ = self.0.send(true);
    }
}

impl ShutdownRx {
    /// Returns whether shutdown has already been signaled.
    pub(crate) fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Completes once shutdown is signaled.
    ///
    /// Also completes if the transmitter was dropped, so a worker never
    /// outlives the aggregator that spawned it.
    pub(crate) async fn wait_for_shutdown(&mut self) {
        let _ = self.0.wait_for(|stop| *stop).await;
    }
}
