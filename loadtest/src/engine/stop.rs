//! Cooperative stop signalling between a worker and its plan

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Sending side of a worker's stop signal.
///
/// `stop` may be called any number of times, including after the plan has
/// finished and dropped every listener.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn listener(&self) -> StopListener {
        StopListener {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side polled by a running plan
#[derive(Debug, Clone)]
pub struct StopListener {
    rx: watch::Receiver<bool>,
}

impl StopListener {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a stop has been requested
    pub async fn stopped(&mut self) {
        let closed = self.rx.wait_for(|stopped| *stopped).await.is_err();
        if closed {
            // Every signal is gone, so no stop can ever arrive.
            std::future::pending::<()>().await;
        }
    }

    /// Sleep for `duration` unless a stop arrives first.
    ///
    /// Returns `true` when the sleep ended because of a stop.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if duration.is_zero() {
            return self.is_stopped();
        }
        let interrupted = tokio::select! {
            _ = self.stopped() => true,
            _ = tokio::time::sleep(duration) => false,
        };
        interrupted || self.is_stopped()
    }
}
