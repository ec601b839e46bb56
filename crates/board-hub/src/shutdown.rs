//! Stop signal for the listener and every chat session.
//!
//! Firing the signal makes the serve loop stop accepting, close every
//! registered connection, and wait for the upgraded sessions to end.

use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{info, warn};

/// Upper bound on how long [`ShutdownCoordinator::drain`] waits by default.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// One-shot stop signal shared by the hub.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    signal: CancellationToken,
}

impl ShutdownCoordinator {
    /// A signal that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that observes this signal.
    pub fn token(&self) -> CancellationToken {
        self.signal.clone()
    }

    /// Resolves once the signal fires.
    pub fn triggered(&self) -> WaitForCancellationFuture<'_> {
        self.signal.cancelled()
    }

    /// Fire the signal. Later calls do nothing.
    pub fn trigger(&self) {
        self.signal.cancel();
    }

    /// Whether the signal has fired.
    pub fn is_triggered(&self) -> bool {
        self.signal.is_cancelled()
    }

    /// Fire the signal, then give `tasks` until `deadline` to finish.
    ///
    /// `true` when every task finished in time.
    pub async fn drain(&self, tasks: Vec<JoinHandle<()>>, deadline: Option<Duration>) -> bool {
        let deadline = deadline.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        let started = Instant::now();
        self.trigger();

        let pending = tasks.len();
        match tokio::time::timeout(deadline, futures::future::join_all(tasks)).await {
            Ok(_) => {
                info!(
                    tasks = pending,
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "hub drained"
                );
                true
            }
            Err(_) => {
                warn!(tasks = pending, deadline_secs = deadline.as_secs(), "hub did not drain in time");
                false
            }
        }
    }
}
