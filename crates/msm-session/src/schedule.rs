//! Supervised recurring background tasks.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A task that waits one period, runs its tick, and repeats until cancelled.
///
/// The period is re-read before every wait, so a changed setting applies
/// from the next tick on. Ticks never overlap, and cancellation is only
/// observed between ticks so a sweep is never cut short.
#[derive(Debug)]
pub struct RecurringTask {
    name: &'static str,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl RecurringTask {
    /// Spawn the task on the current tokio runtime.
    pub fn spawn<P, F, Fut>(name: &'static str, period: P, mut tick: F) -> Self
    where
        P: Fn() -> Duration + Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.clone();

        let handle = tokio::spawn(async move {
            debug!(task = name, "Recurring task started");
            loop {
                let wait = period();
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }
                tick().await;
            }
            debug!(task = name, "Recurring task stopped");
        });

        info!(task = name, "Scheduled recurring task");
        Self {
            name,
            token,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Ask the task to stop after its current tick, without waiting.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Stop the task and wait for it to finish.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            debug!(task = self.name, error = %e, "Recurring task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
