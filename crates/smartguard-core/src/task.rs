//! Cancellable repeating background tasks.
//!
//! A [`RepeatingTask`] runs its body once immediately and then on a fixed
//! period until it is cancelled. Dropping the guard cancels the task, so a
//! source switch only has to replace the guard to stop the old timer.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Guard over a spawned periodic task.
#[derive(Debug)]
pub struct RepeatingTask {
    name: &'static str,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl RepeatingTask {
    /// Spawn `tick` every `period`, starting immediately.
    ///
    /// The body returns [`ControlFlow::Break`] to stop on its own (for
    /// example when its output channel has closed). A tick in progress is
    /// abandoned when the task is cancelled.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = timer.tick() => {}
                }

                let flow = tokio::select! {
                    _ = token.cancelled() => ControlFlow::Break(()),
                    flow = tick() => flow,
                };
                if flow.is_break() {
                    break;
                }
            }
            debug!("{name} task stopped");
        });

        Self {
            name,
            cancel,
            handle: Some(handle),
        }
    }

    /// Task name used in logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Request cancellation without waiting.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the task has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Cancel and wait for the task to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for RepeatingTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
