//! Cooperative cancellation for the event log poller.
//!
//! A [`CancellationController`] owns the stop flag. Anything that needs to
//! *request* a stop (the OS signal listener, a test) gets a [`StopHandle`];
//! anything that needs to *observe* it is handed the controller by
//! reference. There is no process-wide flag.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

/// How a [`CancellationController::wait_or_stop`] call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The full duration elapsed without a stop request.
    Elapsed,
    /// A stop was requested before (or during) the wait.
    Stopped,
}

/// Cheap, cloneable handle whose only power is requesting a stop.
#[derive(Debug, Clone)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    /// Requests a stop. Idempotent.
    pub fn request_stop(&self) {
        self.token.cancel();
    }
}

/// The stop flag of one running poller.
#[derive(Debug, Default)]
pub struct CancellationController {
    token: CancellationToken,
}

impl CancellationController {
    /// Creates a controller with no stop requested.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle able to request a stop from another task.
    pub fn handle(&self) -> StopHandle {
        StopHandle {
            token: self.token.clone(),
        }
    }

    /// Requests a stop. Idempotent.
    pub fn request_stop(&self) {
        self.token.cancel();
    }

    /// Whether a stop has been requested.
    pub fn stop_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Waits for `duration`, returning early if a stop is requested.
    ///
    /// A stop requested before the call returns `Stopped` immediately.
    pub async fn wait_or_stop(&self, duration: Duration) -> WaitOutcome {
        if self.stop_requested() {
            return WaitOutcome::Stopped;
        }
        tokio::select! {
            biased;
            () = self.token.cancelled() => WaitOutcome::Stopped,
            () = tokio::time::sleep(duration) => WaitOutcome::Elapsed,
        }
    }
}

/// Spawns a task that requests a stop on SIGINT (and SIGTERM on Unix).
///
/// Must be called from within a tokio runtime.
pub fn install_signal_handlers(handle: StopHandle) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("interrupt received, stopping after the current step");
        handle.request_stop();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let Ok(mut term) = signal(SignalKind::terminate()) else {
        let _ = tokio::signal::ctrl_c().await;
        return;
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
