/*!
The process-wide shutdown signal.
*/
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{signal, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Process-wide shutdown signal. Once set it stays set.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    token: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the signal. Returns `true` only for the call that actually set
    /// it; every later or concurrent call is a no-op returning `false`.
    pub fn shutdown(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }

        self.token.cancel();
        true
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn wait(&self) {
        self.token.cancelled().await
    }

    /// Sleeps for `period` unless the signal is set first. Returns `true`
    /// if it was.
    pub async fn pause(&self, period: Duration) -> bool {
        tokio::select! {
            _ = self.token.cancelled() => true,
            _ = sleep(period) => self.is_shutdown(),
        }
    }

    /// Token for one connection. Cancelled by the server-wide signal or on
    /// its own when the coordinator force-closes that connection.
    pub(crate) fn client_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}

/// Triggers `handle` on Ctrl+C.
pub fn spawn_ctrl_c_handler(handle: ShutdownHandle) {
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                warn!("Ctrl+C received, shutting down");
                handle.shutdown();
            }
            Err(e) => error!("failed to listen for Ctrl+C: {}", e),
        }
    });
}
