//! Shutdown coordination for the federation session.
//!
//! One [`ShutdownController`] is created per process. Every long-running task
//! (discovery server, push coordinator, address watcher, reconcilers,
//! discovery clients) either awaits [`ShutdownController::cancelled`] in a
//! `select!` or holds a child token from [`ShutdownController::child_token`].
//!
//! # Example
//!
//! ```rust
//! use federation_server::ShutdownController;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let controller = ShutdownController::new();
//! let token = controller.child_token();
//!
//! let task = tokio::spawn(async move { token.cancelled().await });
//! controller.shutdown(Duration::from_millis(100)).await;
//! task.await.unwrap();
//! # }
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Process-wide shutdown signal plus in-flight operation tracking.
#[derive(Debug, Clone)]
pub struct ShutdownController {
    inner: Arc<ShutdownInner>,
}

#[derive(Debug)]
struct ShutdownInner {
    initiated: AtomicBool,
    token: CancellationToken,
    tx: watch::Sender<bool>,
    active_ops: AtomicUsize,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    /// Create a new shutdown controller.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(ShutdownInner {
                initiated: AtomicBool::new(false),
                token: CancellationToken::new(),
                tx,
                active_ops: AtomicUsize::new(0),
            }),
        }
    }

    /// Subscribe to shutdown as a watch channel.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.tx.subscribe()
    }

    /// Token cancelled when shutdown starts; cancelling it does not shut
    /// the controller down.
    pub fn child_token(&self) -> CancellationToken {
        self.inner.token.child_token()
    }

    /// Resolve once shutdown has been initiated.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await;
    }

    /// Check if shutdown has been initiated.
    pub fn is_shutdown(&self) -> bool {
        self.inner.initiated.load(Ordering::SeqCst)
    }

    /// Signal shutdown without waiting for in-flight operations.
    ///
    /// Returns `false` if shutdown had already been initiated.
    pub fn trigger(&self) -> bool {
        if self
            .inner
            .initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        info!("shutdown initiated");
        self.inner.token.cancel();
        self.inner.tx.send_replace(true);
        true
    }

    /// Signal shutdown and wait up to `grace_period` for registered
    /// operations to finish.
    ///
    /// Returns `true` if every operation completed in time.
    pub async fn shutdown(&self, grace_period: Duration) -> bool {
        self.trigger();

        match timeout(grace_period, self.wait_for_completion()).await {
            Ok(()) => {
                info!("graceful shutdown completed");
                true
            }
            Err(_) => {
                warn!(
                    remaining_ops = self.active_operations(),
                    "graceful shutdown timed out"
                );
                false
            }
        }
    }

    async fn wait_for_completion(&self) {
        while self.inner.active_ops.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Register an in-flight operation until the guard is dropped.
    pub fn register_operation(&self) -> OperationGuard {
        self.inner.active_ops.fetch_add(1, Ordering::SeqCst);
        OperationGuard {
            controller: self.clone(),
        }
    }

    /// Number of in-flight operations.
    pub fn active_operations(&self) -> usize {
        self.inner.active_ops.load(Ordering::SeqCst)
    }
}

/// Decrements the controller's operation count when dropped.
#[derive(Debug)]
pub struct OperationGuard {
    controller: ShutdownController,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.controller.inner.active_ops.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Wait for SIGTERM or SIGINT.
///
/// Fails only when the signal handlers cannot be installed.
pub async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("received Ctrl+C");
    }

    Ok(())
}
