//! Graceful shutdown with a drain deadline.
//!
//! A shutdown signal stops the server from accepting connections; in-flight
//! requests then get the configured timeout before the remaining
//! connections are dropped.

use std::future::{Future, pending};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix;
use tokio::sync::oneshot;

use crate::TRACING_TARGET_SERVER_SHUTDOWN;

/// Process signal that requested the shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    Interrupt,
    Terminate,
}

/// Waits for SIGINT/Ctrl+C or, on Unix, SIGTERM.
///
/// A handler that cannot be installed is logged and never fires.
pub(crate) async fn os_signal() -> Signal {
    let interrupt = async {
        match ctrl_c().await {
            Ok(()) => Signal::Interrupt,
            Err(e) => {
                tracing::error!(
                    target: TRACING_TARGET_SERVER_SHUTDOWN,
                    error = %e,
                    "Failed to install Ctrl+C handler"
                );
                pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match unix::signal(unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                Signal::Terminate
            }
            Err(e) => {
                tracing::error!(
                    target: TRACING_TARGET_SERVER_SHUTDOWN,
                    error = %e,
                    "Failed to install SIGTERM handler"
                );
                pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = pending::<Signal>();

    tokio::select! {
        signal = interrupt => signal,
        signal = terminate => signal,
    }
}

/// The two halves of a graceful shutdown.
///
/// `trigger` goes to `with_graceful_shutdown`; `deadline` resolves once the
/// drain timeout has passed after the trigger fired, and never if the
/// trigger is dropped unfired.
pub(crate) struct GracefulShutdown {
    pub trigger: BoxFuture<'static, ()>,
    pub deadline: BoxFuture<'static, ()>,
}

impl GracefulShutdown {
    pub fn new<S>(signal: S, timeout: Duration) -> Self
    where
        S: Future<Output = Signal> + Send + 'static,
    {
        let (fired_tx, fired_rx) = oneshot::channel();

        let trigger = async move {
            let signal = signal.await;
            tracing::info!(
                target: TRACING_TARGET_SERVER_SHUTDOWN,
                signal = ?signal,
                timeout_secs = timeout.as_secs(),
                "Graceful shutdown initiated"
            );
            let _ = fired_tx.send(());
        };

        let deadline = async move {
            if fired_rx.await.is_err() {
                return pending().await;
            }

            tokio::time::sleep(timeout).await;
            tracing::warn!(
                target: TRACING_TARGET_SERVER_SHUTDOWN,
                timeout_secs = timeout.as_secs(),
                "Shutdown timeout elapsed, dropping remaining connections"
            );
        };

        Self {
            trigger: trigger.boxed(),
            deadline: deadline.boxed(),
        }
    }
}
