//! Process lifetime for the forwarder.
//!
//! A single `Shutdown` is shared by the forwarder loop and the confirmation
//! watcher. Once triggered it stays triggered; late waiters return at once.

use std::sync::Arc;

use tokio::sync::watch;

/// Why the process is stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    Signal(&'static str),
    Requested,
}

#[derive(Clone)]
pub struct Shutdown {
    cause: Arc<watch::Sender<Option<StopCause>>>,
}

impl Default for Shutdown {
    fn default() -> Self { Self::new() }
}

impl Shutdown {
    pub fn new() -> Self {
        let (cause, _) = watch::channel(None);
        Self { cause: Arc::new(cause) }
    }

    pub fn trigger(&self) {
        self.stop(StopCause::Requested);
    }

    /// Record `cause` unless an earlier one is already set.
    pub fn stop(&self, cause: StopCause) {
        self.cause.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(cause);
            true
        });
    }

    pub fn is_triggered(&self) -> bool {
        self.cause.borrow().is_some()
    }

    pub fn cause(&self) -> Option<StopCause> {
        *self.cause.borrow()
    }

    /// Resolves once shutdown has been triggered, including before this call.
    pub async fn wait(&self) -> StopCause {
        let mut rx = self.cause.subscribe();
        let cause = match rx.wait_for(Option::is_some).await {
            Ok(cause) => *cause,
            Err(_) => None,
        };
        cause.unwrap_or(StopCause::Requested)
    }
}

/// Stop on SIGINT/SIGTERM (Ctrl-C elsewhere).
pub fn install_signal_handlers() -> Shutdown {
    let shutdown = Shutdown::new();
    let handle = shutdown.clone();

    tokio::spawn(async move {
        #[cfg(unix)]
        let cause = {
            use tokio::signal::unix::{signal, SignalKind};
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(mut sigterm), Ok(mut sigint)) => tokio::select! {
                    _ = sigterm.recv() => StopCause::Signal("SIGTERM"),
                    _ = sigint.recv() => StopCause::Signal("SIGINT"),
                },
                _ => {
                    tracing::warn!("unix signal handlers unavailable, waiting for Ctrl-C");
                    let _ = tokio::signal::ctrl_c().await;
                    StopCause::Signal("Ctrl-C")
                }
            }
        };

        #[cfg(not(unix))]
        let cause = {
            let _ = tokio::signal::ctrl_c().await;
            StopCause::Signal("Ctrl-C")
        };

        tracing::info!(?cause, "stopping");
        handle.stop(cause);
    });

    shutdown
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn waiters_see_the_first_cause() {
        let shutdown = Shutdown::new();
        let waiter = {
            let s = shutdown.clone();
            tokio::spawn(async move { s.wait().await })
        };
        shutdown.stop(StopCause::Signal("SIGTERM"));
        shutdown.trigger();
        let cause = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter finished")
            .expect("join");
        assert_eq!(cause, StopCause::Signal("SIGTERM"));
        assert_eq!(shutdown.cause(), Some(StopCause::Signal("SIGTERM")));
    }

    #[tokio::test]
    async fn wait_after_trigger_is_immediate() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_triggered());
        shutdown.trigger();
        let cause = tokio::time::timeout(Duration::from_millis(100), shutdown.wait())
            .await
            .expect("already triggered");
        assert_eq!(cause, StopCause::Requested);
        assert!(shutdown.is_triggered());
    }
}
