// External crates
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Process-wide cancellation, built on top of a [`CancellationToken`].
///
/// - Components receive a child token via `.token()` and observe it inside `tokio::select!`.
/// - `.trigger()` cancels every token handed out.
/// - An interrupt (Ctrl+C) or an elapsed deadline both end in `.trigger()`.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    #[instrument(name = "shutdown::new", target = "helpers::shutdown", level = "trace")]
    pub fn new() -> Self {
        tracing::trace!("Creating shutdown token");
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Token handed to a component; cancelled when shutdown is triggered.
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    #[instrument(name = "shutdown::trigger", target = "helpers::shutdown", level = "trace", skip_all)]
    pub fn trigger(&self) {
        tracing::trace!("Shutdown triggered");
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Trigger shutdown on the first Ctrl+C.
    pub fn listen_for_interrupt(&self) {
        let shutdown = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                res = signal::ctrl_c() => match res {
                    Ok(()) => {
                        tracing::info!("Interrupt received, stopping");
                        shutdown.trigger();
                    }
                    Err(e) => tracing::warn!(error = %e, "Unable to listen for interrupt signal"),
                },
                _ = shutdown.token.cancelled() => {}
            }
        });
    }

    /// Trigger shutdown once `deadline` has elapsed.
    pub fn trigger_after(&self, deadline: Duration) {
        let shutdown = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(deadline) => {
                    tracing::debug!(?deadline, "Deadline elapsed, stopping");
                    shutdown.trigger();
                }
                _ = shutdown.token.cancelled() => {}
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_cancels_handed_out_tokens() {
        let shutdown = Shutdown::new();
        let token = shutdown.token();

        assert!(!token.is_cancelled());
        shutdown.trigger();

        assert!(token.is_cancelled());
        assert!(shutdown.is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_triggers_shutdown() {
        let shutdown = Shutdown::new();
        let token = shutdown.token();

        shutdown.trigger_after(Duration::from_millis(50));
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .unwrap();

        assert!(shutdown.is_triggered());
    }
}
