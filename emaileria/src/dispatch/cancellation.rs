//! Cooperative cancellation for dispatch runs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

/// A cancellation token shared between a dispatch run and its caller.
///
/// The dispatcher polls [`CancellationToken::is_cancelled`] before each row
/// and races its waits against [`CancellationToken::cancelled`]. A send that
/// is already in flight is never interrupted.
///
/// # Examples
///
/// ```rust
/// use emaileria::dispatch::CancellationToken;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let token = CancellationToken::new();
///
///     let worker = token.clone();
///     let handle = tokio::spawn(async move {
///         while !worker.is_cancelled() {
///             if !worker.sleep(Duration::from_millis(100)).await {
///                 break;
///             }
///         }
///     });
///
///     token.cancel();
///     let _ = handle.await;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    /// Shared cancellation state.
    state: Arc<CancellationState>,
}

#[derive(Debug)]
struct CancellationState {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl CancellationToken {
    /// Create a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            state: Arc::new(CancellationState { tx, rx }),
        }
    }

    /// Check if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.state.rx.borrow()
    }

    /// Request cancellation.
    ///
    /// Every clone of this token observes the request.
    pub fn cancel(&self) {
        if !self.state.tx.send_replace(true) {
            debug!("Cancellation requested");
        }
    }

    /// Wait for the cancellation signal.
    ///
    /// Returns immediately if already cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.state.rx.clone();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Run a future unless cancellation arrives first.
    ///
    /// Returns `None` if the token was cancelled before the future finished.
    pub async fn run_until_cancelled<F, T>(&self, future: F) -> Option<T>
    where
        F: std::future::Future<Output = T>,
    {
        tokio::select! {
            biased;
            () = self.cancelled() => None,
            result = future => Some(result),
        }
    }

    /// Sleep for `duration`, waking early on cancellation.
    ///
    /// Returns `true` if the full duration elapsed.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.is_cancelled();
        }
        self.run_until_cancelled(tokio::time::sleep(duration))
            .await
            .is_some()
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_token_cancel() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());

        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_cancellation_token_clone() {
        let token1 = CancellationToken::new();
        let token2 = token1.clone();

        token1.cancel();
        assert!(token2.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_token_cancelled() {
        let token = CancellationToken::new();

        let token_clone = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token_clone.cancel();
        });

        token.cancelled().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_wakes_on_cancel() {
        let token = CancellationToken::new();
        let start = tokio::time::Instant::now();

        let token_clone = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token_clone.cancel();
        });

        assert!(!token.sleep(Duration::from_secs(1000)).await);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes_without_cancel() {
        let token = CancellationToken::new();
        assert!(token.sleep(Duration::from_millis(750)).await);
        assert!(token.sleep(Duration::ZERO).await);

        token.cancel();
        assert!(!token.sleep(Duration::ZERO).await);
    }

    #[tokio::test]
    async fn test_run_until_cancelled() {
        let token = CancellationToken::new();
        token.cancel();

        let output = token
            .run_until_cancelled(async {
                tokio::time::sleep(Duration::from_secs(1000)).await;
                42
            })
            .await;
        assert_eq!(output, None);
    }
}
