//! Minimum spacing between send attempts, and retry back-off

use std::time::Duration;

use tokio::time::Instant;

use super::CancellationToken;
use crate::config::DispatchSettings;

/// Enforces a minimum interval between the starts of consecutive attempts
///
/// The clock belongs to one dispatcher; separate runs never share it.
#[derive(Debug, Clone)]
pub struct SendThrottle {
    interval: Duration,
    last_attempt: Option<Instant>,
}

impl SendThrottle {
    /// Throttle with the given minimum interval
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_attempt: None,
        }
    }

    /// Configured minimum interval
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Start of the previous attempt, if any
    #[must_use]
    pub const fn last_attempt(&self) -> Option<Instant> {
        self.last_attempt
    }

    /// Time left before the next attempt may start
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.last_attempt.map_or(Duration::ZERO, |last| {
            self.interval.saturating_sub(last.elapsed())
        })
    }

    /// Wait until the next attempt may start
    ///
    /// Returns `false` if cancellation arrived while waiting.
    pub async fn wait(&self, cancel: &CancellationToken) -> bool {
        let remaining = self.remaining();
        if !remaining.is_zero() {
            tracing::trace!(wait_ms = remaining.as_millis(), "Throttling");
        }
        cancel.sleep(remaining).await
    }

    /// Record that an attempt starts now
    pub fn mark(&mut self) -> Instant {
        let now = Instant::now();
        self.last_attempt = Some(now);
        now
    }
}

/// How often and how patiently temporary failures are retried
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Vec<Duration>,
}

impl RetryPolicy {
    /// Policy with at most `max_attempts` attempts per message
    ///
    /// The last back-off value repeats when there are more retries than
    /// values. A `max_attempts` of zero is treated as one.
    #[must_use]
    pub fn new(max_attempts: u32, backoff: Vec<Duration>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// A single attempt, no retries
    #[must_use]
    pub fn never() -> Self {
        Self::new(1, Vec::new())
    }

    /// Policy from loaded settings
    #[must_use]
    pub fn from_settings(settings: &DispatchSettings) -> Self {
        Self::new(
            settings.max_attempts,
            settings
                .backoff_seconds
                .iter()
                .map(|seconds| Duration::from_secs_f64(seconds.max(0.0)))
                .collect(),
        )
    }

    /// Maximum attempts per message
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another attempt is allowed after `attempt` attempts
    #[must_use]
    pub const fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Back-off before the retry that follows attempt number `attempt`
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let index = usize::try_from(attempt.saturating_sub(1)).unwrap_or(usize::MAX);
        self.backoff
            .get(index)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&DispatchSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_does_not_wait() {
        let throttle = SendThrottle::new(Duration::from_secs(2));
        let start = Instant::now();
        assert!(throttle.wait(&CancellationToken::new()).await);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_measured_from_attempt_start() {
        let mut throttle = SendThrottle::new(Duration::from_millis(750));
        let first = throttle.mark();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(throttle.remaining(), Duration::from_millis(250));

        assert!(throttle.wait(&CancellationToken::new()).await);
        let second = throttle.mark();
        assert!(second - first >= Duration::from_millis(750));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_send_consumes_interval() {
        let mut throttle = SendThrottle::new(Duration::from_millis(750));
        throttle.mark();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(throttle.remaining(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_observes_cancellation() {
        let mut throttle = SendThrottle::new(Duration::from_secs(2));
        throttle.mark();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!throttle.wait(&cancel).await);
    }

    #[test]
    fn test_retry_policy_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert!(policy.allows_retry(1));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(7), Duration::from_secs(4));
    }

    #[test]
    fn test_retry_policy_never() {
        let policy = RetryPolicy::never();
        assert!(!policy.allows_retry(1));
        assert_eq!(policy.delay_after(1), Duration::ZERO);
        assert_eq!(RetryPolicy::new(0, vec![]).max_attempts(), 1);
    }
}
