//! Retry policy and the bounded retry loop used by the pool manager.
//!
//! Two delay shapes are in use:
//! - attempt-level retries wait a fixed or linearly growing delay between tries
//!   (`query_delay`, `acquire_retry_delay`);
//! - reconnects after fatal pool errors back off exponentially from
//!   `reconnect_base_delay` (`reconnect_delay`).

use crate::error::DbResult;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_QUERY_ATTEMPTS: u32 = 3;
pub const DEFAULT_ACQUIRE_ATTEMPTS: u32 = 3;
pub const DEFAULT_QUERY_RETRY_DELAY_MS: u64 = 1000;
pub const DEFAULT_ACQUIRE_RETRY_DELAY_MS: u64 = 1000;
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 2000;

/// Largest exponent applied to the reconnect base delay.
const MAX_BACKOFF_SHIFT: u32 = 16;

/// Timing and attempt limits for the pool manager.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per statement before the last error is surfaced.
    pub query_attempts: u32,
    /// Multiplied by the attempt number between statement retries.
    pub query_retry_delay: Duration,
    /// Attempts to obtain a live connection.
    pub acquire_attempts: u32,
    /// Fixed pause between connection attempts.
    pub acquire_retry_delay: Duration,
    /// Pause after recreating the pool.
    pub settle_delay: Duration,
    /// Ceiling for reconnects triggered by asynchronous pool errors.
    pub max_reconnects: u32,
    pub reconnect_base_delay: Duration,
    /// Upper bound for a single statement.
    pub statement_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            query_attempts: DEFAULT_QUERY_ATTEMPTS,
            query_retry_delay: Duration::from_millis(DEFAULT_QUERY_RETRY_DELAY_MS),
            acquire_attempts: DEFAULT_ACQUIRE_ATTEMPTS,
            acquire_retry_delay: Duration::from_millis(DEFAULT_ACQUIRE_RETRY_DELAY_MS),
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            max_reconnects: crate::config::DEFAULT_MAX_RECONNECTS,
            reconnect_base_delay: Duration::from_millis(crate::config::DEFAULT_RECONNECT_DELAY_MS),
            statement_timeout: Duration::from_secs(crate::config::DEFAULT_QUERY_TIMEOUT_SECS),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after failed statement attempt `attempt` (1-based).
    pub fn query_delay(&self, attempt: u32) -> Duration {
        self.query_retry_delay.saturating_mul(attempt)
    }

    /// Delay before reconnect number `retry_count` (1-based): base * 2^(n-1).
    pub fn reconnect_delay(&self, retry_count: u32) -> Duration {
        let shift = retry_count.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
        self.reconnect_base_delay.saturating_mul(1u32 << shift)
    }
}

/// What the failure hook learns about a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureContext {
    /// 1-based attempt number that just failed.
    pub attempt: u32,
    /// No further attempt follows.
    pub is_last: bool,
    pub connection_level: bool,
}

/// Run `op` up to `attempts` times.
///
/// After each failure `on_failure` runs (also after the last one); then, unless
/// the attempts are used up, the loop sleeps `delay(attempt)`. The error of the
/// final attempt is returned unchanged. Errors that cannot succeed on a retry
/// (see [`DbError::is_retryable`](crate::error::DbError::is_retryable)) end the
/// loop at once.
pub async fn retry<T, Op, OpFut, Hook, HookFut, Delay>(
    operation: &str,
    attempts: u32,
    delay: Delay,
    mut op: Op,
    mut on_failure: Hook,
) -> DbResult<T>
where
    Op: FnMut(u32) -> OpFut,
    OpFut: Future<Output = DbResult<T>>,
    Hook: FnMut(FailureContext) -> HookFut,
    HookFut: Future<Output = ()>,
    Delay: Fn(u32) -> Duration,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let is_last = attempt >= attempts || !err.is_retryable();
                warn!(
                    operation,
                    attempt,
                    attempts,
                    connection_level = err.is_connection_level(),
                    error = %err,
                    "Attempt failed"
                );
                on_failure(FailureContext {
                    attempt,
                    is_last,
                    connection_level: err.is_connection_level(),
                })
                .await;

                if is_last {
                    return Err(err);
                }
                let wait = delay(attempt);
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.query_attempts, 3);
        assert_eq!(policy.acquire_attempts, 3);
        assert_eq!(policy.settle_delay, Duration::from_secs(2));
        assert_eq!(policy.max_reconnects, 5);
    }

    #[test]
    fn test_query_delay_is_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.query_delay(1), Duration::from_millis(1000));
        assert_eq!(policy.query_delay(2), Duration::from_millis(2000));
    }

    #[test]
    fn test_reconnect_delay_is_exponential() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.reconnect_delay(1), Duration::from_millis(1000));
        assert_eq!(policy.reconnect_delay(2), Duration::from_millis(2000));
        assert_eq!(policy.reconnect_delay(3), Duration::from_millis(4000));
        assert_eq!(policy.reconnect_delay(5), Duration::from_millis(16000));
        // Saturates instead of overflowing
        assert!(policy.reconnect_delay(u32::MAX) >= policy.reconnect_delay(17));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = retry(
            "test",
            3,
            |attempt| Duration::from_millis(1000 * attempt as u64),
            |attempt| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(DbError::connection("refused", "retry"))
                    } else {
                        Ok(attempt)
                    }
                }
            },
            |_| async {},
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_after_exactly_three_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let hook_seen = Arc::clone(&seen);

        let start = tokio::time::Instant::now();
        let result: DbResult<()> = retry(
            "test",
            3,
            |attempt| Duration::from_millis(1000 * attempt as u64),
            |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(DbError::database("syntax error", None, "")) }
            },
            |ctx| {
                hook_seen.lock().unwrap().push(ctx);
                async {}
            },
        )
        .await;

        assert!(matches!(result, Err(DbError::Database { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|ctx| !ctx.connection_level));
        assert!(seen[2].is_last);
        assert!(!seen[1].is_last);

        // 1s + 2s between attempts, nothing after the last one
        assert_eq!(start.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test]
    async fn test_retry_does_not_repeat_unique_violation() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: DbResult<()> = retry(
            "test",
            3,
            |_| Duration::from_secs(60),
            |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(DbError::UniqueViolation {
                        message: "duplicate key".into(),
                        constraint: None,
                    })
                }
            },
            |ctx| {
                assert!(ctx.is_last);
                async {}
            },
        )
        .await;
        assert!(result.unwrap_err().is_unique_violation());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_first_success_skips_hook() {
        let hook_calls = Arc::new(AtomicU32::new(0));
        let hooks = Arc::clone(&hook_calls);
        let result = retry(
            "test",
            3,
            |_| Duration::ZERO,
            |_| async { Ok::<_, DbError>("ok") },
            |_| {
                hooks.fetch_add(1, Ordering::SeqCst);
                async {}
            },
        )
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(hook_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_retry_zero_attempts_still_runs_once() {
        let result: DbResult<()> = retry(
            "test",
            0,
            |_| Duration::ZERO,
            |_| async { Err(DbError::internal("boom")) },
            |_| async {},
        )
        .await;
        assert!(result.is_err());
    }
}
