use std::future::Future;
use std::time::Duration;

use ahash::AHashSet;
use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::{FailureKind, Result, TxguardError};

/// Immutable retry configuration: which failure kinds to retry, how many
/// times, and how to space the attempts.
///
/// Constructed once (typically at startup) and shared by reference across
/// every call site that retries under the same discipline. Validation happens
/// in [`RetryPolicy::new`]; a constructed policy is always internally
/// consistent. Deserialization routes through the same constructor, so a
/// policy loaded from config cannot sidestep the bounds checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawRetryPolicy")]
pub struct RetryPolicy {
    retryable: AHashSet<FailureKind>,
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: f64,
}

/// Unvalidated mirror of [`RetryPolicy`] used as the deserialization target.
#[derive(Deserialize)]
struct RawRetryPolicy {
    retryable: AHashSet<FailureKind>,
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: f64,
}

impl TryFrom<RawRetryPolicy> for RetryPolicy {
    type Error = TxguardError;

    fn try_from(raw: RawRetryPolicy) -> Result<Self> {
        Self::new(
            raw.retryable,
            raw.max_attempts,
            raw.initial_delay,
            raw.max_delay,
            raw.multiplier,
            raw.jitter,
        )
    }
}

impl RetryPolicy {
    /// Creates a validated policy.
    ///
    /// * `retryable`: the failure kinds worth retrying. Listing
    ///   [`FailureKind::Cancelled`] here has no effect; cancellation always
    ///   propagates.
    /// * `max_attempts`: number of *re*-invocations after the first attempt;
    ///   must be at least 1. The operation runs at most `max_attempts + 1`
    ///   times.
    /// * `initial_delay` / `max_delay`: backoff envelope; `max_delay` must
    ///   not be below `initial_delay`.
    /// * `multiplier`: exponential growth factor, at least 1.0.
    /// * `jitter`: fraction of the base delay randomized away, in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`TxguardError::InvalidConfig`] when any bound is violated.
    pub fn new(
        retryable: impl IntoIterator<Item = FailureKind>,
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        jitter: f64,
    ) -> Result<Self> {
        if max_attempts < 1 {
            return Err(TxguardError::InvalidConfig(
                "retry policy requires max_attempts >= 1".to_string(),
            ));
        }
        if max_delay < initial_delay {
            return Err(TxguardError::InvalidConfig(format!(
                "retry policy requires max_delay >= initial_delay ({max_delay:?} < {initial_delay:?})"
            )));
        }
        if !(multiplier >= 1.0) {
            return Err(TxguardError::InvalidConfig(format!(
                "retry policy requires multiplier >= 1.0 (got {multiplier})"
            )));
        }
        if !(0.0..=1.0).contains(&jitter) {
            return Err(TxguardError::InvalidConfig(format!(
                "retry policy requires jitter in [0, 1] (got {jitter})"
            )));
        }
        Ok(Self {
            retryable: retryable.into_iter().collect(),
            max_attempts,
            initial_delay,
            max_delay,
            multiplier,
            jitter,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether a failure of this kind is worth retrying under this policy.
    /// Cancellation is never retryable, listed or not.
    pub fn is_retryable(&self, kind: FailureKind) -> bool {
        kind != FailureKind::Cancelled && self.retryable.contains(&kind)
    }

    /// The `[min, max]` delay envelope for the given 1-based retry attempt.
    ///
    /// The base is `initial_delay * multiplier^(attempt-1)` capped at
    /// `max_delay`; the envelope widens it by `± base * jitter`, floored at
    /// zero. [`backoff_delay`](Self::backoff_delay) draws uniformly inside
    /// this envelope.
    pub fn backoff_bounds(&self, attempt: u32) -> (Duration, Duration) {
        // Clamp before the i32 cast so absurd attempt counts saturate the
        // growth instead of wrapping into a negative exponent.
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32);
        let base = (self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent as i32))
            .min(self.max_delay.as_secs_f64());
        let band = base * self.jitter;
        (
            Duration::from_secs_f64((base - band).max(0.0)),
            Duration::from_secs_f64(base + band),
        )
    }

    /// Draws the actual delay for the given 1-based retry attempt.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let (min, max) = self.backoff_bounds(attempt);
        if max <= min {
            return min;
        }
        let secs = rand::rng().random_range(min.as_secs_f64()..=max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

/// Re-invokes `operation` until it succeeds, exhausts the policy, or fails
/// in a way the policy does not cover.
///
/// Semantics, in order of precedence per failed attempt:
///
/// * success: the value is returned immediately, no further attempts;
/// * cancellation ([`FailureKind::Cancelled`]): propagated immediately,
///   never retried, regardless of the policy's retryable set;
/// * a retryable kind with attempts remaining: sleep the jittered backoff
///   delay, then invoke again;
/// * anything else: the failure is propagated immediately.
///
/// The operation is invoked between 1 and `max_attempts + 1` times, and the
/// failure ultimately surfaced is always the *last* one encountered; nothing
/// is swallowed or aggregated. Cancellation while suspended in the backoff
/// sleep needs no special handling: dropping the future is how cancellation
/// manifests here, and no partial retry state escapes.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use txguard::prelude::*;
///
/// # async fn demo() -> txguard::Result<()> {
/// let policy = RetryPolicy::new(
///     [FailureKind::Conflict, FailureKind::ChaosInjected],
///     5,
///     Duration::from_millis(10),
///     Duration::from_secs(1),
///     2.0,
///     0.2,
/// )?;
///
/// let value = retry(&policy, || async {
///     // a conflict-prone commit, safe to re-run
///     Ok(1_u64)
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_cancellation() => {
                debug!("retry aborted by cancellation on attempt {}", attempt + 1);
                return Err(err);
            }
            Err(err) if attempt < policy.max_attempts() && policy.is_retryable(err.kind()) => {
                attempt += 1;
                let delay = policy.backoff_delay(attempt);
                debug!(
                    "attempt {} failed ({}), retrying in {:?} ({}/{} retries used)",
                    attempt,
                    err,
                    delay,
                    attempt,
                    policy.max_attempts()
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                debug!(
                    "giving up after {} invocation(s): {}",
                    attempt + 1,
                    err
                );
                return Err(err);
            }
        }
    }
}
