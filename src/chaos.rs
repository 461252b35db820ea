use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use log::debug;
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, TxguardError};

/// Process-wide chaos switch. Intended to be set once at test start and read
/// thereafter; concurrent reads are safe, concurrent writes are not ordered.
static CHAOS_ENABLED: AtomicBool = AtomicBool::new(false);
static CHAOS_SEED: AtomicU64 = AtomicU64::new(0);

/// Configures the process-wide chaos engine.
///
/// Takes effect for every [`ChaosKey`] created afterwards. Keys that already
/// exist keep the seed they snapshotted at construction, so reconfiguring the
/// seed mid-run never disturbs an existing key's deterministic sequence. The
/// `enabled` flag, by contrast, is read at visit time: disabling chaos
/// silences existing keys too, which is what makes injection unobservable
/// whenever the switch is off.
pub fn configure(enabled: bool, seed: u64) {
    CHAOS_SEED.store(seed, Ordering::SeqCst);
    CHAOS_ENABLED.store(enabled, Ordering::SeqCst);
    debug!("chaos engine configured (enabled={enabled}, seed={seed})");
}

/// Whether chaos injection is globally enabled.
pub fn chaos_enabled() -> bool {
    CHAOS_ENABLED.load(Ordering::SeqCst)
}

/// The currently configured global seed.
pub fn chaos_seed() -> u64 {
    CHAOS_SEED.load(Ordering::SeqCst)
}

/// Immutable description of what an injection site may do to callers.
///
/// Deserialization routes through [`ChaosProfile::new`], so a profile loaded
/// from config is held to the same bounds as one built in code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawChaosProfile")]
pub struct ChaosProfile {
    name: String,
    min_latency: Duration,
    max_latency: Duration,
    error_rate: f64,
    max_errors: u64,
}

/// Unvalidated mirror of [`ChaosProfile`] used as the deserialization target.
#[derive(Deserialize)]
struct RawChaosProfile {
    name: String,
    min_latency: Duration,
    max_latency: Duration,
    error_rate: f64,
    max_errors: u64,
}

impl TryFrom<RawChaosProfile> for ChaosProfile {
    type Error = TxguardError;

    fn try_from(raw: RawChaosProfile) -> Result<Self> {
        Self::new(
            raw.name,
            raw.min_latency,
            raw.max_latency,
            raw.error_rate,
            raw.max_errors,
        )
    }
}

impl ChaosProfile {
    /// Creates a validated profile.
    ///
    /// * `min_latency` / `max_latency`: injected delay range; `min` must not
    ///   exceed `max`.
    /// * `error_rate`: probability in `[0, 1]` that a visit injects an error.
    /// * `max_errors`: lifetime cap on injected errors per key;
    ///   [`ChaosProfile::UNLIMITED_ERRORS`] removes the cap.
    ///
    /// # Errors
    ///
    /// Returns [`TxguardError::InvalidConfig`] when any bound is violated.
    pub fn new(
        name: impl Into<String>,
        min_latency: Duration,
        max_latency: Duration,
        error_rate: f64,
        max_errors: u64,
    ) -> Result<Self> {
        if min_latency > max_latency {
            return Err(TxguardError::InvalidConfig(format!(
                "chaos profile requires min_latency <= max_latency ({min_latency:?} > {max_latency:?})"
            )));
        }
        if !(0.0..=1.0).contains(&error_rate) {
            return Err(TxguardError::InvalidConfig(format!(
                "chaos profile requires error_rate in [0, 1] (got {error_rate})"
            )));
        }
        Ok(Self {
            name: name.into(),
            min_latency,
            max_latency,
            error_rate,
            max_errors,
        })
    }

    /// Sentinel for an uncapped error budget.
    pub const UNLIMITED_ERRORS: u64 = u64::MAX;

    /// A profile that injects only errors, never latency.
    pub fn errors_only(name: impl Into<String>, error_rate: f64, max_errors: u64) -> Result<Self> {
        Self::new(name, Duration::ZERO, Duration::ZERO, error_rate, max_errors)
    }

    /// A profile that injects only latency, never errors.
    pub fn latency_only(
        name: impl Into<String>,
        min_latency: Duration,
        max_latency: Duration,
    ) -> Result<Self> {
        Self::new(name, min_latency, max_latency, 0.0, 0)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when a visit can never inject anything: the fast no-op path.
    fn is_inert(&self) -> bool {
        self.max_latency.is_zero() && (self.error_rate == 0.0 || self.max_errors == 0)
    }
}

/// The outcome of one deterministic draw on a [`ChaosKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChaosDraw {
    /// Latency to apply on the non-error path.
    pub latency: Duration,
    /// Whether this visit injects an error.
    pub inject_error: bool,
}

impl ChaosDraw {
    const NOOP: ChaosDraw = ChaosDraw {
        latency: Duration::ZERO,
        inject_error: false,
    };
}

/// A named injection site bound to a [`ChaosProfile`].
///
/// Created once per site and held as a long-lived value (typically in a
/// `static` or alongside the adapter that owns the site), not rebuilt per
/// call. The key owns the private deterministic draw sequence, and
/// recreating it would restart that sequence.
///
/// The key snapshots the global seed at construction. Two keys built under
/// the same seed and profile, visited the same number of times, produce
/// identical sequences of `(inject_error, latency)` draws. Concurrent callers
/// sharing one key still consume one serialized sequence: each two-step draw
/// (latency, then error roll) is indivisible under the key's lock, so the
/// *set* of draws stays seed-deterministic, but which caller observes which
/// draw depends on the scheduler. Use one key per caller when a test needs
/// per-caller reproducibility.
pub struct ChaosKey {
    site: String,
    profile: ChaosProfile,
    seed: u64,
    errors_injected: AtomicU64,
    rng: Mutex<SmallRng>,
}

impl ChaosKey {
    /// Binds `site` to `profile`, snapshotting the current global seed.
    pub fn new(site: impl Into<String>, profile: ChaosProfile) -> Self {
        let seed = chaos_seed();
        Self {
            site: site.into(),
            profile,
            seed,
            errors_injected: AtomicU64::new(0),
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
        }
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn profile(&self) -> &ChaosProfile {
        &self.profile
    }

    /// The global seed this key was constructed under.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Errors injected by this key so far. Never exceeds the profile's
    /// `max_errors`.
    pub fn errors_injected(&self) -> u64 {
        self.errors_injected.load(Ordering::SeqCst)
    }

    /// Performs one deterministic draw.
    ///
    /// Fast path: when chaos is globally disabled, or the profile can never
    /// inject anything, returns a no-op draw without consuming randomness, so
    /// inert sites leave the sequence untouched.
    ///
    /// Otherwise, under the key's lock: a latency value uniform in
    /// `[min_latency, max_latency]` (zero, without a draw, when the range is
    /// empty), then an independent roll in `[0, 1)`. An error is selected iff
    /// the profile's rate and cap admit it and the roll lands at or below the
    /// rate; selection atomically consumes one unit of the error budget.
    pub fn draw(&self) -> ChaosDraw {
        if !chaos_enabled() || self.profile.is_inert() {
            return ChaosDraw::NOOP;
        }

        // Both draws happen under one lock acquisition so the two-step draw
        // is indivisible with respect to other callers on this key.
        let mut rng = self.rng.lock();

        let latency = if self.profile.max_latency.is_zero() {
            Duration::ZERO
        } else {
            let nanos = rng.random_range(
                self.profile.min_latency.as_nanos() as u64
                    ..=self.profile.max_latency.as_nanos() as u64,
            );
            Duration::from_nanos(nanos)
        };

        let roll: f64 = rng.random();
        let inject_error = self.profile.error_rate > 0.0
            && self.profile.max_errors > 0
            && roll <= self.profile.error_rate
            && self.try_consume_error_budget();

        if inject_error {
            debug!(
                "chaos error selected at site `{}` ({}/{} injected)",
                self.site,
                self.errors_injected(),
                self.profile.max_errors
            );
        }

        ChaosDraw {
            latency,
            inject_error,
        }
    }

    /// Increments the error counter iff it is still below the cap. The
    /// compare-and-increment is atomic so concurrent callers can never
    /// overshoot `max_errors`.
    fn try_consume_error_budget(&self) -> bool {
        self.errors_injected
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |injected| {
                (injected < self.profile.max_errors).then_some(injected + 1)
            })
            .is_ok()
    }

    /// Returns one unit of the error budget, for a selected injection that
    /// was discarded before it could surface. Keeps `errors_injected` a count
    /// of failures callers actually observed.
    fn release_error_budget(&self) {
        self.errors_injected.fetch_sub(1, Ordering::SeqCst);
    }

    fn injected_error(&self) -> TxguardError {
        TxguardError::ChaosInjected {
            site: self.site.clone(),
            profile: self.profile.name.clone(),
            seed: self.seed,
        }
    }

    /// Visits the injection site.
    ///
    /// If the draw selected an error, returns [`TxguardError::ChaosInjected`]
    /// without delaying; otherwise sleeps the drawn latency and returns `Ok`.
    /// A no-op (no draw, no sleep) when chaos is disabled or the profile is
    /// inert.
    pub async fn visit(&self) -> Result<()> {
        let draw = self.draw();
        if draw.inject_error {
            return Err(self.injected_error());
        }
        if !draw.latency.is_zero() {
            tokio::time::sleep(draw.latency).await;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ChaosKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaosKey")
            .field("site", &self.site)
            .field("profile", &self.profile.name)
            .field("seed", &self.seed)
            .field("errors_injected", &self.errors_injected())
            .finish()
    }
}

/// Guard shape: possibly fail or delay *before* the caller's own code runs.
///
/// Placed immediately ahead of the protected statements; on an error draw the
/// failure surfaces and the caller's code after the guard never runs. A no-op
/// when `key` is `None` or chaos is disabled.
pub async fn inject_before(key: Option<&ChaosKey>) -> Result<()> {
    match key {
        Some(key) => key.visit().await,
        None => Ok(()),
    }
}

/// Wrapping shape: run `action` only if no error was drawn.
///
/// On an error draw the action is never invoked and the injected failure is
/// returned; otherwise the drawn latency is applied and the action's own
/// result is returned untouched. A no-op (the action runs unmodified) when
/// `key` is `None` or chaos is disabled.
pub async fn inject_before_wrapping<T, F, Fut>(key: Option<&ChaosKey>, action: F) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    inject_before(key).await?;
    action().await
}

/// After shape: always run `action`, then possibly report failure anyway.
///
/// The action runs first, unconditionally. If the draw selected an error, the
/// action's result is *discarded* and the injected failure is returned: the
/// action's side effects persist even though the caller is told it failed.
/// This shape simulates a fault landing after a write has already been
/// applied, which is exactly the situation retry-safe (tx-repeat) code must
/// tolerate. On the non-error path the drawn latency is applied and
/// the action's result returned. A no-op when `key` is `None` or chaos is
/// disabled.
///
/// A genuine failure from the action itself propagates as-is; chaos wrappers
/// never catch or reclassify the action's own errors, cancellation included.
/// When the action fails while an injection was selected, the injection is
/// discarded and its budget unit returned to the key, so `errors_injected`
/// only counts failures the caller actually saw.
pub async fn inject_after<T, F, Fut>(key: Option<&ChaosKey>, action: F) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let Some(key) = key else {
        return action().await;
    };

    let draw = key.draw();
    let result = match action().await {
        Ok(value) => value,
        Err(err) => {
            if draw.inject_error {
                key.release_error_budget();
            }
            return Err(err);
        }
    };
    if draw.inject_error {
        return Err(key.injected_error());
    }
    if !draw.latency.is_zero() {
        tokio::time::sleep(draw.latency).await;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Unit tests here only exercise paths that do not depend on the global
    // switch, so they stay safe under the parallel test runner. Everything
    // seed-sensitive lives in tests/chaos_injection.rs behind a serial lock.

    #[test]
    fn profile_validation() {
        assert!(ChaosProfile::new(
            "bad-latency",
            Duration::from_millis(5),
            Duration::from_millis(1),
            0.0,
            0
        )
        .is_err());
        assert!(ChaosProfile::new("bad-rate", Duration::ZERO, Duration::ZERO, 1.5, 0).is_err());
        assert!(ChaosProfile::errors_only("ok", 0.5, 3).is_ok());
    }

    #[test]
    fn deserialization_enforces_the_same_bounds_as_new() {
        let valid = ChaosProfile::new(
            "cfg",
            Duration::from_millis(1),
            Duration::from_millis(5),
            0.5,
            3,
        )
        .unwrap();
        let value = serde_json::to_value(&valid).unwrap();

        let roundtripped: ChaosProfile = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(roundtripped.name(), "cfg");

        // An inverted latency range would later panic inside a draw; it has
        // to be rejected at the deserialization boundary.
        let mut inverted = value.clone();
        let min = inverted["min_latency"].clone();
        inverted["min_latency"] = inverted["max_latency"].clone();
        inverted["max_latency"] = min;
        assert!(serde_json::from_value::<ChaosProfile>(inverted).is_err());

        let mut wild_rate = value;
        wild_rate["error_rate"] = serde_json::json!(7.5);
        assert!(serde_json::from_value::<ChaosProfile>(wild_rate).is_err());
    }

    #[test]
    fn inert_profile_detection() {
        let inert = ChaosProfile::new("inert", Duration::ZERO, Duration::ZERO, 0.0, 0).unwrap();
        assert!(inert.is_inert());

        // A rate with no budget is still inert.
        let capped_out =
            ChaosProfile::new("capped", Duration::ZERO, Duration::ZERO, 1.0, 0).unwrap();
        assert!(capped_out.is_inert());

        let latency = ChaosProfile::latency_only(
            "lat",
            Duration::from_millis(1),
            Duration::from_millis(2),
        )
        .unwrap();
        assert!(!latency.is_inert());
    }

    #[test]
    fn error_budget_never_overshoots() {
        let profile = ChaosProfile::errors_only("budget", 1.0, 2).unwrap();
        let key = ChaosKey::new("budget-site", profile);

        assert!(key.try_consume_error_budget());
        assert!(key.try_consume_error_budget());
        assert!(!key.try_consume_error_budget());
        assert_eq!(key.errors_injected(), 2);
    }
}
