//! Reconnect delay computation.
//!
//! The delay for attempt `n` (1-based) is:
//!
//! ```text
//! delay = min(base * 2^(n-1) + jitter, max)
//! ```
//!
//! where `jitter` is drawn uniformly from `[0, jitter_bound)`. Jitter keeps
//! many clients that lost the same server from reconnecting in lockstep.
//!
//! The random term comes from a [`JitterSource`] so tests can pin it.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use resilient_stream::backoff::{BackoffPolicy, NoJitter};
//!
//! let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(30))
//!     .with_jitter(NoJitter);
//!
//! assert_eq!(policy.delay(1), Duration::from_secs(1));
//! assert_eq!(policy.delay(3), Duration::from_secs(4));
//! assert_eq!(policy.delay(10), Duration::from_secs(30));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

// ============================================================================
// Constants
// ============================================================================

/// Default base delay before the first reconnect.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Default ceiling for any single reconnect delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Default upper bound (exclusive) of the random jitter term.
pub const DEFAULT_JITTER_BOUND: Duration = Duration::from_millis(1000);

/// Exponent beyond which the doubling is already far past any sane ceiling.
const MAX_EXPONENT: u32 = 31;

// ============================================================================
// JitterSource
// ============================================================================

/// Source of the random jitter term.
pub trait JitterSource: Send + Sync + 'static {
    /// Returns a value in `[0, bound)`. Returns zero when `bound` is zero.
    fn jitter(&self, bound: Duration) -> Duration;
}

/// Uniform jitter from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn jitter(&self, bound: Duration) -> Duration {
        let bound_ms = bound.as_millis() as u64;
        if bound_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..bound_ms))
    }
}

/// No jitter at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl JitterSource for NoJitter {
    fn jitter(&self, _bound: Duration) -> Duration {
        Duration::ZERO
    }
}

/// Always the same jitter, clamped below `bound`.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub Duration);

impl JitterSource for FixedJitter {
    fn jitter(&self, bound: Duration) -> Duration {
        if bound.is_zero() {
            return Duration::ZERO;
        }
        self.0.min(bound.saturating_sub(Duration::from_millis(1)))
    }
}

// ============================================================================
// BackoffPolicy
// ============================================================================

/// Capped exponential backoff with additive jitter.
#[derive(Clone)]
pub struct BackoffPolicy {
    /// Delay before the first reconnect.
    base: Duration,
    /// Ceiling for any single delay.
    max: Duration,
    /// Exclusive bound of the jitter term.
    jitter_bound: Duration,
    /// Random source for the jitter term.
    jitter: Arc<dyn JitterSource>,
}

impl fmt::Debug for BackoffPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackoffPolicy")
            .field("base", &self.base)
            .field("max", &self.max)
            .field("jitter_bound", &self.jitter_bound)
            .finish_non_exhaustive()
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl BackoffPolicy {
    /// Creates a policy with thread-RNG jitter in `[0, 1000)` ms.
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            jitter_bound: DEFAULT_JITTER_BOUND,
            jitter: Arc::new(ThreadRngJitter),
        }
    }

    /// Replaces the jitter source.
    #[must_use]
    pub fn with_jitter(mut self, source: impl JitterSource) -> Self {
        self.jitter = Arc::new(source);
        self
    }

    /// Replaces the jitter source with a shared one.
    #[must_use]
    pub fn with_shared_jitter(mut self, source: Arc<dyn JitterSource>) -> Self {
        self.jitter = source;
        self
    }

    /// Sets the exclusive upper bound of the jitter term.
    #[must_use]
    pub const fn with_jitter_bound(mut self, bound: Duration) -> Self {
        self.jitter_bound = bound;
        self
    }

    /// Base delay.
    #[inline]
    #[must_use]
    pub const fn base(&self) -> Duration {
        self.base
    }

    /// Delay ceiling.
    #[inline]
    #[must_use]
    pub const fn max(&self) -> Duration {
        self.max
    }

    /// Delay before reconnect attempt `attempt` (1-based, `0` behaves as `1`).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter = self.jitter.jitter(self.jitter_bound);
        self.delay_with_jitter(attempt, jitter)
    }

    /// Deterministic part of [`delay`](Self::delay) with the jitter supplied.
    #[must_use]
    pub fn delay_with_jitter(&self, attempt: u32, jitter: Duration) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_EXPONENT);
        let scaled = self
            .base
            .checked_mul(1u32 << exponent)
            .unwrap_or(Duration::MAX);
        scaled.saturating_add(jitter).min(self.max)
    }
}

// ============================================================================
// Tests
// ============================================================================
