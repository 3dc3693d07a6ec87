//! Energy-saving suppression of sensor output.
//!
//! The throttle sits between the motion source and the broadcast path and
//! withholds samples while the sensor is idle or untrustworthy. It has two
//! triggers:
//!
//! - **Low confidence**: a non-finite reading or an uncalibrated sensor.
//! - **Stationary**: more than [`STATIONARY_THRESHOLD_SECS`] between the
//!   reference timestamp and the incoming sample.
//!
//! Either trigger moves the throttle to `Suppressed` and arms a cooldown
//! deadline of [`COOLDOWN`]. The deadline is checked on every incoming
//! sample, so there is no timer thread mutating state behind the caller's
//! back. Once it has passed, the next sample is judged fresh and must pass
//! both triggers itself to be forwarded.

use std::time::{Duration, Instant};

use super::sample::RawSample;

/// Gap between sample timestamps that counts as a stationary sensor.
pub const STATIONARY_THRESHOLD_SECS: f64 = 3.0;

/// Minimum dwell time in the suppressed state.
pub const COOLDOWN: Duration = Duration::from_secs(1);

/// Why a sample was or was not forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// Passed both triggers.
    Forwarded,

    /// Non-finite field or uncalibrated sensor.
    LowConfidence,

    /// Timestamp gap exceeded the stationary threshold.
    Stationary,

    /// Still inside the cooldown armed by an earlier trigger.
    CoolingDown,
}

/// Outcome of [`MotionThrottle::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleDecision {
    pub forward: bool,
    pub reason: SuppressReason,
}

impl ThrottleDecision {
    fn forward() -> Self {
        Self {
            forward: true,
            reason: SuppressReason::Forwarded,
        }
    }

    fn suppress(reason: SuppressReason) -> Self {
        Self {
            forward: false,
            reason,
        }
    }
}

/// Mutable throttle state.
#[derive(Debug, Clone, Default)]
pub struct ThrottleState {
    /// Timestamp of the last forwarded sample, or of the sample that
    /// tripped the stationary trigger.
    pub last_sample_time: Option<f64>,

    /// Whether the throttle is currently withholding samples.
    pub suppressed: bool,

    /// End of the current cooldown, if one is armed.
    pub resume_at: Option<Instant>,
}

/// Stationary and low-confidence suppression policy.
#[derive(Debug, Clone)]
pub struct MotionThrottle {
    state: ThrottleState,
    stationary_threshold: f64,
    cooldown: Duration,
}

impl Default for MotionThrottle {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionThrottle {
    pub fn new() -> Self {
        Self::with_timing(STATIONARY_THRESHOLD_SECS, COOLDOWN)
    }

    /// Creates a throttle with custom thresholds.
    pub fn with_timing(stationary_threshold: f64, cooldown: Duration) -> Self {
        Self {
            state: ThrottleState::default(),
            stationary_threshold,
            cooldown,
        }
    }

    pub fn state(&self) -> &ThrottleState {
        &self.state
    }

    pub fn is_suppressed(&self) -> bool {
        self.state.suppressed
    }

    /// Decides whether `raw` should reach the broadcast path.
    ///
    /// `now` is the monotonic arrival time of the sample; the cooldown is
    /// measured against it, while the stationary gap uses the sample's own
    /// timestamp. The sample itself is never modified.
    pub fn evaluate(&mut self, raw: &RawSample, now: Instant) -> ThrottleDecision {
        if let Some(deadline) = self.state.resume_at {
            if now < deadline {
                return ThrottleDecision::suppress(SuppressReason::CoolingDown);
            }
            self.state.resume_at = None;
            self.state.suppressed = false;
            tracing::debug!("Throttle cooldown elapsed, re-evaluating samples");
        }

        if !raw.calibrated || !raw.sample().is_finite() {
            self.enter_suppressed(SuppressReason::LowConfidence, now);
            return ThrottleDecision::suppress(SuppressReason::LowConfidence);
        }

        if let Some(last) = self.state.last_sample_time {
            let gap = raw.timestamp - last;
            if gap > self.stationary_threshold {
                // Rebase so motion resuming after the cooldown is measured
                // from here, not from the stale forwarded sample.
                self.state.last_sample_time = Some(raw.timestamp);
                self.enter_suppressed(SuppressReason::Stationary, now);
                return ThrottleDecision::suppress(SuppressReason::Stationary);
            }
        }

        if self.state.suppressed {
            tracing::debug!("Throttle resumed forwarding");
        }
        self.state.suppressed = false;
        self.state.last_sample_time = Some(raw.timestamp);
        ThrottleDecision::forward()
    }

    /// Clears all state, as if no sample had ever been seen.
    pub fn reset(&mut self) {
        self.state = ThrottleState::default();
    }

    fn enter_suppressed(&mut self, reason: SuppressReason, now: Instant) {
        if !self.state.suppressed {
            tracing::debug!(?reason, "Throttle suppressing samples");
        }
        self.state.suppressed = true;
        self.state.resume_at = Some(now + self.cooldown);
    }
}
