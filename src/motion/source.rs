//! Motion sources.
//!
//! A [`MotionSource`] pushes raw samples into a [`SampleSink`] from its own
//! execution context; the relay never polls it. The only source shipped
//! here is [`SimulatedSource`], which stands in for the sensor driver.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;

use super::sample::RawSample;
use crate::error::{RelayError, Result};

/// Callback receiving every raw sample a source produces.
pub type SampleSink = Arc<dyn Fn(RawSample) + Send + Sync>;

/// A push-based producer of raw orientation samples.
///
/// `start` may be called again after `stop`; each start begins a fresh
/// sequence. Starting a running source fails with
/// [`RelayError::SourceAlreadyRunning`].
pub trait MotionSource: Send {
    /// Begins delivering samples to `sink`.
    fn start(&mut self, sink: SampleSink) -> Result<()>;

    /// Stops delivery. Calling it on a stopped source does nothing.
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

/// Configuration for the simulated source.
#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    /// Emission rate (default: 60 Hz).
    pub sample_rate_hz: f64,

    /// How long after start the sensor reports itself uncalibrated.
    pub warmup: Duration,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 60.0,
            warmup: Duration::from_secs(1),
        }
    }
}

/// Emits a slow synthetic head sway from a dedicated thread.
pub struct SimulatedSource {
    config: SimulatedConfig,
    shutdown: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SimulatedSource {
    pub fn new(config: SimulatedConfig) -> Self {
        Self {
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Pauses or resumes emission without stopping the thread.
    ///
    /// While paused no samples are produced, which the throttle sees as a
    /// stationary sensor once emission resumes.
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }
}

impl MotionSource for SimulatedSource {
    fn start(&mut self, sink: SampleSink) -> Result<()> {
        if self.handle.is_some() {
            return Err(RelayError::SourceAlreadyRunning);
        }
        if !(self.config.sample_rate_hz.is_finite() && self.config.sample_rate_hz > 0.0) {
            return Err(RelayError::Config(format!(
                "sample rate must be positive, got {}",
                self.config.sample_rate_hz
            )));
        }

        self.shutdown.store(false, Ordering::SeqCst);
        let shutdown = Arc::clone(&self.shutdown);
        let paused = Arc::clone(&self.paused);
        let interval = Duration::from_secs_f64(1.0 / self.config.sample_rate_hz);
        let warmup = self.config.warmup;

        let handle = thread::Builder::new()
            .name("motion-source".into())
            .spawn(move || {
                tracing::info!(
                    interval_ms = interval.as_millis() as u64,
                    "Simulated motion source started"
                );
                let started = Instant::now();

                while !shutdown.load(Ordering::SeqCst) {
                    if !paused.load(Ordering::SeqCst) {
                        let elapsed = started.elapsed();
                        let mut raw = synthesize(elapsed.as_secs_f64(), current_timestamp());
                        if elapsed < warmup {
                            raw = raw.uncalibrated();
                        }
                        sink(raw);
                    }
                    thread::sleep(interval);
                }

                tracing::info!("Simulated motion source stopped");
            })?;

        self.handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Motion source thread panicked");
            }
        }
    }

    fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for SimulatedSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Synthetic orientation at `t` seconds into the run.
fn synthesize(t: f64, timestamp: f64) -> RawSample {
    RawSample::new(
        0.25 * (t * 0.7).sin(),
        0.6 * (t * 0.3).sin(),
        0.1 * (t * 1.1).cos(),
        timestamp,
    )
}

/// Seconds since the Unix epoch, fractional.
fn current_timestamp() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
