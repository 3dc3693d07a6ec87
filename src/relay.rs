//! Glue between a motion source, the throttle and the broadcast server.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::error::{RelayError, Result};
use crate::motion::{MotionSource, MotionThrottle, RawSample, SampleSink, ThrottleDecision};
use crate::server::BroadcastServer;

/// Feeds raw samples through a [`MotionThrottle`] into a [`BroadcastServer`].
///
/// `on_sample` is synchronous and never waits on the network, so it can run
/// directly on the sensor's callback thread.
pub struct MotionRelay {
    server: Arc<BroadcastServer>,
    throttle: Mutex<MotionThrottle>,
}

impl MotionRelay {
    pub fn new(server: Arc<BroadcastServer>) -> Self {
        Self::with_throttle(server, MotionThrottle::new())
    }

    pub fn with_throttle(server: Arc<BroadcastServer>, throttle: MotionThrottle) -> Self {
        Self {
            server,
            throttle: Mutex::new(throttle),
        }
    }

    /// Evaluates one raw sample and broadcasts it if the throttle allows.
    pub fn on_sample(&self, raw: RawSample) -> ThrottleDecision {
        // Held across the broadcast so concurrent callers keep their order.
        let mut throttle = self.throttle();
        let decision = throttle.evaluate(&raw, Instant::now());
        if decision.forward {
            self.server.broadcast(&raw.sample());
        } else {
            tracing::trace!(reason = ?decision.reason, "Sample suppressed");
        }
        decision
    }

    /// A sink that routes every sample into [`MotionRelay::on_sample`].
    pub fn sink(self: &Arc<Self>) -> SampleSink {
        let relay = Arc::clone(self);
        Arc::new(move |raw| {
            relay.on_sample(raw);
        })
    }

    /// Starts `source` with a fresh throttle state.
    ///
    /// A source that is already running keeps its current sink and is
    /// rejected with [`RelayError::SourceAlreadyRunning`].
    pub fn attach(self: &Arc<Self>, source: &mut dyn MotionSource) -> Result<()> {
        if source.is_running() {
            return Err(RelayError::SourceAlreadyRunning);
        }
        self.throttle().reset();
        source.start(self.sink())
    }

    pub fn is_suppressed(&self) -> bool {
        self.throttle().is_suppressed()
    }

    fn throttle(&self) -> MutexGuard<'_, MotionThrottle> {
        self.throttle.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::{SimulatedConfig, SimulatedSource, SuppressReason};
    use crate::server::ClientHandle;
    use std::thread;
    use std::time::Duration;

    struct ManualSource {
        sink: Option<SampleSink>,
    }

    impl MotionSource for ManualSource {
        fn start(&mut self, sink: SampleSink) -> Result<()> {
            self.sink = Some(sink);
            Ok(())
        }

        fn stop(&mut self) {
            self.sink = None;
        }

        fn is_running(&self) -> bool {
            self.sink.is_some()
        }
    }

    #[tokio::test]
    async fn test_forwarded_samples_reach_clients() {
        let server = Arc::new(BroadcastServer::new());
        server.start("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let relay = MotionRelay::new(Arc::clone(&server));

        let (client, mut rx) = ClientHandle::new();
        server.registry().add(client);

        let decision = relay.on_sample(RawSample::new(0.1, 0.2, 0.3, 100.0));
        assert!(decision.forward);
        assert!(rx.try_recv().is_ok());

        let decision = relay.on_sample(RawSample::new(0.1, 0.2, 0.3, 100.1).uncalibrated());
        assert_eq!(decision.reason, SuppressReason::LowConfidence);
        assert!(rx.try_recv().is_err());
        assert!(relay.is_suppressed());

        server.stop().await;
    }

    #[tokio::test]
    async fn test_attach_routes_source_samples() {
        let server = Arc::new(BroadcastServer::new());
        let relay = Arc::new(MotionRelay::new(Arc::clone(&server)));
        let mut source = ManualSource { sink: None };

        relay.attach(&mut source).unwrap();
        assert!(source.is_running());

        let sink = source.sink.clone().unwrap();
        sink(RawSample::new(f64::NAN, 0.0, 0.0, 1.0));
        assert!(relay.is_suppressed());

        source.stop();
        assert!(!source.is_running());
    }

    #[test]
    fn test_attach_rejects_running_source() {
        let server = Arc::new(BroadcastServer::new());
        let relay = Arc::new(MotionRelay::new(Arc::clone(&server)));
        let mut source = ManualSource { sink: None };
        relay.attach(&mut source).unwrap();

        // Leave the throttle suppressed, then try to attach again.
        relay.on_sample(RawSample::new(0.0, 0.0, 0.0, 1.0).uncalibrated());
        assert!(matches!(
            relay.attach(&mut source),
            Err(RelayError::SourceAlreadyRunning)
        ));
        assert!(relay.is_suppressed());
    }

    #[test]
    fn test_paused_source_resumes_as_stationary() {
        let server = Arc::new(BroadcastServer::new());
        let relay = Arc::new(MotionRelay::new(Arc::clone(&server)));
        let mut source = SimulatedSource::new(SimulatedConfig {
            sample_rate_hz: 100.0,
            warmup: Duration::ZERO,
        });

        let reasons = Arc::new(Mutex::new(Vec::new()));
        let sink: SampleSink = {
            let relay = Arc::clone(&relay);
            let reasons = Arc::clone(&reasons);
            Arc::new(move |raw| {
                let decision = relay.on_sample(raw);
                reasons.lock().unwrap().push(decision.reason);
            })
        };

        source.start(sink).unwrap();
        thread::sleep(Duration::from_millis(100));
        source.set_paused(true);
        thread::sleep(Duration::from_millis(50));
        let before_pause = reasons.lock().unwrap().len();
        assert!(before_pause > 0);
        assert!(reasons
            .lock()
            .unwrap()
            .iter()
            .all(|reason| *reason == SuppressReason::Forwarded));

        thread::sleep(Duration::from_millis(3_200));
        assert_eq!(reasons.lock().unwrap().len(), before_pause);

        source.set_paused(false);
        thread::sleep(Duration::from_millis(100));
        source.stop();

        let reasons = reasons.lock().unwrap();
        assert_eq!(reasons[before_pause], SuppressReason::Stationary);
        assert!(reasons[before_pause + 1..]
            .iter()
            .all(|reason| *reason == SuppressReason::CoolingDown));
    }
}
