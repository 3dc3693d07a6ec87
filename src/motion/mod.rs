//! Motion data: sample types, the wire codec, suppression policy and sources.

pub mod sample;
pub mod source;
pub mod throttle;

pub use sample::{decode, encode, MotionSample, RawSample};
pub use source::{MotionSource, SampleSink, SimulatedConfig, SimulatedSource};
pub use throttle::{MotionThrottle, SuppressReason, ThrottleDecision, ThrottleState};
