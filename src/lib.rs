//! Motion Relay - real-time orientation broadcast over WebSocket.
//!
//! A motion source pushes orientation samples (pitch, yaw, roll and a
//! timestamp). Each sample passes a [`MotionThrottle`] that withholds
//! readings while the sensor is idle or uncalibrated, and forwarded samples
//! are fanned out as JSON text frames to every WebSocket client connected
//! to a loopback [`BroadcastServer`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use motion_relay::{BroadcastServer, MotionRelay, RawSample};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Arc::new(BroadcastServer::new());
//!     server.start("127.0.0.1:8765".parse()?).await?;
//!
//!     let relay = MotionRelay::new(Arc::clone(&server));
//!     relay.on_sample(RawSample::new(0.1, 0.2, 0.3, 100.0));
//!
//!     server.stop().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod motion;
pub mod relay;
pub mod server;

pub use config::Config;
pub use error::{RelayError, Result};
pub use motion::{MotionSample, MotionSource, MotionThrottle, RawSample, SimulatedSource};
pub use relay::MotionRelay;
pub use server::BroadcastServer;
