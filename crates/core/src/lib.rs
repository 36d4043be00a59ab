//! adcycle - per-device interaction loops over Appium driver sessions
//!
//! Each attached device gets a [`DeviceWorker`] that opens a driver session
//! against its own automation server and then cycles through the
//! [`InteractionLoop`] states until a stop is requested or the session is lost.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use adcycle::{AppiumConnector, DeviceWorker, VariantKind, WorkerSettings, stop_channel};
//!
//! let (stop, signal) = stop_channel();
//! let worker = DeviceWorker::new(device, assignment, settings, Arc::new(AppiumConnector::new()?), signal);
//! let report = tokio::spawn(worker.run());
//! // ...
//! stop.stop();
//! ```

pub mod appium;
pub mod driver;
pub mod error;
pub mod interaction;
pub mod pause;
pub mod stop;
pub mod variant;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use appium::{AppiumConnector, AppiumSession, DEFAULT_POLL_INTERVAL};
pub use driver::{DeviceDriver, DriverConnector, SessionRequest};
pub use error::{DriverError, Result};
pub use interaction::{InteractionLoop, LoopContext, LoopExit, LoopState};
pub use pause::{InvalidPauseBounds, PauseBounds, PauseProfile};
pub use stop::{StopHandle, StopSignal, stop_channel};
pub use variant::{
	Dwell, LoopVariant, PrimaryTap, RelaunchStep, ScrollStep, TriggerStrategy, VariantKind,
	viewport_tap_point,
};
pub use worker::{DeviceWorker, WorkerReport, WorkerSettings, WorkerSnapshot, WorkerStatus};
