//! adcycle runtime - host-side device and server plumbing
//!
//! - **Tool resolution**: locating the device bridge and automation server executables
//! - **Registry**: enumerating attached physical devices in bridge order
//! - **Ports**: deterministic per-device server and control ports
//! - **Server supervision**: spawning, reaping and terminating one automation server per device
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   devices   ┌───────────┐  assignments  ┌────────────────────┐
//! │ DeviceBridge │────────────►│ PortPlan  │──────────────►│ ServerSupervisor   │
//! │  (adb)       │             │ (pure)    │               │  ServerLauncher    │
//! └──────────────┘             └───────────┘               │  (appium per port) │
//!                                                          └────────────────────┘
//! ```

pub mod error;
pub mod locate;
pub mod ports;
pub mod registry;
pub mod server;

pub use error::{Error, Result};
pub use locate::{Tool, find_executable};
pub use ports::{PortAssignment, PortPlan};
pub use registry::{
	AdbBridge, CONNECTED_STATE, DEFAULT_VIRTUAL_PREFIX, DeviceBridge, DeviceHandle, DeviceRegistry,
	DeviceScan, RejectedRow, Rejection, scan_device_table,
};
pub use server::{
	AppiumLauncher, AutomationServerSupervisor, ExitedServer, ServerLauncher, ServerProcess,
	SpawnOutcome,
};
