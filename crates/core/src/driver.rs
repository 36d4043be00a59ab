//! Driver session abstraction.
//!
//! A [`DeviceDriver`] is one open automation session bound to one device. It
//! is opened through a [`DriverConnector`] and owned by exactly one worker.

use std::time::Duration;

use adcycle_protocol::Selector;
use adcycle_runtime::DeviceHandle;
use async_trait::async_trait;

use crate::error::Result;

/// Everything needed to open a session against one device's server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
	/// Base URL of the automation server (`http://127.0.0.1:4723`).
	pub server_url: String,
	pub device: DeviceHandle,
	pub app_package: String,
	pub app_activity: String,
	/// Locale tag such as `en-US`.
	pub locale: String,
	pub control_port: u16,
}

impl SessionRequest {
	pub fn server_url_for(host: &str, port: u16) -> String {
		format!("http://{host}:{port}")
	}
}

/// Live automation session for one device.
#[async_trait]
pub trait DeviceDriver: Send {
	/// Waits up to `timeout` for `selector` to be present and clickable, then
	/// clicks it. A zero timeout makes a single attempt.
	async fn locate_and_activate(&mut self, selector: &Selector, timeout: Duration) -> Result<()>;

	/// Clicks the last of all elements matching `selector`. Returns how many
	/// matched.
	async fn activate_last(&mut self, selector: &Selector) -> Result<usize>;

	/// Resolves a scrolling selector, which scrolls the content as a side effect.
	async fn scroll_container(&mut self, selector: &Selector) -> Result<()>;

	/// Current window size in pixels as `(width, height)`.
	async fn viewport_size(&mut self) -> Result<(u32, u32)>;

	/// Taps an absolute screen coordinate.
	async fn tap_at(&mut self, x: u32, y: u32) -> Result<()>;

	/// Available contexts, native first.
	async fn contexts(&mut self) -> Result<Vec<String>>;

	async fn switch_context(&mut self, name: &str) -> Result<()>;

	async fn terminate_app(&mut self, package: &str) -> Result<()>;

	async fn activate_app(&mut self, package: &str) -> Result<()>;

	/// Ends the session. Safe to call on a session whose server is gone.
	async fn close(&mut self) -> Result<()>;
}

/// Opens driver sessions.
#[async_trait]
pub trait DriverConnector: Send + Sync {
	async fn open(&self, request: &SessionRequest) -> Result<Box<dyn DeviceDriver>>;
}
