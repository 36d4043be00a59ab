//! In-memory driver fakes for loop and worker tests.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use adcycle_protocol::{NATIVE_CONTEXT, Selector};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::driver::{DeviceDriver, DriverConnector, SessionRequest};
use crate::error::{DriverError, Result};

/// Behaviour of a [`FakeDriver`].
#[derive(Debug, Clone)]
pub struct Script {
	/// Selectors (textual form) that never resolve.
	pub missing: HashSet<String>,
	pub viewport: (u32, u32),
	pub contexts: Vec<String>,
	/// Number of commands that succeed before every command fails with a
	/// transport error.
	pub transport_fails_after: Option<usize>,
}

impl Default for Script {
	fn default() -> Self {
		Self {
			missing: HashSet::new(),
			viewport: (1080, 2340),
			contexts: vec![NATIVE_CONTEXT.to_string()],
			transport_fails_after: None,
		}
	}
}

impl Script {
	pub fn missing(mut self, selector: &Selector) -> Self {
		self.missing.insert(selector.to_string());
		self
	}
}

type Log = Arc<Mutex<Vec<String>>>;

pub struct FakeDriver {
	script: Script,
	log: Log,
	commands: usize,
}

impl FakeDriver {
	fn record(&mut self, entry: String) -> Result<()> {
		self.log.lock().push(entry);
		self.commands += 1;
		match self.script.transport_fails_after {
			Some(limit) if self.commands > limit => {
				Err(DriverError::Transport("connection reset by peer".into()))
			}
			_ => Ok(()),
		}
	}

	fn resolve(&self, selector: &Selector, timeout: Duration) -> Result<()> {
		if !self.script.missing.contains(&selector.to_string()) {
			return Ok(());
		}
		if timeout.is_zero() {
			return Err(DriverError::NotFound {
				selector: selector.to_string(),
			});
		}
		Err(DriverError::Timeout {
			ms: timeout.as_millis() as u64,
			what: selector.to_string(),
		})
	}
}

#[async_trait]
impl DeviceDriver for FakeDriver {
	async fn locate_and_activate(&mut self, selector: &Selector, timeout: Duration) -> Result<()> {
		self.record(format!("activate {selector}"))?;
		self.resolve(selector, timeout)
	}

	async fn activate_last(&mut self, selector: &Selector) -> Result<usize> {
		self.record(format!("activate-last {selector}"))?;
		self.resolve(selector, Duration::ZERO).map(|()| 2)
	}

	async fn scroll_container(&mut self, selector: &Selector) -> Result<()> {
		self.record("scroll".into())?;
		self.resolve(selector, Duration::ZERO)
	}

	async fn viewport_size(&mut self) -> Result<(u32, u32)> {
		self.record("viewport".into())?;
		Ok(self.script.viewport)
	}

	async fn tap_at(&mut self, x: u32, y: u32) -> Result<()> {
		self.record(format!("tap {x},{y}"))
	}

	async fn contexts(&mut self) -> Result<Vec<String>> {
		self.record("contexts".into())?;
		Ok(self.script.contexts.clone())
	}

	async fn switch_context(&mut self, name: &str) -> Result<()> {
		self.record(format!("context {name}"))
	}

	async fn terminate_app(&mut self, package: &str) -> Result<()> {
		self.record(format!("terminate {package}"))
	}

	async fn activate_app(&mut self, package: &str) -> Result<()> {
		self.record(format!("launch {package}"))
	}

	async fn close(&mut self) -> Result<()> {
		self.log.lock().push("close".into());
		Ok(())
	}
}

/// Hands out [`FakeDriver`]s sharing one command log.
pub struct FakeConnector {
	script: Script,
	log: Log,
	refuse: bool,
}

impl FakeConnector {
	pub fn new(script: Script) -> Self {
		Self {
			script,
			log: Log::default(),
			refuse: false,
		}
	}

	pub fn refusing() -> Self {
		Self {
			refuse: true,
			..Self::new(Script::default())
		}
	}

	pub fn log(&self) -> Vec<String> {
		self.log.lock().clone()
	}
}

#[async_trait]
impl DriverConnector for FakeConnector {
	async fn open(&self, request: &SessionRequest) -> Result<Box<dyn DeviceDriver>> {
		if self.refuse {
			return Err(DriverError::SessionFailed(format!(
				"{} refused connection",
				request.server_url
			)));
		}
		self.log.lock().push(format!("open {}", request.device));
		Ok(Box::new(FakeDriver {
			script: self.script.clone(),
			log: Arc::clone(&self.log),
			commands: 0,
		}))
	}
}
