//! Error types for the adcycle runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by device discovery, port planning and server supervision.
#[derive(Debug, Error)]
pub enum Error {
	/// A required host tool could not be located.
	#[error("{tool} executable not found. Install it or set {env_var}.")]
	ExecutableNotFound {
		tool: &'static str,
		env_var: &'static str,
	},

	/// The device bridge could not be queried or returned unusable output.
	#[error("device discovery failed: {0}")]
	Discovery(String),

	/// An automation server process could not be started.
	#[error("failed to spawn automation server on port {port}: {message}")]
	SpawnFailed { port: u16, message: String },

	/// An automation server exited during its startup probe window.
	#[error("automation server on port {port} exited immediately ({status})")]
	ExitedEarly { port: u16, status: String },

	/// The port plan cannot serve the requested number of devices.
	#[error("invalid port plan: {0}")]
	PortPlan(String),

	/// A server did not acknowledge termination within its grace period.
	#[error("automation server on port {port} did not stop: {message}")]
	Terminate { port: u16, message: String },

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}

impl Error {
	/// Returns true for errors that belong to a single server spawn.
	pub fn is_spawn_failure(&self) -> bool {
		matches!(self, Error::SpawnFailed { .. } | Error::ExitedEarly { .. })
	}
}
