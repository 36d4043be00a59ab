use adcycle_protocol::{WireError, WireErrorKind};
use thiserror::Error;

/// Failures talking to a device's automation server.
///
/// Errors fall in two classes. Probe failures ([`is_probe`](Self::is_probe))
/// mean the UI did not look the way a step expected and the loop moves on.
/// Fatal failures ([`is_fatal`](Self::is_fatal)) mean the session itself is
/// gone and the worker must stop.
#[derive(Debug, Clone, Error)]
pub enum DriverError {
	#[error("failed to open driver session: {0}")]
	SessionFailed(String),

	#[error("no element matched {selector}")]
	NotFound { selector: String },

	#[error("timed out after {ms}ms waiting for {what}")]
	Timeout { ms: u64, what: String },

	#[error("transport error: {0}")]
	Transport(String),

	#[error("server error `{code}`: {message}")]
	Remote { code: String, message: String },

	#[error("invalid response: {0}")]
	InvalidResponse(String),
}

impl DriverError {
	pub(crate) fn from_wire(err: WireError) -> Self {
		Self::Remote {
			code: err.error,
			message: err.message,
		}
	}

	fn remote_kind(&self) -> Option<WireErrorKind> {
		match self {
			Self::Remote { code, .. } => Some(WireErrorKind::from_code(code)),
			_ => None,
		}
	}

	/// Session is unusable; further commands cannot succeed.
	pub fn is_fatal(&self) -> bool {
		match self {
			Self::SessionFailed(_) | Self::Transport(_) => true,
			Self::Remote { .. } => self.remote_kind() == Some(WireErrorKind::InvalidSession),
			_ => false,
		}
	}

	/// An expected UI element was absent, stale or not ready in time.
	pub fn is_probe(&self) -> bool {
		match self {
			Self::NotFound { .. } | Self::Timeout { .. } => true,
			Self::Remote { .. } => matches!(
				self.remote_kind(),
				Some(
					WireErrorKind::NoSuchElement
						| WireErrorKind::StaleElement
						| WireErrorKind::NotInteractable
						| WireErrorKind::Timeout
						| WireErrorKind::NoSuchContext
				)
			),
			_ => false,
		}
	}
}

pub type Result<T> = std::result::Result<T, DriverError>;
