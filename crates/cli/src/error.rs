use thiserror::Error;

use crate::output::{CommandError, ErrorCode};

pub type Result<T> = std::result::Result<T, CliError>;

/// Exit status for an invalid configuration (`EX_CONFIG`).
pub const EXIT_CONFIG: i32 = 78;

#[derive(Debug, Error)]
pub enum CliError {
	#[error("no physical devices connected")]
	NoDevices,

	#[error("device discovery failed: {0}")]
	Discovery(String),

	#[error("no automation server could be started ({failed} failed)")]
	NoServers { failed: usize },

	#[error("invalid configuration: {0}")]
	Config(String),

	#[error(transparent)]
	Runtime(#[from] adcycle_runtime::Error),

	#[error(transparent)]
	Driver(#[from] adcycle::DriverError),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

impl CliError {
	/// Process exit status for this error. A clean run exits with 0.
	pub fn exit_code(&self) -> i32 {
		match self {
			CliError::NoDevices => 2,
			CliError::Discovery(_) | CliError::Runtime(adcycle_runtime::Error::Discovery(_)) => 3,
			CliError::NoServers { .. } => 4,
			CliError::Config(_) | CliError::Runtime(adcycle_runtime::Error::PortPlan(_)) => EXIT_CONFIG,
			_ => 1,
		}
	}

	/// Convert this error to a CommandError for structured output
	pub fn to_command_error(&self) -> CommandError {
		let (code, details) = match self {
			CliError::NoDevices => (ErrorCode::NoDevices, None),
			CliError::Discovery(_) | CliError::Runtime(adcycle_runtime::Error::Discovery(_)) => {
				(ErrorCode::DiscoveryFailed, None)
			}
			CliError::NoServers { failed } => (
				ErrorCode::NoServers,
				Some(serde_json::json!({ "failed": failed })),
			),
			CliError::Config(_) | CliError::Runtime(adcycle_runtime::Error::PortPlan(_)) => {
				(ErrorCode::InvalidConfig, None)
			}
			CliError::Runtime(adcycle_runtime::Error::ExecutableNotFound { tool, env_var }) => (
				ErrorCode::ToolNotFound,
				Some(serde_json::json!({ "tool": tool, "envVar": env_var })),
			),
			CliError::Runtime(_) => (ErrorCode::ServerError, None),
			CliError::Driver(_) => (ErrorCode::SessionError, None),
			CliError::Io(_) => (ErrorCode::IoError, None),
			CliError::Json(_) | CliError::Anyhow(_) => (ErrorCode::InternalError, None),
		};

		CommandError {
			code,
			message: self.to_string(),
			details,
		}
	}
}
