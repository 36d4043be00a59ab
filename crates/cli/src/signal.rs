//! Termination signal handling for long-running commands.

use anyhow::{Context, Result};
use tracing::info;

/// Handlers registered up front so a signal that arrives during startup is
/// not lost.
pub struct ShutdownSignal {
	#[cfg(unix)]
	sigterm: tokio::signal::unix::Signal,
	#[cfg(unix)]
	sigint: tokio::signal::unix::Signal,
}

impl ShutdownSignal {
	/// # Errors
	///
	/// Fails if a signal handler cannot be installed.
	#[cfg(unix)]
	pub fn install() -> Result<Self> {
		use tokio::signal::unix::{SignalKind, signal};

		let sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
		let sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
		Ok(Self { sigterm, sigint })
	}

	#[cfg(not(unix))]
	pub fn install() -> Result<Self> {
		Ok(Self {})
	}

	/// Resolves on the first SIGTERM or SIGINT.
	#[cfg(unix)]
	pub async fn wait(mut self) {
		tokio::select! {
			_ = self.sigterm.recv() => {
				info!(target = "adcycle.orchestrator", "received SIGTERM, shutting down");
			}
			_ = self.sigint.recv() => {
				info!(target = "adcycle.orchestrator", "received SIGINT, shutting down");
			}
		}
	}

	/// Resolves on Ctrl+C.
	#[cfg(not(unix))]
	pub async fn wait(self) {
		match tokio::signal::ctrl_c().await {
			Ok(()) => info!(target = "adcycle.orchestrator", "received Ctrl+C, shutting down"),
			Err(e) => {
				tracing::warn!(target = "adcycle.orchestrator", error = %e, "Ctrl+C handler unavailable");
				std::future::pending::<()>().await;
			}
		}
	}
}
