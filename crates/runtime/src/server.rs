//! Automation server process supervision
//!
//! One Appium server runs per device, each on its own port with
//! `--session-override` so a session left behind by a crashed run does not
//! block the next one. Server output is discarded; the orchestrator's console
//! only carries its own log lines.
//!
//! The supervisor owns every [`ServerProcess`]. It does not health-check a
//! server beyond a short post-spawn probe that catches immediate exits.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::ports::PortAssignment;

/// How long a freshly spawned server must stay alive to count as started.
pub const DEFAULT_STARTUP_PROBE: Duration = Duration::from_millis(100);

/// Wait after the forced kill before giving up on a server.
const KILL_WAIT: Duration = Duration::from_secs(2);

/// An automation server child process bound to one port.
#[derive(Debug)]
pub struct ServerProcess {
	port: u16,
	child: Child,
}

impl ServerProcess {
	/// Wraps an already spawned child listening on `port`.
	pub fn from_child(port: u16, child: Child) -> Self {
		Self { port, child }
	}

	pub fn port(&self) -> u16 {
		self.port
	}

	pub fn pid(&self) -> Option<u32> {
		self.child.id()
	}

	/// Exit status if the process has already ended, without blocking.
	pub fn try_exit_status(&mut self) -> Result<Option<ExitStatus>> {
		Ok(self.child.try_wait()?)
	}

	/// Asks the server to stop, escalating to a kill after `grace`.
	///
	/// Never waits longer than `grace` plus a short fixed kill window.
	///
	/// # Platform-Specific Behavior
	///
	/// **Unix**: sends `SIGTERM` to the server's process group, so helpers the
	/// server spawned go down with it, then `SIGKILL` to the group on timeout.
	///
	/// **Windows**: kills the process directly.
	pub async fn terminate(mut self, grace: Duration) -> Result<()> {
		if self.try_exit_status()?.is_some() {
			return Ok(());
		}

		#[cfg(unix)]
		if let Some(pid) = self.child.id() {
			signal_group(pid, libc::SIGTERM);
			if tokio::time::timeout(grace, self.child.wait()).await.is_ok() {
				debug!(target = "adcycle.server", port = self.port, "server stopped after SIGTERM");
				return Ok(());
			}
			warn!(target = "adcycle.server", port = self.port, grace_ms = grace.as_millis() as u64, "server ignored SIGTERM; killing");
			signal_group(pid, libc::SIGKILL);
		}

		#[cfg(not(unix))]
		let _ = grace;

		let _ = self.child.start_kill();
		match tokio::time::timeout(KILL_WAIT, self.child.wait()).await {
			Ok(Ok(_)) => Ok(()),
			Ok(Err(e)) => Err(Error::Terminate {
				port: self.port,
				message: format!("failed to wait for process: {e}"),
			}),
			Err(_) => Err(Error::Terminate {
				port: self.port,
				message: format!("still running {}s after kill", KILL_WAIT.as_secs()),
			}),
		}
	}
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) {
	let Ok(pid) = libc::pid_t::try_from(pid) else {
		return;
	};
	// The server is started as its own group leader, so -pid addresses the group.
	let rc = unsafe { libc::kill(-pid, signal) };
	if rc != 0 {
		debug!(target = "adcycle.server", pid, signal, error = %std::io::Error::last_os_error(), "kill(2) failed");
	}
}

/// Starts automation server processes.
#[async_trait]
pub trait ServerLauncher: Send + Sync {
	/// Starts a server listening on `port`.
	async fn launch(&self, port: u16) -> Result<ServerProcess>;
}

/// [`ServerLauncher`] for the Appium CLI.
#[derive(Debug, Clone)]
pub struct AppiumLauncher {
	program: PathBuf,
	extra_args: Vec<String>,
	startup_probe: Duration,
}

impl AppiumLauncher {
	pub fn new(program: impl Into<PathBuf>) -> Self {
		Self {
			program: program.into(),
			extra_args: Vec::new(),
			startup_probe: DEFAULT_STARTUP_PROBE,
		}
	}

	/// Arguments appended after the port and session-override flags.
	pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
		self.extra_args = args;
		self
	}

	pub fn with_startup_probe(mut self, probe: Duration) -> Self {
		self.startup_probe = probe;
		self
	}

	fn command(&self, port: u16) -> Command {
		let mut cmd = Command::new(&self.program);
		cmd.arg("-p")
			.arg(port.to_string())
			.arg("--session-override")
			.args(&self.extra_args)
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::null())
			.kill_on_drop(true);

		// Own process group: a terminal Ctrl+C reaches the orchestrator only,
		// which then stops servers itself after the workers have unwound.
		#[cfg(unix)]
		cmd.process_group(0);

		cmd
	}
}

#[async_trait]
impl ServerLauncher for AppiumLauncher {
	async fn launch(&self, port: u16) -> Result<ServerProcess> {
		let mut child = self.command(port).spawn().map_err(|e| Error::SpawnFailed {
			port,
			message: format!("{}: {e}", self.program.display()),
		})?;

		tokio::time::sleep(self.startup_probe).await;

		match child.try_wait() {
			Ok(Some(status)) => Err(Error::ExitedEarly {
				port,
				status: status.to_string(),
			}),
			Ok(None) => Ok(ServerProcess::from_child(port, child)),
			Err(e) => Err(Error::SpawnFailed {
				port,
				message: format!("failed to check process status: {e}"),
			}),
		}
	}
}

/// Result of spawning the server for one assignment.
#[derive(Debug)]
pub struct SpawnOutcome {
	pub assignment: PortAssignment,
	pub result: Result<()>,
}

/// A server that exited without being asked to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitedServer {
	pub port: u16,
	pub status: String,
}

/// Owns one automation server per device for the duration of a run.
pub struct AutomationServerSupervisor<L> {
	launcher: L,
	servers: Vec<ServerProcess>,
	terminate_grace: Duration,
}

impl<L: ServerLauncher> AutomationServerSupervisor<L> {
	pub fn new(launcher: L, terminate_grace: Duration) -> Self {
		Self {
			launcher,
			servers: Vec::new(),
			terminate_grace,
		}
	}

	/// Starts a server on `port` and takes ownership of it.
	///
	/// # Errors
	///
	/// Returns [`Error::SpawnFailed`] or [`Error::ExitedEarly`] for this port only.
	pub async fn spawn(&mut self, port: u16) -> Result<()> {
		let server = self.launcher.launch(port).await?;
		info!(target = "adcycle.server", port, pid = ?server.pid(), "automation server started");
		self.servers.push(server);
		Ok(())
	}

	/// Spawns a server for every assignment, in order.
	///
	/// A failure only affects its own assignment; the rest are still attempted.
	pub async fn spawn_all(&mut self, assignments: &[PortAssignment]) -> Vec<SpawnOutcome> {
		let mut outcomes = Vec::with_capacity(assignments.len());
		for assignment in assignments {
			let result = self.spawn(assignment.server_port).await;
			if let Err(err) = &result {
				warn!(target = "adcycle.server", port = assignment.server_port, ordinal = assignment.ordinal, error = %err, "automation server failed to start");
			}
			outcomes.push(SpawnOutcome {
				assignment: *assignment,
				result,
			});
		}
		outcomes
	}

	/// Ports of servers currently owned.
	pub fn ports(&self) -> Vec<u16> {
		self.servers.iter().map(ServerProcess::port).collect()
	}

	pub fn len(&self) -> usize {
		self.servers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.servers.is_empty()
	}

	/// Drops servers that have exited on their own and reports them.
	pub fn reap_exited(&mut self) -> Vec<ExitedServer> {
		let mut exited = Vec::new();
		self.servers.retain_mut(|server| match server.try_exit_status() {
			Ok(Some(status)) => {
				exited.push(ExitedServer {
					port: server.port(),
					status: status.to_string(),
				});
				false
			}
			Ok(None) => true,
			Err(e) => {
				debug!(target = "adcycle.server", port = server.port(), error = %e, "could not poll server status");
				true
			}
		});
		exited
	}

	/// Terminates the server on `port`, if this supervisor owns one.
	///
	/// # Errors
	///
	/// Returns [`Error::Terminate`] if the process outlives its grace period and kill window.
	pub async fn terminate(&mut self, port: u16) -> Result<bool> {
		let Some(idx) = self.servers.iter().position(|s| s.port() == port) else {
			return Ok(false);
		};
		self.servers.swap_remove(idx).terminate(self.terminate_grace).await?;
		Ok(true)
	}

	/// Terminates every owned server concurrently. Returns how many were stopped.
	///
	/// Bounded by the grace period plus the kill window, regardless of server count.
	pub async fn terminate_all(&mut self) -> usize {
		let grace = self.terminate_grace;
		let mut tasks = JoinSet::new();
		for server in self.servers.drain(..) {
			tasks.spawn(async move {
				let port = server.port();
				(port, server.terminate(grace).await)
			});
		}

		let mut stopped = 0;
		while let Some(joined) = tasks.join_next().await {
			match joined {
				Ok((port, Ok(()))) => {
					debug!(target = "adcycle.server", port, "automation server terminated");
					stopped += 1;
				}
				Ok((port, Err(err))) => {
					warn!(target = "adcycle.server", port, error = %err, "automation server did not terminate cleanly");
				}
				Err(join_err) => {
					warn!(target = "adcycle.server", error = %join_err, "termination task failed");
				}
			}
		}
		stopped
	}
}

#[cfg(test)]
mod tests {
	use std::fs;
	#[cfg(unix)]
	use std::os::unix::fs::PermissionsExt;
	use std::path::Path;

	use tempfile::TempDir;

	use super::*;
	use crate::ports::PortPlan;

	#[cfg(unix)]
	fn write_mock_server(dir: &Path, name: &str, body: &str) -> PathBuf {
		let path = dir.join(name);
		fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
		let mut perms = fs::metadata(&path).unwrap().permissions();
		perms.set_mode(0o755);
		fs::set_permissions(&path, perms).unwrap();
		path
	}

	/// Fails on one port, delegates the rest.
	struct FlakyLauncher {
		inner: AppiumLauncher,
		failing_port: u16,
	}

	#[async_trait]
	impl ServerLauncher for FlakyLauncher {
		async fn launch(&self, port: u16) -> Result<ServerProcess> {
			if port == self.failing_port {
				return Err(Error::SpawnFailed {
					port,
					message: "simulated".into(),
				});
			}
			self.inner.launch(port).await
		}
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn test_server_launch_and_terminate() {
		let temp = TempDir::new().unwrap();
		let program = write_mock_server(temp.path(), "appium", "exec sleep 30");

		let server = AppiumLauncher::new(&program).launch(4723).await.unwrap();
		assert_eq!(server.port(), 4723);
		assert!(server.pid().is_some());

		let started = std::time::Instant::now();
		server.terminate(Duration::from_secs(3)).await.unwrap();
		assert!(started.elapsed() < Duration::from_secs(3));
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn test_immediate_exit_is_reported() {
		let temp = TempDir::new().unwrap();
		let program = write_mock_server(temp.path(), "appium", "exit 3");

		let err = AppiumLauncher::new(&program)
			.with_startup_probe(Duration::from_millis(300))
			.launch(4725)
			.await
			.unwrap_err();
		assert!(matches!(err, Error::ExitedEarly { port: 4725, .. }));
		assert!(err.is_spawn_failure());
	}

	#[tokio::test]
	async fn test_missing_program_is_spawn_failure() {
		let temp = TempDir::new().unwrap();
		let err = AppiumLauncher::new(temp.path().join("no-such-appium"))
			.launch(4727)
			.await
			.unwrap_err();
		assert!(matches!(err, Error::SpawnFailed { port: 4727, .. }));
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn test_partial_spawn_failure_is_isolated() {
		let temp = TempDir::new().unwrap();
		let program = write_mock_server(temp.path(), "appium", "exec sleep 30");
		let launcher = FlakyLauncher {
			inner: AppiumLauncher::new(&program),
			failing_port: 4725,
		};

		let assignments = PortPlan::default().assign_all(3).unwrap();
		let mut supervisor = AutomationServerSupervisor::new(launcher, Duration::from_secs(2));
		let outcomes = supervisor.spawn_all(&assignments).await;

		let ok: Vec<_> = outcomes.iter().map(|o| o.result.is_ok()).collect();
		assert_eq!(ok, vec![true, false, true]);
		assert_eq!(supervisor.ports(), vec![4723, 4727]);

		assert_eq!(supervisor.terminate_all().await, 2);
		assert!(supervisor.is_empty());
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn test_reap_exited_detects_crashed_server() {
		let temp = TempDir::new().unwrap();
		let short = write_mock_server(temp.path(), "short", "sleep 0.3");
		let long = write_mock_server(temp.path(), "long", "exec sleep 30");

		let mut supervisor = AutomationServerSupervisor::new(
			AppiumLauncher::new(&long),
			Duration::from_secs(2),
		);
		supervisor.spawn(4723).await.unwrap();
		let crashing = AppiumLauncher::new(&short)
			.with_startup_probe(Duration::from_millis(10))
			.launch(4725)
			.await
			.unwrap();
		supervisor.servers.push(crashing);

		let mut exited = Vec::new();
		for _ in 0..50 {
			exited = supervisor.reap_exited();
			if !exited.is_empty() {
				break;
			}
			tokio::time::sleep(Duration::from_millis(100)).await;
		}

		assert_eq!(exited.len(), 1);
		assert_eq!(exited[0].port, 4725);
		assert_eq!(supervisor.ports(), vec![4723]);
		assert!(supervisor.terminate(4723).await.unwrap());
		assert!(!supervisor.terminate(4723).await.unwrap());
	}
}
