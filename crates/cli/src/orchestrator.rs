//! Run coordinator: discovery, port planning, server supervision, workers and
//! the shutdown protocol.
//!
//! ```text
//! Discovering ─► Spawning ─► Settling ─► Running ─► ShuttingDown ─► Finished
//!      │             │           │                        ▲
//!      │ no devices  │ 0 servers └──── signal ────────────┘
//!      ▼             ▼
//!    error         error
//! ```
//!
//! Everything a run owns lives in one [`RunState`]; the shutdown routine gets
//! it by reference instead of reaching into globals.


use std::collections::HashSet;
use std::future::Future;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use adcycle::{
	DeviceWorker, DriverConnector, LoopState, StopHandle, WorkerReport, WorkerSettings,
	WorkerStatus, stop_channel,
};
use adcycle_runtime::{
	AutomationServerSupervisor, DeviceBridge, DeviceHandle, DeviceRegistry, PortAssignment,
	PortPlan, ServerLauncher,
};
use colored::Colorize;
use serde::Serialize;
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::{CliError, Result};
use crate::output::RenderText;

/// How often servers are polled for unexpected exits.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(5);

/// Extra wait for workers after their servers are gone.
const POST_TERMINATE_DRAIN: Duration = Duration::from_secs(2);

/// Timing and shared settings of one run.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
	pub plan: PortPlan,
	pub settle_delay: Duration,
	pub worker_grace: Duration,
	pub reap_interval: Duration,
	pub settings: Arc<WorkerSettings>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
	Discovering,
	Spawning,
	Settling,
	Running,
	ShuttingDown,
	Finished,
}

/// Everything a run owns between startup and shutdown.
struct RunState<L> {
	phase: RunPhase,
	supervisor: AutomationServerSupervisor<L>,
	/// Devices whose server started, in ordinal order.
	live: Vec<(DeviceHandle, PortAssignment)>,
	/// Devices whose server did not start.
	failed: Vec<DeviceSummary>,
	workers: JoinSet<WorkerReport>,
	statuses: Vec<Arc<WorkerStatus>>,
	stop: StopHandle,
	reports: Vec<WorkerReport>,
}

impl<L: ServerLauncher> RunState<L> {
	fn enter(&mut self, phase: RunPhase) {
		debug!(target = "adcycle.orchestrator", from = ?self.phase, to = ?phase, "run phase");
		self.phase = phase;
	}

	fn record(&mut self, joined: std::result::Result<WorkerReport, JoinError>) {
		match joined {
			Ok(report) => {
				if report.crashed() {
					warn!(
						target = "adcycle.orchestrator",
						device = %report.device,
						last_step = %report.last_step,
						iteration = report.completed_iterations + 1,
						error = ?report.error,
						"worker crashed"
					);
				} else {
					info!(
						target = "adcycle.orchestrator",
						device = %report.device,
						completed = report.completed_iterations,
						"worker stopped"
					);
				}
				self.reports.push(report);
			}
			Err(err) if err.is_cancelled() => {}
			Err(err) => error!(target = "adcycle.orchestrator", error = %err, "worker task panicked"),
		}
	}

	fn reap_servers(&mut self) {
		for exited in self.supervisor.reap_exited() {
			let device = self
				.live
				.iter()
				.find(|(_, a)| a.server_port == exited.port)
				.map(|(d, _)| d.to_string())
				.unwrap_or_default();
			warn!(
				target = "adcycle.orchestrator",
				port = exited.port,
				device = %device,
				status = %exited.status,
				"automation server exited on its own"
			);
		}
	}

	/// Cancels workers, waits for them within `grace`, then terminates every
	/// server and gives stragglers a short final window before aborting them.
	async fn shutdown(&mut self, grace: Duration) -> usize {
		self.enter(RunPhase::ShuttingDown);
		info!(
			target = "adcycle.orchestrator",
			workers = self.workers.len(),
			servers = self.supervisor.len(),
			"stopping workers"
		);
		self.stop.stop();

		if !self.drain(grace).await {
			warn!(
				target = "adcycle.orchestrator",
				remaining = self.workers.len(),
				grace_ms = grace.as_millis() as u64,
				"workers still busy after grace period; terminating servers anyway"
			);
		}

		let terminated = self.supervisor.terminate_all().await;
		info!(target = "adcycle.orchestrator", terminated, "automation servers terminated");

		if !self.drain(POST_TERMINATE_DRAIN).await {
			warn!(target = "adcycle.orchestrator", remaining = self.workers.len(), "aborting unresponsive workers");
			self.workers.abort_all();
			while let Some(joined) = self.workers.join_next().await {
				self.record(joined);
			}
		}

		self.enter(RunPhase::Finished);
		terminated
	}

	/// Joins workers until none remain or `limit` passes. True if all joined.
	async fn drain(&mut self, limit: Duration) -> bool {
		let deadline = tokio::time::Instant::now() + limit;
		while !self.workers.is_empty() {
			match tokio::time::timeout_at(deadline, self.workers.join_next()).await {
				Ok(Some(joined)) => self.record(joined),
				Ok(None) => break,
				Err(_) => return false,
			}
		}
		true
	}

	fn summary(self, servers_terminated: usize) -> RunSummary {
		let mut devices = self.failed;
		let reported: HashSet<&DeviceHandle> = self.reports.iter().map(|r| &r.device).collect();

		for report in &self.reports {
			devices.push(DeviceSummary::from_report(report));
		}

		for (device, assignment) in &self.live {
			if reported.contains(device) {
				continue;
			}
			let status = self.statuses.iter().find(|s| s.device() == device);
			let outcome = if status.is_some() {
				DeviceOutcome::Aborted
			} else {
				DeviceOutcome::NotStarted
			};
			let snapshot = status.map(|s| s.snapshot());
			devices.push(DeviceSummary {
				device: device.clone(),
				ordinal: assignment.ordinal,
				server_port: assignment.server_port,
				control_port: assignment.control_port,
				outcome,
				last_step: snapshot.as_ref().map(|s| s.state),
				completed_iterations: snapshot.map_or(0, |s| s.completed_iterations),
				error: None,
			});
		}

		devices.sort_by_key(|d| d.ordinal);
		RunSummary {
			devices,
			servers_terminated,
		}
	}
}

/// Coordinates one run over every discovered device.
pub struct Orchestrator<B, L> {
	registry: DeviceRegistry<B>,
	supervisor: AutomationServerSupervisor<L>,
	connector: Arc<dyn DriverConnector>,
	options: OrchestratorOptions,
}

impl<B: DeviceBridge, L: ServerLauncher> Orchestrator<B, L> {
	pub fn new(
		registry: DeviceRegistry<B>,
		supervisor: AutomationServerSupervisor<L>,
		connector: Arc<dyn DriverConnector>,
		options: OrchestratorOptions,
	) -> Self {
		Self {
			registry,
			supervisor,
			connector,
			options,
		}
	}

	/// Runs until `shutdown` resolves, then tears everything down.
	///
	/// # Errors
	///
	/// Fails before any worker starts: [`CliError::NoDevices`] when discovery
	/// finds nothing, a discovery error when the bridge cannot be queried,
	/// [`CliError::Config`] when the port plan cannot serve every device, and
	/// [`CliError::NoServers`] when no server starts. Once workers run, the
	/// result is always a [`RunSummary`].
	pub async fn run<F>(self, shutdown: F) -> Result<RunSummary>
	where
		F: Future<Output = ()>,
	{
		let Self {
			registry,
			supervisor,
			connector,
			options,
		} = self;
		tokio::pin!(shutdown);

		let devices = registry.list_devices().await?;
		if devices.is_empty() {
			return Err(CliError::NoDevices);
		}
		info!(target = "adcycle.orchestrator", count = devices.len(), "devices discovered");

		let assignments = options
			.plan
			.assign_all(devices.len())
			.map_err(|e| CliError::Config(e.to_string()))?;

		let (stop, signal) = stop_channel();
		let mut state = RunState {
			phase: RunPhase::Discovering,
			supervisor,
			live: Vec::new(),
			failed: Vec::new(),
			workers: JoinSet::new(),
			statuses: Vec::new(),
			stop,
			reports: Vec::new(),
		};

		state.enter(RunPhase::Spawning);
		let outcomes = state.supervisor.spawn_all(&assignments).await;
		for (device, outcome) in devices.into_iter().zip(outcomes) {
			match outcome.result {
				Ok(()) => state.live.push((device, outcome.assignment)),
				Err(err) => {
					error!(
						target = "adcycle.orchestrator",
						device = %device,
						port = outcome.assignment.server_port,
						error = %err,
						"device skipped: automation server did not start"
					);
					state
						.failed
						.push(DeviceSummary::server_failed(device, outcome.assignment, err.to_string()));
				}
			}
		}
		if state.live.is_empty() {
			return Err(CliError::NoServers {
				failed: state.failed.len(),
			});
		}

		state.enter(RunPhase::Settling);
		debug!(target = "adcycle.orchestrator", delay_ms = options.settle_delay.as_millis() as u64, "waiting for servers to settle");
		let settled = tokio::select! {
			_ = &mut shutdown => false,
			_ = tokio::time::sleep(options.settle_delay) => true,
		};
		if !settled {
			info!(target = "adcycle.orchestrator", "shutdown requested before workers started");
			let terminated = state.shutdown(options.worker_grace).await;
			return Ok(state.summary(terminated));
		}

		state.enter(RunPhase::Running);
		for (device, assignment) in &state.live {
			let worker = DeviceWorker::new(
				device.clone(),
				*assignment,
				Arc::clone(&options.settings),
				Arc::clone(&connector),
				signal.clone(),
			);
			state.statuses.push(worker.status());
			state.workers.spawn(worker.run());
		}
		info!(target = "adcycle.orchestrator", workers = state.workers.len(), "workers started");

		let mut reap = tokio::time::interval(options.reap_interval);
		reap.set_missed_tick_behavior(MissedTickBehavior::Delay);
		let mut idle_logged = false;

		loop {
			tokio::select! {
				_ = &mut shutdown => break,
				Some(joined) = state.workers.join_next(), if !state.workers.is_empty() => {
					state.record(joined);
				}
				_ = reap.tick() => state.reap_servers(),
			}
			if state.workers.is_empty() && !idle_logged {
				warn!(target = "adcycle.orchestrator", "no workers left running; waiting for shutdown signal");
				idle_logged = true;
			}
		}

		let terminated = state.shutdown(options.worker_grace).await;
		Ok(state.summary(terminated))
	}
}

/// How one device's part of the run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceOutcome {
	Stopped,
	Crashed,
	ServerFailed,
	/// Shutdown arrived before the worker was started.
	NotStarted,
	/// The worker had to be aborted during shutdown.
	Aborted,
}

impl DeviceOutcome {
	fn as_str(self) -> &'static str {
		match self {
			Self::Stopped => "stopped",
			Self::Crashed => "crashed",
			Self::ServerFailed => "server-failed",
			Self::NotStarted => "not-started",
			Self::Aborted => "aborted",
		}
	}
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSummary {
	pub device: DeviceHandle,
	pub ordinal: u16,
	pub server_port: u16,
	pub control_port: u16,
	pub outcome: DeviceOutcome,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub last_step: Option<LoopState>,
	pub completed_iterations: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl DeviceSummary {
	fn server_failed(device: DeviceHandle, assignment: PortAssignment, error: String) -> Self {
		Self {
			device,
			ordinal: assignment.ordinal,
			server_port: assignment.server_port,
			control_port: assignment.control_port,
			outcome: DeviceOutcome::ServerFailed,
			last_step: None,
			completed_iterations: 0,
			error: Some(error),
		}
	}

	fn from_report(report: &WorkerReport) -> Self {
		Self {
			device: report.device.clone(),
			ordinal: report.assignment.ordinal,
			server_port: report.assignment.server_port,
			control_port: report.assignment.control_port,
			outcome: if report.crashed() {
				DeviceOutcome::Crashed
			} else {
				DeviceOutcome::Stopped
			},
			last_step: Some(report.last_step),
			completed_iterations: report.completed_iterations,
			error: report.error.as_ref().map(ToString::to_string),
		}
	}
}

/// Per-device outcome of a finished run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
	pub devices: Vec<DeviceSummary>,
	pub servers_terminated: usize,
}

impl RunSummary {
	pub fn device(&self, udid: &str) -> Option<&DeviceSummary> {
		self.devices.iter().find(|d| d.device.udid() == udid)
	}

	pub fn total_iterations(&self) -> u64 {
		self.devices.iter().map(|d| d.completed_iterations).sum()
	}
}

impl RenderText for RunSummary {
	fn render_text(&self, out: &mut dyn Write) -> io::Result<()> {
		writeln!(out, "{}", "Run summary".bold())?;
		for d in &self.devices {
			let outcome = match d.outcome {
				DeviceOutcome::Stopped => d.outcome.as_str().green(),
				DeviceOutcome::NotStarted | DeviceOutcome::Aborted => d.outcome.as_str().yellow(),
				DeviceOutcome::Crashed | DeviceOutcome::ServerFailed => d.outcome.as_str().red(),
			};
			write!(
				out,
				"  {:<20} :{:<5} ctl:{:<5} {:<13} {} iterations",
				d.device.udid(),
				d.server_port,
				d.control_port,
				outcome,
				d.completed_iterations
			)?;
			if let (DeviceOutcome::Crashed, Some(step)) = (d.outcome, d.last_step) {
				write!(out, " (at {step})")?;
			}
			if let Some(ref err) = d.error {
				write!(out, " {}", err.dimmed())?;
			}
			writeln!(out)?;
		}
		writeln!(
			out,
			"{} iterations, {} servers terminated",
			self.total_iterations(),
			self.servers_terminated
		)
	}
}
