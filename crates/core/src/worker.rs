//! One worker per device: opens the session, then runs the interaction loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use adcycle_runtime::{DeviceHandle, PortAssignment};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{error, info};

use crate::driver::{DriverConnector, SessionRequest};
use crate::error::DriverError;
use crate::interaction::{InteractionLoop, LoopContext, LoopState};
use crate::pause::PauseBounds;
use crate::stop::StopSignal;
use crate::variant::LoopVariant;

/// Live view of a worker, shared with the orchestrator.
#[derive(Debug)]
pub struct WorkerStatus {
	device: DeviceHandle,
	state: Mutex<LoopState>,
	iteration: AtomicU64,
}

/// Point-in-time copy of a [`WorkerStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSnapshot {
	pub device: DeviceHandle,
	pub state: LoopState,
	/// Iterations whose loop body ran to completion.
	pub completed_iterations: u64,
}

impl WorkerStatus {
	pub fn new(device: DeviceHandle) -> Arc<Self> {
		Arc::new(Self {
			device,
			state: Mutex::new(LoopState::Connecting),
			iteration: AtomicU64::new(0),
		})
	}

	pub fn device(&self) -> &DeviceHandle {
		&self.device
	}

	pub fn state(&self) -> LoopState {
		*self.state.lock()
	}

	pub(crate) fn set_state(&self, state: LoopState) {
		*self.state.lock() = state;
	}

	/// Current 1-based iteration, 0 before the loop starts.
	pub fn iteration(&self) -> u64 {
		self.iteration.load(Ordering::Relaxed)
	}

	pub(crate) fn set_iteration(&self, iteration: u64) {
		self.iteration.store(iteration, Ordering::Relaxed);
	}

	pub fn snapshot(&self) -> WorkerSnapshot {
		WorkerSnapshot {
			device: self.device.clone(),
			state: self.state(),
			completed_iterations: self.iteration().saturating_sub(1),
		}
	}
}

/// Settings shared by every worker of a run.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
	pub server_host: String,
	pub app_package: String,
	pub app_activity: String,
	pub locale: String,
	pub variant: Arc<LoopVariant>,
	pub pause: PauseBounds,
	/// Delay between session establishment and the first iteration.
	pub session_warmup: Duration,
	/// Base seed; each worker uses `seed + ordinal`.
	pub seed: Option<u64>,
}

/// Final outcome of one worker.
#[derive(Debug, Clone)]
pub struct WorkerReport {
	pub device: DeviceHandle,
	pub assignment: PortAssignment,
	/// [`LoopState::Stopped`] or [`LoopState::Crashed`].
	pub state: LoopState,
	/// State the worker was in when it ended.
	pub last_step: LoopState,
	pub completed_iterations: u64,
	pub error: Option<DriverError>,
}

impl WorkerReport {
	pub fn crashed(&self) -> bool {
		self.state == LoopState::Crashed
	}
}

/// Owns one device, its port assignment and, once connected, its session.
pub struct DeviceWorker {
	device: DeviceHandle,
	assignment: PortAssignment,
	settings: Arc<WorkerSettings>,
	connector: Arc<dyn DriverConnector>,
	stop: StopSignal,
	status: Arc<WorkerStatus>,
}

impl DeviceWorker {
	pub fn new(
		device: DeviceHandle,
		assignment: PortAssignment,
		settings: Arc<WorkerSettings>,
		connector: Arc<dyn DriverConnector>,
		stop: StopSignal,
	) -> Self {
		let status = WorkerStatus::new(device.clone());
		Self {
			device,
			assignment,
			settings,
			connector,
			stop,
			status,
		}
	}

	pub fn status(&self) -> Arc<WorkerStatus> {
		Arc::clone(&self.status)
	}

	pub fn session_request(&self) -> SessionRequest {
		SessionRequest {
			server_url: SessionRequest::server_url_for(
				&self.settings.server_host,
				self.assignment.server_port,
			),
			device: self.device.clone(),
			app_package: self.settings.app_package.clone(),
			app_activity: self.settings.app_activity.clone(),
			locale: self.settings.locale.clone(),
			control_port: self.assignment.control_port,
		}
	}

	fn rng(&self) -> StdRng {
		match self.settings.seed {
			Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(u64::from(self.assignment.ordinal))),
			None => StdRng::from_entropy(),
		}
	}

	/// Runs the worker to completion. Never panics on driver failures; they
	/// end up in the report.
	pub async fn run(mut self) -> WorkerReport {
		let request = self.session_request();
		self.status.set_state(LoopState::Connecting);
		info!(
			target = "adcycle.worker",
			device = %self.device,
			server = %request.server_url,
			control_port = request.control_port,
			"opening session"
		);

		let driver = match self.connector.open(&request).await {
			Ok(driver) => driver,
			Err(err) => {
				error!(target = "adcycle.worker", device = %self.device, error = %err, "session failed");
				return self.report(LoopState::Crashed, LoopState::Connecting, 0, Some(err));
			}
		};

		let warmup = self.settings.session_warmup;
		if !self.stop.sleep(warmup).await {
			let mut driver = driver;
			let _ = driver.close().await;
			info!(target = "adcycle.worker", device = %self.device, "stopped before first iteration");
			return self.report(LoopState::Stopped, LoopState::Connecting, 0, None);
		}

		let ctx = LoopContext {
			device: self.device.clone(),
			app_package: self.settings.app_package.clone(),
			variant: Arc::clone(&self.settings.variant),
			pause: self.settings.pause,
		};
		let exit = InteractionLoop::new(
			ctx,
			driver,
			self.rng(),
			self.stop.clone(),
			Arc::clone(&self.status),
		)
		.run()
		.await;

		self.report(exit.state, exit.last_step, exit.completed_iterations, exit.error)
	}

	fn report(
		&self,
		state: LoopState,
		last_step: LoopState,
		completed_iterations: u64,
		error: Option<DriverError>,
	) -> WorkerReport {
		self.status.set_state(state);
		WorkerReport {
			device: self.device.clone(),
			assignment: self.assignment,
			state,
			last_step,
			completed_iterations,
			error,
		}
	}
}

#[cfg(test)]
mod tests {
	use adcycle_runtime::PortPlan;

	use super::*;
	use crate::stop::stop_channel;
	use crate::testing::{FakeConnector, Script};
	use crate::variant::VariantKind;

	fn settings() -> Arc<WorkerSettings> {
		Arc::new(WorkerSettings {
			server_host: "127.0.0.1".into(),
			app_package: "com.basketballshots.app".into(),
			app_activity: ".MainActivity".into(),
			locale: "en-US".into(),
			variant: Arc::new(VariantKind::BannerTap.preset()),
			pause: PauseBounds::SHORT,
			session_warmup: Duration::ZERO,
			seed: Some(1),
		})
	}

	#[test]
	fn session_request_uses_assigned_ports() {
		let (_handle, signal) = stop_channel();
		let worker = DeviceWorker::new(
			DeviceHandle::new("R5CX"),
			PortPlan::default().assign(2),
			settings(),
			Arc::new(FakeConnector::new(Script::default())),
			signal,
		);
		let request = worker.session_request();
		assert_eq!(request.server_url, "http://127.0.0.1:4727");
		assert_eq!(request.control_port, 8202);
		assert_eq!(request.device.udid(), "R5CX");
	}

	#[tokio::test]
	async fn session_failure_crashes_worker() {
		let (_handle, signal) = stop_channel();
		let connector = FakeConnector::refusing();
		let worker = DeviceWorker::new(
			DeviceHandle::new("R5CX"),
			PortPlan::default().assign(0),
			settings(),
			Arc::new(connector),
			signal,
		);
		let status = worker.status();

		let report = worker.run().await;
		assert!(report.crashed());
		assert_eq!(report.last_step, LoopState::Connecting);
		assert!(matches!(report.error, Some(DriverError::SessionFailed(_))));
		assert_eq!(status.state(), LoopState::Crashed);
	}

	#[tokio::test(start_paused = true)]
	async fn stop_ends_worker_and_closes_session() {
		let (handle, signal) = stop_channel();
		let connector = Arc::new(FakeConnector::new(Script::default()));
		let worker = DeviceWorker::new(
			DeviceHandle::new("R5CX"),
			PortPlan::default().assign(0),
			settings(),
			connector.clone(),
			signal,
		);
		let status = worker.status();
		let task = tokio::spawn(worker.run());

		while status.iteration() < 3 {
			tokio::time::sleep(Duration::from_millis(100)).await;
		}
		handle.stop();

		let report = task.await.unwrap();
		assert_eq!(report.state, LoopState::Stopped);
		assert!(report.completed_iterations >= 2);
		assert!(connector.log().contains(&"close".to_string()));
	}
}
