//! The per-device interaction loop state machine.
//!
//! ```text
//! Connecting ─► Ready ─► TapPrimary ─► ScrollContent ─► TriggerSurface
//!                 ▲                                          │
//!                 │                                          ▼
//!               Pause ◄──────── RelaunchApp ◄──────── AwaitPlayback
//!
//! any state ─► Stopped   (stop requested)
//! any state ─► Crashed   (session lost)
//! ```
//!
//! Step failures caused by missing or slow UI elements are logged and the
//! machine moves on to the next state; only a lost session ends the loop early.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use adcycle_protocol::{NATIVE_CONTEXT, Selector, WEBVIEW_CONTEXT_PREFIX};
use adcycle_runtime::DeviceHandle;
use rand::Rng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::driver::DeviceDriver;
use crate::error::{DriverError, Result};
use crate::pause::PauseBounds;
use crate::stop::StopSignal;
use crate::variant::{Dwell, LoopVariant, TriggerStrategy, viewport_tap_point};
use crate::worker::WorkerStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoopState {
	Connecting,
	Ready,
	TapPrimary,
	ScrollContent,
	TriggerSurface,
	AwaitPlayback,
	RelaunchApp,
	Pause,
	Stopped,
	Crashed,
}

impl LoopState {
	/// Successor when the current state finishes, whether its step succeeded
	/// or failed with a probe error. Terminal states map to themselves.
	pub fn next(self) -> Self {
		match self {
			Self::Connecting => Self::Ready,
			Self::Ready => Self::TapPrimary,
			Self::TapPrimary => Self::ScrollContent,
			Self::ScrollContent => Self::TriggerSurface,
			Self::TriggerSurface => Self::AwaitPlayback,
			Self::AwaitPlayback => Self::RelaunchApp,
			Self::RelaunchApp => Self::Pause,
			Self::Pause => Self::Ready,
			Self::Stopped => Self::Stopped,
			Self::Crashed => Self::Crashed,
		}
	}

	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Stopped | Self::Crashed)
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Connecting => "connecting",
			Self::Ready => "ready",
			Self::TapPrimary => "tap-primary",
			Self::ScrollContent => "scroll-content",
			Self::TriggerSurface => "trigger-surface",
			Self::AwaitPlayback => "await-playback",
			Self::RelaunchApp => "relaunch-app",
			Self::Pause => "pause",
			Self::Stopped => "stopped",
			Self::Crashed => "crashed",
		}
	}
}

impl fmt::Display for LoopState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// How a loop ended.
#[derive(Debug, Clone)]
pub struct LoopExit {
	/// [`LoopState::Stopped`] or [`LoopState::Crashed`].
	pub state: LoopState,
	pub completed_iterations: u64,
	/// State the loop was in when it left.
	pub last_step: LoopState,
	pub error: Option<DriverError>,
}

/// Inputs of one interaction loop.
pub struct LoopContext {
	pub device: DeviceHandle,
	pub app_package: String,
	pub variant: Arc<LoopVariant>,
	pub pause: PauseBounds,
}

/// Drives one device through the loop until stopped or crashed.
pub struct InteractionLoop {
	ctx: LoopContext,
	driver: Box<dyn DeviceDriver>,
	rng: StdRng,
	stop: StopSignal,
	status: Arc<WorkerStatus>,
	state: LoopState,
	iteration: u64,
}

impl InteractionLoop {
	pub fn new(
		ctx: LoopContext,
		driver: Box<dyn DeviceDriver>,
		rng: StdRng,
		stop: StopSignal,
		status: Arc<WorkerStatus>,
	) -> Self {
		Self {
			ctx,
			driver,
			rng,
			stop,
			status,
			state: LoopState::Ready,
			iteration: 1,
		}
	}

	/// Runs until stop is requested or the session is lost, then closes the
	/// session.
	pub async fn run(mut self) -> LoopExit {
		self.enter(LoopState::Ready);
		self.status.set_iteration(self.iteration);

		loop {
			if self.stop.is_stopped() {
				return self.finish(LoopState::Stopped, None).await;
			}

			let step = self.state;
			if let Err(err) = self.execute(step).await {
				if err.is_fatal() {
					error!(
						target = "adcycle.worker",
						device = %self.ctx.device,
						iteration = self.iteration,
						state = %step,
						error = %err,
						"session lost"
					);
					return self.finish(LoopState::Crashed, Some(err)).await;
				}
				warn!(
					target = "adcycle.worker",
					device = %self.ctx.device,
					iteration = self.iteration,
					state = %step,
					error = %err,
					"step failed, continuing"
				);
			}

			if self.stop.is_stopped() {
				return self.finish(LoopState::Stopped, None).await;
			}

			if step == LoopState::Pause {
				self.iteration += 1;
				self.status.set_iteration(self.iteration);
			}
			self.enter(step.next());
		}
	}

	fn enter(&mut self, state: LoopState) {
		self.state = state;
		self.status.set_state(state);
		debug!(
			target = "adcycle.worker",
			device = %self.ctx.device,
			iteration = self.iteration,
			state = %state,
			"entering state"
		);
	}

	async fn finish(mut self, terminal: LoopState, error: Option<DriverError>) -> LoopExit {
		let last_step = self.state;
		self.status.set_state(terminal);
		if let Err(err) = self.driver.close().await {
			debug!(target = "adcycle.worker", device = %self.ctx.device, error = %err, "session close failed");
		}
		let completed_iterations = self.iteration - 1;
		info!(
			target = "adcycle.worker",
			device = %self.ctx.device,
			iteration = self.iteration,
			completed = completed_iterations,
			state = %terminal,
			"worker finished"
		);
		LoopExit {
			state: terminal,
			completed_iterations,
			last_step,
			error,
		}
	}

	async fn execute(&mut self, state: LoopState) -> Result<()> {
		match state {
			LoopState::Ready => {
				info!(
					target = "adcycle.worker",
					device = %self.ctx.device,
					iteration = self.iteration,
					variant = %self.ctx.variant.name,
					"iteration starting"
				);
				Ok(())
			}
			LoopState::TapPrimary => self.tap_primary().await,
			LoopState::ScrollContent => self.scroll_content().await,
			LoopState::TriggerSurface => self.trigger_surface().await,
			LoopState::AwaitPlayback => {
				let dwell = self.dwell();
				self.wait(dwell).await;
				Ok(())
			}
			LoopState::RelaunchApp => self.relaunch().await,
			LoopState::Pause => {
				let pause = self.ctx.pause.sample(&mut self.rng);
				info!(
					target = "adcycle.worker",
					device = %self.ctx.device,
					iteration = self.iteration,
					secs = pause.as_secs(),
					"pausing before next iteration"
				);
				self.wait(pause).await;
				Ok(())
			}
			LoopState::Connecting | LoopState::Stopped | LoopState::Crashed => Ok(()),
		}
	}

	async fn wait(&mut self, duration: Duration) -> bool {
		self.stop.sleep(duration).await
	}

	async fn tap_primary(&mut self) -> Result<()> {
		let variant = Arc::clone(&self.ctx.variant);
		for tap in &variant.primary {
			if tap.last_match {
				let matched = self.driver.activate_last(&tap.target).await?;
				debug!(target = "adcycle.worker", device = %self.ctx.device, selector = %tap.target, matched, "tapped last match");
			} else {
				self.driver
					.locate_and_activate(&tap.target, tap.timeout())
					.await?;
			}
			info!(
				target = "adcycle.worker",
				device = %self.ctx.device,
				iteration = self.iteration,
				selector = %tap.target,
				"tapped"
			);
			if !self.wait(tap.settle()).await {
				return Ok(());
			}
		}
		Ok(())
	}

	async fn scroll_content(&mut self) -> Result<()> {
		let Some(selector) = self.ctx.variant.scroll.selector() else {
			return Ok(());
		};
		self.driver.scroll_container(&selector).await?;
		debug!(target = "adcycle.worker", device = %self.ctx.device, iteration = self.iteration, "scrolled content");
		Ok(())
	}

	async fn trigger_surface(&mut self) -> Result<()> {
		let variant = Arc::clone(&self.ctx.variant);
		match &variant.trigger {
			TriggerStrategy::ViewportTap {
				x_ratio,
				bottom_offset,
			} => {
				let (width, height) = self.driver.viewport_size().await?;
				let (x, y) = viewport_tap_point(width, height, *x_ratio, *bottom_offset);
				self.driver.tap_at(x, y).await?;
				info!(target = "adcycle.worker", device = %self.ctx.device, iteration = self.iteration, x, y, "tapped ad surface");
			}
			TriggerStrategy::Element { target, timeout_ms } => {
				self.driver
					.locate_and_activate(target, Duration::from_millis(*timeout_ms))
					.await?;
				info!(target = "adcycle.worker", device = %self.ctx.device, iteration = self.iteration, selector = %target, "activated ad surface");
			}
			TriggerStrategy::WebContent {
				candidates,
				per_candidate_timeout_ms,
			} => {
				let timeout = Duration::from_millis(*per_candidate_timeout_ms);
				self.trigger_web_content(candidates, timeout).await?;
			}
		}
		Ok(())
	}

	async fn trigger_web_content(&mut self, candidates: &[Selector], timeout: Duration) -> Result<()> {
		let contexts = self.driver.contexts().await?;
		let Some(web) = contexts
			.iter()
			.find(|c| c.starts_with(WEBVIEW_CONTEXT_PREFIX))
		else {
			return Err(DriverError::NotFound {
				selector: format!("{WEBVIEW_CONTEXT_PREFIX}* context"),
			});
		};
		self.driver.switch_context(web).await?;

		let mut outcome = Err(DriverError::NotFound {
			selector: "any web ad candidate".into(),
		});
		for candidate in candidates {
			match self.driver.locate_and_activate(candidate, timeout).await {
				Ok(()) => {
					info!(target = "adcycle.worker", device = %self.ctx.device, iteration = self.iteration, selector = %candidate, "activated web ad");
					outcome = Ok(());
					break;
				}
				Err(err) if err.is_fatal() => return Err(err),
				Err(err) => {
					debug!(target = "adcycle.worker", device = %self.ctx.device, selector = %candidate, error = %err, "web ad candidate missed");
				}
			}
		}

		if let Err(err) = self.driver.switch_context(NATIVE_CONTEXT).await {
			if err.is_fatal() {
				return Err(err);
			}
			warn!(target = "adcycle.worker", device = %self.ctx.device, error = %err, "failed to restore native context");
		}
		outcome
	}

	fn dwell(&mut self) -> Duration {
		match self.ctx.variant.dwell {
			Dwell::Fixed { ms } => Duration::from_millis(ms),
			Dwell::Random { min_ms, max_ms } => Duration::from_millis(self.rng.gen_range(min_ms..=max_ms)),
		}
	}

	async fn relaunch(&mut self) -> Result<()> {
		let relaunch = self.ctx.variant.relaunch;
		let package = self.ctx.app_package.clone();

		let terminated = self.driver.terminate_app(&package).await;
		if let Err(err) = &terminated {
			if err.is_fatal() {
				return terminated;
			}
		}
		if !self.wait(Duration::from_millis(relaunch.gap_ms)).await {
			return terminated;
		}

		self.driver.activate_app(&package).await?;
		info!(target = "adcycle.worker", device = %self.ctx.device, iteration = self.iteration, "app relaunched");
		self.wait(Duration::from_millis(relaunch.reload_ms)).await;
		terminated
	}
}

#[cfg(test)]
mod tests;
