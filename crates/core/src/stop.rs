//! Cooperative cancellation shared by the orchestrator and its workers.

use std::time::Duration;

use tokio::sync::watch;

/// Creates a linked handle/signal pair. Further signals come from
/// [`StopHandle::signal`].
pub fn stop_channel() -> (StopHandle, StopSignal) {
	let (tx, rx) = watch::channel(false);
	(StopHandle { tx }, StopSignal { rx })
}

/// Raises the stop flag for every linked [`StopSignal`].
#[derive(Debug)]
pub struct StopHandle {
	tx: watch::Sender<bool>,
}

impl StopHandle {
	pub fn stop(&self) {
		self.tx.send_replace(true);
	}

	pub fn signal(&self) -> StopSignal {
		StopSignal {
			rx: self.tx.subscribe(),
		}
	}

	pub fn is_stopped(&self) -> bool {
		*self.tx.borrow()
	}
}

/// Observed at step boundaries and inside every wait. A dropped
/// [`StopHandle`] counts as a stop.
#[derive(Debug, Clone)]
pub struct StopSignal {
	rx: watch::Receiver<bool>,
}

impl StopSignal {
	pub fn is_stopped(&self) -> bool {
		*self.rx.borrow() || self.rx.has_changed().is_err()
	}

	/// Resolves once stop is requested.
	pub async fn stopped(&mut self) {
		let _ = self.rx.wait_for(|stopped| *stopped).await;
	}

	/// Sleeps for `duration` unless stopped first. Returns `true` if the full
	/// duration elapsed.
	pub async fn sleep(&mut self, duration: Duration) -> bool {
		if self.is_stopped() {
			return false;
		}
		if duration.is_zero() {
			tokio::task::yield_now().await;
			return !self.is_stopped();
		}
		tokio::select! {
			_ = tokio::time::sleep(duration) => true,
			_ = self.stopped() => false,
		}
	}
}
