use std::time::Duration;

use rand::SeedableRng;

use super::*;
use crate::driver::{DriverConnector, SessionRequest};
use crate::stop::stop_channel;
use crate::testing::{FakeConnector, Script};
use crate::variant::VariantKind;

const APP: &str = "com.basketballshots.app";

fn request() -> SessionRequest {
	SessionRequest {
		server_url: "http://127.0.0.1:4723".into(),
		device: DeviceHandle::new("R5CX"),
		app_package: APP.into(),
		app_activity: ".MainActivity".into(),
		locale: "en-US".into(),
		control_port: 8200,
	}
}

/// Runs a loop until `iterations` complete (or it ends on its own), then stops it.
async fn run_for(variant: LoopVariant, script: Script, iterations: u64) -> (LoopExit, Vec<String>) {
	let connector = FakeConnector::new(script);
	let driver = connector.open(&request()).await.unwrap();
	let (handle, signal) = stop_channel();
	let status = WorkerStatus::new(DeviceHandle::new("R5CX"));
	let ctx = LoopContext {
		device: DeviceHandle::new("R5CX"),
		app_package: APP.into(),
		variant: Arc::new(variant),
		pause: PauseBounds::SHORT,
	};

	let task = tokio::spawn(
		InteractionLoop::new(ctx, driver, StdRng::seed_from_u64(3), signal, Arc::clone(&status)).run(),
	);
	while status.iteration() <= iterations && !status.state().is_terminal() {
		tokio::time::sleep(Duration::from_millis(100)).await;
	}
	handle.stop();

	let exit = task.await.unwrap();
	(exit, connector.log())
}

fn count(log: &[String], prefix: &str) -> usize {
	log.iter().filter(|entry| entry.starts_with(prefix)).count()
}

#[test]
fn next_cycles_back_to_ready() {
	let mut state = LoopState::Ready;
	let mut seen = vec![state];
	for _ in 0..7 {
		state = state.next();
		seen.push(state);
	}
	assert_eq!(
		seen,
		vec![
			LoopState::Ready,
			LoopState::TapPrimary,
			LoopState::ScrollContent,
			LoopState::TriggerSurface,
			LoopState::AwaitPlayback,
			LoopState::RelaunchApp,
			LoopState::Pause,
			LoopState::Ready,
		]
	);
	assert_eq!(LoopState::Connecting.next(), LoopState::Ready);
	assert_eq!(LoopState::Stopped.next(), LoopState::Stopped);
	assert!(LoopState::Crashed.is_terminal());
}

#[tokio::test(start_paused = true)]
async fn probe_failures_do_not_stop_the_loop() {
	let variant = VariantKind::BannerElement.preset();
	let TriggerStrategy::Element { target, .. } = &variant.trigger else {
		panic!("banner-element triggers an element");
	};
	let script = Script::default()
		.missing(&Selector::button_text("Change Teams"))
		.missing(target);

	let (exit, log) = run_for(variant, script, 2).await;

	assert_eq!(exit.state, LoopState::Stopped);
	assert!(exit.completed_iterations >= 2);
	assert!(count(&log, &format!("terminate {APP}")) >= 2);
	assert!(count(&log, &format!("launch {APP}")) >= 2);
	assert_eq!(log.last().map(String::as_str), Some("close"));
}

#[tokio::test(start_paused = true)]
async fn transport_failure_crashes_and_closes() {
	let script = Script {
		transport_fails_after: Some(1),
		..Script::default()
	};

	let (exit, log) = run_for(VariantKind::BannerTap.preset(), script, 5).await;

	assert_eq!(exit.state, LoopState::Crashed);
	assert_eq!(exit.completed_iterations, 0);
	assert_eq!(exit.last_step, LoopState::ScrollContent);
	assert!(matches!(exit.error, Some(DriverError::Transport(_))));
	assert_eq!(log.last().map(String::as_str), Some("close"));
}

#[tokio::test(start_paused = true)]
async fn banner_tap_hits_bottom_center() {
	let (exit, log) = run_for(VariantKind::BannerTap.preset(), Script::default(), 1).await;

	assert_eq!(exit.state, LoopState::Stopped);
	assert!(log.contains(&"tap 540,2320".to_string()));
}

#[tokio::test(start_paused = true)]
async fn web_content_clicks_first_candidate_and_restores_native() {
	let variant = VariantKind::WebContent.preset();
	let TriggerStrategy::WebContent { candidates, .. } = &variant.trigger else {
		panic!("web-content preset triggers web content");
	};
	let script = Script {
		contexts: vec![NATIVE_CONTEXT.into(), "WEBVIEW_com.basketballshots.app".into()],
		..Script::default()
	}
	.missing(&candidates[0]);

	let (_exit, log) = run_for(variant.clone(), script, 1).await;

	let start = log
		.iter()
		.position(|e| e == "context WEBVIEW_com.basketballshots.app")
		.unwrap();
	assert_eq!(
		&log[start..start + 4],
		&[
			"context WEBVIEW_com.basketballshots.app".to_string(),
			format!("activate {}", candidates[0]),
			format!("activate {}", candidates[1]),
			format!("context {NATIVE_CONTEXT}"),
		]
	);
}

#[tokio::test(start_paused = true)]
async fn missing_web_context_is_not_fatal() {
	let (exit, log) = run_for(VariantKind::WebContent.preset(), Script::default(), 1).await;

	assert_eq!(exit.state, LoopState::Stopped);
	assert_eq!(count(&log, "context "), 0);
	assert!(count(&log, "terminate ") >= 1);
}

#[tokio::test(start_paused = true)]
async fn play_and_return_taps_play_then_last_button() {
	let variant = VariantKind::PlayAndReturn.preset();
	let (_exit, log) = run_for(variant, Script::default(), 1).await;

	let play = format!("activate {}", Selector::button_text("Play"));
	let last = format!("activate-last {}", Selector::class_name("android.widget.Button"));
	let play_at = log.iter().position(|e| *e == play).unwrap();
	assert_eq!(log[play_at + 1], last);
}

#[tokio::test]
async fn stop_before_start_completes_nothing() {
	let connector = FakeConnector::new(Script::default());
	let driver = connector.open(&request()).await.unwrap();
	let (handle, signal) = stop_channel();
	handle.stop();
	let status = WorkerStatus::new(DeviceHandle::new("R5CX"));
	let ctx = LoopContext {
		device: DeviceHandle::new("R5CX"),
		app_package: APP.into(),
		variant: Arc::new(VariantKind::BannerTap.preset()),
		pause: PauseBounds::SHORT,
	};

	let exit = InteractionLoop::new(ctx, driver, StdRng::seed_from_u64(1), signal, Arc::clone(&status))
		.run()
		.await;

	assert_eq!(exit.state, LoopState::Stopped);
	assert_eq!(exit.completed_iterations, 0);
	assert_eq!(status.state(), LoopState::Stopped);
	assert_eq!(connector.log(), vec!["open R5CX".to_string(), "close".to_string()]);
}
