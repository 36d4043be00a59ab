//! The main run: one automation server and worker per device until a signal.

use std::sync::Arc;
use std::time::{Duration, Instant};

use adcycle::{AppiumConnector, DriverConnector};
use adcycle_runtime::{
	AdbBridge, AppiumLauncher, AutomationServerSupervisor, DeviceRegistry, Tool, find_executable,
};
use tracing::info;

use crate::cli::RunArgs;
use crate::config::RunConfig;
use crate::error::Result;
use crate::orchestrator::{DEFAULT_REAP_INTERVAL, Orchestrator, OrchestratorOptions};
use crate::output::{OutputFormat, ResultBuilder, print_result};
use crate::signal::ShutdownSignal;

pub async fn execute(args: &RunArgs, mut config: RunConfig, format: OutputFormat) -> Result<()> {
	let started = Instant::now();
	args.apply(&mut config);
	config.validate()?;

	// Installed before discovery so an early Ctrl+C is not lost.
	let shutdown = ShutdownSignal::install()?;

	let adb = find_executable(Tool::Adb, config.bridge_program.as_deref())?;
	let appium = find_executable(Tool::Appium, config.server_program.as_deref())?;
	let settings = config.worker_settings();
	info!(
		target = "adcycle.orchestrator",
		adb = %adb.display(),
		appium = %appium.display(),
		variant = %settings.variant.name,
		pause = %settings.pause,
		"starting run"
	);

	let registry = DeviceRegistry::new(AdbBridge::new(adb), config.virtual_prefix.clone());
	let launcher = AppiumLauncher::new(appium).with_extra_args(config.server_args.clone());
	let supervisor =
		AutomationServerSupervisor::new(launcher, Duration::from_millis(config.terminate_grace_ms));
	let connector: Arc<dyn DriverConnector> = Arc::new(AppiumConnector::new()?);

	let options = OrchestratorOptions {
		plan: config.port_plan(),
		settle_delay: Duration::from_millis(config.settle_delay_ms),
		worker_grace: Duration::from_millis(config.worker_grace_ms),
		reap_interval: DEFAULT_REAP_INTERVAL,
		settings: Arc::new(settings),
	};

	let summary = Orchestrator::new(registry, supervisor, connector, options)
		.run(shutdown.wait())
		.await?;

	let result = ResultBuilder::new("run")
		.started_at(started)
		.data(summary)
		.build();
	print_result(&result, format);
	Ok(())
}
