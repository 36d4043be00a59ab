
use std::path::PathBuf;

use adcycle::{PauseBounds, PauseProfile, VariantKind};
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::RunConfig;
use crate::output::OutputFormat;
use crate::styles::cli_styles;

/// Root CLI for adcycle.
#[derive(Parser, Debug)]
#[command(name = "adcycle")]
#[command(about = "Run an app interaction loop on every attached Android device")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v debug, -vv trace)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format: text (default), json, or ndjson
	#[arg(short = 'f', long, global = true, value_enum, default_value = "text")]
	pub format: OutputFormat,

	/// Config file (defaults to $XDG_CONFIG_HOME/adcycle/config.json if present)
	#[arg(short = 'c', long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Start one automation server and worker per device and loop until interrupted.
	Run(RunArgs),
	/// List attached devices, the rows that were skipped, and their would-be ports.
	Devices(DevicesArgs),
	/// Print the port plan for a number of devices.
	Ports(PortsArgs),
	/// Print the built-in loop variants as JSON.
	Variants,
}

/// Port plan overrides.
#[derive(Args, Debug, Clone, Default)]
pub struct PortArgs {
	/// First automation server port
	#[arg(long, value_name = "PORT")]
	pub base_port: Option<u16>,

	/// Server port increment per device
	#[arg(long, value_name = "N")]
	pub port_stride: Option<u16>,

	/// First secondary control port
	#[arg(long, value_name = "PORT")]
	pub control_port_base: Option<u16>,
}

impl PortArgs {
	pub fn apply(&self, config: &mut RunConfig) {
		if let Some(port) = self.base_port {
			config.base_port = port;
		}
		if let Some(stride) = self.port_stride {
			config.port_stride = stride;
		}
		if let Some(port) = self.control_port_base {
			config.control_port_base = port;
		}
	}
}

/// Device discovery overrides.
#[derive(Args, Debug, Clone, Default)]
pub struct DiscoveryArgs {
	/// Path to the adb executable
	#[arg(long, value_name = "PATH")]
	pub adb: Option<PathBuf>,

	/// Keep emulator instances instead of skipping them
	#[arg(long)]
	pub include_emulators: bool,
}

impl DiscoveryArgs {
	pub fn apply(&self, config: &mut RunConfig) {
		if let Some(ref adb) = self.adb {
			config.bridge_program = Some(adb.clone());
		}
		if self.include_emulators {
			config.virtual_prefix.clear();
		}
	}
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
	/// Loop variant preset
	#[arg(long, value_name = "NAME", value_parser = parse_variant)]
	pub variant: Option<VariantKind>,

	/// Force the short or long pause range regardless of variant
	#[arg(long, value_enum, value_name = "PROFILE")]
	pub pause_profile: Option<PauseArg>,

	/// Short pause range in seconds, e.g. 1-4
	#[arg(long, value_name = "MIN-MAX", value_parser = parse_bounds)]
	pub pause_short: Option<PauseBounds>,

	/// Long pause range in seconds, e.g. 1-40
	#[arg(long, value_name = "MIN-MAX", value_parser = parse_bounds)]
	pub pause_long: Option<PauseBounds>,

	/// Package of the app under test
	#[arg(long, value_name = "PACKAGE")]
	pub app_package: Option<String>,

	/// Launch activity of the app under test
	#[arg(long, value_name = "ACTIVITY")]
	pub app_activity: Option<String>,

	/// Device locale tag
	#[arg(long, value_name = "TAG")]
	pub locale: Option<String>,

	/// Delay between starting servers and starting workers
	#[arg(long, value_name = "MS")]
	pub settle_delay_ms: Option<u64>,

	/// Seed for reproducible pauses (each device uses seed + ordinal)
	#[arg(long, value_name = "N")]
	pub seed: Option<u64>,

	/// Path to the appium executable
	#[arg(long, value_name = "PATH")]
	pub appium: Option<PathBuf>,

	/// Extra argument passed to every automation server (repeatable)
	#[arg(long = "server-arg", value_name = "ARG", allow_hyphen_values = true)]
	pub server_args: Vec<String>,

	#[command(flatten)]
	pub ports: PortArgs,

	#[command(flatten)]
	pub discovery: DiscoveryArgs,
}

impl RunArgs {
	pub fn apply(&self, config: &mut RunConfig) {
		self.ports.apply(config);
		self.discovery.apply(config);
		if let Some(variant) = self.variant {
			config.variant = variant;
			config.custom_variant = None;
		}
		if let Some(profile) = self.pause_profile {
			config.pause_profile = Some(profile.into());
		}
		if let Some(bounds) = self.pause_short {
			config.pause_bounds_short = bounds;
		}
		if let Some(bounds) = self.pause_long {
			config.pause_bounds_long = bounds;
		}
		if let Some(ref package) = self.app_package {
			config.app_package = package.clone();
		}
		if let Some(ref activity) = self.app_activity {
			config.app_activity = activity.clone();
		}
		if let Some(ref locale) = self.locale {
			config.locale = locale.clone();
		}
		if let Some(ms) = self.settle_delay_ms {
			config.settle_delay_ms = ms;
		}
		if let Some(seed) = self.seed {
			config.seed = Some(seed);
		}
		if let Some(ref appium) = self.appium {
			config.server_program = Some(appium.clone());
		}
		if !self.server_args.is_empty() {
			config.server_args = self.server_args.clone();
		}
	}
}

#[derive(Args, Debug, Clone, Default)]
pub struct DevicesArgs {
	#[command(flatten)]
	pub ports: PortArgs,

	#[command(flatten)]
	pub discovery: DiscoveryArgs,
}

#[derive(Args, Debug, Clone)]
pub struct PortsArgs {
	/// Number of devices to plan for
	#[arg(short = 'n', long, value_name = "N", default_value_t = 1)]
	pub count: usize,

	#[command(flatten)]
	pub ports: PortArgs,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PauseArg {
	Short,
	Long,
}

impl From<PauseArg> for PauseProfile {
	fn from(arg: PauseArg) -> Self {
		match arg {
			PauseArg::Short => PauseProfile::Short,
			PauseArg::Long => PauseProfile::Long,
		}
	}
}

fn parse_variant(s: &str) -> Result<VariantKind, String> {
	s.parse()
}

/// Parses `MIN-MAX` (or a single `N` for a fixed pause) in whole seconds.
fn parse_bounds(s: &str) -> Result<PauseBounds, String> {
	let (min, max) = s.split_once('-').unwrap_or((s, s));
	let parse = |v: &str| {
		v.trim()
			.parse::<u64>()
			.map_err(|e| format!("invalid seconds '{v}': {e}"))
	};
	PauseBounds::new(parse(min)?, parse(max)?).map_err(|e| e.to_string())
}
