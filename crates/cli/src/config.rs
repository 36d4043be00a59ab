//! Run configuration.
//!
//! Values resolve in three layers: built-in defaults, then a JSON config file
//! (`--config FILE`, or `$XDG_CONFIG_HOME/adcycle/config.json` when present),
//! then command-line flags.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use adcycle::{LoopVariant, PauseBounds, PauseProfile, VariantKind, WorkerSettings};
use adcycle_runtime::{DEFAULT_VIRTUAL_PREFIX, PortPlan};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CliError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct RunConfig {
	pub base_port: u16,
	pub port_stride: u16,
	pub control_port_base: u16,
	pub pause_bounds_short: PauseBounds,
	pub pause_bounds_long: PauseBounds,
	pub app_package: String,
	pub app_activity: String,
	pub locale: String,
	pub variant: VariantKind,
	/// Overrides the variant's own pause profile.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub pause_profile: Option<PauseProfile>,
	pub settle_delay_ms: u64,
	pub session_warmup_ms: u64,
	/// Serial prefix of devices to skip. Empty keeps every device.
	pub virtual_prefix: String,
	pub server_host: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub server_program: Option<PathBuf>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub bridge_program: Option<PathBuf>,
	pub server_args: Vec<String>,
	pub terminate_grace_ms: u64,
	pub worker_grace_ms: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub seed: Option<u64>,
	/// Replaces the preset named by `variant`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub custom_variant: Option<LoopVariant>,
}

impl Default for RunConfig {
	fn default() -> Self {
		let plan = PortPlan::default();
		Self {
			base_port: plan.base_port,
			port_stride: plan.stride,
			control_port_base: plan.control_base,
			pause_bounds_short: PauseBounds::SHORT,
			pause_bounds_long: PauseBounds::LONG,
			app_package: "com.basketballshots.app".into(),
			app_activity: ".MainActivity".into(),
			locale: "en-US".into(),
			variant: VariantKind::default(),
			pause_profile: None,
			settle_delay_ms: 5_000,
			session_warmup_ms: 1_000,
			virtual_prefix: DEFAULT_VIRTUAL_PREFIX.into(),
			server_host: "127.0.0.1".into(),
			server_program: None,
			bridge_program: None,
			server_args: Vec::new(),
			terminate_grace_ms: 3_000,
			worker_grace_ms: 10_000,
			seed: None,
			custom_variant: None,
		}
	}
}

impl RunConfig {
	/// `$XDG_CONFIG_HOME/adcycle/config.json`, falling back to `~/.config`.
	pub fn default_path() -> Option<PathBuf> {
		let config_home = std::env::var_os("XDG_CONFIG_HOME")
			.map(PathBuf::from)
			.filter(|p| p.is_absolute())
			.or_else(|| dirs::home_dir().map(|h| h.join(".config")))?;
		Some(config_home.join("adcycle").join("config.json"))
	}

	/// Loads `explicit`, or the default file if it exists, or the defaults.
	///
	/// # Errors
	///
	/// Returns [`CliError::Config`] when a file cannot be read or parsed. A
	/// missing explicit file is an error; a missing default file is not.
	pub fn load(explicit: Option<&Path>) -> Result<Self> {
		if let Some(path) = explicit {
			return Self::from_file(path);
		}
		match Self::default_path() {
			Some(path) if path.is_file() => Self::from_file(&path),
			_ => Ok(Self::default()),
		}
	}

	pub fn from_file(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path)
			.map_err(|e| CliError::Config(format!("cannot read {}: {e}", path.display())))?;
		let config = serde_json::from_str(&content)
			.map_err(|e| CliError::Config(format!("{}: {e}", path.display())))?;
		debug!(target = "adcycle.config", path = %path.display(), "loaded config file");
		Ok(config)
	}

	pub fn port_plan(&self) -> PortPlan {
		PortPlan::new(self.base_port, self.port_stride, self.control_port_base)
	}

	/// Effective loop variant: the custom definition if present, else the preset.
	pub fn loop_variant(&self) -> LoopVariant {
		self.custom_variant
			.clone()
			.unwrap_or_else(|| self.variant.preset())
	}

	pub fn pause_bounds(&self, variant: &LoopVariant) -> PauseBounds {
		match self.pause_profile.unwrap_or(variant.pause) {
			PauseProfile::Short => self.pause_bounds_short,
			PauseProfile::Long => self.pause_bounds_long,
		}
	}

	/// Checks everything that does not depend on the discovered device count.
	///
	/// # Errors
	///
	/// Returns [`CliError::Config`] describing the first problem found.
	pub fn validate(&self) -> Result<()> {
		if self.port_stride == 0 {
			return Err(CliError::Config("portStride must be at least 1".into()));
		}
		self.port_plan()
			.validate(1)
			.map_err(|e| CliError::Config(e.to_string()))?;
		for (key, value) in [
			("appPackage", &self.app_package),
			("appActivity", &self.app_activity),
			("locale", &self.locale),
			("serverHost", &self.server_host),
		] {
			if value.trim().is_empty() {
				return Err(CliError::Config(format!("{key} must not be empty")));
			}
		}
		self.loop_variant()
			.validate()
			.map_err(|e| CliError::Config(format!("variant: {e}")))?;
		Ok(())
	}

	pub fn worker_settings(&self) -> WorkerSettings {
		let variant = self.loop_variant();
		WorkerSettings {
			server_host: self.server_host.clone(),
			app_package: self.app_package.clone(),
			app_activity: self.app_activity.clone(),
			locale: self.locale.clone(),
			pause: self.pause_bounds(&variant),
			variant: Arc::new(variant),
			session_warmup: Duration::from_millis(self.session_warmup_ms),
			seed: self.seed,
		}
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use tempfile::NamedTempFile;

	use super::*;

	fn write_config(json: &str) -> NamedTempFile {
		let mut file = NamedTempFile::new().unwrap();
		file.write_all(json.as_bytes()).unwrap();
		file
	}

	#[test]
	fn defaults_match_known_layout() {
		let config = RunConfig::default();
		assert_eq!(config.port_plan(), PortPlan::new(4723, 2, 8200));
		assert_eq!(config.pause_bounds_short, PauseBounds::new(1, 4).unwrap());
		assert_eq!(config.pause_bounds_long, PauseBounds::new(1, 40).unwrap());
		assert_eq!(config.variant, VariantKind::BannerTap);
		assert_eq!(config.settle_delay_ms, 5_000);
		config.validate().unwrap();
	}

	#[test]
	fn file_overrides_defaults() {
		let file = write_config(
			r#"{ "basePort": 5000, "pauseBoundsShort": [2, 6], "variant": "play-and-return", "seed": 9 }"#,
		);
		let config = RunConfig::load(Some(file.path())).unwrap();

		assert_eq!(config.base_port, 5000);
		assert_eq!(config.port_stride, 2);
		assert_eq!(config.pause_bounds_short, PauseBounds::new(2, 6).unwrap());
		assert_eq!(config.variant, VariantKind::PlayAndReturn);
		assert_eq!(config.seed, Some(9));
		assert_eq!(config.app_package, "com.basketballshots.app");
	}

	#[test]
	fn inverted_pause_bounds_are_rejected() {
		let file = write_config(r#"{ "pauseBoundsLong": [40, 1] }"#);
		let err = RunConfig::load(Some(file.path())).unwrap_err();
		assert!(matches!(err, CliError::Config(_)));
	}

	#[test]
	fn unknown_keys_are_rejected() {
		let file = write_config(r#"{ "basePrt": 5000 }"#);
		assert!(matches!(
			RunConfig::load(Some(file.path())),
			Err(CliError::Config(_))
		));
	}

	#[test]
	fn missing_explicit_file_is_an_error() {
		let dir = tempfile::tempdir().unwrap();
		let err = RunConfig::load(Some(&dir.path().join("nope.json"))).unwrap_err();
		assert!(matches!(err, CliError::Config(_)));
	}

	#[test]
	fn pause_profile_follows_variant_unless_forced() {
		let mut config = RunConfig {
			variant: VariantKind::PlayAndReturn,
			..RunConfig::default()
		};
		assert_eq!(config.worker_settings().pause, PauseBounds::LONG);

		config.pause_profile = Some(PauseProfile::Short);
		assert_eq!(config.worker_settings().pause, PauseBounds::SHORT);
	}

	#[test]
	fn custom_variant_replaces_preset() {
		let mut custom = VariantKind::BannerElement.preset();
		custom.name = "mine".into();
		let config = RunConfig {
			custom_variant: Some(custom),
			..RunConfig::default()
		};
		assert_eq!(config.loop_variant().name, "mine");
	}

	#[test]
	fn invalid_values_fail_validation() {
		let config = RunConfig {
			port_stride: 0,
			..RunConfig::default()
		};
		assert!(config.validate().is_err());

		let config = RunConfig {
			locale: " ".into(),
			..RunConfig::default()
		};
		assert!(config.validate().is_err());

		let config = RunConfig {
			base_port: 8200,
			port_stride: 1,
			control_port_base: 8200,
			..RunConfig::default()
		};
		assert!(config.validate().is_err());
	}

	#[test]
	fn config_roundtrips_through_json() {
		let config = RunConfig::default();
		let json = serde_json::to_string(&config).unwrap();
		let back: RunConfig = serde_json::from_str(&json).unwrap();
		assert_eq!(back, config);
	}
}
