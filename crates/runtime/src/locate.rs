//! Host tool resolution
//!
//! Locates the device-bridge (`adb`) and automation-server (`appium`)
//! executables. Each tool is searched in the following order:
//! 1. Explicit path from the run configuration
//! 2. Environment override (`ADCYCLE_ADB`, `ADCYCLE_APPIUM`)
//! 3. Tool-specific install location (Android SDK `platform-tools`, npm global prefix)
//! 4. `PATH` lookup
//!
//! Candidates that exist but are not runnable files are skipped with a warning.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Host tools the orchestrator shells out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
	/// Android device bridge.
	Adb,
	/// Appium automation server.
	Appium,
}

impl Tool {
	pub fn name(self) -> &'static str {
		match self {
			Tool::Adb => "adb",
			Tool::Appium => "appium",
		}
	}

	/// Environment variable that overrides the search.
	pub fn env_var(self) -> &'static str {
		match self {
			Tool::Adb => "ADCYCLE_ADB",
			Tool::Appium => "ADCYCLE_APPIUM",
		}
	}

	fn file_name(self) -> &'static str {
		match (self, cfg!(windows)) {
			(Tool::Adb, false) => "adb",
			(Tool::Adb, true) => "adb.exe",
			(Tool::Appium, false) => "appium",
			(Tool::Appium, true) => "appium.cmd",
		}
	}
}

/// Resolves `tool` to an executable path.
///
/// # Errors
///
/// Returns [`Error::ExecutableNotFound`] when no candidate is usable.
pub fn find_executable(tool: Tool, explicit: Option<&Path>) -> Result<PathBuf> {
	if let Some(path) = explicit {
		if let Some(found) = accept_candidate("config", path) {
			return Ok(found);
		}
	}

	if let Some(path) = std::env::var_os(tool.env_var()) {
		if let Some(found) = accept_candidate(tool.env_var(), Path::new(&path)) {
			return Ok(found);
		}
	}

	let install_dir = match tool {
		Tool::Adb => sdk_platform_tools(),
		Tool::Appium => npm_global_bin(),
	};
	if let Some(dir) = install_dir {
		let candidate = dir.join(tool.file_name());
		if candidate.exists() {
			if let Some(found) = accept_candidate("install location", &candidate) {
				return Ok(found);
			}
		}
	}

	if let Ok(found) = which::which(tool.name()) {
		debug!(target = "adcycle.locate", tool = tool.name(), path = %found.display(), "found on PATH");
		return Ok(found);
	}

	Err(Error::ExecutableNotFound {
		tool: tool.name(),
		env_var: tool.env_var(),
	})
}

fn accept_candidate(source: &str, path: &Path) -> Option<PathBuf> {
	if is_runnable_file(path) {
		debug!(target = "adcycle.locate", source, path = %path.display(), "using executable");
		return Some(path.to_path_buf());
	}

	warn!(
		target = "adcycle.locate",
		source,
		path = %path.display(),
		"executable candidate is missing or not runnable; continuing search"
	);
	None
}

fn is_runnable_file(path: &Path) -> bool {
	let Ok(meta) = std::fs::metadata(path) else {
		return false;
	};
	if !meta.is_file() {
		return false;
	}

	#[cfg(unix)]
	{
		use std::os::unix::fs::PermissionsExt;
		meta.permissions().mode() & 0o111 != 0
	}

	#[cfg(not(unix))]
	{
		true
	}
}

/// `platform-tools` directory of the Android SDK, if one is configured.
fn sdk_platform_tools() -> Option<PathBuf> {
	["ANDROID_HOME", "ANDROID_SDK_ROOT"]
		.iter()
		.filter_map(std::env::var_os)
		.map(|root| PathBuf::from(root).join("platform-tools"))
		.find(|dir| dir.is_dir())
}

/// Directory npm installs global binaries into.
fn npm_global_bin() -> Option<PathBuf> {
	let output = Command::new("npm").args(["prefix", "-g"]).output().ok()?;
	if !output.status.success() {
		return None;
	}

	let prefix = String::from_utf8_lossy(&output.stdout).trim().to_string();
	if prefix.is_empty() {
		return None;
	}

	let prefix = PathBuf::from(prefix);
	Some(if cfg!(windows) { prefix } else { prefix.join("bin") })
}
