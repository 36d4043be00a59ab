//! Device discovery through the host device bridge.
//!
//! The bridge prints a table of `<serial>\t<state>` rows. Only rows with
//! exactly two fields whose state is [`CONNECTED_STATE`] are accepted, and
//! serials starting with the virtual-device prefix are dropped. Accepted
//! devices keep the bridge's order, which later determines port ordinals.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// State marker the bridge reports for a usable, authorized device.
pub const CONNECTED_STATE: &str = "device";

/// Serial prefix the bridge gives emulator instances.
pub const DEFAULT_VIRTUAL_PREFIX: &str = "emulator-";

/// Upper bound on a single bridge query.
const QUERY_TIMEOUT: Duration = Duration::from_secs(15);

/// Serial of one physical device (UDID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DeviceHandle(String);

impl DeviceHandle {
	pub fn new(udid: impl Into<String>) -> Self {
		Self(udid.into())
	}

	pub fn udid(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for DeviceHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Source of the raw device table.
#[async_trait]
pub trait DeviceBridge: Send + Sync {
	/// Returns the bridge's device listing verbatim.
	async fn list_raw(&self) -> Result<String>;
}

/// [`DeviceBridge`] backed by `adb devices`.
#[derive(Debug, Clone)]
pub struct AdbBridge {
	program: PathBuf,
}

impl AdbBridge {
	pub fn new(program: impl Into<PathBuf>) -> Self {
		Self {
			program: program.into(),
		}
	}
}

#[async_trait]
impl DeviceBridge for AdbBridge {
	async fn list_raw(&self) -> Result<String> {
		let mut cmd = Command::new(&self.program);
		cmd.arg("devices").kill_on_drop(true);

		let output = tokio::time::timeout(QUERY_TIMEOUT, cmd.output())
			.await
			.map_err(|_| {
				Error::Discovery(format!(
					"{} devices did not answer within {}s",
					self.program.display(),
					QUERY_TIMEOUT.as_secs()
				))
			})?
			.map_err(|e| Error::Discovery(format!("failed to run {}: {e}", self.program.display())))?;

		if !output.status.success() {
			let stderr = String::from_utf8_lossy(&output.stderr);
			return Err(Error::Discovery(format!(
				"{} devices exited with {}: {}",
				self.program.display(),
				output.status,
				stderr.trim()
			)));
		}

		Ok(String::from_utf8_lossy(&output.stdout).into_owned())
	}
}

/// Why a bridge row was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
	/// Row does not have the two-field `<serial> <state>` shape.
	Malformed,
	/// Device is present but not in the connected state (offline, unauthorized).
	NotConnected { state: String },
	/// Serial matches the virtual-device prefix.
	Virtual,
}

/// A bridge row that was filtered out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRow {
	pub line: String,
	#[serde(flatten)]
	pub rejection: Rejection,
}

/// Full classification of one bridge listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceScan {
	pub accepted: Vec<DeviceHandle>,
	pub rejected: Vec<RejectedRow>,
}

/// Classifies every non-empty row of a bridge listing.
pub fn scan_device_table(raw: &str, virtual_prefix: &str) -> DeviceScan {
	let mut scan = DeviceScan::default();

	for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
		let fields: Vec<&str> = line.split_whitespace().collect();
		let rejection = match fields.as_slice() {
			[serial, state] if *state == CONNECTED_STATE => {
				if !virtual_prefix.is_empty() && serial.starts_with(virtual_prefix) {
					Rejection::Virtual
				} else {
					scan.accepted.push(DeviceHandle::new(*serial));
					continue;
				}
			}
			[_, state] => Rejection::NotConnected {
				state: (*state).to_string(),
			},
			_ => Rejection::Malformed,
		};

		scan.rejected.push(RejectedRow {
			line: line.to_string(),
			rejection,
		});
	}

	scan
}

/// Enumerates attached physical devices.
pub struct DeviceRegistry<B> {
	bridge: B,
	virtual_prefix: String,
}

impl<B: DeviceBridge> DeviceRegistry<B> {
	pub fn new(bridge: B, virtual_prefix: impl Into<String>) -> Self {
		Self {
			bridge,
			virtual_prefix: virtual_prefix.into(),
		}
	}

	/// Queries the bridge and classifies every row.
	///
	/// # Errors
	///
	/// Returns [`Error::Discovery`] when the bridge cannot be queried.
	pub async fn scan(&self) -> Result<DeviceScan> {
		let raw = self.bridge.list_raw().await?;
		let scan = scan_device_table(&raw, &self.virtual_prefix);
		for row in &scan.rejected {
			debug!(target = "adcycle.registry", line = %row.line, rejection = ?row.rejection, "skipping bridge row");
		}
		Ok(scan)
	}

	/// Physical, connected devices in bridge order. Empty is not an error.
	///
	/// # Errors
	///
	/// Returns [`Error::Discovery`] when the bridge cannot be queried.
	pub async fn list_devices(&self) -> Result<Vec<DeviceHandle>> {
		Ok(self.scan().await?.accepted)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct StaticBridge(std::result::Result<&'static str, &'static str>);

	#[async_trait]
	impl DeviceBridge for StaticBridge {
		async fn list_raw(&self) -> Result<String> {
			self.0
				.map(str::to_string)
				.map_err(|msg| Error::Discovery(msg.to_string()))
		}
	}

	const MIXED_TABLE: &str = "List of devices attached\n\
		R5CXC0CHHWY\tdevice\n\
		emulator-5554\tdevice\n\
		this line is garbage\n\
		0A1B2C3D\tdevice\n\
		\n";

	#[tokio::test]
	async fn test_list_devices_keeps_real_devices_in_order() {
		let registry = DeviceRegistry::new(StaticBridge(Ok(MIXED_TABLE)), DEFAULT_VIRTUAL_PREFIX);
		let devices = registry.list_devices().await.unwrap();
		assert_eq!(
			devices,
			vec![DeviceHandle::new("R5CXC0CHHWY"), DeviceHandle::new("0A1B2C3D")]
		);
	}

	#[test]
	fn test_scan_reports_rejection_reasons() {
		let raw = "List of devices attached\nABC\tunauthorized\nemulator-5556\tdevice\nXYZ\toffline extra\n";
		let scan = scan_device_table(raw, DEFAULT_VIRTUAL_PREFIX);

		assert!(scan.accepted.is_empty());
		let reasons: Vec<_> = scan.rejected.iter().map(|r| r.rejection.clone()).collect();
		assert_eq!(
			reasons,
			vec![
				Rejection::Malformed,
				Rejection::NotConnected {
					state: "unauthorized".into()
				},
				Rejection::Virtual,
				Rejection::Malformed,
			]
		);
	}

	#[test]
	fn test_empty_prefix_disables_virtual_filter() {
		let scan = scan_device_table("emulator-5554\tdevice\n", "");
		assert_eq!(scan.accepted, vec![DeviceHandle::new("emulator-5554")]);
	}

	#[tokio::test]
	async fn test_no_devices_is_not_an_error() {
		let registry = DeviceRegistry::new(
			StaticBridge(Ok("List of devices attached\n\n")),
			DEFAULT_VIRTUAL_PREFIX,
		);
		assert!(registry.list_devices().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_unreachable_bridge_is_discovery_error() {
		let registry = DeviceRegistry::new(StaticBridge(Err("adb server down")), DEFAULT_VIRTUAL_PREFIX);
		let err = registry.list_devices().await.unwrap_err();
		assert!(matches!(err, Error::Discovery(_)));
	}

	#[test]
	fn test_rejected_row_serializes_flat() {
		let row = RejectedRow {
			line: "ABC offline".into(),
			rejection: Rejection::NotConnected {
				state: "offline".into(),
			},
		};
		let json = serde_json::to_value(&row).unwrap();
		assert_eq!(json["reason"], "not_connected");
		assert_eq!(json["state"], "offline");
		assert_eq!(json["line"], "ABC offline");
	}
}
