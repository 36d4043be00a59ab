//! Device discovery diagnostics.

use std::io::{self, Write};

use adcycle_runtime::{
	AdbBridge, DeviceHandle, DeviceRegistry, DeviceScan, PortAssignment, PortPlan, RejectedRow,
	Rejection, Tool, find_executable,
};
use colored::Colorize;
use serde::Serialize;

use crate::cli::DevicesArgs;
use crate::config::RunConfig;
use crate::error::{CliError, Result};
use crate::output::{OutputFormat, RenderText, ResultBuilder, print_result};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedDevice {
	pub device: DeviceHandle,
	#[serde(flatten)]
	pub ports: PortAssignment,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicesData {
	pub devices: Vec<PlannedDevice>,
	pub rejected: Vec<RejectedRow>,
}

impl DevicesData {
	/// Pairs accepted devices with the ports a run would give them.
	pub fn plan(scan: DeviceScan, plan: &PortPlan) -> Result<Self> {
		let assignments = plan
			.assign_all(scan.accepted.len())
			.map_err(|e| CliError::Config(e.to_string()))?;
		let devices = scan
			.accepted
			.into_iter()
			.zip(assignments)
			.map(|(device, ports)| PlannedDevice { device, ports })
			.collect();
		Ok(Self {
			devices,
			rejected: scan.rejected,
		})
	}
}

fn describe(rejection: &Rejection) -> String {
	match rejection {
		Rejection::Malformed => "malformed".into(),
		Rejection::NotConnected { state } => format!("not connected ({state})"),
		Rejection::Virtual => "virtual".into(),
	}
}

impl RenderText for DevicesData {
	fn render_text(&self, out: &mut dyn Write) -> io::Result<()> {
		if self.devices.is_empty() {
			writeln!(out, "{}", "No physical devices connected".yellow())?;
		}
		for d in &self.devices {
			writeln!(
				out,
				"{:>3}  {:<20} server {:<5} control {}",
				d.ports.ordinal,
				d.device.udid().bold(),
				d.ports.server_port,
				d.ports.control_port
			)?;
		}
		if !self.rejected.is_empty() {
			writeln!(out, "\n{}", "Skipped".dimmed())?;
			for row in &self.rejected {
				writeln!(out, "     {:<32} {}", row.line, describe(&row.rejection).dimmed())?;
			}
		}
		Ok(())
	}
}

pub async fn execute(args: &DevicesArgs, mut config: RunConfig, format: OutputFormat) -> Result<()> {
	args.ports.apply(&mut config);
	args.discovery.apply(&mut config);

	let adb = find_executable(Tool::Adb, config.bridge_program.as_deref())?;
	let registry = DeviceRegistry::new(AdbBridge::new(adb), config.virtual_prefix.clone());
	let scan = registry.scan().await?;
	let data = DevicesData::plan(scan, &config.port_plan())?;

	let result = ResultBuilder::new("devices").data(data).build();
	print_result(&result, format);
	Ok(())
}

#[cfg(test)]
mod tests {
	use adcycle_runtime::{DEFAULT_VIRTUAL_PREFIX, scan_device_table};

	use super::*;

	#[test]
	fn accepted_devices_get_planned_ports() {
		let scan = scan_device_table(
			"List of devices attached\nR5CX\tdevice\nemulator-5554\tdevice\n0A1B\tdevice\n",
			DEFAULT_VIRTUAL_PREFIX,
		);
		let data = DevicesData::plan(scan, &PortPlan::default()).unwrap();

		assert_eq!(data.devices.len(), 2);
		assert_eq!(data.devices[1].device.udid(), "0A1B");
		assert_eq!(data.devices[1].ports.server_port, 4725);
		assert_eq!(data.devices[1].ports.control_port, 8201);

		let json = serde_json::to_value(&data).unwrap();
		assert_eq!(json["devices"][0]["serverPort"], 4723);
		assert_eq!(json["rejected"].as_array().unwrap().len(), 2);
	}

	#[test]
	fn text_lists_skipped_rows_with_reason() {
		let scan = scan_device_table("ABC\tunauthorized\n", DEFAULT_VIRTUAL_PREFIX);
		let data = DevicesData::plan(scan, &PortPlan::default()).unwrap();

		let mut out = Vec::new();
		data.render_text(&mut out).unwrap();
		let text = String::from_utf8(out).unwrap();
		assert!(text.contains("No physical devices"));
		assert!(text.contains("not connected (unauthorized)"));
	}
}
