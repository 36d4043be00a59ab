use std::io::{self, Write};

use adcycle_runtime::{PortAssignment, PortPlan};
use serde::Serialize;

use crate::cli::PortsArgs;
use crate::config::RunConfig;
use crate::error::{CliError, Result};
use crate::output::{OutputFormat, RenderText, ResultBuilder, print_result};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortsData {
	pub plan: PortPlan,
	pub capacity: usize,
	pub assignments: Vec<PortAssignment>,
}

impl PortsData {
	pub fn for_count(plan: PortPlan, count: usize) -> Result<Self> {
		let assignments = plan
			.assign_all(count)
			.map_err(|e| CliError::Config(e.to_string()))?;
		Ok(Self {
			plan,
			capacity: plan.capacity(),
			assignments,
		})
	}
}

impl RenderText for PortsData {
	fn render_text(&self, out: &mut dyn Write) -> io::Result<()> {
		writeln!(out, "ordinal  server  control")?;
		for a in &self.assignments {
			writeln!(out, "{:>7}  {:>6}  {:>7}", a.ordinal, a.server_port, a.control_port)?;
		}
		Ok(())
	}
}

pub fn execute(args: &PortsArgs, mut config: RunConfig, format: OutputFormat) -> Result<()> {
	args.ports.apply(&mut config);
	let data = PortsData::for_count(config.port_plan(), args.count)?;

	let result = ResultBuilder::new("ports").data(data).build();
	print_result(&result, format);
	Ok(())
}
