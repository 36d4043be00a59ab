mod devices;
mod ports;
mod run;
mod variants;

use crate::cli::{Cli, Commands};
use crate::config::RunConfig;
use crate::error::Result;

pub async fn dispatch(cli: Cli) -> Result<()> {
	let format = cli.format;
	let config = RunConfig::load(cli.config.as_deref())?;

	match cli.command {
		Commands::Run(args) => run::execute(&args, config, format).await,
		Commands::Devices(args) => devices::execute(&args, config, format).await,
		Commands::Ports(args) => ports::execute(&args, config, format),
		Commands::Variants => variants::execute(format),
	}
}

/// Name used in the result envelope.
pub fn command_name(command: &Commands) -> &'static str {
	match command {
		Commands::Run(_) => "run",
		Commands::Devices(_) => "devices",
		Commands::Ports(_) => "ports",
		Commands::Variants => "variants",
	}
}
