use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Filter directive for a `-v` count, used when `RUST_LOG` is unset.
pub fn default_filter(verbosity: u8) -> &'static str {
	// 0 = progress lines only (info for adcycle crates)
	// 1 (-v) = state transitions and driver traffic
	// 2+ (-vv) = everything, including dependencies
	match verbosity {
		0 => "warn,adcycle=info",
		1 => "warn,adcycle=debug",
		_ => "trace",
	}
}

pub fn init_logging(verbosity: u8) {
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn verbosity_filters_parse() {
		for level in 0..=3 {
			assert!(EnvFilter::try_new(default_filter(level)).is_ok());
		}
		assert_eq!(default_filter(5), "trace");
	}
}
