use std::io::{self, Write};

use adcycle::{LoopVariant, VariantKind};
use colored::Colorize;
use serde::Serialize;

use crate::error::Result;
use crate::output::{OutputFormat, RenderText, ResultBuilder, print_result};

#[derive(Debug, Serialize)]
pub struct VariantsData {
	pub variants: Vec<LoopVariant>,
}

impl VariantsData {
	pub fn presets() -> Self {
		Self {
			variants: VariantKind::ALL.iter().map(|kind| kind.preset()).collect(),
		}
	}
}

impl RenderText for VariantsData {
	fn render_text(&self, out: &mut dyn Write) -> io::Result<()> {
		for variant in &self.variants {
			writeln!(out, "{}", variant.name.bold())?;
			let json = serde_json::to_string_pretty(variant).map_err(io::Error::other)?;
			writeln!(out, "{json}\n")?;
		}
		Ok(())
	}
}

pub fn execute(format: OutputFormat) -> Result<()> {
	let result = ResultBuilder::new("variants")
		.data(VariantsData::presets())
		.build();
	print_result(&result, format);
	Ok(())
}
