use clap::builder::{
	Styles,
	styling::{AnsiColor, Effects},
};
use serde_json::Value;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Cyan.on_default() | Effects::BOLD)
		.usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
		.literal(AnsiColor::Blue.on_default() | Effects::BOLD)
		.placeholder(AnsiColor::Green.on_default())
}

/// Clap value parser for `--metadata '{"k":"v"}'` style arguments.
pub fn json_object(raw: &str) -> Result<Value, String> {
	let value: Value =
		serde_json::from_str(raw).map_err(|err| format!("Invalid JSON metadata: {err}."))?;

	if !value.is_object() {
		return Err("Metadata must be a JSON object.".to_string());
	}

	Ok(value)
}
