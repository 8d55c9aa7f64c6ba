//! Command-line presentation shared by the TCR binaries.

use clap::builder::{
	Styles,
	styling::{AnsiColor, Effects},
};

/// Version string reported by `--version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Terminal styles for help output.
pub fn styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Yellow.on_default() | Effects::BOLD)
		.usage(AnsiColor::Yellow.on_default() | Effects::BOLD)
		.literal(AnsiColor::Cyan.on_default() | Effects::BOLD)
		.placeholder(AnsiColor::Green.on_default())
		.error(AnsiColor::Red.on_default() | Effects::BOLD)
		.valid(AnsiColor::Green.on_default())
		.invalid(AnsiColor::Red.on_default())
}
