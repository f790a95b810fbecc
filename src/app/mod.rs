//! Command-line front end: flag parsing, runtime wiring and result output.

pub mod data_io;
pub mod push;
pub mod runtime;
pub mod types;

use clap::Parser;

pub use self::types::{Cli, OutputMode};

pub async fn run() -> anyhow::Result<()> {
    runtime::run_cli(Cli::parse()).await
}
