use std::process;

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::error;

use rusbit::cli::Cli;
use rusbit::config::Config;
use rusbit::engine::use_command;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();

	let level = if cli.verbose { "debug" } else { "warn" };
	env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

	match run(cli).await {
		Ok(output) => {
			if !output.is_empty() {
				println!("{}", output);
			}
		}
		Err(err) => {
			error!("{:?}", err);
			eprintln!("Error: {:#}", err);
			process::exit(1);
		}
	}
}

async fn run(cli: Cli) -> Result<String> {
	let config = match &cli.config {
		Some(path) => Config::from_path(path)?,
		None => Config::load()?,
	};
	use_command(cli.command, &config).await
}
