use anyhow::Result;
use clap::Parser;

use flowmeter_lib::cli::Cli;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    flowmeter_lib::run(Cli::parse())
}
