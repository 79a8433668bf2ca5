//! Pagemark command-line entry point.

mod cli;
mod commands;

use clap::Parser;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = cli::Cli::parse();
    log::debug!("Running {:?}", cli.command);
    pollster::block_on(commands::run(cli))
}
