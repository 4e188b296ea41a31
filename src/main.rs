mod app;
mod cli;
mod commands;
mod config;
mod device;
mod diagnostics;
mod display;
mod emulator;
mod presets;
mod render;
mod settings;
mod theme;
mod timezone;

use anyhow::Result;
use clap::Parser;
use log::debug;

use crate::cli::Cli;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    debug!("parsed command line: {cli:?}");
    commands::execute(cli)
}
