//! autoreload - in-place module hot reloading for interactive sessions.

use anyhow::Result;
use clap::{ColorChoice, Parser};

use autoreload::cli::{self, Cli, Commands};
use autoreload::config::ReloadConfig;
use autoreload::logger::set_verbose;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }

    let config = ReloadConfig::load(&cli)?;
    set_verbose(config.watch.verbose);

    match &cli.command {
        Commands::Repl { import } => cli::repl::run(&config, import),
        Commands::Watch { .. } => cli::watch::run(&config),
        Commands::Graph { json } => cli::graph::run(&config, *json),
    }
}
