//! Templar - a development server for templ component files.

#![allow(dead_code)]

mod actor;
mod bus;
mod cache;
mod cli;
mod config;
mod core;
mod logger;
mod monitor;
mod pipeline;
mod plugin;
mod registry;
mod reload;
mod scanner;
mod utils;

use std::sync::Arc;

use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::{ConfigError, TemplarConfig, init_config};
use core::{EXIT_BIND, EXIT_CONFIG, EXIT_INTERRUPTED};

fn main() {
    // Setup global Ctrl+C handler (before any blocking operations)
    if let Err(e) = core::setup_shutdown_handler() {
        log!("error"; "{}", e);
        std::process::exit(1);
    }

    let cli: &'static Cli = Box::leak(Box::new(Cli::parse()));

    logger::set_verbose(cli.verbose);

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }

    let config = match TemplarConfig::load(cli) {
        Ok(config) => init_config(config),
        Err(e) => {
            log!("error"; "{}", e);
            std::process::exit(EXIT_CONFIG);
        }
    };

    let result = run(cli, config);

    match result {
        Ok(()) => {
            if core::is_shutdown() {
                std::process::exit(EXIT_INTERRUPTED);
            }
        }
        Err(e) => {
            log!("error"; "{:#}", e);
            std::process::exit(exit_code_for(&e));
        }
    }
}

fn run(cli: &'static Cli, config: Arc<TemplarConfig>) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Init { name } => cli::init::new_project(&config, name.as_deref()),
        Commands::Build => cli::build::build_project(&config),
        Commands::Serve { .. } => cli::serve::serve(config),
    }
}

/// Map error categories onto the documented exit codes.
fn exit_code_for(error: &anyhow::Error) -> i32 {
    if error.downcast_ref::<ConfigError>().is_some()
        || error.downcast_ref::<pipeline::InvalidCommand>().is_some()
    {
        return EXIT_CONFIG;
    }
    if error.downcast_ref::<cli::serve::BindError>().is_some() {
        return EXIT_BIND;
    }
    1
}
