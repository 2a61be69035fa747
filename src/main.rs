mod cancel;
mod classify;
mod cli;
mod commands;
mod model;
mod settings;
mod store;
mod tracker;
mod util;

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use crate::cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    if let Err(err) = init_tracing(cli.log_file.as_deref()) {
        eprintln!("failed to initialise logging: {err:#}");
        std::process::exit(1);
    }

    if let Err(err) = run(cli) {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Ingest(args) => commands::ingest::run(args),
        Commands::Status(args) => commands::status::run(args),
        Commands::Init(args) => commands::init::run(args),
    }
}

fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(log_path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
        return Ok(());
    };

    if let Some(parent) = log_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        util::ensure_directory(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr.and(Mutex::new(file)))
        .init();
    Ok(())
}
