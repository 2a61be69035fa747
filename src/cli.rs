use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "aoi-tracker",
    version,
    about = "Incremental ingestion of AOI inspection screenshots and CSV results"
)]
pub struct Cli {
    /// Also append every log line to this file.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Ingest(IngestArgs),
    Status(StatusArgs),
    Init(InitArgs),
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    #[arg(long, default_value = ".cache/aoi-tracker")]
    pub data_root: PathBuf,

    #[arg(long)]
    pub settings_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub skip_screenshots: bool,

    #[arg(long, default_value_t = false)]
    pub skip_csv: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/aoi-tracker")]
    pub data_root: PathBuf,

    #[arg(long)]
    pub settings_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct InitArgs {
    #[arg(long, default_value = ".cache/aoi-tracker")]
    pub data_root: PathBuf,

    #[arg(long)]
    pub settings_path: Option<PathBuf>,

    /// Overwrite an existing settings file with defaults.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}
