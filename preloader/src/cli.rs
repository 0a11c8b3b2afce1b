use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
pub struct CLIArgs {
    #[arg(
        long = "logFilePath",
        global = true,
        help = "Additionally write logs to this file."
    )]
    pub log_file_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CLICommand,
}

#[derive(Subcommand)]
pub enum CLICommand {
    #[command(
        name = "run",
        about = "Preload every thumbnail and video listed in the manifest, one at a time."
    )]
    Run(RunArgs),

    #[command(
        name = "check",
        about = "Validate the manifest and report which listed media exist, without preloading."
    )]
    Check(CheckArgs),
}

#[derive(Args, Eq, PartialEq)]
pub struct RunArgs {
    pub manifest_file_path: PathBuf,

    #[arg(long = "json", help = "Print the final summary to stdout as JSON.")]
    pub json: bool,

    #[arg(
        long = "skipStartupDelay",
        help = "Submit the video batch immediately instead of waiting for startup_delay_ms."
    )]
    pub skip_startup_delay: bool,
}

#[derive(Args, Eq, PartialEq)]
pub struct CheckArgs {
    pub manifest_file_path: PathBuf,
}
