mod check;
mod cli;
mod run;

use clap::Parser;
use miette::Result;
use preload_shared::logging::initialize_console_and_file_logging;
use preload_shared::manifest::PreloadManifest;
use tracing::info;

use crate::cli::{CLIArgs, CLICommand};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CLIArgs::parse();

    let _guard = initialize_console_and_file_logging(args.log_file_path.as_deref())?;

    match args.command {
        CLICommand::Run(run_args) => {
            info!("Loading preload manifest.");
            let manifest = PreloadManifest::load_from_file(&run_args.manifest_file_path)?;

            let report = run::run_manifest_to_completion(&manifest, run_args.skip_startup_delay).await;

            if run_args.json {
                println!("{}", report.to_json()?);
            }
        }
        CLICommand::Check(check_args) => {
            let manifest = PreloadManifest::load_from_file(&check_args.manifest_file_path)?;

            let report = check::check_manifest(&manifest);
            report.log();

            report.into_result()?;
        }
    }

    Ok(())
}
