use std::path::Path;

use miette::Result;
use miette::{miette, Context, IntoDiagnostic};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_DIRECTIVE: &str = "info";

fn split_log_file_path(log_file_path: &Path) -> Result<(&Path, String)> {
    let directory = log_file_path
        .parent()
        .ok_or_else(|| miette!("Could not parse --logFilePath's parent directory path."))?;

    let file_name = log_file_path
        .file_name()
        .ok_or_else(|| miette!("Could not parse --logFilePath's file name."))?
        .to_string_lossy()
        .to_string();

    Ok((directory, file_name))
}

fn env_filter_or_default() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE))
}

/// Initialize console logging and, if `log_file_path` is `Some`, an additional
/// non-blocking file log without ANSI colours.
///
/// **Keep the returned `Option<WorkerGuard>` alive for as long as you log, dropping it
/// stops flushing to the file.**
pub fn initialize_console_and_file_logging(
    log_file_path: Option<&Path>,
) -> Result<Option<WorkerGuard>> {
    let (file_writer, guard) = match log_file_path {
        Some(path) => {
            let (directory, file_name) = split_log_file_path(path)?;

            let (non_blocking_appender, guard) = tracing_appender::non_blocking(
                tracing_appender::rolling::never(directory, file_name),
            );

            (Some(non_blocking_appender), Some(guard))
        }
        None => (None, None),
    };


    let console_subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter_or_default())
        .finish();

    let file_layer = file_writer.map(|writer| {
        tracing_subscriber::fmt::Layer::default()
            .with_ansi(false)
            .with_writer(writer)
    });

    tracing::subscriber::set_global_default(console_subscriber.with(file_layer))
        .into_diagnostic()
        .wrap_err_with(|| miette!("Failed to set up logging."))?;


    Ok(guard)
}
