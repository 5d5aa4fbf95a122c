use std::fs;
use std::io;
use std::path::Path;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mzthresholder::{MZThresholder, MZThresholderError};

#[cfg(feature = "mimalloc")]
use mimalloc::MiMalloc;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn init_logging(log_file: Option<&Path>) -> io::Result<Option<WorkerGuard>> {
    let stderr_layer = fmt::layer()
        .compact()
        .with_timer(fmt::time::ChronoLocal::rfc_3339())
        .with_writer(io::stderr)
        .with_filter(
            EnvFilter::builder()
                .with_default_directive(tracing::Level::INFO.into())
                .from_env_lossy(),
        );

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(fs::File::create(path)?);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_timer(fmt::time::ChronoLocal::rfc_3339())
                .with_writer(writer)
                .with_filter(
                    EnvFilter::builder()
                        .with_default_directive(tracing::Level::DEBUG.into())
                        .from_env_lossy(),
                );
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(guard)
}

fn main() -> Result<(), MZThresholderError> {
    let args = MZThresholder::parse().configured()?;
    let _guard = init_logging(args.log_file.as_deref())?;
    args.main()
}
