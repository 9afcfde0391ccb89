//! Tracing setup: stderr plus a daily rotating log file

use consentlex_core::config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_FILE_PREFIX: &str = "consentlex.log";

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop; keep it alive for
/// the whole run.
pub fn init(config: &LoggingConfig, verbose: bool) -> Option<WorkerGuard> {
    let stderr_default = if verbose {
        "consentlex=debug,consentlex_core=debug,warn"
    } else {
        "warn"
    };
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(verbose)
        .with_line_number(verbose)
        .with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(stderr_default)),
        );

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .build(&config.dir);

    let (file_layer, guard) = match appender {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let filter =
                EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("info"));
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(filter);
            (Some(layer), Some(guard))
        }
        Err(e) => {
            eprintln!(
                "warning: file logging disabled, {} is not writable: {e}",
                config.dir.display()
            );
            (None, None)
        }
    };

    if tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .is_err()
    {
        eprintln!("warning: tracing subscriber already set");
    }
    tracing::debug!(log_dir = %config.dir.display(), "logging initialized");
    guard
}
