// =============================================================================
// Logging bootstrap — console + non-blocking file sinks
// =============================================================================
//
// Console output goes through the standard fmt subscriber. File output goes
// through tracing-appender's lossy non-blocking writer: the decision path
// never blocks on log I/O, and when the bounded queue fills, incoming lines
// are dropped in favour of throughput.
//
// `RUST_LOG` overrides the configured level when set.
// =============================================================================

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Map the config level vocabulary onto tracing directives.
fn level_directive(level: &str) -> &'static str {
    match level {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        // tracing has no level above error; both map onto error.
        "error" | "critical" => "error",
        "off" => "off",
        _ => "info",
    }
}

/// Initialise the global subscriber from the logging section.
///
/// Returns the non-blocking writer guard when file logging is enabled; the
/// caller must hold it for the process lifetime or buffered lines are lost
/// on shutdown.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(&config.level)));

    let console_layer = config
        .enable_console
        .then(|| tracing_subscriber::fmt::layer().with_target(false));

    let (file_layer, guard) = if config.enable_file {
        let path = std::path::Path::new(&config.file_path);
        let directory = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "meridian.log".to_string());

        std::fs::create_dir_all(directory)
            .with_context(|| format!("failed to create log directory {}", directory.display()))?;

        let appender = tracing_appender::rolling::daily(directory, file_name);
        let (writer, guard) = tracing_appender::non_blocking::NonBlockingBuilder::default()
            .lossy(true)
            .finish(appender);

        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("failed to initialise tracing subscriber")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_vocabulary_maps_onto_tracing() {
        assert_eq!(level_directive("trace"), "trace");
        assert_eq!(level_directive("critical"), "error");
        assert_eq!(level_directive("off"), "off");
        assert_eq!(level_directive("unknown"), "info");
    }
}
