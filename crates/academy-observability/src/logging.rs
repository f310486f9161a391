use academy_config::{LogConfig, LogFormat};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber.
///
/// - **Filter**: `RUST_LOG` when set, otherwise `LOG_LEVEL` for our crates with
///   `sqlx` held at warn
/// - **Console**: compact human output, or JSON lines when `LOG_FORMAT=json`
/// - **File**: daily rolling JSON file `academy.json` under `LOG_DIR`, if set
///
/// Keep the returned guard alive for the life of the process, otherwise
/// buffered file output is lost. Calling this twice leaves the first
/// subscriber in place.
pub fn init_tracing(config: &LogConfig) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "academy={level},academy_core={level},academy_db={level},sqlx=warn",
            level = config.level
        ))
    });

    let (pretty_layer, json_layer) = match config.format {
        LogFormat::Pretty => (
            Some(
                fmt::layer()
                    .compact()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_writer(std::io::stderr),
            ),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            ),
        ),
    };

    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, "academy.json");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(pretty_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init();

    if installed.is_err() {
        eprintln!("tracing subscriber already installed, keeping the existing one");
    }

    guard
}
