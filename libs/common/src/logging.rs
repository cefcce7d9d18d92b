//! Logging setup shared by the PLC binaries
//!
//! Console output uses a bracketed level format, optionally mirrored into a
//! daily rolling file through `tracing-appender`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Environment variable overriding the log directory
pub const LOG_DIR_ENV: &str = "PLC_LOG_DIR";

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

fn level_color(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "\x1b[35m", // magenta
        Level::DEBUG => "\x1b[34m", // blue
        Level::INFO => "\x1b[32m",  // green
        Level::WARN => "\x1b[33m",  // yellow
        Level::ERROR => "\x1b[31m", // red
    }
}

/// Event formatter writing `timestamp [LEVEL] message`
///
/// Example output: `2025-12-02T00:50:44.809123Z [INFO] [POOL] plc1 created connection`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            write!(writer, "{}{}\x1b[0m ", level_color(&level), format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Prefix of the log file name (e.g. "plcctl")
    pub service_name: String,
    /// Default filter when `RUST_LOG` is not set
    pub level: Level,
    /// Colored console output
    pub ansi: bool,
    /// Directory for the daily file; `None` logs to the console only
    pub log_dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "plc".to_string(),
            level: Level::INFO,
            ansi: true,
            log_dir: std::env::var(LOG_DIR_ENV).ok().map(PathBuf::from),
        }
    }
}

impl LogConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Filter directive used when `RUST_LOG` is absent
    pub fn default_filter(&self) -> String {
        self.level.to_string().to_lowercase()
    }

    fn env_filter(&self) -> EnvFilter {
        match std::env::var("RUST_LOG") {
            Ok(directives) => EnvFilter::new(directives),
            Err(_) => EnvFilter::new(self.default_filter()),
        }
    }
}

/// Install the global subscriber
///
/// Returns the guard of the file writer when a log directory is configured;
/// keep it alive for as long as file output is wanted. Installing twice is
/// reported on stderr and otherwise ignored.
pub fn init_logging(config: &LogConfig) -> Option<WorkerGuard> {
    let console_layer = fmt::layer()
        .with_ansi(config.ansi)
        .event_format(BracketedLevelFormat)
        .boxed();

    let file_writer = config
        .log_dir
        .as_deref()
        .map(|dir| open_file_writer(config, dir));
    let (file_layer, guard) = match file_writer {
        Some(Ok((writer, guard))) => {
            let layer = fmt::layer()
                .with_ansi(false)
                .event_format(BracketedLevelFormat)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        },
        Some(Err(e)) => {
            eprintln!("Warning: file logging disabled: {}", e);
            (None, None)
        },
        None => (None, None),
    };

    let result = tracing_subscriber::registry()
        .with(config.env_filter())
        .with(console_layer)
        .with(file_layer)
        .try_init();
    if let Err(e) = result {
        eprintln!("Warning: logging already initialized: {}", e);
    }
    guard
}

fn open_file_writer(
    config: &LogConfig,
    dir: &Path,
) -> std::io::Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::daily(dir, format!("{}.log", config.service_name));
    Ok(tracing_appender::non_blocking(appender))
}
