// Logging for Corral
//
// Thin setup layer over the `tracing` ecosystem. Pools never install a
// subscriber on their own; the embedding application picks one of the `init_*`
// functions below, and every pool captures whatever dispatcher is current when
// it is constructed so its workers log through the same subscriber.
//
// # Usage Examples
//
// ```rust
// use corral::logging;
//
// // INFO level, human-readable console output
// logging::init_default();
//
// // Or pick the settings explicitly
// let config = logging::LogConfig {
//     level: tracing::Level::DEBUG,
//     json_format: true,
//     ..Default::default()
// };
// logging::init(config);
// ```
//
// Worker threads enter a `worker` span carrying the pool and worker names, so
// every record emitted by work items is attributed to the thread running it:
//
// ```rust
// let span = corral::pool_span!("io", "p: io; w: 3");
// let _guard = span.enter();
// corral::log_pool!("io", "resized", current = 3);
// ```

use std::io;
use std::sync::Once;
use tracing::{Level, Subscriber};
use tracing_subscriber::{fmt, prelude::*, registry::Registry, EnvFilter, Layer};

/// Configuration for the logging system
///
/// # Examples
///
/// ```rust
/// use corral::logging::LogConfig;
/// use tracing::Level;
///
/// let config = LogConfig {
///     level: Level::DEBUG,
///     target_filters: Some("corral::thread=trace".to_string()),
///     ..Default::default()
/// };
/// assert!(!config.json_format);
/// ```
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: Level,
    /// Whether to use JSON format for logs
    pub json_format: bool,
    /// Whether to include file and line information
    pub show_file_line: bool,
    /// Whether to include thread name/id
    pub show_thread_info: bool,
    /// Whether to include timestamps
    pub show_time: bool,
    /// Target filter expressions (format: "target=level,target2=level2,...")
    pub target_filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_file_line: true,
            show_thread_info: true,
            show_time: true,
            target_filters: None,
        }
    }
}

impl LogConfig {
    /// Builds the filter: `RUST_LOG` first, then the level, then the
    /// per-target directives. Unparseable directives are skipped.
    fn env_filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::from_default_env().add_directive(self.level.into());
        if let Some(filters) = &self.target_filters {
            for directive in filters.split(',').map(str::trim).filter(|d| !d.is_empty()) {
                match directive.parse() {
                    Ok(directive) => filter = filter.add_directive(directive),
                    Err(err) => eprintln!("Ignoring log directive {:?}: {}", directive, err),
                }
            }
        }
        filter
    }

    /// Console formatting layer honoring every display switch.
    fn console_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let layer = fmt::layer()
            .with_ansi(atty::is(atty::Stream::Stdout))
            .with_file(self.show_file_line)
            .with_line_number(self.show_file_line)
            .with_thread_names(self.show_thread_info)
            .with_thread_ids(self.show_thread_info);

        match (self.json_format, self.show_time) {
            (true, true) => layer.json().flatten_event(true).boxed(),
            (true, false) => layer.json().flatten_event(true).without_time().boxed(),
            (false, true) => layer.boxed(),
            (false, false) => layer.without_time().boxed(),
        }
    }
}

// Initialization guard to ensure we only initialize once
static INIT: Once = Once::new();

/// Initialize the logging system with the given configuration
///
/// Safe to call multiple times; only the first call in the process takes
/// effect, and a subscriber installed by someone else is left alone.
pub fn init(config: LogConfig) {
    INIT.call_once(|| {
        let subscriber = tracing_subscriber::registry()
            .with(config.console_layer())
            .with(config.env_filter());
        set_global_subscriber(subscriber);
    });
}

fn set_global_subscriber<S>(subscriber: S)
where
    S: Subscriber + Send + Sync + 'static,
{
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error setting global tracing subscriber: {}", err);
    }
}

/// Opens `path` for appending, creating it if needed.
pub fn file_writer(path: &str) -> io::Result<Box<dyn io::Write + Send + Sync + 'static>> {
    use std::fs::OpenOptions;

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Box::new(file))
}

/// Initialize logging to both the console and `log_file`
///
/// The file is opened up front so a bad path is reported to the caller
/// instead of silently dropping records. File output is always plain text
/// with location and thread information.
///
/// # Errors
/// Returns the I/O error if the log file cannot be opened or created.
pub fn init_with_file(config: LogConfig, log_file: &str) -> Result<(), io::Error> {
    file_writer(log_file)?;

    INIT.call_once(|| {
        let path = log_file.to_string();
        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(move || match file_writer(&path) {
                Ok(writer) => writer,
                Err(_) => Box::new(io::stderr()),
            })
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_thread_ids(true);

        let subscriber = tracing_subscriber::registry()
            .with(config.console_layer())
            .with(file_layer)
            .with(config.env_filter());
        set_global_subscriber(subscriber);
    });

    Ok(())
}

/// INFO level, human-readable console output.
pub fn init_default() {
    init(LogConfig::default());
}

/// Initialize logging optimized for development environments
///
/// - DEBUG level for all Corral modules
/// - TRACE level for `corral::thread`, which logs every idle wakeup
/// - Colorized console output with file/line information
pub fn init_development() {
    init(development_config());
}

fn development_config() -> LogConfig {
    LogConfig {
        level: Level::DEBUG,
        json_format: false,
        show_file_line: true,
        show_thread_info: true,
        show_time: true,
        target_filters: Some("corral=debug,corral::thread=trace".to_string()),
    }
}

/// Initialize logging optimized for production environments
///
/// JSON records without file/line information, INFO level unless `RUST_LOG`
/// says otherwise.
pub fn init_production() {
    init(production_config());
}

fn production_config() -> LogConfig {
    LogConfig {
        level: Level::INFO,
        json_format: true,
        show_file_line: false,
        show_thread_info: true,
        show_time: true,
        target_filters: None,
    }
}

/// Initialize logging for testing
///
/// Only warnings and errors, without thread information or timestamps, to
/// keep test output readable.
pub fn init_test() {
    init(test_config());
}

fn test_config() -> LogConfig {
    LogConfig {
        level: Level::WARN,
        json_format: false,
        show_file_line: true,
        show_thread_info: false,
        show_time: false,
        target_filters: None,
    }
}

/// Span entered by every worker thread for its whole life.
///
/// # Examples
///
/// ```rust
/// let span = corral::pool_span!("io", "p: io; w: 1");
/// let _guard = span.enter();
///
/// let span = corral::pool_span!("io", "p: io; w: 2", stack_kb = 256);
/// ```
#[macro_export]
macro_rules! pool_span {
    ($pool:expr, $worker:expr) => {
        tracing::info_span!("worker", pool = $pool, worker = $worker)
    };
    ($pool:expr, $worker:expr, $($fields:tt)*) => {
        tracing::info_span!("worker", pool = $pool, worker = $worker, $($fields)*)
    };
}

/// Log pool lifecycle events - creation, shutdown and similar state changes
///
/// # Examples
///
/// ```rust
/// corral::log_pool!("io", "created");
/// corral::log_pool!("io", "shut_down", processed = 12u64);
/// ```
#[macro_export]
macro_rules! log_pool {
    ($pool:expr, $event:expr) => {
        tracing::info!(pool = $pool, event = $event);
    };
    ($pool:expr, $event:expr, $($fields:tt)*) => {
        tracing::info!(pool = $pool, event = $event, $($fields)*);
    };
}

/// Log per-worker events at debug level
///
/// # Examples
///
/// ```rust
/// corral::log_worker!("p: io; w: 1", "spawned");
/// corral::log_worker!("p: io; w: 1", "spawn_failed", reason = "EAGAIN");
/// ```
#[macro_export]
macro_rules! log_worker {
    ($worker:expr, $event:expr) => {
        tracing::debug!(worker = $worker, event = $event);
    };
    ($worker:expr, $event:expr, $($fields:tt)*) => {
        tracing::debug!(worker = $worker, event = $event, $($fields)*);
    };
}

/// Log error events - use for all error conditions
///
/// # Examples
///
/// ```rust
/// let error = std::io::Error::new(std::io::ErrorKind::WouldBlock, "no threads left");
/// corral::log_error!(error);
/// corral::log_error!(error, pool = "io", "worker creation failed");
/// ```
#[macro_export]
macro_rules! log_error {
    ($error:expr) => {
        tracing::error!(error = %$error);
    };
    ($error:expr, $($fields:tt)*) => {
        tracing::error!(error = %$error, $($fields)*);
    };
}

/// The dispatcher current on the calling thread.
///
/// Pools capture this at construction and install it in each worker, so work
/// logs through the subscriber the pool's creator was using.
///
/// # Examples
///
/// ```rust
/// use corral::logging;
/// use std::thread;
///
/// let dispatch = logging::current_subscriber();
/// thread::spawn(move || {
///     tracing::dispatcher::with_default(&dispatch, || {
///         tracing::info!("logged through the captured subscriber");
///     });
/// })
/// .join()
/// .unwrap();
/// ```
#[inline]
pub fn current_subscriber() -> tracing::Dispatch {
    tracing::dispatcher::get_default(|d| d.clone())
}

pub use tracing::{debug, error, info, trace, warn};
