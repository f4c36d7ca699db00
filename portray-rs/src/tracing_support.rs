//! Tracing and logging setup for the `portray` binary.
//!
//! Library crates only emit events through `tracing` macros; installing a
//! subscriber is left to the binary. Logs go to stderr so command output on
//! stdout stays machine-readable.

#[cfg(feature = "tracing")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum TracingFormat {
    /// Multi-line, colored.
    #[default]
    Pretty,

    /// One line per event.
    Compact,

    /// One JSON object per event.
    Json,
}

/// Subscriber configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Filter directive such as `debug` or `portray_guard=trace`.
    ///
    /// If None, uses `RUST_LOG` or defaults to "info".
    pub filter: Option<String>,

    pub format: TracingFormat,

    /// Include timestamps in output.
    pub timestamps: bool,

    /// Include target module names in output.
    pub target: bool,

    pub thread_ids: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: None,
            format: TracingFormat::Pretty,
            timestamps: true,
            target: true,
            thread_ids: false,
        }
    }
}

impl TracingConfig {
    /// Config for a `-v` count: 0 keeps the default filter, 1 is debug,
    /// anything above is trace.
    pub fn from_verbosity(verbose: u8, format: TracingFormat) -> Self {
        let filter = match verbose {
            0 => None,
            1 => Some("debug".to_string()),
            _ => Some("trace".to_string()),
        };
        Self {
            filter,
            format,
            ..Self::default()
        }
    }

    #[cfg(feature = "tracing")]
    fn env_filter(&self) -> EnvFilter {
        match &self.filter {
            Some(directive) => EnvFilter::new(directive),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        }
    }
}

/// Initialize the subscriber with default settings.
///
/// # Environment Variables
///
/// - `RUST_LOG=debug` - Enable debug logs
/// - `RUST_LOG=portray_guard=trace` - Per-crate filtering
#[cfg(feature = "tracing")]
pub fn init_subscriber() {
    init_subscriber_with_config(TracingConfig::default());
}

/// Initialize the subscriber with a custom configuration.
///
/// A subscriber that is already installed is left in place.
///
/// ```ignore
/// use portray::tracing_support::{init_subscriber_with_config, TracingConfig, TracingFormat};
///
/// init_subscriber_with_config(TracingConfig {
///     format: TracingFormat::Json,
///     ..Default::default()
/// });
/// ```
#[cfg(feature = "tracing")]
pub fn init_subscriber_with_config(config: TracingConfig) {
    let fmt = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.target)
        .with_thread_ids(config.thread_ids);

    let layer = match (config.format, config.timestamps) {
        (TracingFormat::Pretty, true) => fmt.pretty().boxed(),
        (TracingFormat::Pretty, false) => fmt.pretty().without_time().boxed(),
        (TracingFormat::Compact, true) => fmt.compact().boxed(),
        (TracingFormat::Compact, false) => fmt.compact().without_time().boxed(),
        (TracingFormat::Json, true) => fmt.json().boxed(),
        (TracingFormat::Json, false) => fmt.json().without_time().boxed(),
    };

    let _ = tracing_subscriber::registry()
        .with(layer)
        .with(config.env_filter())
        .try_init();
}

// Fallbacks when the tracing feature is disabled
#[cfg(not(feature = "tracing"))]
pub fn init_subscriber() {}

#[cfg(not(feature = "tracing"))]
pub fn init_subscriber_with_config(_config: TracingConfig) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.format, TracingFormat::Pretty);
        assert!(config.filter.is_none());
        assert!(config.timestamps);
        assert!(!config.thread_ids);
    }

    #[test]
    fn test_from_verbosity() {
        assert!(TracingConfig::from_verbosity(0, TracingFormat::Json)
            .filter
            .is_none());
        assert_eq!(
            TracingConfig::from_verbosity(1, TracingFormat::Json).filter.as_deref(),
            Some("debug")
        );
        let config = TracingConfig::from_verbosity(4, TracingFormat::Compact);
        assert_eq!(config.filter.as_deref(), Some("trace"));
        assert_eq!(config.format, TracingFormat::Compact);
    }

    #[test]
    #[cfg(feature = "tracing")]
    fn test_init_twice_is_harmless() {
        init_subscriber();
        init_subscriber_with_config(TracingConfig::from_verbosity(2, TracingFormat::Json));
    }
}
