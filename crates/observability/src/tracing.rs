//! Tracing/logging initialization.
//!
//! Logs always go to stderr so that binaries can keep stdout for their own output.
//! Filtering follows `RUST_LOG` (default `info`); the format follows
//! `STOCK_LEDGER_LOG_FORMAT` (`json` by default, or `pretty`).

use tracing_subscriber::EnvFilter;

pub const LOG_FORMAT_VAR: &str = "STOCK_LEDGER_LOG_FORMAT";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl LogFormat {
    /// Read the format from the environment; unknown values fall back to JSON.
    pub fn from_env() -> Self {
        std::env::var(LOG_FORMAT_VAR)
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }
}

impl core::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Initialize tracing/logging for the process from the environment.
pub fn init() {
    init_with(LogFormat::from_env(), "info");
}

/// Initialize with an explicit format and a fallback filter used when `RUST_LOG` is unset.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_with(format: LogFormat, default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let _ = match format {
        LogFormat::Json => builder
            .json()
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
}
