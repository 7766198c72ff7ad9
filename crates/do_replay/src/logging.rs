//! Logging system setup.
//!
//! Installs the global `tracing` subscriber that renders the registry's log
//! categories, in human-readable or JSON form.

use do_hierarchy::{LoggingSettings, Severity};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Maps a registry level name onto an `EnvFilter` directive.
///
/// Unknown names fall back to `info`.
pub fn filter_directive(level: &str) -> &'static str {
    match Severity::parse(level) {
        Some(Severity::Error) => "error",
        Some(Severity::Warning) => "warn",
        Some(Severity::Debug) => "debug",
        Some(Severity::Info) | None => "info",
    }
}

/// Initializes the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn setup_logging(
    config: &LoggingSettings,
    json_format: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let directive = filter_directive(&config.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    let registry = tracing_subscriber::registry().with(filter);

    if json_format || config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(false)
                    .with_line_number(false)
                    .with_target(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_file(false)
                    .with_line_number(false)
                    .with_target(true),
            )
            .try_init()?;
    }

    info!("Logging initialized with level: {}", directive);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive() {
        assert_eq!(filter_directive("warning"), "warn");
        assert_eq!(filter_directive("warn"), "warn");
        assert_eq!(filter_directive("ERROR"), "error");
        assert_eq!(filter_directive("debug"), "debug");
        assert_eq!(filter_directive("bogus"), "info");
    }
}
