use std::str::FromStr;

use tracing::metadata::LevelFilter;

/// Environment variable that overrides the configured log level.
pub const LOG_ENV: &str = "SPF_TRAIL_LOG";

/// Picks the effective level: environment first, then `configured`.
/// Unparseable values fall back to `warn`.
pub fn level(configured: &str) -> LevelFilter {
    let requested = std::env::var(LOG_ENV).unwrap_or_else(|_| configured.to_string());
    LevelFilter::from_str(requested.trim()).unwrap_or_else(|_| {
        eprintln!("Invalid log level specified {requested}, defaulting to {}", LevelFilter::WARN);
        LevelFilter::WARN
    })
}

/// Installs the stderr subscriber. Stdout is left to the report.
pub fn init(level: LevelFilter) {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_configured_level() {
        if std::env::var(LOG_ENV).is_err() {
            assert_eq!(level("debug"), LevelFilter::DEBUG);
            assert_eq!(level("nonsense"), LevelFilter::WARN);
        }
    }
}
