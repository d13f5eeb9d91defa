//! Log output for the forwarder. Everything goes to stderr; stdout carries
//! only the addresses and the startup report.

use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_JSON_VAR: &str = "FORWARDER_LOG_JSON";
const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// `1`, `true` or `json` select JSON lines.
    pub fn from_setting(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("1") | Some("true") | Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Install the global subscriber with a `RUST_LOG` filter. Returns the
/// format chosen from `FORWARDER_LOG_JSON`.
pub fn init_logging() -> LogFormat {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let format = LogFormat::from_setting(std::env::var(LOG_JSON_VAR).ok().as_deref());

    let builder = fmt::Subscriber::builder().with_env_filter(filter).with_writer(std::io::stderr);
    let _ = match format {
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
        LogFormat::Text => builder.with_target(false).compact().try_init(),
    };
    format
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_needs_an_explicit_setting() {
        assert_eq!(LogFormat::from_setting(None), LogFormat::Text);
        assert_eq!(LogFormat::from_setting(Some("0")), LogFormat::Text);
        assert_eq!(LogFormat::from_setting(Some("1")), LogFormat::Json);
        assert_eq!(LogFormat::from_setting(Some(" json ")), LogFormat::Json);
    }
}
