//! Tracing subscriber setup for the gateway
//!
//! The gateway logs through `tracing`. Per-message flow is `debug!`, so a
//! production gateway usually runs at `info` with the transaction layer
//! raised when chasing a call agent problem:
//!
//! ```rust,no_run
//! use rvoip_media_gateway::logging::{setup_logging, LogFormat, LoggingConfig};
//!
//! let config = LoggingConfig::default()
//!     .with_format(LogFormat::Json)
//!     .with_directive("rvoip_media_gateway::transaction=trace");
//! setup_logging(config).unwrap();
//! ```

use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::errors::{GatewayError, Result};

/// Output format of the subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    /// One JSON object per line on stdout
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level for every target (`error` .. `trace`)
    pub level: String,
    /// Extra `target=level` directives, applied after `level`
    pub directives: Vec<String>,
    pub format: LogFormat,
    /// Log span open/close, useful with per-transaction spans
    pub log_spans: bool,
    /// Let `RUST_LOG` override the configured directives
    pub honor_env: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directives: Vec::new(),
            format: LogFormat::Pretty,
            log_spans: false,
            honor_env: true,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_spans(mut self) -> Self {
        self.log_spans = true;
        self
    }

    /// Build the filter: level, then directives, then `RUST_LOG` when honoured
    pub fn filter(&self) -> Result<EnvFilter> {
        let mut filter = EnvFilter::try_new(&self.level)
            .map_err(|e| GatewayError::config(format!("invalid log level {:?}: {}", self.level, e)))?;
        for directive in &self.directives {
            let parsed = directive
                .parse::<Directive>()
                .map_err(|e| GatewayError::config(format!("invalid log directive {:?}: {}", directive, e)))?;
            filter = filter.add_directive(parsed);
        }
        if self.honor_env {
            if let Ok(env) = std::env::var(EnvFilter::DEFAULT_ENV) {
                for directive in env.split(',').map(str::trim).filter(|d| !d.is_empty()) {
                    match directive.parse::<Directive>() {
                        Ok(parsed) => filter = filter.add_directive(parsed),
                        Err(e) => eprintln!("ignoring RUST_LOG directive {:?}: {}", directive, e),
                    }
                }
            }
        }
        Ok(filter)
    }
}

/// Install the global subscriber
///
/// Fails when the configuration does not parse or a subscriber is already
/// installed.
pub fn setup_logging(config: LoggingConfig) -> Result<()> {
    let span_events = if config.log_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let builder = fmt::Subscriber::builder()
        .with_env_filter(config.filter()?)
        .with_span_events(span_events)
        .with_target(true);

    let installed = match config.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.with_writer(std::io::stdout).json().try_init(),
    };
    installed.map_err(|e| GatewayError::config(format!("logging already initialized: {}", e)))?;

    tracing::info!("rvoip-media-gateway v{} logging at {}", env!("CARGO_PKG_VERSION"), config.level);
    Ok(())
}
