//! Subscriber setup for the native server

use crate::config::Config;
use crate::{Error, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Output settings read from the `logging` section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive, `RUST_LOG` wins when set
    pub level: String,
    /// One JSON object per line instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggingConfig {
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();
        Self {
            level: config
                .get_str("logging.level")
                .map(str::to_string)
                .unwrap_or(defaults.level),
            json: config.get_bool("logging.json").unwrap_or(defaults.json),
        }
    }

    fn filter(&self) -> Result<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.level)
                .map_err(|e| Error::Config(format!("Invalid log level {:?}: {}", self.level, e))),
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = config.filter()?;
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    let installed = if config.json {
        Registry::default()
            .with(filter)
            .with(fmt_layer.json().with_current_span(false))
            .try_init()
    } else {
        Registry::default().with(filter).with(fmt_layer).try_init()
    };
    installed.map_err(|e| Error::Internal(format!("tracing already initialized: {}", e)))?;

    tracing::debug!(level = %config.level, json = config.json, "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let config = Config::new().with("logging.level", "weave_core=debug").with("logging.json", true);
        let logging = LoggingConfig::from_config(&config);
        assert_eq!(logging.level, "weave_core=debug");
        assert!(logging.json);

        assert_eq!(LoggingConfig::from_config(&Config::new()), LoggingConfig::default());
    }
}
