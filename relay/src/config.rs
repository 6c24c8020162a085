use jira_gateway::config::{Config as GatewayConfig, ValidationError};
use serde::Deserialize;
use std::fmt::Write as _;
use std::fs::File;
use std::path::Path;

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `jira_gateway=debug,info`
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    pub sentry_dsn: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: LogFormat::default(),
            sentry_dsn: None,
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    #[serde(flatten)]
    pub gateway: GatewayConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    /// Loads the config file if one is given, otherwise builds the config from
    /// the environment alone. Environment values win over file values.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, |name| std::env::var(name).ok())
    }

    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => {
                let mut config = Self::from_file(path)?;
                config.gateway.apply_overrides(&lookup)?;
                config
            }
            None => Config {
                common: CommonConfig::default(),
                gateway: GatewayConfig::from_lookup(&lookup)?,
            },
        };
        config.common.apply_overrides(&lookup)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gateway.validate()?;
        if self.common.logging.level.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "LOG_LEVEL",
                value: self.common.logging.level.clone(),
            });
        }
        Ok(())
    }

    /// Human-readable summary without credentials.
    pub fn summary(&self) -> String {
        let gateway = &self.gateway;
        let mut out = String::new();
        let _ = writeln!(out, "listener: {}:{}", gateway.listener.host, gateway.listener.port);
        let _ = writeln!(out, "upstream.base_url: {}", gateway.upstream.base_url);
        let _ = writeln!(out, "upstream.email: {}", gateway.upstream.email);
        let _ = writeln!(out, "upstream.api_token: <redacted>");
        let _ = writeln!(
            out,
            "upstream.timeouts: connect={}s read={}s",
            gateway.upstream.connect_timeout_secs, gateway.upstream.read_timeout_secs
        );
        let _ = writeln!(
            out,
            "retry: max_attempts={} backoff={}s",
            gateway.retry.max_attempts, gateway.retry.backoff_secs
        );
        let _ = writeln!(
            out,
            "cache: enabled={} ttl={}s max_capacity={}",
            gateway.cache.enabled, gateway.cache.ttl_secs, gateway.cache.max_capacity
        );
        let _ = writeln!(
            out,
            "logging: level={} format={:?} sentry={}",
            self.common.logging.level,
            self.common.logging.format,
            if self.common.logging.sentry_dsn.is_some() { "enabled" } else { "disabled" }
        );
        match &self.common.metrics {
            Some(m) => {
                let _ = writeln!(out, "metrics: statsd {}:{}", m.statsd_host, m.statsd_port);
            }
            None => {
                let _ = writeln!(out, "metrics: disabled");
            }
        }
        out
    }
}

impl CommonConfig {
    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(level) = var("LOG_LEVEL") {
            self.logging.level = level.trim().to_lowercase();
        }
        if let Some(format) = var("LOG_FORMAT") {
            self.logging.format = match format.trim().to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" => LogFormat::Text,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: "LOG_FORMAT",
                        value: format,
                    });
                }
            };
        }
        if let Some(dsn) = var("SENTRY_DSN") {
            self.logging.sentry_dsn = Some(dsn);
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    ValidationError(#[from] ValidationError),
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}
