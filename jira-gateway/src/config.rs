use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Missing required settings: {}", .0.join(", "))]
    MissingSettings(Vec<&'static str>),

    #[error("Upstream base URL must use http or https: {0}")]
    UnsupportedScheme(String),

    #[error("{0} must be greater than 0")]
    NonPositiveTimeout(&'static str),

    #[error("{0} is too large")]
    DurationOutOfRange(&'static str),

    #[error("RETRY_MAX_ATTEMPTS must be between 1 and 8, got {0}")]
    InvalidMaxAttempts(u32),

    #[error("RETRY_BACKOFF_SECONDS must be a finite number >= 0, got {0}")]
    InvalidBackoff(f64),

    #[error("CACHE_TTL_SECONDS must be between 120 and 300, got {0}")]
    InvalidCacheTtl(u64),

    #[error("Cache capacity cannot be 0")]
    InvalidCacheCapacity,

    #[error("Invalid value for {name}: {value:?}")]
    InvalidVariable { name: &'static str, value: String },
}

/// Gateway configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for incoming requests
    #[serde(default)]
    pub listener: Listener,
    /// Jira connection settings
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Config {
    /// Builds the configuration from environment variables only.
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from a variable lookup, starting from defaults.
    /// Missing required variables are reported together.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = non_empty(lookup("JIRA_BASE_URL"));
        let email = non_empty(lookup("JIRA_EMAIL"));
        let api_token = non_empty(lookup("JIRA_API_TOKEN"));

        let mut missing = Vec::new();
        if base_url.is_none() {
            missing.push("JIRA_BASE_URL");
        }
        if email.is_none() {
            missing.push("JIRA_EMAIL");
        }
        if api_token.is_none() {
            missing.push("JIRA_API_TOKEN");
        }

        let (Some(base_url), Some(email), Some(api_token)) = (base_url, email, api_token) else {
            return Err(ValidationError::MissingSettings(missing));
        };

        let mut config = Config {
            listener: Listener::default(),
            upstream: UpstreamConfig {
                base_url: parse_url(&base_url)?,
                email,
                api_token,
                connect_timeout_secs: default_connect_timeout(),
                read_timeout_secs: default_read_timeout(),
            },
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
        };
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    /// Applies environment variable overrides on top of file-based values.
    pub fn apply_env_overrides(&mut self) -> Result<(), ValidationError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| non_empty(lookup(name));

        if let Some(host) = var("LISTEN_HOST") {
            self.listener.host = host;
        }
        if let Some(port) = var("LISTEN_PORT") {
            self.listener.port = parse_var("LISTEN_PORT", &port)?;
        }
        if let Some(url) = var("JIRA_BASE_URL") {
            self.upstream.base_url = parse_url(&url)?;
        }
        if let Some(email) = var("JIRA_EMAIL") {
            self.upstream.email = email;
        }
        if let Some(token) = var("JIRA_API_TOKEN") {
            self.upstream.api_token = token;
        }
        if let Some(secs) = var("REQUEST_CONNECT_TIMEOUT_SECONDS") {
            self.upstream.connect_timeout_secs = parse_var("REQUEST_CONNECT_TIMEOUT_SECONDS", &secs)?;
        }
        if let Some(secs) = var("REQUEST_READ_TIMEOUT_SECONDS") {
            self.upstream.read_timeout_secs = parse_var("REQUEST_READ_TIMEOUT_SECONDS", &secs)?;
        }
        if let Some(attempts) = var("RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_var("RETRY_MAX_ATTEMPTS", &attempts)?;
        }
        if let Some(secs) = var("RETRY_BACKOFF_SECONDS") {
            self.retry.backoff_secs = parse_var("RETRY_BACKOFF_SECONDS", &secs)?;
        }
        if let Some(enabled) = var("ENABLE_RESPONSE_CACHE") {
            // Anything but "true" disables the cache.
            self.cache.enabled = enabled.trim().eq_ignore_ascii_case("true");
        }
        if let Some(ttl) = var("CACHE_TTL_SECONDS") {
            self.cache.ttl_secs = parse_var("CACHE_TTL_SECONDS", &ttl)?;
        }
        Ok(())
    }

    /// Validates the gateway configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.upstream.validate()?;
        self.retry.validate()?;
        self.cache.validate()?;
        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 8000,
        }
    }
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Jira connection settings
#[derive(Clone, Deserialize, PartialEq)]
pub struct UpstreamConfig {
    /// Site URL, e.g. `https://example.atlassian.net`
    pub base_url: Url,
    /// Account email used for basic auth
    #[serde(default)]
    pub email: String,
    /// API token used for basic auth
    #[serde(default)]
    pub api_token: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: f64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: f64,
}

impl UpstreamConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !matches!(self.base_url.scheme(), "http" | "https") {
            return Err(ValidationError::UnsupportedScheme(self.base_url.to_string()));
        }

        let mut missing = Vec::new();
        if self.email.trim().is_empty() {
            missing.push("JIRA_EMAIL");
        }
        if self.api_token.trim().is_empty() {
            missing.push("JIRA_API_TOKEN");
        }
        if !missing.is_empty() {
            return Err(ValidationError::MissingSettings(missing));
        }

        validate_timeout("REQUEST_CONNECT_TIMEOUT_SECONDS", self.connect_timeout_secs)?;
        validate_timeout("REQUEST_READ_TIMEOUT_SECONDS", self.read_timeout_secs)?;
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        saturating_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        saturating_secs(self.read_timeout_secs)
    }
}

fn validate_timeout(name: &'static str, secs: f64) -> Result<(), ValidationError> {
    if !(secs.is_finite() && secs > 0.0) {
        return Err(ValidationError::NonPositiveTimeout(name));
    }
    if Duration::try_from_secs_f64(secs).is_err() {
        return Err(ValidationError::DurationOutOfRange(name));
    }
    Ok(())
}

/// Seconds as a `Duration`; values `validate` would reject saturate instead
/// of panicking.
fn saturating_secs(secs: f64) -> Duration {
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) => duration,
        Err(_) if secs > 0.0 => Duration::MAX,
        Err(_) => Duration::ZERO,
    }
}

// The API token never ends up in logs.
impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url.as_str())
            .field("email", &self.email)
            .field("api_token", &"<redacted>")
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("read_timeout_secs", &self.read_timeout_secs)
            .finish()
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Total attempts per upstream call, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay; attempt n waits `backoff_secs * 2^(n-1)`
    #[serde(default = "default_backoff")]
    pub backoff_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: default_max_attempts(),
            backoff_secs: default_backoff(),
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=8).contains(&self.max_attempts) {
            return Err(ValidationError::InvalidMaxAttempts(self.max_attempts));
        }
        if !(self.backoff_secs.is_finite() && self.backoff_secs >= 0.0) {
            return Err(ValidationError::InvalidBackoff(self.backoff_secs));
        }
        if Duration::try_from_secs_f64(self.backoff_secs).is_err() {
            return Err(ValidationError::DurationOutOfRange("RETRY_BACKOFF_SECONDS"));
        }
        Ok(())
    }

    pub fn backoff(&self) -> Duration {
        saturating_secs(self.backoff_secs)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: default_cache_enabled(),
            ttl_secs: default_cache_ttl(),
            max_capacity: default_cache_capacity(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(120..=300).contains(&self.ttl_secs) {
            return Err(ValidationError::InvalidCacheTtl(self.ttl_secs));
        }
        if self.max_capacity == 0 {
            return Err(ValidationError::InvalidCacheCapacity);
        }
        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn default_connect_timeout() -> f64 {
    5.0
}

fn default_read_timeout() -> f64 {
    20.0
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff() -> f64 {
    0.5
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    180
}

fn default_cache_capacity() -> u64 {
    1000
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_url(value: &str) -> Result<Url, ValidationError> {
    Url::parse(value.trim().trim_end_matches('/')).map_err(|_| ValidationError::InvalidVariable {
        name: "JIRA_BASE_URL",
        value: value.to_string(),
    })
}

fn parse_var<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ValidationError> {
    value
        .trim()
        .parse()
        .map_err(|_| ValidationError::InvalidVariable {
            name,
            value: value.to_string(),
        })
}
