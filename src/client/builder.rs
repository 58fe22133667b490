use crate::client::core::Packer;
use crate::config::{CredentialMode, FilterMode, PackerConfig};
use crate::transport::{HttpTransport, Transport};
use crate::Result;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Builder for [`Packer`].
///
/// Starts from the default configuration with environment overrides applied:
/// - `PACKER_MAX_BATCH_SIZE`
/// - `PACKER_FLUSH_INTERVAL_MS` (`0` disables the timer)
/// - `PACKER_DEBUG` (`1`/`true`)
/// - `PACKER_HTTP_TIMEOUT_SECS`
pub struct PackerBuilder {
    config: PackerConfig,
    transport: Option<Arc<dyn Transport>>,
    group_credentials: Vec<String>,
}

impl Default for PackerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PackerBuilder {
    pub fn new() -> Self {
        Self {
            config: with_env_overrides(PackerConfig::default()),
            transport: None,
            group_credentials: Vec::new(),
        }
    }

    /// Replace the whole configuration. Environment overrides are not reapplied.
    pub fn config(mut self, config: PackerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.config.api_version = version.into();
        self
    }

    pub fn max_batch_size(mut self, n: usize) -> Self {
        self.config.max_batch_size = n;
        self
    }

    /// `None` disables the timer trigger.
    pub fn flush_interval(mut self, interval: Option<Duration>) -> Self {
        self.config.flush_interval_ms = interval.map(|d| d.as_millis() as u64).unwrap_or(0);
        self
    }

    /// Batch only the listed methods.
    pub fn allow_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.filter.mode = FilterMode::Allow;
        self.config.filter.methods = methods.into_iter().map(Into::into).collect();
        self
    }

    /// Batch everything except the listed methods.
    pub fn deny_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.filter.mode = FilterMode::Deny;
        self.config.filter.methods = methods.into_iter().map(Into::into).collect();
        self
    }

    /// Use a fixed set of credentials for batches.
    pub fn static_credentials<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.credentials.mode = CredentialMode::Static;
        self.config.credentials.tokens = tokens.into_iter().map(Into::into).collect();
        self
    }

    /// Learn credentials from incoming calls (default).
    pub fn lazy_credentials(mut self) -> Self {
        self.config.credentials.mode = CredentialMode::Lazy;
        self.config.credentials.tokens.clear();
        self
    }

    /// Limit direct calls under `token` at the group ceiling instead of the default class.
    pub fn group_credential(mut self, token: impl Into<String>) -> Self {
        self.group_credentials.push(token.into());
        self
    }

    pub fn user_rps(mut self, rps: f64) -> Self {
        self.config.rate_limits.user_rps = rps;
        self
    }

    pub fn group_rps(mut self, rps: f64) -> Self {
        self.config.rate_limits.group_rps = rps;
        self
    }

    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.config.http_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Verbose logs of routed methods, scripts and response bodies.
    pub fn debug(mut self, enable: bool) -> Self {
        self.config.debug = enable;
        self
    }

    /// Use a custom transport instead of HTTP. Primarily for tests.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the packer and start its background tasks. Must run inside a Tokio runtime.
    pub fn build(self) -> Result<Packer> {
        let config = self.config.normalized();
        if config.credentials.mode == CredentialMode::Static
            && config.credentials.tokens.is_empty()
        {
            warn!("static credential mode without tokens; every batch will fail");
        }
        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new(&config)?),
        };
        Packer::assemble(config, transport, self.group_credentials)
    }
}

fn with_env_overrides(mut config: PackerConfig) -> PackerConfig {
    if let Some(n) = env_parse::<usize>("PACKER_MAX_BATCH_SIZE") {
        config.max_batch_size = n;
    }
    if let Some(ms) = env_parse::<u64>("PACKER_FLUSH_INTERVAL_MS") {
        config.flush_interval_ms = ms;
    }
    if let Ok(v) = env::var("PACKER_DEBUG") {
        config.debug = matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
    }
    if let Some(secs) = env_parse::<u64>("PACKER_HTTP_TIMEOUT_SECS") {
        config.http_timeout_secs = secs.max(1);
    }
    config
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}
