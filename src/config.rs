//! Packer configuration.
//!
//! Everything the embedding application can tune, loadable from YAML:
//!
//! ```yaml
//! base_url: https://api.vk.com/method/
//! api_version: "5.131"
//! max_batch_size: 20
//! flush_interval_ms: 500
//! filter:
//!   mode: deny
//!   methods: [messages.send]
//! credentials:
//!   mode: static
//!   tokens: [token-a, token-b]
//! rate_limits:
//!   default_class: group
//! debug: true
//! ```

use crate::resilience::registry::CredentialClass;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Hard ceiling on operations per composite script, imposed by the run-many endpoint.
pub const MAX_BATCH_SIZE: usize = 25;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackerConfig {
    /// Prefix every method name is appended to.
    pub base_url: String,
    /// Value of the version parameter sent with every call.
    pub api_version: String,
    pub version_param: String,
    /// Name of the run-many method; never batched itself.
    pub run_many_method: String,
    /// Parameter carrying the access credential.
    pub credential_param: String,
    /// Script parameter of the run-many method.
    pub script_param: String,
    pub max_batch_size: usize,
    /// Timer flush period; `0` disables the timer (size and explicit flushes only).
    pub flush_interval_ms: u64,
    pub filter: FilterConfig,
    pub credentials: CredentialConfig,
    pub rate_limits: RateLimitConfig,
    pub http_timeout_secs: u64,
    /// Log method names, generated scripts and raw response bodies.
    pub debug: bool,
}

impl Default for PackerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.vk.com/method/".to_string(),
            api_version: "5.131".to_string(),
            version_param: "v".to_string(),
            run_many_method: "execute".to_string(),
            credential_param: "access_token".to_string(),
            script_param: "code".to_string(),
            max_batch_size: MAX_BATCH_SIZE,
            flush_interval_ms: 2_000,
            filter: FilterConfig::default(),
            credentials: CredentialConfig::default(),
            rate_limits: RateLimitConfig::default(),
            http_timeout_secs: 10,
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Only the listed methods are batched.
    Allow,
    /// Every method except the listed ones is batched.
    #[default]
    Deny,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub mode: FilterMode,
    pub methods: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialMode {
    /// Fixed set of tokens given at construction.
    Static,
    /// Tokens are learned from the credential parameter of incoming calls.
    #[default]
    Lazy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    pub mode: CredentialMode,
    pub tokens: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub user_rps: f64,
    pub group_rps: f64,
    pub default_class: CredentialClass,
    /// Limiters unused for longer than this are evicted.
    pub idle_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            user_rps: CredentialClass::User.default_rps(),
            group_rps: CredentialClass::Group.default_rps(),
            default_class: CredentialClass::User,
            idle_ttl_secs: 600,
            sweep_interval_secs: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn rps_for(&self, class: CredentialClass) -> f64 {
        match class {
            CredentialClass::User => self.user_rps,
            CredentialClass::Group => self.group_rps,
        }
    }

    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl PackerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: PackerConfig = serde_yaml::from_str(content).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid packer config: {}", e),
                ErrorContext::new().with_source("config"),
            )
        })?;
        Ok(config.normalized())
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::configuration_with_context(
                format!("cannot read packer config: {}", e),
                ErrorContext::new()
                    .with_details(path.display().to_string())
                    .with_source("config"),
            )
        })?;
        Self::from_yaml_str(&content)
    }

    /// Clamp out-of-range values the way the endpoint limits require.
    pub fn normalized(mut self) -> Self {
        if self.max_batch_size == 0 || self.max_batch_size > MAX_BATCH_SIZE {
            tracing::warn!(
                requested = self.max_batch_size,
                "max_batch_size out of range 1..=25, using 25"
            );
            self.max_batch_size = MAX_BATCH_SIZE;
        }
        self
    }

    pub fn flush_interval(&self) -> Option<Duration> {
        (self.flush_interval_ms > 0).then(|| Duration::from_millis(self.flush_interval_ms))
    }

    /// Whether `method` goes through the batcher.
    pub fn is_batched(&self, method: &str) -> bool {
        if method == self.run_many_method {
            return false;
        }
        let listed = self.filter.methods.iter().any(|m| m == method);
        match self.filter.mode {
            FilterMode::Allow => listed,
            FilterMode::Deny => !listed,
        }
    }
}
