//! Per-credential rate limiting for the single-call path.
//!
//! Mutation rights: the limiter map is only changed by [`RateLimiterRegistry::limiter`]
//! (insert on first use), [`RateLimiterRegistry::assign_class`] (replace) and
//! [`RateLimiterRegistry::sweep`] (evict idle). All three hold the map lock for the whole
//! change and never across an await.

use super::rate_limiter::{RateLimiter, RateLimiterConfig};
use crate::config::RateLimitConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Kind of credential; each kind has its own request ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialClass {
    /// Personal access token.
    #[default]
    User,
    /// Community/service token.
    Group,
}

impl CredentialClass {
    pub fn default_rps(&self) -> f64 {
        match self {
            CredentialClass::User => 3.0,
            CredentialClass::Group => 20.0,
        }
    }
}

pub struct RateLimiterRegistry {
    config: RateLimitConfig,
    limiters: Mutex<HashMap<String, Arc<RateLimiter>>>,
    classes: Mutex<HashMap<String, CredentialClass>>,
}

impl RateLimiterRegistry {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            limiters: Mutex::new(HashMap::new()),
            classes: Mutex::new(HashMap::new()),
        }
    }

    fn limiters(&self) -> MutexGuard<'_, HashMap<String, Arc<RateLimiter>>> {
        self.limiters.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn classes(&self) -> MutexGuard<'_, HashMap<String, CredentialClass>> {
        self.classes.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn class_of(&self, credential: &str) -> CredentialClass {
        self.classes()
            .get(credential)
            .copied()
            .unwrap_or(self.config.default_class)
    }

    /// Pin `credential` to `class`. An existing limiter is replaced so the new ceiling
    /// applies to the next call.
    pub fn assign_class(&self, credential: impl Into<String>, class: CredentialClass) {
        let credential = credential.into();
        self.classes().insert(credential.clone(), class);
        self.limiters().remove(&credential);
    }

    /// Limiter for `credential`, created on first use.
    pub fn limiter(&self, credential: &str) -> Arc<RateLimiter> {
        let class = self.class_of(credential);
        let mut limiters = self.limiters();
        let limiter = limiters.entry(credential.to_string()).or_insert_with(|| {
            let rps = self.config.rps_for(class);
            let cfg = RateLimiterConfig::from_rps(rps).unwrap_or(RateLimiterConfig {
                rps: 0.0,
                burst: 1.0,
            });
            debug!(?class, rps, "creating rate limiter");
            Arc::new(RateLimiter::new(cfg))
        });
        limiter.touch();
        Arc::clone(limiter)
    }

    /// Wait until a call under `credential` may proceed. Credential-less calls are unlimited.
    pub async fn take(&self, credential: Option<&str>) {
        if let Some(credential) = credential {
            self.limiter(credential).acquire().await;
        }
    }

    /// Evict limiters idle for longer than the configured TTL. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let ttl = self.config.idle_ttl();
        let mut limiters = self.limiters();
        let before = limiters.len();
        limiters.retain(|_, limiter| limiter.idle_for() <= ttl);
        before - limiters.len()
    }

    pub fn len(&self) -> usize {
        self.limiters().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, credential: &str) -> bool {
        self.limiters().contains_key(credential)
    }

    /// Run [`sweep`](Self::sweep) every `sweep_interval` until `cancel` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let period = registry.config.sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately; nothing can be idle yet.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = registry.sweep();
                        if evicted > 0 {
                            debug!(
                                evicted,
                                remaining = registry.len(),
                                "evicted idle rate limiters"
                            );
                        }
                    }
                }
            }
            debug!("rate limiter sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::Instant;

    fn config(ttl_secs: u64, sweep_secs: u64) -> RateLimitConfig {
        RateLimitConfig {
            idle_ttl_secs: ttl_secs,
            sweep_interval_secs: sweep_secs,
            ..RateLimitConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_paces_one_credential() {
        let registry = RateLimiterRegistry::new(config(600, 60));
        let start = Instant::now();
        for _ in 0..4 {
            registry.take(Some("token-a")).await;
        }
        // default class is User (3 rps): 4 calls need at least 3 / 3 s.
        assert!(start.elapsed() >= Duration::from_millis(999));
    }

    #[tokio::test(start_paused = true)]
    async fn test_credentials_are_independent() {
        let registry = RateLimiterRegistry::new(config(600, 60));
        let start = Instant::now();
        registry.take(Some("token-a")).await;
        registry.take(Some("token-b")).await;
        registry.take(None).await;
        registry.take(None).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_group_class_has_higher_ceiling() {
        let registry = RateLimiterRegistry::new(config(600, 60));
        registry.assign_class("group-token", CredentialClass::Group);
        assert_eq!(registry.class_of("group-token"), CredentialClass::Group);
        assert_eq!(registry.limiter("group-token").config().rps, 20.0);
        assert_eq!(registry.limiter("user-token").config().rps, 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_idle_credentials() {
        let registry = RateLimiterRegistry::new(config(10, 60));
        registry.take(Some("stale")).await;
        tokio::time::advance(Duration::from_secs(8)).await;
        registry.take(Some("fresh")).await;
        tokio::time::advance(Duration::from_secs(3)).await;

        assert_eq!(registry.sweep(), 1);
        assert!(!registry.contains("stale"));
        assert!(registry.contains("fresh"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_task_runs_and_stops() {
        let registry = Arc::new(RateLimiterRegistry::new(config(5, 1)));
        let cancel = CancellationToken::new();
        let handle = registry.spawn_sweeper(cancel.clone());

        registry.take(Some("token")).await;
        tokio::time::sleep(Duration::from_secs(7)).await;
        assert!(registry.is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }
}
