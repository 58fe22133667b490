use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Tokens per second. `0` disables limiting.
    pub rps: f64,
    /// Maximum burst size (tokens).
    pub burst: f64,
}

impl RateLimiterConfig {
    /// Strict pacing: one token of burst, so `n` calls take at least `(n - 1) / rps`.
    pub fn from_rps(rps: f64) -> Option<Self> {
        if !rps.is_finite() || rps < 0.0 {
            return None;
        }
        Some(Self { rps, burst: 1.0 })
    }
}

#[derive(Debug)]
struct State {
    tokens: f64,
    last_refill: Instant,
    last_used: Instant,
}

/// Token-bucket rate limiter for one credential.
///
/// The state lock is never held across an await, so the limiter can be shared freely
/// between tasks.
#[derive(Debug)]
pub struct RateLimiter {
    cfg: RateLimiterConfig,
    state: Mutex<State>,
}

impl RateLimiter {
    pub fn new(cfg: RateLimiterConfig) -> Self {
        let now = Instant::now();
        let state = Mutex::new(State {
            tokens: cfg.burst,
            last_refill: now,
            last_used: now,
        });
        Self { cfg, state }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.cfg
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn refill_locked(cfg: &RateLimiterConfig, st: &mut State, now: Instant) {
        let elapsed = now.duration_since(st.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            st.tokens = (st.tokens + elapsed * cfg.rps).min(cfg.burst);
            st.last_refill = now;
        }
    }

    /// Take one token if available, otherwise report how long until one is.
    fn try_take(&self) -> Option<Duration> {
        let cfg = &self.cfg;
        let mut st = self.lock();
        let now = Instant::now();
        st.last_used = now;
        if cfg.rps <= 0.0 {
            return None;
        }
        Self::refill_locked(cfg, &mut st, now);
        if st.tokens >= 1.0 {
            st.tokens -= 1.0;
            return None;
        }
        let missing = 1.0 - st.tokens;
        Some(Duration::from_secs_f64(missing / cfg.rps))
    }

    /// Acquire one token (may sleep).
    pub async fn acquire(&self) {
        while let Some(wait) = self.try_take() {
            tokio::time::sleep(wait).await;
        }
    }

    /// Mark the limiter as used without consuming a token.
    pub fn touch(&self) {
        self.lock().last_used = Instant::now();
    }

    /// How long the limiter has been idle.
    pub fn idle_for(&self) -> Duration {
        Instant::now().duration_since(self.lock().last_used)
    }
}
