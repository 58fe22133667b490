//! 弹性模块：按凭证限流与空闲限流器回收。
//!
//! # Resilience Module
//!
//! Pacing for the single-call (non-batched) path.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`rate_limiter`] | Token bucket for one credential, with last-used tracking |
//! | [`registry`] | Credential -> limiter map, credential classes, idle eviction sweep |
//!
//! ## Rate Limiting
//!
//! Each credential gets its own bucket with a burst of one token, so `n` calls under
//! the same credential take at least `(n - 1) / rps` seconds. Calls without a
//! credential are not limited.
//!
//! ```rust
//! use call_packer::config::RateLimitConfig;
//! use call_packer::resilience::registry::{CredentialClass, RateLimiterRegistry};
//!
//! # async fn demo() {
//! let registry = RateLimiterRegistry::new(RateLimitConfig::default());
//! registry.assign_class("community-token", CredentialClass::Group);
//!
//! registry.take(Some("community-token")).await; // up to 20 rps
//! registry.take(None).await; // unlimited
//! # }
//! ```
//!
//! Limiters are evicted once idle for longer than the configured TTL, either by an
//! explicit [`registry::RateLimiterRegistry::sweep`] or by the background task started
//! with [`registry::RateLimiterRegistry::spawn_sweeper`].

pub mod rate_limiter;
pub mod registry;

pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use registry::{CredentialClass, RateLimiterRegistry};
