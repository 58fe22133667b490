//! Remote endpoint error classes.
//!
//! The remote endpoint reports failures as a numeric `error_code` plus a free-form
//! `error_msg`. This module maps that pair onto the small set of classes the runtime
//! actually makes decisions on.
//!
//! | Class              | Codes                      | Runtime behavior                          |
//! |--------------------|----------------------------|-------------------------------------------|
//! | `RateLimited`      | 6                          | retried on the single-call path (3 tries) |
//! | `Flood`            | 9, 29                      | surfaced, never retried                   |
//! | `Authorization`    | 5, 15, 27, 28              | surfaced                                  |
//! | `ResponseTooLarge` | message says "too big"     | batch is bisected and re-sent             |
//! | `Other`            | everything else            | surfaced                                  |
//!
//! ## Example
//!
//! ```rust
//! use call_packer::error_code::ErrorClass;
//!
//! let class = ErrorClass::classify(6, "Too many requests per second");
//! assert_eq!(class, ErrorClass::RateLimited);
//! assert!(class.retryable());
//! ```

use std::fmt;

/// Too many requests per second.
pub const TOO_MANY_REQUESTS: i64 = 6;
/// Flood control.
pub const FLOOD_CONTROL: i64 = 9;
/// Script runtime error; also reported when the aggregate response is too big.
pub const RUNTIME_ERROR: i64 = 13;
/// Rate limit reached for a method.
pub const RATE_LIMIT_REACHED: i64 = 29;

const AUTHORIZATION_CODES: [i64; 4] = [5, 15, 27, 28];

/// Decision-relevant class of a remote error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    RateLimited,
    Flood,
    Authorization,
    ResponseTooLarge,
    Other,
}

impl ErrorClass {
    /// Classify a remote `(error_code, error_msg)` pair.
    pub fn classify(code: i64, message: &str) -> Self {
        match code {
            TOO_MANY_REQUESTS => Self::RateLimited,
            FLOOD_CONTROL | RATE_LIMIT_REACHED => Self::Flood,
            c if AUTHORIZATION_CODES.contains(&c) => Self::Authorization,
            _ if is_size_message(message) => Self::ResponseTooLarge,
            _ => Self::Other,
        }
    }

    /// Returns the standard name (e.g. `"rate_limited"`).
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Flood => "flood",
            Self::Authorization => "authorization",
            Self::ResponseTooLarge => "response_too_large",
            Self::Other => "other",
        }
    }

    /// Whether the single-call path may transparently retry.
    #[inline]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::RateLimited)
    }

    /// Whether a multi-operation batch should be bisected and re-sent.
    #[inline]
    pub fn splittable(&self) -> bool {
        matches!(self, Self::ResponseTooLarge)
    }
}

fn is_size_message(message: &str) -> bool {
    let m = message.to_lowercase();
    m.contains("too big") || m.contains("too large")
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
