use crate::Error;

/// Attempts made on the single-call path before a rate-limit error is surfaced.
pub(crate) const MAX_ATTEMPTS: u32 = 3;

/// Internal decision for how to proceed after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    Retry,
    Fail,
}

/// Retry policy for direct calls.
///
/// Only whole-call rate-limit rejections are retried. Pacing between attempts comes from
/// the per-credential limiter, so there is no separate backoff here.
#[derive(Debug, Clone)]
pub(crate) struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Decide what to do after attempt number `attempt` (1-based) failed with `err`.
    pub fn decide(&self, err: &Error, attempt: u32) -> Decision {
        if err.is_rate_limited() && attempt < self.max_attempts {
            Decision::Retry
        } else {
            Decision::Fail
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;

    #[test]
    fn test_rate_limited_is_retried_until_budget() {
        let policy = RetryPolicy::default();
        let err = Error::from(ProviderError::new(6, "Too many requests per second"));
        assert_eq!(policy.decide(&err, 1), Decision::Retry);
        assert_eq!(policy.decide(&err, 2), Decision::Retry);
        assert_eq!(policy.decide(&err, 3), Decision::Fail);
    }

    #[test]
    fn test_other_errors_fail_immediately() {
        let policy = RetryPolicy::default();
        let flood = Error::from(ProviderError::new(9, "Flood control"));
        assert_eq!(policy.decide(&flood, 1), Decision::Fail);
        assert_eq!(policy.decide(&Error::decode("bad"), 1), Decision::Fail);
    }
}
