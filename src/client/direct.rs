//! Single-call path.
//!
//! Calls that bypass the batcher go straight to the transport, paced by the limiter of
//! their credential and retried on rate-limit rejections.

use super::policy::{Decision, RetryPolicy};
use crate::config::PackerConfig;
use crate::resilience::RateLimiterRegistry;
use crate::transport::Transport;
use crate::types::{ApiResponse, Params};
use crate::{Error, ErrorContext, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct DirectCaller {
    transport: Arc<dyn Transport>,
    limiters: Arc<RateLimiterRegistry>,
    policy: RetryPolicy,
    credential_param: String,
    version_param: String,
    api_version: String,
    debug: bool,
}

impl DirectCaller {
    pub fn new(
        transport: Arc<dyn Transport>,
        limiters: Arc<RateLimiterRegistry>,
        config: &PackerConfig,
    ) -> Self {
        Self {
            transport,
            limiters,
            policy: RetryPolicy::default(),
            credential_param: config.credential_param.clone(),
            version_param: config.version_param.clone(),
            api_version: config.api_version.clone(),
            debug: config.debug,
        }
    }

    /// Perform `method` on its own. The API version is added when the caller did not
    /// set one.
    pub async fn call(&self, method: &str, mut params: Params) -> Result<ApiResponse> {
        params
            .entry(self.version_param.clone())
            .or_insert_with(|| Value::from(self.api_version.as_str()));

        let credential = match params.get(&self.credential_param) {
            None => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                return Err(Error::precondition_with_context(
                    "credential parameter must be a string",
                    ErrorContext::new()
                        .with_field_path(self.credential_param.as_str())
                        .with_source("direct_caller"),
                ))
            }
        };

        let mut attempt = 0;
        loop {
            self.limiters.take(credential.as_deref()).await;
            attempt += 1;

            if self.debug {
                debug!(method, attempt, "direct call");
            }
            let result = self
                .transport
                .call(method, &params)
                .await
                .and_then(|envelope| envelope.into_response());

            match result {
                Ok(response) => return Ok(response),
                Err(err) => match self.policy.decide(&err, attempt) {
                    Decision::Retry => {
                        warn!(method, attempt, error = %err, "rate limited, retrying");
                    }
                    Decision::Fail => return Err(err),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::types::Envelope;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned bodies in order and records the params it was called with.
    struct Scripted {
        bodies: Mutex<VecDeque<&'static str>>,
        seen: Mutex<Vec<Params>>,
    }

    impl Scripted {
        fn new(bodies: &[&'static str]) -> Arc<Self> {
            Arc::new(Self {
                bodies: Mutex::new(bodies.iter().copied().collect()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn call(&self, _method: &str, params: &Params) -> Result<Envelope> {
            self.seen.lock().unwrap().push(params.clone());
            let body = self.bodies.lock().unwrap().pop_front().unwrap_or("{}");
            Envelope::from_slice(body.as_bytes())
        }
    }

    fn caller(transport: Arc<Scripted>) -> DirectCaller {
        let limiters = Arc::new(RateLimiterRegistry::new(RateLimitConfig::default()));
        DirectCaller::new(transport, limiters, &PackerConfig::default())
    }

    const TOO_MANY: &str = r#"{"error":{"error_code":6,"error_msg":"Too many requests per second"}}"#;

    #[tokio::test]
    async fn test_injects_version() {
        let transport = Scripted::new(&[r#"{"response":[1]}"#]);
        let resp = caller(transport.clone())
            .call("users.get", Params::new())
            .await
            .unwrap();
        assert_eq!(resp.raw(), "[1]");
        assert_eq!(transport.seen.lock().unwrap()[0]["v"], "5.131");
    }

    #[tokio::test]
    async fn test_keeps_caller_version() {
        let transport = Scripted::new(&[r#"{"response":1}"#]);
        let mut params = Params::new();
        params.insert("v".into(), Value::from("5.199"));
        caller(transport.clone()).call("users.get", params).await.unwrap();
        assert_eq!(transport.seen.lock().unwrap()[0]["v"], "5.199");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_rate_limited_then_succeeds() {
        let transport = Scripted::new(&[TOO_MANY, r#"{"response":"ok"}"#]);
        let mut params = Params::new();
        params.insert("access_token".into(), Value::from("tok"));
        let resp = caller(transport.clone()).call("wall.get", params).await.unwrap();
        assert_eq!(resp.raw(), "\"ok\"");
        assert_eq!(transport.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_three_attempts() {
        let transport = Scripted::new(&[TOO_MANY, TOO_MANY, TOO_MANY, r#"{"response":1}"#]);
        let err = caller(transport.clone())
            .call("wall.get", Params::new())
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());
        assert_eq!(transport.seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_rejects_non_string_credential() {
        let transport = Scripted::new(&[]);
        let mut params = Params::new();
        params.insert("access_token".into(), Value::from(42));
        let err = caller(transport.clone()).call("wall.get", params).await.unwrap_err();
        assert!(matches!(err, Error::Precondition { .. }));
        assert!(transport.seen.lock().unwrap().is_empty());
    }
}
