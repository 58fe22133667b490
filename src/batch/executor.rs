//! Run-many executor.

use crate::config::PackerConfig;
use crate::transport::Transport;
use crate::types::{AggregateResult, Params};
use crate::Result;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Sends one composite script to the run-many endpoint under one credential.
#[derive(Clone)]
pub struct Executor {
    transport: Arc<dyn Transport>,
    run_many_method: String,
    credential_param: String,
    script_param: String,
    version_param: String,
    api_version: String,
    debug: bool,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("run_many_method", &self.run_many_method)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

impl Executor {
    pub fn new(transport: Arc<dyn Transport>, config: &PackerConfig) -> Self {
        Self {
            transport,
            run_many_method: config.run_many_method.clone(),
            credential_param: config.credential_param.clone(),
            script_param: config.script_param.clone(),
            version_param: config.version_param.clone(),
            api_version: config.api_version.clone(),
            debug: config.debug,
        }
    }

    pub fn credential_param(&self) -> &str {
        &self.credential_param
    }

    /// Execute `script`. Whole-call failures (transport, decode, provider) are returned
    /// as errors; per-call outcomes are left for the router.
    pub async fn run(&self, credential: &str, script: &str) -> Result<AggregateResult> {
        let mut params = Params::new();
        params.insert(self.credential_param.clone(), Value::from(credential));
        params.insert(self.version_param.clone(), Value::from(self.api_version.as_str()));
        params.insert(self.script_param.clone(), Value::from(script));

        if self.debug {
            debug!(method = %self.run_many_method, script = %script, "sending composite script");
        }

        let started = Instant::now();
        let envelope = self.transport.call(&self.run_many_method, &params).await?;
        let result = AggregateResult::from_envelope(envelope);

        debug!(
            method = %self.run_many_method,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "run-many call finished"
        );
        result
    }
}
