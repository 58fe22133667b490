use crate::batch::{BatchConfig, BatchContext, Batcher, Executor, ResponseRouter};
use crate::client::direct::DirectCaller;
use crate::config::{CredentialMode, PackerConfig};
use crate::credentials::CredentialPool;
use crate::resilience::{CredentialClass, RateLimiterRegistry};
use crate::transport::Transport;
use crate::types::{ApiResponse, Params};
use crate::{Error, ErrorContext, Result};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Request-coalescing front end.
///
/// Calls whose method passes the filter are batched into run-many scripts; all other
/// calls go out on their own through the rate-limited direct path. Either way the caller
/// gets back only its own result.
pub struct Packer {
    config: Arc<PackerConfig>,
    batcher: Batcher,
    direct: DirectCaller,
    credentials: Arc<CredentialPool>,
    limiters: Arc<RateLimiterRegistry>,
    cancel: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Packer {
    pub fn builder() -> crate::client::PackerBuilder {
        crate::client::PackerBuilder::new()
    }

    pub(crate) fn assemble(
        config: PackerConfig,
        transport: Arc<dyn Transport>,
        group_credentials: Vec<String>,
    ) -> Result<Self> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(Error::runtime_with_context(
                "packer must be built inside a Tokio runtime",
                ErrorContext::new().with_source("packer_builder"),
            ));
        }

        let cancel = CancellationToken::new();
        let credentials = Arc::new(CredentialPool::from_config(&config.credentials));
        let limiters = Arc::new(RateLimiterRegistry::new(config.rate_limits.clone()));
        for token in group_credentials {
            limiters.assign_class(token, CredentialClass::Group);
        }

        let context = BatchContext {
            executor: Executor::new(Arc::clone(&transport), &config),
            credentials: Arc::clone(&credentials),
            router: ResponseRouter::new(config.credential_param.clone(), config.debug),
        };
        let batcher = Batcher::spawn(BatchConfig::from(&config), context, cancel.clone());
        let direct = DirectCaller::new(transport, Arc::clone(&limiters), &config);
        let sweeper = limiters.spawn_sweeper(cancel.clone());

        info!(
            max_batch_size = config.max_batch_size,
            credential_mode = ?config.credentials.mode,
            "packer started"
        );

        Ok(Self {
            config: Arc::new(config),
            batcher,
            direct,
            credentials,
            limiters,
            cancel,
            sweeper: Mutex::new(Some(sweeper)),
        })
    }

    /// Perform `method` with `params`, batched when the filter allows it.
    pub async fn call(&self, method: &str, params: Params) -> Result<ApiResponse> {
        let batched = self.config.is_batched(method);
        if self.config.debug {
            debug!(method, batched, "routing call");
        }
        if !batched {
            return self.direct.call(method, params).await;
        }

        if self.credentials.mode() == CredentialMode::Lazy {
            let credential = self.extract_credential(method, &params)?;
            self.credentials.append(credential);
        }
        self.batcher.submit(method, params).await
    }

    fn extract_credential<'a>(&self, method: &str, params: &'a Params) -> Result<&'a str> {
        let name = self.config.credential_param.as_str();
        match params.get(name) {
            Some(Value::String(s)) => Ok(s.as_str()),
            Some(_) => Err(Error::precondition_with_context(
                "credential parameter must be a string",
                ErrorContext::new()
                    .with_field_path(name)
                    .with_details(method)
                    .with_source("packer"),
            )),
            None => Err(Error::precondition_with_context(
                "batched calls need a credential parameter in lazy mode",
                ErrorContext::new()
                    .with_field_path(name)
                    .with_details(method)
                    .with_source("packer"),
            )),
        }
    }

    /// Send the open batch now. Returns the number of calls handed off.
    pub async fn flush(&self) -> Result<usize> {
        self.batcher.flush().await
    }

    /// Send what is still open, wait for in-flight batches and stop background tasks.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.batcher.shutdown().await;
        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(sweeper) = sweeper {
            let _ = sweeper.await;
        }
        info!("packer stopped");
    }

    pub fn config(&self) -> &PackerConfig {
        &self.config
    }

    pub fn credentials(&self) -> &CredentialPool {
        &self.credentials
    }

    pub fn rate_limiters(&self) -> &RateLimiterRegistry {
        &self.limiters
    }

    pub fn is_running(&self) -> bool {
        self.batcher.is_running()
    }
}

impl Drop for Packer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
