//! Single-call transport.
//!
//! Everything above this module talks to the remote service through [`Transport`]:
//! one method name plus its parameters in, one decoded [`Envelope`] out. Batching,
//! rate limiting and retries all live above this seam.

mod http;

pub use http::HttpTransport;

use crate::types::{Envelope, Params};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// One remote call, no policy.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform `method` with `params` and return the decoded envelope.
    ///
    /// I/O failures are `Error::Transport`; a non-JSON response is `Error::Decode`.
    /// Provider errors are *not* raised here; they stay in the envelope.
    async fn call(&self, method: &str, params: &Params) -> Result<Envelope>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(Arc<reqwest::Error>),

    #[error("Transport error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Http(Arc::new(e))
    }
}
