//! A caller's operation waiting inside a batch.

use crate::types::{ApiResponse, Params};
use crate::Result;
use tokio::sync::oneshot;

pub type Responder = oneshot::Sender<Result<ApiResponse>>;

/// One submitted call plus the channel its caller is waiting on.
///
/// Resolution consumes the operation, so an operation cannot be resolved twice. If an
/// operation is dropped unresolved the caller observes a closed channel instead of
/// waiting forever.
#[derive(Debug)]
pub struct PendingOperation {
    method: String,
    params: Params,
    responder: Responder,
}

impl PendingOperation {
    pub fn new(
        method: impl Into<String>,
        params: Params,
    ) -> (Self, oneshot::Receiver<Result<ApiResponse>>) {
        let (responder, rx) = oneshot::channel();
        let op = Self {
            method: method.into(),
            params,
            responder,
        };
        (op, rx)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Deliver the outcome to the caller. Returns `false` if the caller stopped waiting.
    pub fn resolve(self, result: Result<ApiResponse>) -> bool {
        let delivered = self.responder.send(result).is_ok();
        if !delivered {
            tracing::trace!(method = %self.method, "caller went away before resolution");
        }
        delivered
    }
}
