//! Response routing.
//!
//! Walks the run-many result in the order the endpoint returned it and resolves the
//! matching pending operations. A `false` entry is a failed sub-call and takes the next
//! error from the endpoint's error list; pairing is strictly positional, so a `false`
//! under an unknown id still uses up its error.

use super::collector::SealedBatch;
use crate::error::SubRequestError;
use crate::types::params::form_value;
use crate::types::{AggregateResult, ExecuteError, Params};
use crate::Error;
use tracing::{debug, warn};

/// Outcome counters of one routing pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RouteSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Members the endpoint returned nothing for.
    pub missing: usize,
    /// Returned ids that matched no pending member.
    pub unmatched: usize,
}

#[derive(Debug, Clone)]
pub struct ResponseRouter {
    credential_param: String,
    debug: bool,
}

impl ResponseRouter {
    pub fn new(credential_param: impl Into<String>, debug: bool) -> Self {
        Self {
            credential_param: credential_param.into(),
            debug,
        }
    }

    /// Resolve every member of `batch` from `result`. Members absent from the result
    /// are resolved with [`Error::MissingResponse`].
    pub fn route(&self, batch: SealedBatch, result: AggregateResult) -> RouteSummary {
        let trace_id = batch.trace_id().to_string();
        let mut pending = batch.into_pending();
        let mut errors = result.errors.into_iter();
        let mut summary = RouteSummary::default();

        for (id, response) in result.responses {
            let Some(op) = pending.remove(&id) else {
                warn!(batch = %trace_id, request_id = %id, "response id matches no pending call");
                if response.is_failure_sentinel() {
                    if let Some(discarded) = errors.next() {
                        warn!(
                            batch = %trace_id,
                            request_id = %id,
                            method = ?discarded.method,
                            code = discarded.error_code,
                            "discarding execute error of unmatched call"
                        );
                    }
                }
                summary.unmatched += 1;
                continue;
            };

            if response.is_failure_sentinel() {
                let err = self.sub_request_error(op.method(), op.params(), errors.next());
                if self.debug {
                    debug!(batch = %trace_id, request_id = %id, error = %err, "sub-call failed");
                }
                op.resolve(Err(Error::SubRequest(err)));
                summary.failed += 1;
            } else {
                op.resolve(Ok(response));
                summary.succeeded += 1;
            }
        }

        for (id, op) in pending {
            warn!(
                batch = %trace_id,
                request_id = %id,
                method = %op.method(),
                "no response for call"
            );
            let method = op.method().to_string();
            op.resolve(Err(Error::MissingResponse {
                request_id: id,
                method,
            }));
            summary.missing += 1;
        }

        let leftover = errors.count();
        if leftover > 0 {
            warn!(batch = %trace_id, leftover, "execute errors left unpaired");
        }
        summary
    }

    fn sub_request_error(
        &self,
        method: &str,
        params: &Params,
        reported: Option<ExecuteError>,
    ) -> SubRequestError {
        let (code, message) = match reported {
            Some(e) => (e.error_code, e.error_msg),
            None => (0, "sub-call failed without a reported error".to_string()),
        };
        SubRequestError {
            method: method.to_string(),
            code,
            message,
            request_params: params
                .iter()
                .filter(|(name, _)| name.as_str() != self.credential_param)
                .map(|(name, value)| (name.clone(), form_value(value)))
                .collect(),
        }
    }
}
