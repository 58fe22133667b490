//! Batch collector.
//!
//! A batch is [`OpenBatch`] while it accepts operations and becomes [`SealedBatch`] by
//! consuming the open one, so a sealed batch can never grow and can only be sealed once.

use super::pending::PendingOperation;
use crate::config::{PackerConfig, MAX_BATCH_SIZE};
use crate::Error;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

pub type RequestId = String;

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub max_batch_size: usize,
    /// Timer trigger period; `None` means only size and explicit flushes send.
    pub flush_interval: Option<Duration>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: MAX_BATCH_SIZE,
            flush_interval: Some(Duration::from_secs(2)),
        }
    }
}

impl BatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values outside `1..=25` fall back to 25.
    pub fn with_max_batch_size(mut self, s: usize) -> Self {
        self.max_batch_size = if (1..=MAX_BATCH_SIZE).contains(&s) {
            s
        } else {
            MAX_BATCH_SIZE
        };
        self
    }

    pub fn with_flush_interval(mut self, interval: Option<Duration>) -> Self {
        self.flush_interval = interval;
        self
    }
}

impl From<&PackerConfig> for BatchConfig {
    fn from(config: &PackerConfig) -> Self {
        BatchConfig::new()
            .with_max_batch_size(config.max_batch_size)
            .with_flush_interval(config.flush_interval())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchAddResult {
    Added { count: usize },
    ShouldFlush { count: usize },
}

impl BatchAddResult {
    pub fn should_flush(&self) -> bool {
        matches!(self, BatchAddResult::ShouldFlush { .. })
    }

    pub fn count(&self) -> usize {
        match self {
            BatchAddResult::Added { count } | BatchAddResult::ShouldFlush { count } => *count,
        }
    }
}

/// Batch accepting operations. Ids are `req1`, `req2`, ... in append order.
#[derive(Debug)]
pub struct OpenBatch {
    max_batch_size: usize,
    next_id: u64,
    entries: Vec<(RequestId, PendingOperation)>,
    opened_at: Option<Instant>,
}

impl OpenBatch {
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            max_batch_size: max_batch_size.clamp(1, MAX_BATCH_SIZE),
            next_id: 0,
            entries: Vec::new(),
            opened_at: None,
        }
    }

    fn next_request_id(&mut self) -> RequestId {
        self.next_id += 1;
        format!("req{}", self.next_id)
    }

    pub fn push(&mut self, op: PendingOperation) -> BatchAddResult {
        if self.entries.is_empty() {
            self.opened_at = Some(Instant::now());
        }
        let id = self.next_request_id();
        self.entries.push((id, op));
        let count = self.entries.len();
        if count >= self.max_batch_size {
            BatchAddResult::ShouldFlush { count }
        } else {
            BatchAddResult::Added { count }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Time since the first operation was appended.
    pub fn age(&self) -> Option<Duration> {
        self.opened_at.map(|t| t.elapsed())
    }

    pub fn seal(self) -> SealedBatch {
        SealedBatch {
            trace_id: new_trace_id(),
            entries: self.entries,
        }
    }
}

/// Frozen batch on its way to the run-many endpoint.
#[derive(Debug)]
pub struct SealedBatch {
    trace_id: String,
    entries: Vec<(RequestId, PendingOperation)>,
}

impl SealedBatch {
    /// Build a sealed batch with fresh ids from operations in order.
    pub fn from_operations(ops: Vec<PendingOperation>) -> Self {
        let mut open = OpenBatch::new(MAX_BATCH_SIZE);
        open.entries.reserve(ops.len());
        for op in ops {
            let id = open.next_request_id();
            open.entries.push((id, op));
        }
        open.seal()
    }

    /// Short id used to correlate log lines of one batch.
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(RequestId, PendingOperation)] {
        &self.entries
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(id, _)| id.as_str())
    }

    /// Bisect by count into two new batches with fresh ids. The first half gets the
    /// extra operation when the length is odd.
    pub fn split(self) -> (SealedBatch, SealedBatch) {
        let mut ops: Vec<PendingOperation> = self.entries.into_iter().map(|(_, op)| op).collect();
        let right = ops.split_off(ops.len().div_ceil(2));
        (Self::from_operations(ops), Self::from_operations(right))
    }

    /// Resolve every member with the same error. Returns the number of members.
    pub fn fail_all(self, err: Error) -> usize {
        let count = self.entries.len();
        for (_, op) in self.entries {
            op.resolve(Err(err.clone()));
        }
        count
    }

    pub fn into_pending(self) -> HashMap<RequestId, PendingOperation> {
        self.entries.into_iter().collect()
    }
}

fn new_trace_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}
