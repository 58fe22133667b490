//! Batch coordinator.
//!
//! One background task owns the open batch. Callers talk to it over a channel, so
//! appends, size triggers, timer triggers and explicit flushes are serialized without a
//! lock. Sealed batches are sent on their own tasks and never block new submissions.

use super::collector::{BatchConfig, OpenBatch, SealedBatch};
use super::executor::Executor;
use super::pending::PendingOperation;
use super::router::ResponseRouter;
use super::script::encode_batch;
use crate::credentials::CredentialPool;
use crate::types::{ApiResponse, Params};
use crate::{Error, ErrorContext, Result};
use async_recursion::async_recursion;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const COMMAND_BUFFER: usize = 1024;

/// Everything a sealed batch needs to reach its callers.
#[derive(Debug)]
pub struct BatchContext {
    pub executor: Executor,
    pub credentials: Arc<CredentialPool>,
    pub router: ResponseRouter,
}

enum Command {
    Submit(PendingOperation),
    Flush(oneshot::Sender<usize>),
}

/// Handle to the coordinator task.
pub struct Batcher {
    tx: mpsc::Sender<Command>,
    cancel: CancellationToken,
    coordinator: Mutex<Option<JoinHandle<()>>>,
}

impl Batcher {
    /// Start the coordinator. Must be called from within a Tokio runtime.
    ///
    /// Cancelling `cancel` sends whatever is still open and stops the coordinator once
    /// every in-flight batch has resolved its callers.
    pub fn spawn(config: BatchConfig, context: BatchContext, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let coordinator = Coordinator {
            open: OpenBatch::new(config.max_batch_size),
            config,
            context: Arc::new(context),
            last_flush: Instant::now(),
            in_flight: JoinSet::new(),
        };
        let handle = tokio::spawn(coordinator.run(rx, cancel.clone()));
        Self {
            tx,
            cancel,
            coordinator: Mutex::new(Some(handle)),
        }
    }

    /// Queue one call and wait for its own result.
    pub async fn submit(&self, method: impl Into<String>, params: Params) -> Result<ApiResponse> {
        let (op, rx) = PendingOperation::new(method, params);
        self.tx
            .send(Command::Submit(op))
            .await
            .map_err(|_| stopped("submit"))?;
        rx.await.map_err(|_| {
            Error::runtime_with_context(
                "call was dropped before a result arrived",
                ErrorContext::new().with_source("batcher"),
            )
        })?
    }

    /// Send the open batch now. Returns how many calls were handed off; `0` when the
    /// batch was empty.
    pub async fn flush(&self) -> Result<usize> {
        let (ack, rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(ack))
            .await
            .map_err(|_| stopped("flush"))?;
        rx.await.map_err(|_| stopped("flush"))
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Stop accepting calls, send the open batch and wait for in-flight batches.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self
            .coordinator
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "batch coordinator ended abnormally");
            }
        }
    }
}

fn stopped(op: &str) -> Error {
    Error::runtime_with_context(
        "batcher is shut down",
        ErrorContext::new().with_details(op).with_source("batcher"),
    )
}

struct Coordinator {
    config: BatchConfig,
    context: Arc<BatchContext>,
    open: OpenBatch,
    last_flush: Instant,
    in_flight: JoinSet<()>,
}

impl Coordinator {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>, cancel: CancellationToken) {
        let mut ticker = self.config.flush_interval.map(|period| {
            let mut t = tokio::time::interval(period);
            t.set_missed_tick_behavior(MissedTickBehavior::Delay);
            t
        });

        debug!(
            max_batch_size = self.config.max_batch_size,
            flush_interval = ?self.config.flush_interval,
            "batch coordinator started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                cmd = rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
                _ = tick(&mut ticker) => self.on_tick(),
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "batch send task failed");
                    }
                }
            }
        }

        // Late commands already queued still belong to a batch.
        rx.close();
        while let Some(cmd) = rx.recv().await {
            self.handle(cmd);
        }
        self.dispatch("shutdown");

        while let Some(joined) = self.in_flight.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "batch send task failed");
            }
        }
        info!("batch coordinator stopped");
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Submit(op) => {
                if self.open.push(op).should_flush() {
                    self.dispatch("size");
                }
            }
            Command::Flush(ack) => {
                let sent = self.dispatch("explicit");
                let _ = ack.send(sent);
            }
        }
    }

    fn on_tick(&mut self) {
        let Some(period) = self.config.flush_interval else {
            return;
        };
        if self.last_flush.elapsed() >= period {
            self.dispatch("timer");
        }
    }

    /// Seal the open batch and hand it to a send task. Empty batches are not sent.
    fn dispatch(&mut self, reason: &'static str) -> usize {
        self.last_flush = Instant::now();
        if self.open.is_empty() {
            return 0;
        }
        let age = self.open.age().unwrap_or_default();
        let fresh = OpenBatch::new(self.config.max_batch_size);
        let batch = std::mem::replace(&mut self.open, fresh).seal();
        let size = batch.len();
        debug!(
            batch = %batch.trace_id(),
            size,
            reason,
            age_ms = age.as_millis() as u64,
            "dispatching batch"
        );
        self.in_flight.spawn(send_batch(Arc::clone(&self.context), batch));
        size
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Send one sealed batch and resolve every member.
///
/// An oversize rejection of a batch with more than one member splits it in two and
/// sends both halves concurrently; a single oversize call fails with the provider error.
#[async_recursion]
async fn send_batch(context: Arc<BatchContext>, batch: SealedBatch) {
    if batch.is_empty() {
        return;
    }

    let Some(credential) = context.credentials.get() else {
        let size = batch.fail_all(Error::configuration_with_context(
            "no credential available for batched call",
            ErrorContext::new().with_source("credential_pool"),
        ));
        warn!(size, "batch failed: credential pool is empty");
        return;
    };

    let script = encode_batch(&batch, context.executor.credential_param());
    match context.executor.run(&credential, &script).await {
        Ok(result) => {
            let trace_id = batch.trace_id().to_string();
            let summary = context.router.route(batch, result);
            debug!(
                batch = %trace_id,
                succeeded = summary.succeeded,
                failed = summary.failed,
                missing = summary.missing,
                unmatched = summary.unmatched,
                "batch resolved"
            );
        }
        Err(err) if err.is_oversize() && batch.len() > 1 => {
            warn!(
                batch = %batch.trace_id(),
                size = batch.len(),
                "response too large, splitting batch"
            );
            let (left, right) = batch.split();
            futures::join!(
                send_batch(Arc::clone(&context), left),
                send_batch(context, right)
            );
        }
        Err(err) => {
            warn!(batch = %batch.trace_id(), size = batch.len(), error = %err, "batch failed");
            batch.fail_all(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PackerConfig;
    use crate::transport::Transport;
    use crate::types::Envelope;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Echoes each call's method name back as its result and rejects scripts with more
    /// than `max_calls` calls as too large.
    struct EchoTransport {
        max_calls: usize,
        calls: AtomicUsize,
    }

    impl EchoTransport {
        fn new(max_calls: usize) -> Arc<Self> {
            Arc::new(Self {
                max_calls,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    /// `var req1 = API.users.get({...});` -> `("req1", "users.get")`
    fn parse_line(line: &str) -> Option<(String, String)> {
        let rest = line.strip_prefix("var ")?;
        let (id, rest) = rest.split_once(" = API.")?;
        let (method, _) = rest.split_once('(')?;
        Some((id.to_string(), method.to_string()))
    }

    #[async_trait]
    impl Transport for EchoTransport {
        async fn call(&self, _method: &str, params: &Params) -> Result<Envelope> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let script = params["code"].as_str().unwrap_or_default();
            let mut response = serde_json::Map::new();
            for (id, method) in script.lines().filter_map(parse_line) {
                response.insert(id, json!(method));
            }
            let body = if response.len() > self.max_calls {
                json!({"error": {"error_code": 13, "error_msg": "response size is too big"}})
            } else {
                json!({ "response": response })
            };
            Envelope::from_slice(body.to_string().as_bytes())
        }
    }

    fn batcher(
        transport: Arc<EchoTransport>,
        config: BatchConfig,
        tokens: &[&str],
    ) -> Arc<Batcher> {
        let packer = PackerConfig::default();
        let context = BatchContext {
            executor: Executor::new(transport, &packer),
            credentials: Arc::new(CredentialPool::new_static(tokens.iter().copied())),
            router: ResponseRouter::new("access_token", false),
        };
        Arc::new(Batcher::spawn(config, context, CancellationToken::new()))
    }

    fn manual(size: usize) -> BatchConfig {
        BatchConfig::new()
            .with_max_batch_size(size)
            .with_flush_interval(None)
    }

    async fn submit_many(b: &Arc<Batcher>, n: usize) -> Vec<Result<ApiResponse>> {
        let calls: Vec<_> = (0..n)
            .map(|i| {
                let b = Arc::clone(b);
                tokio::spawn(async move { b.submit(format!("m{}", i), Params::new()).await })
            })
            .collect();
        let mut out = Vec::new();
        for call in calls {
            out.push(call.await.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_size_trigger_sends_one_batch() {
        let transport = EchoTransport::new(25);
        let b = batcher(transport.clone(), manual(4), &["t"]);

        let results = submit_many(&b, 4).await;
        for (i, result) in results.into_iter().enumerate() {
            assert_eq!(result.unwrap().raw(), format!("\"m{}\"", i));
        }
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_explicit_flush() {
        let transport = EchoTransport::new(25);
        let b = batcher(transport.clone(), manual(25), &["t"]);

        assert_eq!(b.flush().await.unwrap(), 0);

        let pending = {
            let b = Arc::clone(&b);
            tokio::spawn(async move { b.submit("users.get", Params::new()).await })
        };
        // Wait until the submission reached the coordinator.
        let mut sent = 0;
        while sent == 0 {
            tokio::task::yield_now().await;
            sent = b.flush().await.unwrap();
        }
        assert_eq!(sent, 1);
        assert_eq!(pending.await.unwrap().unwrap().raw(), "\"users.get\"");
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_oversize_batch_is_halved_until_it_fits() {
        let transport = EchoTransport::new(2);
        let b = batcher(transport.clone(), manual(10), &["t"]);

        let results = submit_many(&b, 10).await;
        assert_eq!(results.len(), 10);
        for (i, result) in results.into_iter().enumerate() {
            assert_eq!(result.unwrap().raw(), format!("\"m{}\"", i));
        }
        // 10 -> 5+5 -> (3+2)+(3+2) -> 3s split into 2+1
        assert!(transport.calls() > 1);
    }

    #[tokio::test]
    async fn test_single_oversize_call_fails() {
        let transport = EchoTransport::new(0);
        let b = batcher(transport.clone(), manual(1), &["t"]);

        let err = b.submit("wall.get", Params::new()).await.unwrap_err();
        assert!(err.is_oversize());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_pool_fails_batch() {
        let transport = EchoTransport::new(25);
        let b = batcher(transport.clone(), manual(2), &[]);

        let results = submit_many(&b, 2).await;
        for result in results {
            assert!(matches!(result, Err(Error::Configuration { .. })));
        }
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_flushes_partial_batch() {
        let transport = EchoTransport::new(25);
        let config = BatchConfig::new().with_flush_interval(Some(Duration::from_secs(2)));
        let b = batcher(transport.clone(), config, &["t"]);

        let start = Instant::now();
        let resp = b.submit("users.get", Params::new()).await.unwrap();
        assert_eq!(resp.raw(), "\"users.get\"");
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_sends_open_batch() {
        let transport = EchoTransport::new(25);
        let b = batcher(transport.clone(), manual(25), &["t"]);

        let pending = {
            let b = Arc::clone(&b);
            tokio::spawn(async move { b.submit("friends.get", Params::new()).await })
        };
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        b.shutdown().await;
        assert_eq!(pending.await.unwrap().unwrap().raw(), "\"friends.get\"");
        assert!(!b.is_running());

        let err = b.submit("late", Params::new()).await.unwrap_err();
        assert!(matches!(err, Error::Runtime { .. }));
    }
}
