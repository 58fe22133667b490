//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use call_packer::transport::Transport;
use call_packer::types::{Envelope, Params};
use call_packer::{Packer, PackerBuilder};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, Once};

static TRACING: Once = Once::new();

/// Install a test subscriber honoring `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

type Responder = dyn Fn(&str, &Params) -> Value + Send + Sync;

/// In-memory transport answering from a closure and recording every call.
pub struct FakeTransport {
    responder: Box<Responder>,
    calls: Mutex<Vec<(String, Params)>>,
}

impl FakeTransport {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&str, &Params) -> Value + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Answers run-many calls by echoing each sub-call's method name, and single calls
    /// with `{"response": "<method>"}`.
    pub fn echo() -> Arc<Self> {
        Self::new(|method, params| {
            if method == "execute" {
                json!({ "response": echo_script(script_of(params)) })
            } else {
                json!({ "response": method })
            }
        })
    }

    pub fn calls(&self) -> Vec<(String, Params)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn run_many_scripts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(m, _)| m == "execute")
            .map(|(_, p)| script_of(&p).to_string())
            .collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls().iter().filter(|(m, _)| m == method).count()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn call(&self, method: &str, params: &Params) -> call_packer::Result<Envelope> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params.clone()));
        let body = (self.responder)(method, params);
        Envelope::from_slice(body.to_string().as_bytes())
    }
}

pub fn script_of(params: &Params) -> &str {
    params.get("code").and_then(Value::as_str).unwrap_or_default()
}

/// `(id, method)` of every declaration in a composite script.
pub fn parse_script(script: &str) -> Vec<(String, String)> {
    script
        .lines()
        .filter_map(|line| {
            let rest = line.strip_prefix("var ")?;
            let (id, rest) = rest.split_once(" = API.")?;
            let (method, _) = rest.split_once('(')?;
            Some((id.to_string(), method.to_string()))
        })
        .collect()
}

pub fn echo_script(script: &str) -> serde_json::Map<String, Value> {
    parse_script(script)
        .into_iter()
        .map(|(id, method)| (id, json!(method)))
        .collect()
}

pub fn params(value: Value) -> Params {
    serde_json::from_value(value).unwrap()
}

/// Builder wired to `transport` with no timer and no environment overrides.
pub fn builder(transport: Arc<FakeTransport>) -> PackerBuilder {
    init_tracing();
    Packer::builder()
        .config(call_packer::PackerConfig::default())
        .flush_interval(None)
        .transport(transport)
}
