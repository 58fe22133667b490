//! 批处理模块：把并发的单次调用合并为一次 run-many 脚本调用。
//!
//! # Request Batching Module
//!
//! Independent calls submitted concurrently are collected into a batch, compiled into
//! one composite script and executed by the run-many endpoint under a single
//! credential. Each caller still receives only its own result or error.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Batcher`] | Coordinator task: accepts calls, triggers sends by size, timer or flush |
//! | [`OpenBatch`] / [`SealedBatch`] | Batch accepting calls / frozen batch being sent |
//! | [`script`] | Pure batch -> script encoder |
//! | [`Executor`] | Sends a script to the run-many endpoint |
//! | [`ResponseRouter`] | Routes the aggregate result back to each caller |
//!
//! ## Triggers
//!
//! - **Size**: the batch reaches `max_batch_size` (at most 25)
//! - **Timer**: `flush_interval` passed since the last send
//! - **Explicit**: [`Batcher::flush`]
//! - **Shutdown**: the open batch is sent before the coordinator exits
//!
//! ## Oversize Responses
//!
//! When the endpoint rejects a batch because the combined response is too large, the
//! batch is split in half and both halves are sent again, recursively, until each
//! half fits or consists of a single call.
//!
//! ## Example
//!
//! ```rust
//! use call_packer::batch::script::{encode, ScriptCall};
//! use call_packer::types::Params;
//! use serde_json::json;
//!
//! let mut params = Params::new();
//! params.insert("x".into(), json!(1));
//!
//! let script = encode(
//!     [ScriptCall { id: "req1", method: "A", params: &params }],
//!     "access_token",
//! );
//! assert_eq!(script, "var req1 = API.A({\"x\":1});\nreturn {\"req1\":req1};");
//! ```

mod batcher;
mod collector;
mod executor;
mod pending;
mod router;
pub mod script;

pub use batcher::{BatchContext, Batcher};
pub use collector::{BatchAddResult, BatchConfig, OpenBatch, RequestId, SealedBatch};
pub use executor::Executor;
pub use pending::PendingOperation;
pub use router::{ResponseRouter, RouteSummary};
