//! # call-packer
//!
//! 透明的请求合并中间件：把并发的独立调用打包成一次 run-many 脚本调用。
//!
//! Transparent request coalescing for remote APIs that offer a "run-many" endpoint
//! executing a small script of up to 25 calls in one round trip.
//!
//! ## Overview
//!
//! Callers keep making ordinary single calls through [`Packer::call`]. Calls that pass
//! the method filter are collected into a batch, compiled into one composite script
//! and sent under a single credential. The aggregate response is split back apart and
//! every caller receives only its own result or error. Calls that bypass the batcher go
//! out directly, paced per credential and retried on rate-limit rejections.
//!
//! ## Key Features
//!
//! - **Batching**: size, timer and explicit flush triggers via [`batch::Batcher`]
//! - **Split-retry**: oversize batches are halved until they fit
//! - **Credentials**: static or lazily learned pool, round-robin via [`credentials`]
//! - **Rate limiting**: per-credential token buckets with idle eviction via [`resilience`]
//! - **Typed errors**: sub-call failures carry code, message and the call's parameters
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use call_packer::{Packer, Params};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> call_packer::Result<()> {
//!     let packer = Packer::builder()
//!         .static_credentials(["service-token"])
//!         .build()?;
//!
//!     let mut params = Params::new();
//!     params.insert("user_ids".into(), json!([1, 2, 3]));
//!     let users = packer.call("users.get", params).await?;
//!     println!("{}", users.raw());
//!
//!     packer.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`Packer`] facade, builder and the direct single-call path |
//! | [`batch`] | Batch lifecycle, script encoding, run-many execution, response routing |
//! | [`credentials`] | Credential pool |
//! | [`resilience`] | Per-credential rate limiting |
//! | [`transport`] | HTTP transport and the [`transport::Transport`] seam |
//! | [`types`] | Parameters, responses, envelopes |
//! | [`config`] | Configuration and YAML loading |

pub mod batch;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error_code;
pub mod resilience;
pub mod transport;
pub mod types;

pub use client::{Packer, PackerBuilder};
pub use config::PackerConfig;
pub use error_code::ErrorClass;
pub use types::{ApiResponse, Params};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
