//! 类型模块：参数、响应与 run-many 封包的核心数据类型。
//!
//! # Types Module
//!
//! Core data types shared by the batched and the single-call paths.
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Params`] | Method parameters (ordered name -> JSON value map) |
//! | [`ApiResponse`] | Raw, still-encoded result of one remote call |
//! | [`Envelope`] | Response envelope shared by every endpoint |
//! | [`AggregateResult`] | Decoded run-many result: per-id responses plus ordered sub-errors |
//!
//! ## Submodules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`params`] | Parameter map and the form/script value formatters |
//! | [`response`] | Raw responses, envelopes, aggregate results |
//!
//! ## Example
//!
//! ```rust
//! use call_packer::types::{params, Params};
//! use serde_json::json;
//!
//! let mut p = Params::new();
//! p.insert("user_ids".into(), json!([1, 2, 3]));
//! p.insert("fields".into(), json!("photo_50"));
//!
//! assert_eq!(params::form_value(&p["user_ids"]), "1,2,3");
//! assert_eq!(params::script_literal(&p["fields"]), "\"photo_50\"");
//! ```

pub mod params;
pub mod response;

pub use params::Params;
pub use response::{AggregateResult, ApiResponse, Envelope, ExecuteError, RemoteError};
