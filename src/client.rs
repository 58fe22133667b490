//! Caller-facing entry point.
//!
//! Keep the public surface small: build a [`Packer`] with [`PackerBuilder`] and use
//! [`Packer::call`] wherever a single remote call would otherwise be made.

pub mod builder;
pub mod core;
pub mod direct;
mod policy;

pub use builder::PackerBuilder;
pub use core::Packer;
pub use direct::DirectCaller;
