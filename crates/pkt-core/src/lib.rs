//! # pkt-core
//!
//! Core types, traits, and error handling for packet-spectrum inference.
//!
//! This crate provides:
//! - Common error types
//! - The [`LogDensityModel`] interface consumed by the optimizer and the
//!   Laplace integrator
//! - Shared result structures

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::LogDensityModel;
pub use types::FitResult;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
