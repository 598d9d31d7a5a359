//! Shared library for cross-cutting concerns in Armedis Rust services.
//!
//! This crate provides centralized implementations for:
//! - Error types shared by the outbound HTTP layer
//! - HTTP client configuration with bounded timeouts
//! - Tracing subscriber setup for host binaries

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod http;
pub mod tracing_config;

pub use error::PlatformError;
pub use http::{HttpConfig, build_http_client};
pub use tracing_config::{TracingConfig, init_tracing};
