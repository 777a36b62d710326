//! # Codebox
//!
//! A sandboxed code execution service built with Rust.
//!
//! ## Features
//!
//! - **Ephemeral Execution:** One-shot runs in resource-capped, network-less containers
//! - **Persistent Sandboxes:** Named long-lived environments with dependency installs
//! - **Swappable Isolation:** Narrow runtime trait over the Docker backend
//! - **Structured Failures:** Every operation returns a payload, never a raw crash

pub mod config;
pub mod engine;
pub mod error;
pub mod languages;
pub mod manager;
pub mod runtime;
pub mod service;

pub use config::ServiceConfig;
pub use error::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
