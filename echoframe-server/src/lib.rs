//! # echoframe-server
//!
//! TCP server for echoframe.
//!
//! This crate provides:
//! - TCP connection handling with async I/O
//! - A length-prefixed receive-decode-echo loop per connection
//! - Per-connection session bookkeeping
//! - Layered configuration (defaults, YAML file, environment)

pub mod config;
pub mod error;
pub mod server;
pub mod session;

pub use config::{Config, ConfigError, LimitsConfig, NetworkConfig};
pub use error::ServerError;
pub use server::{Server, ServerConfig, ServerStats};
pub use session::Session;
