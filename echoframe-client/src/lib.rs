//! # echoframe-client
//!
//! Client library for echoframe.
//!
//! This crate provides:
//! - Async TCP client with connect and request timeouts
//! - Frame send with raw or framed reply handling
//! - A high-level [`Client`] API over the connection

pub mod client;
pub mod connection;
pub mod error;

pub use client::Client;
pub use connection::{Connection, ConnectionConfig};
pub use error::ClientError;
