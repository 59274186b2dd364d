//! ClickHouse Gateway Library
//!
//! This library provides an MCP (Model Context Protocol) tool for AI assistants
//! to run read-only SQL against ClickHouse, over the native protocol with
//! automatic fallback to the HTTP interface.

pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::GatewayError;
pub use mcp::GatewayService;
