//! Database access layer.
//!
//! This module provides ClickHouse access:
//! - Transport backends (native protocol and HTTP interface)
//! - Connection management with failover between them
//! - Client-side parameter rendering
//! - Result normalization

pub mod backend;
pub mod http;
pub mod native;
pub mod params;
pub mod pool;
pub mod types;

pub use backend::QueryBackend;
pub use http::HttpBackend;
pub use native::NativeBackend;
pub use pool::ConnectionManager;
pub use types::{Cell, Execution, NormalizedResult, RawResult, normalize};
