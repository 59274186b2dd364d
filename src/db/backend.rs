//! Transport backend trait.
//!
//! Both ClickHouse transports implement [`QueryBackend`] so the connection
//! manager can order, retry and invalidate them without knowing which
//! driver sits underneath.

use crate::db::types::RawResult;
use crate::error::GatewayResult;
use crate::models::TransportKind;
use async_trait::async_trait;
use std::time::Duration;

/// Statement used to check that a transport is reachable.
pub const HEALTH_CHECK_SQL: &str = "SELECT 1";

#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// The transport this backend speaks.
    fn kind(&self) -> TransportKind;

    /// Execute a rendered, read-only statement.
    ///
    /// Backends bound a single attempt by the endpoint's read timeout only.
    /// The caller enforces the call budget by dropping the returned future,
    /// which must abort the query.
    async fn execute(&self, sql: &str) -> GatewayResult<RawResult>;

    /// Longest a single attempt can take before the driver gives up on its own.
    fn attempt_ceiling(&self) -> Duration {
        Duration::MAX
    }

    /// Drop the cached driver handle; the next call recreates it.
    async fn invalidate(&self);

    /// Release the driver handle at shutdown.
    async fn close(&self);

    /// Check the transport is reachable.
    async fn health_check(&self) -> GatewayResult<()> {
        self.execute(HEALTH_CHECK_SQL).await.map(|_| ())
    }
}
