//! Connection management and transport failover.
//!
//! The [`ConnectionManager`] owns one backend per configured transport and
//! runs each statement on them in order: the transport that last succeeded
//! first, the other one as a single fallback. Both attempts share one
//! call-level time budget.

use crate::db::backend::QueryBackend;
use crate::db::http::HttpBackend;
use crate::db::native::NativeBackend;
use crate::db::params;
use crate::db::types::Execution;
use crate::error::{GatewayError, GatewayResult};
use crate::models::{EndpointConfig, QueryParams, TransportKind};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Runs statements against ClickHouse with native/HTTP failover.
pub struct ConnectionManager {
    native: Option<Arc<dyn QueryBackend>>,
    http: Option<Arc<dyn QueryBackend>>,
    /// Transport that succeeded last; reset when every attempt fails.
    preferred: RwLock<Option<TransportKind>>,
}

impl ConnectionManager {
    /// Create a manager from explicit backends. At least one is required.
    pub fn new(
        native: Option<Arc<dyn QueryBackend>>,
        http: Option<Arc<dyn QueryBackend>>,
    ) -> GatewayResult<Self> {
        if native.is_none() && http.is_none() {
            return Err(GatewayError::config("no ClickHouse transport is configured"));
        }
        Ok(Self {
            native,
            http,
            preferred: RwLock::new(None),
        })
    }

    /// Create a manager with a backend for every port the endpoint configures.
    pub fn from_endpoint(endpoint: &EndpointConfig) -> GatewayResult<Self> {
        let native = match endpoint.native_port {
            Some(_) => Some(Arc::new(NativeBackend::new(endpoint.clone())?) as Arc<dyn QueryBackend>),
            None => None,
        };
        let http = match endpoint.http_port {
            Some(_) => Some(Arc::new(HttpBackend::new(endpoint.clone())?) as Arc<dyn QueryBackend>),
            None => None,
        };

        info!(
            host = %endpoint.host,
            native_port = ?endpoint.native_port,
            http_port = ?endpoint.http_port,
            database = %endpoint.database,
            "Connection manager configured"
        );
        Self::new(native, http)
    }

    fn backend(&self, kind: TransportKind) -> Option<&Arc<dyn QueryBackend>> {
        match kind {
            TransportKind::Native => self.native.as_ref(),
            TransportKind::Http => self.http.as_ref(),
        }
    }

    /// Configured transports, native first.
    pub fn transports(&self) -> Vec<TransportKind> {
        [TransportKind::Native, TransportKind::Http]
            .into_iter()
            .filter(|kind| self.backend(*kind).is_some())
            .collect()
    }

    /// The transport that succeeded last, if any.
    pub async fn preferred(&self) -> Option<TransportKind> {
        *self.preferred.read().await
    }

    /// Transports in the order the next call will try them.
    pub async fn attempt_order(&self) -> Vec<TransportKind> {
        let first = self.preferred().await.unwrap_or(TransportKind::Native);
        [first, first.other()]
            .into_iter()
            .filter(|kind| self.backend(*kind).is_some())
            .collect()
    }

    async fn set_preferred(&self, kind: Option<TransportKind>) {
        // Skip the write lock when nothing changes
        if *self.preferred.read().await == kind {
            return;
        }
        let mut preferred = self.preferred.write().await;
        if *preferred != kind {
            debug!(from = ?*preferred, to = ?kind, "Preferred transport changed");
            *preferred = kind;
        }
    }

    /// Execute a classified statement.
    ///
    /// Parameters are rendered once; the same text goes to every attempt.
    /// Transport and timeout failures fall back to the other transport
    /// while budget remains. Any other failure is returned as-is.
    pub async fn execute(
        &self,
        statement: &str,
        params: Option<&QueryParams>,
        timeout: Duration,
    ) -> GatewayResult<Execution> {
        let sql = params::render(statement, params)?;
        let started = Instant::now();
        let deadline = started + timeout;
        let mut last_error: Option<GatewayError> = None;

        let order = self.attempt_order().await;
        for (attempt, kind) in order.iter().copied().enumerate() {
            let Some(backend) = self.backend(kind) else {
                continue;
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let has_fallback = attempt + 1 < order.len();
            let limit = if has_fallback {
                first_attempt_limit(remaining, timeout, backend.attempt_ceiling())
            } else {
                remaining
            };

            let outcome = match tokio::time::timeout(limit, backend.execute(&sql)).await {
                Ok(outcome) => outcome,
                Err(_) if limit < remaining => Err(GatewayError::timeout(kind, limit)),
                Err(_) => Err(GatewayError::timeout(kind, timeout)),
            };

            match outcome {
                Ok(result) => {
                    self.set_preferred(Some(kind)).await;
                    let elapsed = started.elapsed();
                    debug!(transport = %kind, elapsed_ms = elapsed.as_millis() as u64, "Statement executed");
                    return Ok(Execution {
                        transport: kind,
                        result,
                        elapsed,
                    });
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(transport = %kind, error = %e, "Transport attempt failed");
                    backend.invalidate().await;
                    last_error = Some(e);
                }
            }
        }

        self.set_preferred(None).await;
        Err(last_error.unwrap_or_else(|| {
            let kind = self.transports().first().copied().unwrap_or(TransportKind::Native);
            GatewayError::timeout(kind, timeout)
        }))
    }

    /// Run a health check on every configured transport.
    pub async fn check_transports(&self, timeout: Duration) -> Vec<(TransportKind, GatewayResult<()>)> {
        let mut results = Vec::new();
        for kind in self.transports() {
            let Some(backend) = self.backend(kind) else {
                continue;
            };
            let result = match tokio::time::timeout(timeout, backend.health_check()).await {
                Ok(result) => result,
                Err(_) => Err(GatewayError::timeout(kind, timeout)),
            };
            match &result {
                Ok(()) => info!(transport = %kind, "ClickHouse reachable"),
                Err(e) => warn!(transport = %kind, error = %e, "ClickHouse not reachable"),
            }
            results.push((kind, result));
        }
        results
    }

    /// Close all connections.
    pub async fn close_all(&self) {
        let backends: Vec<&Arc<dyn QueryBackend>> =
            self.native.iter().chain(self.http.iter()).collect();
        for backend in &backends {
            info!(transport = %backend.kind(), "Closing connection");
        }
        join_all(backends.iter().map(|backend| backend.close())).await;
        self.set_preferred(None).await;
        info!("All connections closed");
    }
}

/// Time the first of two attempts may take. Half the budget stays reserved
/// for the fallback, and an attempt never outlives its driver's own ceiling.
fn first_attempt_limit(remaining: Duration, budget: Duration, ceiling: Duration) -> Duration {
    remaining.min(budget / 2).min(ceiling)
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("transports", &self.transports())
            .finish_non_exhaustive()
    }
}
