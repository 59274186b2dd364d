//! Native protocol backend.
//!
//! Queries go through a lazily created `clickhouse_rs::Pool`. The driver
//! call runs in its own task so a dropped attempt (timeout or shutdown)
//! aborts the query instead of leaving it running in the background.

use crate::db::backend::QueryBackend;
use crate::db::types::{NativeColumn, NativeResult, NativeValue, RawResult};
use crate::error::{GatewayError, GatewayResult, from_native};
use crate::models::{EndpointConfig, TransportKind};
use async_trait::async_trait;
use clickhouse_rs::types::{Block, Complex, FromSql, FromSqlResult, Options, ValueRef};
use clickhouse_rs::Pool;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

/// Upper bound of pooled native connections.
const NATIVE_POOL_MAX: usize = 10;

pub struct NativeBackend {
    endpoint: EndpointConfig,
    addr: Url,
    pool: RwLock<Option<Pool>>,
    /// Number of pools created so far
    generation: AtomicU64,
}

impl NativeBackend {
    /// Create a backend for the endpoint's native port. No connection is opened yet.
    pub fn new(endpoint: EndpointConfig) -> GatewayResult<Self> {
        let addr = endpoint
            .native_addr()
            .ok_or_else(|| GatewayError::config("native port is not configured"))?;
        let addr = Url::parse(&addr)
            .map_err(|e| GatewayError::config(format!("invalid native address: {}", e)))?;
        Ok(Self {
            endpoint,
            addr,
            pool: RwLock::new(None),
            generation: AtomicU64::new(0),
        })
    }

    fn options(&self) -> Options {
        let options = Options::new(self.addr.clone())
            .database(&self.endpoint.database)
            .username(&self.endpoint.username)
            .password(&self.endpoint.password)
            .pool_min(1)
            .pool_max(NATIVE_POOL_MAX)
            .send_retries(0)
            .ping_timeout(self.endpoint.connect_timeout)
            .connection_timeout(self.endpoint.connect_timeout)
            .query_timeout(self.endpoint.read_timeout);

        if self.endpoint.readonly > 0 {
            options.with_setting("readonly", u64::from(self.endpoint.readonly), true)
        } else {
            options
        }
    }

    /// Get the cached pool, creating it on first use.
    async fn pool(&self) -> Pool {
        if let Some(pool) = self.pool.read().await.as_ref() {
            return pool.clone();
        }

        let mut guard = self.pool.write().await;
        // Re-check after acquiring the write lock
        if let Some(pool) = guard.as_ref() {
            return pool.clone();
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            host = %self.endpoint.host,
            port = ?self.endpoint.native_port,
            generation,
            "Creating native connection pool"
        );
        let pool = Pool::new(self.options());
        *guard = Some(pool.clone());
        pool
    }
}

impl std::fmt::Debug for NativeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeBackend")
            .field("endpoint", &self.endpoint)
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl QueryBackend for NativeBackend {
    fn kind(&self) -> TransportKind {
        TransportKind::Native
    }

    fn attempt_ceiling(&self) -> Duration {
        self.endpoint.connect_timeout + self.endpoint.read_timeout
    }

    async fn execute(&self, sql: &str) -> GatewayResult<RawResult> {
        let pool = self.pool().await;
        let sql = sql.to_string();

        let mut task = AbortOnDrop(tokio::spawn(async move {
            let mut handle = pool.get_handle().await?;
            let block = handle.query(sql).fetch_all().await?;
            read_block(&block)
        }));

        match (&mut task.0).await {
            Ok(Ok(result)) => {
                debug!(rows = result.row_count, columns = result.columns.len(), "Native query finished");
                Ok(RawResult::Native(result))
            }
            Ok(Err(e)) => Err(from_native(e).with_budget(self.endpoint.read_timeout)),
            // The driver panics when a query yields no blocks at all.
            Err(e) if e.is_panic() => Err(GatewayError::transport(
                TransportKind::Native,
                "driver returned no result blocks",
            )),
            Err(e) => Err(GatewayError::internal(format!("native query task failed: {}", e))),
        }
    }

    async fn invalidate(&self) {
        if self.pool.write().await.take().is_some() {
            debug!("Dropped native connection pool");
        }
    }

    async fn close(&self) {
        if self.pool.write().await.take().is_some() {
            info!("Closed native connection pool");
        }
    }
}

/// Aborts the spawned task when the owning future is dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn read_block(block: &Block<Complex>) -> clickhouse_rs::errors::Result<NativeResult> {
    let columns = block
        .columns()
        .iter()
        .map(|c| NativeColumn {
            name: c.name().to_string(),
            type_name: c.sql_type().to_string().into_owned(),
        })
        .collect();

    let row_count = block.row_count();
    let mut rows = Vec::with_capacity(row_count);
    for row in 0..row_count {
        let values = (0..block.column_count())
            .map(|col| block.get::<NativeValue, usize>(row, col))
            .collect::<clickhouse_rs::errors::Result<Vec<_>>>()?;
        rows.push(values);
    }

    Ok(NativeResult {
        columns,
        rows,
        row_count,
    })
}

impl<'a> FromSql<'a> for NativeValue {
    fn from_sql(value: ValueRef<'a>) -> FromSqlResult<Self> {
        Ok(native_value(value))
    }
}

fn native_value(value: ValueRef<'_>) -> NativeValue {
    match value {
        ValueRef::Bool(v) => NativeValue::Bool(v),
        ValueRef::UInt8(_)
        | ValueRef::UInt16(_)
        | ValueRef::UInt32(_)
        | ValueRef::UInt64(_)
        | ValueRef::Int8(_)
        | ValueRef::Int16(_)
        | ValueRef::Int32(_)
        | ValueRef::Int64(_)
        | ValueRef::Decimal(_) => NativeValue::Number(value.to_string()),
        ValueRef::Float32(v) => NativeValue::Number(float_text(v.is_nan(), v.to_string())),
        ValueRef::Float64(v) => NativeValue::Number(float_text(v.is_nan(), v.to_string())),
        ValueRef::String(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => NativeValue::Text(s.to_string()),
            Err(_) => NativeValue::Bytes(bytes.to_vec()),
        },
        ValueRef::Nullable(inner) => inner
            .right()
            .map_or(NativeValue::Null, |v| native_value(*v)),
        ValueRef::Array(_, items) => {
            NativeValue::Array(items.iter().cloned().map(native_value).collect())
        }
        ValueRef::Map(_, _, entries) => NativeValue::Map(
            entries
                .iter()
                .map(|(k, v)| (native_value(k.clone()), native_value(v.clone())))
                .collect(),
        ),
        ValueRef::Enum8(names, code) => {
            let code = code.internal();
            match names.iter().find(|(_, c)| *c == code) {
                Some((name, _)) => NativeValue::Text(name.clone()),
                None => NativeValue::Number(code.to_string()),
            }
        }
        ValueRef::Enum16(names, code) => {
            let code = code.internal();
            match names.iter().find(|(_, c)| *c == code) {
                Some((name, _)) => NativeValue::Text(name.clone()),
                None => NativeValue::Number(code.to_string()),
            }
        }
        ValueRef::Date(_)
        | ValueRef::DateTime(..)
        | ValueRef::DateTime64(..)
        | ValueRef::Ipv4(_)
        | ValueRef::Ipv6(_)
        | ValueRef::Uuid(_) => NativeValue::Text(value.to_string()),
    }
}

/// Spell non-finite floats the way ClickHouse prints them.
fn float_text(is_nan: bool, text: String) -> String {
    if is_nan { "nan".to_string() } else { text }
}
