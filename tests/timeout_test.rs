//! Integration tests for call-level timeouts.
//!
//! Fake endpoints accept connections and never answer; every call must
//! come back as a timeout at roughly its budget.

mod common;

use clickhouse_gateway::db::ConnectionManager;
use clickhouse_gateway::models::{EndpointConfig, TransportKind};
use clickhouse_gateway::tools::{QueryInput, QueryOutcome, QueryToolHandler};
use common::{FakeHttp, Mode, silent_tcp};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn handler(endpoint: EndpointConfig) -> QueryToolHandler {
    let manager = Arc::new(ConnectionManager::from_endpoint(&endpoint).unwrap());
    QueryToolHandler::new(manager)
}

fn input(sql: &str, timeout_seconds: u64) -> QueryInput {
    QueryInput {
        sql: sql.to_string(),
        params: None,
        timeout_seconds: Some(timeout_seconds),
        max_rows: None,
    }
}

/// A hanging HTTP interface times out at the call budget.
#[tokio::test]
async fn test_hanging_http_times_out_at_budget() {
    let http = FakeHttp::start(Mode::Hang).await;
    let endpoint = EndpointConfig::new("127.0.0.1", None, Some(http.port))
        .unwrap()
        .with_timeouts(Duration::from_secs(5), Duration::from_secs(60));
    let handler = handler(endpoint);

    let started = Instant::now();
    let outcome = handler.query(input("SELECT sleep(3)", 2)).await;
    let elapsed = started.elapsed();

    assert_eq!(
        outcome,
        QueryOutcome::TimedOut {
            transport: TransportKind::Http,
            secs: 2
        }
    );
    assert!(elapsed >= Duration::from_millis(1900), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(4), "{:?}", elapsed);
}

/// A read timeout shorter than the budget ends the attempt early.
#[tokio::test]
async fn test_read_timeout_bounds_http_attempt() {
    let http = FakeHttp::start(Mode::Hang).await;
    let endpoint = EndpointConfig::new("127.0.0.1", None, Some(http.port))
        .unwrap()
        .with_timeouts(Duration::from_secs(5), Duration::from_secs(1));
    let handler = handler(endpoint);

    let started = Instant::now();
    let outcome = handler.query(input("SELECT 1", 30)).await;

    assert_eq!(
        outcome,
        QueryOutcome::TimedOut {
            transport: TransportKind::Http,
            secs: 1
        }
    );
    assert!(started.elapsed() < Duration::from_secs(4));
}

/// A native server that never completes the handshake only gets part of the
/// budget; the HTTP fallback answers within the rest.
#[tokio::test]
async fn test_hanging_native_falls_back_to_http() {
    let native = silent_tcp().await;
    let http = FakeHttp::start(Mode::Serve).await;
    let endpoint = EndpointConfig::new("127.0.0.1", Some(native.port()), Some(http.port)).unwrap();
    let handler = handler(endpoint);

    let started = Instant::now();
    let outcome = handler.query(input("SHOW TABLES", 5)).await;
    let elapsed = started.elapsed();

    let QueryOutcome::Table(table) = &outcome else {
        panic!("expected a table, got {:?}", outcome);
    };
    assert!(table.contains("| events |"), "{}", table);
    assert!(elapsed >= Duration::from_millis(2400), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(4), "{:?}", elapsed);
    assert_eq!(http.requests().len(), 1);
}

/// Both transports hang: the call ends at the budget, reported for the
/// fallback transport.
#[tokio::test]
async fn test_both_hanging_time_out_at_budget() {
    let native = silent_tcp().await;
    let http = FakeHttp::start(Mode::Hang).await;
    let endpoint = EndpointConfig::new("127.0.0.1", Some(native.port()), Some(http.port)).unwrap();
    let handler = handler(endpoint);

    let started = Instant::now();
    let outcome = handler.query(input("SELECT sleep(10)", 5)).await;
    let elapsed = started.elapsed();

    assert_eq!(
        outcome,
        QueryOutcome::TimedOut {
            transport: TransportKind::Http,
            secs: 5
        }
    );
    assert!(elapsed >= Duration::from_millis(4900), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(6), "{:?}", elapsed);
}

/// The timeout message names the transport and the budget.
#[tokio::test]
async fn test_timeout_message() {
    let http = FakeHttp::start(Mode::Hang).await;
    let endpoint = EndpointConfig::new("127.0.0.1", None, Some(http.port)).unwrap();
    let handler = handler(endpoint);

    let outcome = handler.query(input("SELECT 1", 1)).await;
    assert_eq!(outcome.to_string(), "http transport timed out after 1s");

    let err = outcome.into_tool_result().unwrap_err();
    let data = err.data.unwrap();
    assert_eq!(data["kind"], "timeout");
    assert_eq!(data["transport"], "http");
}
