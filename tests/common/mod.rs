//! Fake ClickHouse endpoints shared by the integration tests.

#![allow(dead_code)]

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

/// A request the fake HTTP interface received.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub query: HashMap<String, String>,
    pub user: Option<String>,
    pub key: Option<String>,
    pub body: String,
}

#[derive(Clone, Copy)]
pub enum Mode {
    /// Answer with JSONCompact
    Serve,
    /// Answer with an HTTP 500 carrying a ClickHouse exception
    Fail,
    /// Never answer
    Hang,
}

#[derive(Clone)]
struct FakeState {
    mode: Mode,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

/// A fake ClickHouse HTTP interface on 127.0.0.1.
pub struct FakeHttp {
    pub port: u16,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl FakeHttp {
    pub async fn start(mode: Mode) -> Self {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let state = FakeState {
            mode,
            seen: seen.clone(),
        };
        let app = Router::new().route("/", post(handle)).with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { port, seen }
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

async fn handle(
    State(state): State<FakeState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let body = String::from_utf8_lossy(&body).to_string();
    state.seen.lock().unwrap().push(SeenRequest {
        query,
        user: header("x-clickhouse-user"),
        key: header("x-clickhouse-key"),
        body: body.clone(),
    });

    match state.mode {
        Mode::Serve => (StatusCode::OK, answer(&body)),
        Mode::Fail => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Code: 60. DB::Exception: Table default.missing does not exist. (UNKNOWN_TABLE)\n"
                .to_string(),
        ),
        Mode::Hang => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            (StatusCode::OK, String::new())
        }
    }
}

/// Answers for the statements the tests send: JSONCompact unless the
/// statement asks for TSV.
fn answer(body: &str) -> String {
    if body.ends_with("FORMAT TSV") {
        "events\tMergeTree\nusers\tMemory\n".to_string()
    } else if body.starts_with("SHOW TABLES") {
        r#"{"meta":[{"name":"name","type":"String"}],"data":[["events"],["users"]],"rows":2,"statistics":{"elapsed":0.0001,"rows_read":2,"bytes_read":64}}"#.to_string()
    } else if body.starts_with("SELECT count()") {
        r#"{"meta":[{"name":"count()","type":"UInt64"}],"data":[["18446744073709551615"]],"rows":1}"#.to_string()
    } else if body.starts_with("SELECT * FROM empty") {
        r#"{"meta":[{"name":"id","type":"UInt32"},{"name":"tags","type":"Array(String)"}],"data":[],"rows":0}"#.to_string()
    } else {
        r#"{"meta":[{"name":"1","type":"UInt8"}],"data":[[1]],"rows":1}"#.to_string()
    }
}

/// A local port nothing listens on.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// A TCP server that accepts connections and never writes a byte.
pub async fn silent_tcp() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    addr
}
