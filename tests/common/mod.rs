// SPDX-License-Identifier: Apache-2.0

//! In-memory driver and a line-oriented client for driving the request loop.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value as Json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use datawarden_lib::engine::DriverRegistry;
use datawarden_lib::rpc::{self, Dispatcher};
use datawarden_lib::AppState;
use warden_core::{
    CancelStage, Column, ConnectionConfig, DataEngine, DatabaseHandle, Database, EngineError,
    EngineResult, QueryRequest, QueryResult, Table, Value,
};

/// Counters shared by every handle the mock driver opens
#[derive(Default)]
pub struct MockStats {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub list_databases_calls: AtomicUsize,
    pub executed: AtomicUsize,
}

pub struct MockDriver {
    stats: Arc<MockStats>,
}

#[async_trait]
impl DataEngine for MockDriver {
    fn driver_id(&self) -> &'static str {
        "mysql"
    }

    fn driver_name(&self) -> &'static str {
        "In-memory MySQL stand-in"
    }

    async fn open(&self, config: &ConnectionConfig) -> EngineResult<Arc<dyn DatabaseHandle>> {
        if config.host == "unreachable" {
            return Err(EngineError::connection_failed(format!(
                "connection refused: MySQL server is not running on {}:{}, or the port is blocked by a firewall",
                config.host, config.port
            )));
        }
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockHandle {
            stats: Arc::clone(&self.stats),
            closed: Default::default(),
        }))
    }
}

struct MockHandle {
    stats: Arc<MockStats>,
    closed: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl DatabaseHandle for MockHandle {
    async fn version(&self) -> EngineResult<String> {
        Ok("8.0.36-mock".to_string())
    }

    async fn health_check(&self) -> EngineResult<()> {
        Ok(())
    }

    async fn list_databases(&self) -> EngineResult<Vec<Database>> {
        self.stats.list_databases_calls.fetch_add(1, Ordering::SeqCst);
        Ok(["crm", "information_schema", "locked", "mysql", "shop"]
            .into_iter()
            .map(Database::new)
            .collect())
    }

    async fn list_tables(&self, database: &str) -> EngineResult<Vec<Table>> {
        if database == "locked" {
            return Err(EngineError::execution(
                "failed to list tables",
                "Access denied for user 'app'@'%' to database 'locked'",
            ));
        }
        Ok(vec![Table {
            name: format!("{database}_main"),
            row_count: 42,
            engine: "InnoDB".to_string(),
            data_length: 16384,
            index_length: 0,
        }])
    }

    async fn list_columns(&self, _database: &str, _table: &str) -> EngineResult<Vec<Column>> {
        panic!("column metadata unavailable");
    }

    async fn execute(
        &self,
        request: &QueryRequest,
        cancel: CancellationToken,
    ) -> EngineResult<QueryResult> {
        if cancel.is_cancelled() {
            return Err(EngineError::cancelled(CancelStage::BeforeExecution));
        }
        self.stats.executed.fetch_add(1, Ordering::SeqCst);

        let sql = request.effective_sql();
        if sql.contains("SLEEP") {
            return tokio::select! {
                _ = cancel.cancelled() => Err(EngineError::cancelled(CancelStage::DuringExecution)),
                _ = tokio::time::sleep(Duration::from_secs(60)) => Ok(QueryResult::from_affected(0, 60_000)),
            };
        }
        if sql.starts_with("SELECT 1") {
            return Ok(QueryResult::from_rows(
                vec!["1".to_string()],
                vec![vec![Value::Int(1)]],
                0,
            ));
        }
        if sql.starts_with("BROKEN") {
            return Err(EngineError::execution(
                "failed to execute query",
                "You have an error in your SQL syntax",
            ));
        }
        Ok(QueryResult::from_affected(1, 0))
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.stats.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A daemon serving one in-memory pipe, and the client end of that pipe
pub struct TestDaemon {
    pub state: Arc<AppState>,
    pub stats: Arc<MockStats>,
    writer: WriteHalf<DuplexStream>,
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    server: JoinHandle<std::io::Result<()>>,
}

impl TestDaemon {
    pub fn start() -> Self {
        let stats = Arc::new(MockStats::default());
        let mut registry = DriverRegistry::new();
        registry.register(Arc::new(MockDriver {
            stats: Arc::clone(&stats),
        }));

        let state = Arc::new(AppState::with_registry(registry));
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&state)));

        let (client, server) = tokio::io::duplex(64 * 1024);
        let (server_reader, server_writer) = tokio::io::split(server);
        let server = tokio::spawn(rpc::serve(
            dispatcher,
            server_reader,
            server_writer,
            Duration::from_secs(2),
        ));

        let (client_reader, writer) = tokio::io::split(client);
        Self {
            state,
            stats,
            writer,
            lines: BufReader::new(client_reader).lines(),
            server,
        }
    }

    pub async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    pub async fn send(&mut self, id: &str, method: &str, params: Json) {
        let request = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        self.send_raw(&request.to_string()).await;
    }

    pub async fn recv(&mut self) -> Json {
        let line = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("response within 5s")
            .unwrap()
            .expect("stream open");
        serde_json::from_str(&line).unwrap()
    }

    /// Sends one request and waits for its response.
    pub async fn call(&mut self, id: &str, method: &str, params: Json) -> Json {
        self.send(id, method, params).await;
        let response = self.recv().await;
        assert_eq!(response["id"], id, "unexpected response {response}");
        response
    }

    pub async fn connect(&mut self, connection_id: &str) {
        let response = self
            .call(
                &format!("connect-{connection_id}"),
                "connect",
                json!({"id": connection_id, "name": "local", "type": "mysql", "host": "localhost", "username": "app"}),
            )
            .await;
        assert_eq!(response["result"], json!({"success": true}), "{response}");
    }

    /// Closes the client's write side and waits for the loop to finish.
    pub async fn finish(self) -> std::io::Result<()> {
        let TestDaemon {
            mut writer, server, ..
        } = self;
        writer.shutdown().await.unwrap();
        drop(writer);
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("loop ends at end of input")
            .unwrap()
    }
}
