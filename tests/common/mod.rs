// Shared in-memory store for client tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat};
use influx_access::{
    BatchOptions, BatchPoints, ConnectionConfig, InfluxProperties, Point, Pong, Precision,
    QueryResult, Series, StatementResult, StoreConnection, StoreConnector, TransportError,
    TransportResult,
};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Config for database `metrics` with the given `skip_error`
pub fn test_config(skip_error: bool) -> ConnectionConfig {
    let mut properties = InfluxProperties::new("metrics");
    properties.skip_error = skip_error;
    ConnectionConfig::try_from(properties).unwrap()
}

#[derive(Debug, Clone, PartialEq)]
pub struct WrittenPoint {
    pub database: String,
    pub retention_policy: String,
    pub point: Point,
}

#[derive(Default)]
struct FakeState {
    commands: Vec<(String, Option<String>)>,
    points: Vec<WrittenPoint>,
    batches: Vec<BatchPoints>,
    default_database: Option<String>,
    batch_options: Option<BatchOptions>,
    flushes: usize,
    canned: Option<QueryResult>,
    transport_failure: Option<String>,
    statement_failure: Option<(String, String)>,
    write_failure: Option<String>,
}

/// Store that keeps every command and write in memory
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<FakeState>,
    ping_ok: AtomicBool,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        let store = Self::default();
        store.ping_ok.store(true, Ordering::SeqCst);
        Arc::new(store)
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn command_databases(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().commands.iter().map(|(_, db)| db.clone()).collect()
    }

    pub fn points(&self) -> Vec<WrittenPoint> {
        self.state.lock().unwrap().points.clone()
    }

    pub fn batches(&self) -> Vec<BatchPoints> {
        self.state.lock().unwrap().batches.clone()
    }

    pub fn default_database(&self) -> Option<String> {
        self.state.lock().unwrap().default_database.clone()
    }

    pub fn batch_options(&self) -> Option<BatchOptions> {
        self.state.lock().unwrap().batch_options.clone()
    }

    pub fn flushes(&self) -> usize {
        self.state.lock().unwrap().flushes
    }

    /// Answer every `SELECT` with `result` instead of the stored points
    pub fn respond_with(&self, result: QueryResult) {
        self.state.lock().unwrap().canned = Some(result);
    }

    /// Fail every query at the transport level
    pub fn fail_queries(&self, message: &str) {
        self.state.lock().unwrap().transport_failure = Some(message.to_string());
    }

    /// Report a statement error for commands starting with `prefix`
    pub fn statement_error_on(&self, prefix: &str, message: &str) {
        self.state.lock().unwrap().statement_failure =
            Some((prefix.to_string(), message.to_string()));
    }

    pub fn fail_writes(&self, message: &str) {
        self.state.lock().unwrap().write_failure = Some(message.to_string());
    }

    pub fn set_ping(&self, ok: bool) {
        self.ping_ok.store(ok, Ordering::SeqCst);
    }

    fn select(state: &FakeState, command: &str) -> QueryResult {
        if let Some(canned) = &state.canned {
            return canned.clone();
        }

        let measurement = command
            .split_whitespace()
            .skip_while(|w| !w.eq_ignore_ascii_case("FROM"))
            .nth(1)
            .unwrap_or_default()
            .trim_matches('"');

        let mut written: Vec<&Point> = state
            .points
            .iter()
            .map(|w| &w.point)
            .chain(state.batches.iter().flat_map(|b| b.points()))
            .filter(|p| p.name() == measurement)
            .collect();
        written.sort_by_key(|p| nanos(p));

        if written.is_empty() {
            return statement(None);
        }

        let tag_keys: BTreeSet<&String> = written.iter().flat_map(|p| p.tags().keys()).collect();
        let field_keys: BTreeSet<&String> =
            written.iter().flat_map(|p| p.fields().keys()).collect();

        let mut columns = vec!["time".to_string()];
        columns.extend(tag_keys.iter().map(|k| k.to_string()));
        columns.extend(field_keys.iter().map(|k| k.to_string()));

        let values = written
            .iter()
            .map(|p| {
                let time = DateTime::from_timestamp_nanos(nanos(p))
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true);
                let mut row = vec![Value::String(time)];
                row.extend(tag_keys.iter().map(|k| {
                    p.tags().get(*k).map(|v| Value::String(v.clone())).unwrap_or(Value::Null)
                }));
                row.extend(field_keys.iter().map(|k| {
                    p.fields()
                        .get(*k)
                        .map(|v| serde_json::to_value(v).unwrap())
                        .unwrap_or(Value::Null)
                }));
                row
            })
            .collect();

        statement(Some(vec![Series {
            name: measurement.to_string(),
            tags: None,
            columns,
            values: Some(values),
        }]))
    }
}

fn nanos(point: &Point) -> i64 {
    point
        .time()
        .map(|t| point.precision().convert(t, Precision::Nanoseconds))
        .unwrap_or_default()
}

fn statement(series: Option<Vec<Series>>) -> QueryResult {
    QueryResult {
        results: vec![StatementResult {
            statement_id: 0,
            series,
            error: None,
        }],
        error: None,
    }
}

#[async_trait]
impl StoreConnection for FakeStore {
    async fn query(&self, command: &str, database: Option<&str>) -> TransportResult<QueryResult> {
        let mut state = self.state.lock().unwrap();
        state
            .commands
            .push((command.to_string(), database.map(str::to_string)));

        if let Some(message) = &state.transport_failure {
            return Err(TransportError::Status {
                status: 500,
                message: message.clone(),
            });
        }

        if let Some((prefix, message)) = &state.statement_failure {
            if command.starts_with(prefix.as_str()) {
                return Ok(QueryResult {
                    results: vec![StatementResult {
                        statement_id: 0,
                        series: None,
                        error: Some(message.clone()),
                    }],
                    error: None,
                });
            }
        }

        if command.to_ascii_uppercase().starts_with("SELECT") {
            return Ok(Self::select(&state, command));
        }
        Ok(statement(None))
    }

    async fn write_point(
        &self,
        database: &str,
        retention_policy: &str,
        point: &Point,
    ) -> TransportResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.write_failure {
            return Err(TransportError::Other(message.clone()));
        }
        state.points.push(WrittenPoint {
            database: database.to_string(),
            retention_policy: retention_policy.to_string(),
            point: point.clone(),
        });
        Ok(())
    }

    async fn write_batch(&self, batch: &BatchPoints) -> TransportResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.write_failure {
            return Err(TransportError::Other(message.clone()));
        }
        state.batches.push(batch.clone());
        Ok(())
    }

    fn set_default_database(&self, database: &str) {
        self.state.lock().unwrap().default_database = Some(database.to_string());
    }

    async fn enable_batch(&self, options: BatchOptions) -> TransportResult<()> {
        self.state.lock().unwrap().batch_options = Some(options);
        Ok(())
    }

    async fn disable_batch(&self) -> TransportResult<()> {
        self.state.lock().unwrap().batch_options = None;
        Ok(())
    }

    fn is_batch_enabled(&self) -> bool {
        self.state.lock().unwrap().batch_options.is_some()
    }

    async fn flush(&self) -> TransportResult<()> {
        self.state.lock().unwrap().flushes += 1;
        Ok(())
    }

    async fn ping(&self) -> TransportResult<Pong> {
        if self.ping_ok.load(Ordering::SeqCst) {
            Ok(Pong {
                version: "fake".to_string(),
                response_time: Duration::from_millis(1),
            })
        } else {
            Err(TransportError::Other("ping refused".to_string()))
        }
    }
}

/// Connector handing out one shared [`FakeStore`], counting connect attempts
pub struct FakeConnector {
    pub store: Arc<FakeStore>,
    connects: AtomicUsize,
    refuse: AtomicBool,
    delay: Duration,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    /// Connector whose `connect` takes `delay` to complete
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            store: FakeStore::new(),
            connects: AtomicUsize::new(0),
            refuse: AtomicBool::new(false),
            delay,
        })
    }

    pub fn refusing() -> Arc<Self> {
        let connector = Self::new();
        connector.refuse(true);
        connector
    }

    pub fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreConnector for FakeConnector {
    async fn connect(&self, _config: &ConnectionConfig) -> TransportResult<Arc<dyn StoreConnection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Other("connection refused".to_string()));
        }
        Ok(self.store.clone())
    }
}
