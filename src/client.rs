use chrono::{DateTime, FixedOffset, Utc};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::config::{BatchOptions, ConnectionConfig};
use crate::error::{InfluxError, Result, TransportError};
use crate::store::{StoreConnection, StoreConnector};
use crate::transport::HttpConnector;
use crate::translate::{self, Record, DEFAULT_TIME_FORMAT};
use crate::types::{BatchPoints, Fields, Point, Precision, QueryResult, RetentionPolicy, Tags};
use crate::write;

/// Outcome of the first connection attempt
#[derive(Clone)]
pub enum ConnectionState {
    /// Connected, database and retention policy in place
    Live(Arc<dyn StoreConnection>),
    /// Bootstrap failed with `skip_error` set; every operation is a no-op
    Degraded,
}

impl std::fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Live(_) => write!(f, "Live"),
            ConnectionState::Degraded => write!(f, "Degraded"),
        }
    }
}

/// Lazily connecting InfluxDB client
///
/// The connection is built on first use and shared by every caller afterwards. Concurrent
/// first callers wait on the same initialization, so exactly one connection is opened.
/// When the bootstrap fails and the configuration has `skip_error` set, the client
/// degrades for good: queries return empty results and writes are dropped.
///
/// # Example
///
/// ```no_run
/// use influx_access::{ConnectionConfig, InfluxClient, InfluxProperties};
/// use std::collections::BTreeMap;
///
/// # async fn run() -> influx_access::Result<()> {
/// let config = ConnectionConfig::try_from(InfluxProperties::new("telemetry"))?;
/// let client = InfluxClient::new(config);
///
/// let tags = BTreeMap::from([("host".to_string(), "a".to_string())]);
/// let fields = BTreeMap::from([("usage".to_string(), 42.5.into())]);
/// client.insert("cpu", &tags, &fields).await?;
///
/// let rows = client.query_records("SELECT * FROM cpu").await?;
/// # Ok(())
/// # }
/// ```
pub struct InfluxClient {
    config: ConnectionConfig,
    connector: Arc<dyn StoreConnector>,
    state: OnceCell<ConnectionState>,
}

impl InfluxClient {
    /// Create a client backed by the HTTP transport. No I/O happens until first use.
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_connector(config, Arc::new(HttpConnector))
    }

    /// Create a client with a custom connection strategy
    pub fn with_connector(config: ConnectionConfig, connector: Arc<dyn StoreConnector>) -> Self {
        info!("Initializing InfluxClient: {}", config);
        Self {
            config,
            connector,
            state: OnceCell::new(),
        }
    }

    /// Create an HTTP-backed client and connect right away
    pub async fn connect(config: ConnectionConfig) -> Result<Self> {
        Self::connect_with(config, Arc::new(HttpConnector)).await
    }

    /// Create a client with a custom connection strategy and connect right away
    pub async fn connect_with(
        config: ConnectionConfig,
        connector: Arc<dyn StoreConnector>,
    ) -> Result<Self> {
        let client = Self::with_connector(config, connector);
        client.ensure_connected().await?;
        Ok(client)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Connect if no connection exists yet and return the connection state.
    ///
    /// Failed attempts without `skip_error` leave the client unconnected, so the next call
    /// tries again. Once a state is stored it is kept until [`InfluxClient::reset`].
    pub async fn ensure_connected(&self) -> Result<&ConnectionState> {
        self.state.get_or_try_init(|| self.build_state()).await
    }

    async fn build_state(&self) -> Result<ConnectionState> {
        match self.bootstrap().await {
            Ok(connection) => {
                info!(
                    "InfluxDB ready: database={}, retention_policy={}",
                    self.config.database(),
                    self.config.retention_policy()
                );
                Ok(ConnectionState::Live(connection))
            }
            Err(message) if self.config.skip_error() => {
                warn!(
                    "InfluxDB unavailable, continuing without it (skip_error set): {}",
                    message
                );
                Ok(ConnectionState::Degraded)
            }
            Err(message) => {
                error!("InfluxDB connection failed: {}", message);
                Err(InfluxError::ConnectionError(message))
            }
        }
    }

    async fn bootstrap(&self) -> std::result::Result<Arc<dyn StoreConnection>, String> {
        let connection = self
            .connector
            .connect(&self.config)
            .await
            .map_err(|e| format!("connect to {} failed: {}", self.config.url(), e))?;

        let database = self.config.database();
        let create_db = format!("CREATE DATABASE \"{}\"", database);
        run_admin(connection.as_ref(), &create_db, None)
            .await
            .map_err(|e| format!("create database {} failed: {}", database, e))?;
        connection.set_default_database(database);

        if self.config.provision_retention_policy() {
            let command = self.default_retention_policy().create_command(database);
            run_admin(connection.as_ref(), &command, Some(database))
                .await
                .map_err(|e| {
                    format!(
                        "create retention policy {} failed: {}",
                        self.config.retention_policy(),
                        e
                    )
                })?;
        }

        debug!("InfluxDB bootstrap complete: {:?}", self.config);
        Ok(connection)
    }

    fn default_retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy::new(
            self.config.retention_policy(),
            self.config.retention_policy_time(),
            1,
            true,
        )
    }

    /// Live connection, or `None` when degraded
    async fn live(&self) -> Result<Option<&Arc<dyn StoreConnection>>> {
        match self.ensure_connected().await? {
            ConnectionState::Live(connection) => Ok(Some(connection)),
            ConnectionState::Degraded => Ok(None),
        }
    }

    /// Live connection if one was already established; never connects
    fn established(&self) -> Option<&Arc<dyn StoreConnection>> {
        match self.state.get() {
            Some(ConnectionState::Live(connection)) => Some(connection),
            _ => None,
        }
    }

    /// Whether a live connection exists
    pub fn is_connected(&self) -> bool {
        self.established().is_some()
    }

    /// Whether the client has degraded to no-op mode
    pub fn is_degraded(&self) -> bool {
        matches!(self.state.get(), Some(ConnectionState::Degraded))
    }

    /// Forget the current connection or degraded state; the next operation reconnects
    pub fn reset(&mut self) {
        if self.state.take().is_some() {
            info!("InfluxClient connection state cleared");
        }
    }

    /// Create a database
    pub async fn create_database(&self, name: &str) -> Result<()> {
        self.query(&format!("CREATE DATABASE \"{}\"", name)).await?;
        Ok(())
    }

    /// Provision the configured retention policy as the database default, replication 1
    pub async fn create_retention_policy(&self) -> Result<()> {
        let policy = self.default_retention_policy();
        self.apply_retention_policy(&policy).await
    }

    /// Provision an arbitrary retention policy on the configured database
    pub async fn create_retention_policy_with(
        &self,
        name: &str,
        duration: &str,
        replication: u32,
        is_default: bool,
    ) -> Result<()> {
        let policy = RetentionPolicy::new(name, duration, replication, is_default);
        self.apply_retention_policy(&policy).await
    }

    /// Provision `policy` on the configured database
    pub async fn apply_retention_policy(&self, policy: &RetentionPolicy) -> Result<()> {
        info!(
            "Creating retention policy {} on {} (duration: {}, replication: {}, default: {})",
            policy.name,
            self.config.database(),
            policy.duration,
            policy.replication,
            policy.is_default
        );
        self.query(&policy.create_command(self.config.database())).await?;
        Ok(())
    }

    /// Drop a retention policy from the configured database
    pub async fn drop_retention_policy(&self, name: &str) -> Result<()> {
        self.query(&RetentionPolicy::drop_command(name, self.config.database()))
            .await?;
        Ok(())
    }

    /// Run a raw command against the configured database
    pub async fn query(&self, command: &str) -> Result<QueryResult> {
        let connection = match self.live().await? {
            Some(connection) => connection,
            None => return Ok(QueryResult::empty()),
        };

        debug!("Executing command: {}", command);
        run_admin(connection.as_ref(), command, Some(self.config.database()))
            .await
            .map_err(|e| {
                error!("InfluxDB operation failed: {}", e);
                InfluxError::OperationError(e)
            })
    }

    /// Query and map each row of the first series to a record, time formatted as
    /// `yyyy-MM-dd HH:mm:ss`
    pub async fn query_records(&self, command: &str) -> Result<Vec<Record>> {
        self.query_records_with_format(command, DEFAULT_TIME_FORMAT)
            .await
    }

    /// Query and map each row of the first series to a record, `time` rendered with the
    /// chrono strftime pattern `time_format`
    pub async fn query_records_with_format(
        &self,
        command: &str,
        time_format: &str,
    ) -> Result<Vec<Record>> {
        let result = self.query(command).await?;
        translate::records(&result, time_format)
    }

    /// Query and deserialize each row of the first series into `T`
    pub async fn query_as<T: DeserializeOwned>(&self, command: &str) -> Result<Vec<T>> {
        let result = self.query(command).await?;
        translate::typed(&result)
    }

    /// Insert one point at the current time (UTC)
    pub async fn insert(&self, measurement: &str, tags: &Tags, fields: &Fields) -> Result<()> {
        self.insert_with_offset(measurement, tags, fields, write::utc())
            .await
    }

    /// Insert one point at the current time in `offset`
    pub async fn insert_with_offset(
        &self,
        measurement: &str,
        tags: &Tags,
        fields: &Fields,
        offset: FixedOffset,
    ) -> Result<()> {
        let time = write::now_millis(offset);
        let point = write::point_at(measurement, tags, fields, time, Precision::Milliseconds)?;
        self.write_point(point).await
    }

    /// Insert one point at an explicit timestamp; `0` means now
    pub async fn insert_at(
        &self,
        measurement: &str,
        tags: &Tags,
        fields: &Fields,
        time: i64,
        precision: Precision,
    ) -> Result<()> {
        if time == 0 {
            return self.insert(measurement, tags, fields).await;
        }
        let point = write::point_at(measurement, tags, fields, time, precision)?;
        self.write_point(point).await
    }

    async fn write_point(&self, point: Point) -> Result<()> {
        let connection = match self.live().await? {
            Some(connection) => connection,
            None => return Ok(()),
        };

        info!("InfluxDB insert data: {}", point);
        connection
            .write_point(self.config.database(), self.config.retention_policy(), &point)
            .await
            .map_err(|e| {
                error!("InfluxDB insert failed: {}", e);
                InfluxError::OperationError(format!("insert failed: {}", e))
            })
    }

    /// Insert one point per field set at the current time (UTC), all sharing
    /// `measurement` and `tags`
    pub async fn batch_insert(
        &self,
        measurement: &str,
        tags: &Tags,
        field_sets: &[Fields],
    ) -> Result<()> {
        self.batch_insert_with_offset(measurement, tags, field_sets, write::utc())
            .await
    }

    /// Batch insert at the current time in `offset`
    pub async fn batch_insert_with_offset(
        &self,
        measurement: &str,
        tags: &Tags,
        field_sets: &[Fields],
        offset: FixedOffset,
    ) -> Result<()> {
        self.write_disambiguated(measurement, tags, field_sets, write::now_millis(offset))
            .await
    }

    /// Batch insert anchored at an explicit base instant
    pub async fn batch_insert_at(
        &self,
        measurement: &str,
        tags: &Tags,
        field_sets: &[Fields],
        base: DateTime<Utc>,
    ) -> Result<()> {
        self.write_disambiguated(measurement, tags, field_sets, write::base_millis(base))
            .await
    }

    async fn write_disambiguated(
        &self,
        measurement: &str,
        tags: &Tags,
        field_sets: &[Fields],
        base_millis: i64,
    ) -> Result<()> {
        if field_sets.is_empty() {
            return Ok(());
        }

        let points = write::disambiguated_points(measurement, tags, field_sets, base_millis)?;
        let batch = write::all_replicas_batch(
            self.config.database(),
            self.config.retention_policy(),
            points,
        );
        self.write_batch(batch).await
    }

    /// Write a caller-built batch unchanged, possibly spanning databases and measurements
    pub async fn write_batch(&self, batch: BatchPoints) -> Result<()> {
        let connection = match self.live().await? {
            Some(connection) => connection,
            None => return Ok(()),
        };

        info!("InfluxDB insert batch data: {}", batch);
        connection.write_batch(&batch).await.map_err(|e| {
            error!("InfluxDB batch insert failed: {}", e);
            InfluxError::OperationError(format!("batch insert failed: {}", e))
        })
    }

    /// Send buffered batch-mode points now; no-op before the first connection
    pub async fn flush(&self) -> Result<()> {
        match self.established() {
            Some(connection) => connection
                .flush()
                .await
                .map_err(|e| InfluxError::OperationError(format!("flush failed: {}", e))),
            None => Ok(()),
        }
    }

    /// Buffer point writes and send them asynchronously.
    ///
    /// `None` uses the options from the configuration. Call [`InfluxClient::disable_batch`]
    /// or [`InfluxClient::flush`] before shutting down, or buffered points are lost.
    pub async fn enable_batch(&self, options: Option<BatchOptions>) -> Result<()> {
        let connection = match self.live().await? {
            Some(connection) => connection,
            None => return Ok(()),
        };

        let options = options.unwrap_or_else(|| self.config.batch_options().clone());
        connection
            .enable_batch(options)
            .await
            .map_err(|e| InfluxError::OperationError(format!("enable batch failed: {}", e)))
    }

    /// Flush buffered points and return to immediate writes
    pub async fn disable_batch(&self) -> Result<()> {
        match self.established() {
            Some(connection) => connection
                .disable_batch()
                .await
                .map_err(|e| InfluxError::OperationError(format!("disable batch failed: {}", e))),
            None => Ok(()),
        }
    }

    pub fn is_batch_enabled(&self) -> bool {
        self.established()
            .map(|c| c.is_batch_enabled())
            .unwrap_or(false)
    }

    /// Check whether the store answers. Never fails; a degraded client reports `false`.
    pub async fn ping(&self) -> bool {
        let connection = match self.live().await {
            Ok(Some(connection)) => connection,
            Ok(None) => return false,
            Err(e) => {
                debug!("Ping skipped, not connected: {}", e);
                return false;
            }
        };

        match connection.ping().await {
            Ok(pong) => {
                debug!("Ping ok: version {} in {:?}", pong.version, pong.response_time);
                true
            }
            Err(e) => {
                debug!("Ping failed: {}", e);
                false
            }
        }
    }
}

/// Run a command and surface statement errors reported in the response body
async fn run_admin(
    connection: &dyn StoreConnection,
    command: &str,
    database: Option<&str>,
) -> std::result::Result<QueryResult, String> {
    let result = connection
        .query(command, database)
        .await
        .map_err(|e: TransportError| e.to_string())?;

    match result.error_message() {
        Some(message) => Err(message.to_string()),
        None => Ok(result),
    }
}
