//! Store connection capability
//!
//! The client never talks to the network itself. It asks a [`StoreConnector`] for a
//! [`StoreConnection`] once, then drives every query and write through it. The HTTP
//! implementation lives in [`crate::transport::http`]; tests plug in in-memory fakes.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{BatchOptions, ConnectionConfig};
use crate::error::TransportError;
use crate::types::{BatchPoints, Point, Pong, QueryResult};

/// Result type for store connection calls
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Connection strategy, selected once when the client is built
#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// Open a connection using the configured endpoint and credentials
    ///
    /// # Returns
    /// * `Ok(connection)` - Store reachable, connection ready for use
    /// * `Err(TransportError)` - Store could not be reached
    async fn connect(&self, config: &ConnectionConfig) -> TransportResult<Arc<dyn StoreConnection>>;
}

/// Live connection to the time-series store
#[async_trait]
pub trait StoreConnection: Send + Sync {
    /// Run a command, against `database` when given, else the connection default
    async fn query(&self, command: &str, database: Option<&str>) -> TransportResult<QueryResult>;

    /// Write a single point to `database`/`retention_policy`
    async fn write_point(
        &self,
        database: &str,
        retention_policy: &str,
        point: &Point,
    ) -> TransportResult<()>;

    /// Write a batch in one request, bypassing any write buffer
    async fn write_batch(&self, batch: &BatchPoints) -> TransportResult<()>;

    /// Database used by `query` when none is passed
    fn set_default_database(&self, database: &str);

    /// Switch point writes to buffered asynchronous batching
    async fn enable_batch(&self, options: BatchOptions) -> TransportResult<()>;

    /// Flush buffered points and return to immediate writes
    async fn disable_batch(&self) -> TransportResult<()>;

    fn is_batch_enabled(&self) -> bool;

    /// Send buffered points now
    async fn flush(&self) -> TransportResult<()>;

    async fn ping(&self) -> TransportResult<Pong>;
}
