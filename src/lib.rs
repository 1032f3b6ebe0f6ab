//! InfluxDB access layer
//!
//! A thin, lazily connecting client for InfluxDB 1.x used by services that record
//! time-series telemetry.
//!
//! # Features
//!
//! - Connection opened on first use, exactly once under concurrent callers
//! - Database and default retention policy provisioned when the connection is opened
//! - Batch inserts with per-point timestamp disambiguation
//! - Query results as ordered records or deserialized into caller types
//! - Optional degraded mode: with `skip_error` an unreachable store turns every call into a no-op
//! - Asynchronous batch mode with interval and size based flushing
//!
//! # Example
//!
//! ```no_run
//! use influx_access::{ConnectionConfig, InfluxClient, InfluxProperties};
//! use std::collections::BTreeMap;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut properties = InfluxProperties::new("telemetry");
//!     properties.open_url = "http://localhost:8086".to_string();
//!     let client = InfluxClient::new(ConnectionConfig::try_from(properties)?);
//!
//!     // Insert a point
//!     let tags = BTreeMap::from([("host".to_string(), "a".to_string())]);
//!     let fields = BTreeMap::from([("usage".to_string(), 42.5.into())]);
//!     client.insert("cpu", &tags, &fields).await?;
//!
//!     for row in client.query_records("SELECT * FROM cpu").await? {
//!         println!("{:?}", row);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod store;
pub mod translate;
pub mod types;
pub mod write;

// Include transport module from parent directory
#[path = "../transport/mod.rs"]
pub mod transport_impl;
pub mod transport {
    pub use super::transport_impl::*;
}

// Re-export main types
pub use client::{ConnectionState, InfluxClient};
pub use config::{
    BatchOptions, BufferFullAction, ConnectionConfig, EnvSource, InfluxProperties,
};
pub use error::{InfluxError, Result, TransportError};
pub use store::{StoreConnection, StoreConnector, TransportResult};
pub use translate::{Record, DEFAULT_TIME_FORMAT};
pub use types::{
    BatchPoints, Consistency, FieldValue, Fields, Point, Pong, Precision, QueryResult,
    RetentionPolicy, Series, StatementResult, Tags,
};

// Re-export transport types
pub use transport::{HttpConnection, HttpConnector};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize tracing subscriber (for demos and tests)
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("influx_access=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}
