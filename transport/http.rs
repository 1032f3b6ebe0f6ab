//! InfluxDB 1.x HTTP connection
//!
//! Endpoints used: `GET /ping`, `POST /query`, `POST /write`. Credentials travel in a basic
//! `Authorization` header, never in the URL, so they cannot leak through request errors.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use super::batch::{BatchProcessor, BatchSink};
use super::line_protocol;
use crate::config::{BatchOptions, ConnectionConfig};
use crate::error::TransportError;
use crate::store::{StoreConnection, StoreConnector, TransportResult};
use crate::types::{BatchPoints, Consistency, Point, Pong, Precision, QueryResult};

/// Connector that opens [`HttpConnection`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpConnector;

#[async_trait]
impl StoreConnector for HttpConnector {
    async fn connect(&self, config: &ConnectionConfig) -> TransportResult<Arc<dyn StoreConnection>> {
        let connection = HttpConnection::new(config)?;
        // fail fast when the store is unreachable
        let pong = connection.ping().await?;
        info!(
            "Connected to InfluxDB {} at {} ({:?})",
            pong.version,
            config.url(),
            pong.response_time
        );
        Ok(Arc::new(connection))
    }
}

/// Request plumbing shared between the connection and its batch processor
struct HttpTransport {
    client: Client,
    base: Url,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpTransport {
    fn endpoint(&self, path: &str) -> TransportResult<Url> {
        Ok(self.base.join(path)?)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(username) => request.basic_auth(username, self.password.as_deref()),
            None => request,
        }
    }

    async fn check(response: Response) -> TransportResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or_else(|_| {
                if body.trim().is_empty() {
                    status.canonical_reason().unwrap_or("unknown error").to_string()
                } else {
                    body.trim().to_string()
                }
            });

        Err(TransportError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn ping(&self) -> TransportResult<Pong> {
        let started = Instant::now();
        let request = self.client.get(self.endpoint("ping")?);
        let response = self.authorize(request).send().await?;
        let response = Self::check(response).await?;

        let version = response
            .headers()
            .get("X-Influxdb-Version")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        Ok(Pong {
            version,
            response_time: started.elapsed(),
        })
    }

    async fn query(&self, command: &str, database: Option<&str>) -> TransportResult<QueryResult> {
        let mut url = self.endpoint("query")?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(db) = database {
                pairs.append_pair("db", db);
            }
            pairs.append_pair("q", command);
        }

        let response = self.authorize(self.client.post(url)).send().await?;
        let response = Self::check(response).await?;
        let body = response.text().await?;
        let result: QueryResult = serde_json::from_str(&body)?;
        Ok(result)
    }

    async fn write_lines(
        &self,
        database: &str,
        retention_policy: Option<&str>,
        precision: Precision,
        consistency: Option<Consistency>,
        body: String,
    ) -> TransportResult<()> {
        let mut url = self.endpoint("write")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("db", database);
            if let Some(rp) = retention_policy {
                pairs.append_pair("rp", rp);
            }
            pairs.append_pair("precision", precision.as_str());
            if let Some(consistency) = consistency {
                pairs.append_pair("consistency", consistency.as_str());
            }
        }

        let response = self
            .authorize(self.client.post(url))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn write_batch(&self, batch: &BatchPoints) -> TransportResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let body = line_protocol::render_batch(batch)
            .map_err(|e| TransportError::Other(e.to_string()))?;
        self.write_lines(
            batch.database_name(),
            batch.retention_policy(),
            batch.precision(),
            Some(batch.consistency()),
            body,
        )
        .await
    }
}

#[async_trait]
impl BatchSink for HttpTransport {
    async fn send(&self, batch: BatchPoints) -> TransportResult<()> {
        self.write_batch(&batch).await
    }
}

/// Connection to an InfluxDB 1.x server over HTTP
pub struct HttpConnection {
    transport: Arc<HttpTransport>,
    default_database: RwLock<Option<String>>,
    batch: Mutex<Option<Arc<BatchProcessor>>>,
    batch_enabled: AtomicBool,
}

impl HttpConnection {
    /// Build the HTTP client; does not touch the network
    pub fn new(config: &ConnectionConfig) -> TransportResult<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        let base = Url::parse(&format!("{}/", config.url()))?;

        Ok(Self {
            transport: Arc::new(HttpTransport {
                client,
                base,
                username: config.username().map(str::to_string),
                password: config.password().map(str::to_string),
            }),
            default_database: RwLock::new(None),
            batch: Mutex::new(None),
            batch_enabled: AtomicBool::new(false),
        })
    }

    fn default_database(&self) -> Option<String> {
        self.default_database
            .read()
            .map(|db| db.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    async fn processor(&self) -> Option<Arc<BatchProcessor>> {
        self.batch.lock().await.clone()
    }
}

#[async_trait]
impl StoreConnection for HttpConnection {
    async fn query(&self, command: &str, database: Option<&str>) -> TransportResult<QueryResult> {
        let fallback = self.default_database();
        let database = database.or(fallback.as_deref());
        debug!("Query on {:?}: {}", database, command);
        self.transport.query(command, database).await
    }

    async fn write_point(
        &self,
        database: &str,
        retention_policy: &str,
        point: &Point,
    ) -> TransportResult<()> {
        {
            // held across enqueue so disable_batch cannot stop the processor in between
            let batch = self.batch.lock().await;
            if let Some(processor) = batch.as_ref() {
                return processor
                    .enqueue(database, retention_policy, point.clone())
                    .await;
            }
        }

        let body = line_protocol::render_point(point, None, point.precision())
            .map_err(|e| TransportError::Other(e.to_string()))?;
        self.transport
            .write_lines(database, Some(retention_policy), point.precision(), None, body)
            .await
    }

    async fn write_batch(&self, batch: &BatchPoints) -> TransportResult<()> {
        self.transport.write_batch(batch).await
    }

    fn set_default_database(&self, database: &str) {
        match self.default_database.write() {
            Ok(mut db) => *db = Some(database.to_string()),
            Err(poisoned) => *poisoned.into_inner() = Some(database.to_string()),
        }
    }

    async fn enable_batch(&self, options: BatchOptions) -> TransportResult<()> {
        let mut batch = self.batch.lock().await;
        if batch.is_some() {
            warn!("Batch mode already enabled, keeping current options");
            return Ok(());
        }

        info!(
            "Enabling batch mode (actions: {}, flush interval: {:?}, buffer limit: {})",
            options.actions,
            options.flush_interval(),
            options.buffer_limit
        );
        let sink: Arc<dyn BatchSink> = self.transport.clone();
        *batch = Some(Arc::new(BatchProcessor::start(sink, options)));
        self.batch_enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disable_batch(&self) -> TransportResult<()> {
        let mut batch = self.batch.lock().await;
        let flushed = match batch.as_ref() {
            // on failure the processor stays in place with the unsent points
            Some(processor) => processor.flush().await?,
            None => return Ok(()),
        };

        if let Some(processor) = batch.take() {
            self.batch_enabled.store(false, Ordering::SeqCst);
            let remaining = processor.stop().await?;
            info!("Batch mode disabled, flushed {} points", flushed + remaining);
        }
        Ok(())
    }

    fn is_batch_enabled(&self) -> bool {
        self.batch_enabled.load(Ordering::SeqCst)
    }

    async fn flush(&self) -> TransportResult<()> {
        if let Some(processor) = self.processor().await {
            processor.flush().await?;
        }
        Ok(())
    }

    async fn ping(&self) -> TransportResult<Pong> {
        self.transport.ping().await
    }
}
