//! Buffered asynchronous point batching
//!
//! Points are collected in memory and written in groups, either when `actions` points are
//! waiting or when the flush interval elapses. Callers must `flush` or `stop` before exit,
//! otherwise whatever is still buffered is lost.

use async_trait::async_trait;
use indexmap::IndexMap;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, warn};

use crate::config::{BatchOptions, BufferFullAction};
use crate::store::TransportResult;
use crate::types::{BatchPoints, Point};

/// Destination for flushed batches
#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn send(&self, batch: BatchPoints) -> TransportResult<()>;
}

#[derive(Debug)]
struct BufferedPoint {
    database: String,
    retention_policy: String,
    point: Point,
}

struct Shared {
    sink: Arc<dyn BatchSink>,
    options: BatchOptions,
    buffer: Mutex<VecDeque<BufferedPoint>>,
}

impl Shared {
    /// Send every buffered group. Groups the sink rejects go back to the front of the buffer
    /// and the first error is returned once all groups have been tried.
    async fn flush(&self) -> TransportResult<usize> {
        let drained = {
            let mut buffer = self.buffer.lock().await;
            std::mem::take(&mut *buffer)
        };

        if drained.is_empty() {
            return Ok(0);
        }

        let count = drained.len();
        let mut groups: IndexMap<(String, String), Vec<Point>> = IndexMap::new();
        for entry in drained {
            groups
                .entry((entry.database, entry.retention_policy))
                .or_default()
                .push(entry.point);
        }

        debug!("Flushing {} buffered points in {} writes", count, groups.len());

        let mut sent = 0;
        let mut failed = Vec::new();
        let mut first_error = None;

        for ((database, retention_policy), points) in groups {
            let batch = BatchPoints::database(database.as_str())
                .retention_policy(retention_policy.as_str())
                .consistency(self.options.consistency)
                .precision(self.options.precision)
                .points(points.iter().cloned())
                .build();

            match self.sink.send(batch).await {
                Ok(()) => sent += points.len(),
                Err(e) => {
                    error!(
                        "Batch write to {}/{} failed, keeping {} points buffered: {}",
                        database,
                        retention_policy,
                        points.len(),
                        e
                    );
                    failed.extend(points.into_iter().map(|point| BufferedPoint {
                        database: database.clone(),
                        retention_policy: retention_policy.clone(),
                        point,
                    }));
                    first_error.get_or_insert(e);
                }
            }
        }

        if !failed.is_empty() {
            self.requeue(failed).await;
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(sent),
        }
    }

    /// Put unsent points back ahead of anything buffered since the flush began
    async fn requeue(&self, failed: Vec<BufferedPoint>) {
        let mut buffer = self.buffer.lock().await;
        for entry in failed.into_iter().rev() {
            buffer.push_front(entry);
        }

        let limit = self.options.buffer_limit;
        if buffer.len() > limit {
            let excess = buffer.len() - limit;
            match self.options.on_buffer_full {
                BufferFullAction::DropOldest => {
                    buffer.drain(..excess);
                }
                BufferFullAction::DropNewest => buffer.truncate(limit),
            }
            warn!("Batch buffer over limit after failed flush, dropped {} points", excess);
        }
    }
}

/// Write buffer with a background flush timer
pub struct BatchProcessor {
    shared: Arc<Shared>,
    ticker: JoinHandle<()>,
}

impl BatchProcessor {
    /// Start buffering; spawns the flush timer on the current tokio runtime
    pub fn start(sink: Arc<dyn BatchSink>, options: BatchOptions) -> Self {
        let shared = Arc::new(Shared {
            sink,
            buffer: Mutex::new(VecDeque::with_capacity(options.actions.min(options.buffer_limit))),
            options,
        });

        let timer_shared = Arc::clone(&shared);
        let period = shared.options.flush_interval().max(std::time::Duration::from_millis(1));
        let ticker = tokio::spawn(async move {
            let mut ticker = interval(period);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = timer_shared.flush().await {
                    error!("Scheduled batch flush failed: {}", e);
                }
            }
        });

        Self { shared, ticker }
    }

    pub fn options(&self) -> &BatchOptions {
        &self.shared.options
    }

    /// Buffer one point, flushing when `actions` points are waiting
    pub async fn enqueue(
        &self,
        database: &str,
        retention_policy: &str,
        point: Point,
    ) -> TransportResult<()> {
        let should_flush = {
            let mut buffer = self.shared.buffer.lock().await;

            if buffer.len() >= self.shared.options.buffer_limit {
                match self.shared.options.on_buffer_full {
                    BufferFullAction::DropOldest => {
                        if let Some(dropped) = buffer.pop_front() {
                            warn!("Batch buffer full, dropping oldest point: {}", dropped.point.name());
                        }
                    }
                    BufferFullAction::DropNewest => {
                        warn!("Batch buffer full, dropping point: {}", point.name());
                        return Ok(());
                    }
                }
            }

            buffer.push_back(BufferedPoint {
                database: database.to_string(),
                retention_policy: retention_policy.to_string(),
                point,
            });

            buffer.len() >= self.shared.options.actions
        };

        if should_flush {
            self.shared.flush().await?;
        }

        Ok(())
    }

    /// Write everything buffered now; returns the number of points sent
    pub async fn flush(&self) -> TransportResult<usize> {
        self.shared.flush().await
    }

    /// Number of buffered points
    pub async fn len(&self) -> usize {
        self.shared.buffer.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.shared.buffer.lock().await.is_empty()
    }

    /// Stop the timer and flush what is left
    pub async fn stop(&self) -> TransportResult<usize> {
        self.ticker.abort();
        self.shared.flush().await
    }
}

impl Drop for BatchProcessor {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}
