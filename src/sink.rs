//! Fire-and-forget dispatch of normalized batches to the Fleet API.
//!
//! The read path enqueues and moves on; the device ACK never waits for the
//! sink. The queue is bounded with a drop-oldest policy so a slow sink
//! cannot grow memory without bound, and every delivery runs as its own
//! task, so per-IMEI ordering is not guaranteed downstream.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Error, Result, SinkError};
use crate::normalize::NormalizedRecord;

/// Bound on batches awaiting dispatch.
pub const DEFAULT_QUEUE_DEPTH: usize = 1024;

/// Per-request timeout against the sink.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How long shutdown waits for in-flight deliveries.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// One delivery unit: everything a single AVL frame produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Batch {
    pub imei: String,
    pub records: Vec<NormalizedRecord>,
}

/// Body the sink answers with.
#[derive(Debug, Deserialize)]
struct IngestResponse {
    accepted: u64,
    total: u64,
}

/// Delivery counters exposed on the status surface. A batch is `dropped`
/// whether it fell off the full queue or failed against the sink; either
/// way it is gone and the device was already ACKed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SinkStats {
    pub delivered: u64,
    pub dropped: u64,
}

pub struct SinkDispatcher {
    client: reqwest::Client,
    ingest_url: String,
    shared_secret: String,
    queue: Mutex<VecDeque<Batch>>,
    depth: usize,
    notify: Notify,
    stopping: AtomicBool,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl SinkDispatcher {
    pub fn new(config: &Config) -> Result<Arc<Self>> {
        Self::with_depth(config, DEFAULT_QUEUE_DEPTH)
    }

    pub fn with_depth(config: &Config, depth: usize) -> Result<Arc<Self>> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("failed to build sink client: {e}")))?;

        Ok(Arc::new(Self {
            client,
            ingest_url: config.ingest_url(),
            shared_secret: config.shared_secret.clone(),
            queue: Mutex::new(VecDeque::with_capacity(depth.min(64))),
            depth,
            notify: Notify::new(),
            stopping: AtomicBool::new(false),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }))
    }

    /// Queue a batch for delivery. Never blocks; when the queue is full the
    /// oldest batch is dropped to keep the device window moving.
    pub fn enqueue(&self, batch: Batch) {
        let mut queue = self.queue.lock();
        if queue.len() >= self.depth {
            if let Some(old) = queue.pop_front() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    imei = %old.imei,
                    records = old.records.len(),
                    "sink queue full, dropped oldest batch"
                );
            }
        }
        queue.push_back(batch);
        drop(queue);
        self.notify.notify_one();
    }

    /// Number of batches waiting for a delivery task.
    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn stats(&self) -> SinkStats {
        SinkStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    /// Ask the pump to stop. Queued batches are abandoned; in-flight
    /// deliveries get the grace window.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    /// Pump loop: pop batches and spawn one delivery task each. Returns
    /// after [`shutdown`](Self::shutdown), once in-flight deliveries finish
    /// or the grace window expires.
    pub async fn run(self: Arc<Self>) {
        let mut inflight = JoinSet::new();

        loop {
            while inflight.try_join_next().is_some() {}

            if self.stopping.load(Ordering::Acquire) {
                break;
            }

            let batch = self.queue.lock().pop_front();
            match batch {
                Some(batch) => {
                    let this = Arc::clone(&self);
                    inflight.spawn(async move { this.deliver(batch).await });
                }
                None => self.notify.notified().await,
            }
        }

        let drain = async {
            while inflight.join_next().await.is_some() {}
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            warn!(
                inflight = inflight.len(),
                "sink deliveries abandoned after shutdown grace window"
            );
            inflight.abort_all();
        }
    }

    async fn deliver(&self, batch: Batch) {
        let records = batch.records.len();
        match self.post(&batch).await {
            Ok(accepted) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                debug!(imei = %batch.imei, records, accepted, "batch delivered");
            }
            Err(e) => {
                // The device was ACKed at enqueue time; nothing to retry.
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(imei = %batch.imei, records, error = %e, "batch dropped");
            }
        }
    }

    async fn post(&self, batch: &Batch) -> std::result::Result<u64, SinkError> {
        let response = self
            .client
            .post(&self.ingest_url)
            .bearer_auth(&self.shared_secret)
            .json(batch)
            .send()
            .await
            .map_err(|e| SinkError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Status(status.as_u16()));
        }

        let body: IngestResponse = response
            .json()
            .await
            .map_err(|e| SinkError::Request(format!("bad response body: {e}")))?;
        if body.accepted != body.total {
            warn!(
                imei = %batch.imei,
                accepted = body.accepted,
                total = body.total,
                "sink accepted a partial batch"
            );
        }
        Ok(body.accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            fleet_api_url: "http://127.0.0.1:9".into(),
            shared_secret: "test-secret".into(),
            tcp_port: 5000,
            status_port: 3000,
            logging: Default::default(),
        }
    }

    fn batch(imei: &str) -> Batch {
        Batch {
            imei: imei.into(),
            records: Vec::new(),
        }
    }

    #[tokio::test]
    async fn enqueue_drops_oldest_when_full() {
        let sink = SinkDispatcher::with_depth(&config(), 2).unwrap();

        sink.enqueue(batch("000000000000001"));
        sink.enqueue(batch("000000000000002"));
        sink.enqueue(batch("000000000000003"));

        assert_eq!(sink.queued(), 2);
        assert_eq!(sink.stats().dropped, 1);

        let front = sink.queue.lock().pop_front().unwrap();
        assert_eq!(front.imei, "000000000000002");
    }

    #[tokio::test]
    async fn run_exits_on_shutdown() {
        let sink = SinkDispatcher::with_depth(&config(), 4).unwrap();
        let pump = tokio::spawn(Arc::clone(&sink).run());

        sink.shutdown();
        tokio::time::timeout(Duration::from_secs(1), pump)
            .await
            .expect("pump should stop promptly")
            .unwrap();
    }

    #[test]
    fn batch_serializes_as_sink_body() {
        let json = serde_json::to_value(batch("356307042441013")).unwrap();
        assert_eq!(json["imei"], "356307042441013");
        assert!(json["records"].as_array().unwrap().is_empty());
    }
}
