//! The spawned analytics pipeline.
//!
//! Events flow through a bounded channel into a single-writer aggregator
//! task. Recording never blocks the decision path: a full channel drops the
//! event and bumps a counter. The task publishes an updated snapshot after
//! each event; readers clone the latest published view.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::debug;

use crate::config::AnalyticsConfig;
use crate::error::{FloodgateError, Result};

use super::aggregator::{Aggregator, AnalyticsSnapshot};
use super::event::CheckEvent;
use super::offenders::TopIdentifier;

#[derive(Default)]
struct Published {
    snapshot: AnalyticsSnapshot,
    offenders: Vec<TopIdentifier>,
}

/// Handle to the running analytics pipeline.
pub struct Analytics {
    sender: mpsc::Sender<CheckEvent>,
    dropped: Arc<AtomicU64>,
    published: Arc<RwLock<Published>>,
    task: JoinHandle<()>,
}

impl Analytics {
    /// Spawn the aggregator task and return its handle.
    pub fn spawn(config: &AnalyticsConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.event_buffer.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let published = Arc::new(RwLock::new(Published::default()));

        let mut aggregator = Aggregator::new(config);
        let task = tokio::spawn({
            let dropped = Arc::clone(&dropped);
            let published = Arc::clone(&published);
            async move {
                let mut events = ReceiverStream::new(receiver);
                while let Some(event) = events.next().await {
                    aggregator.record(&event);
                    let snapshot = aggregator.snapshot(dropped.load(Ordering::Relaxed));
                    let offenders = aggregator.ranked_offenders();
                    *published.write() = Published {
                        snapshot,
                        offenders,
                    };
                }
                debug!("Analytics pipeline drained");
            }
        });

        Self {
            sender,
            dropped,
            published,
            task,
        }
    }

    /// Enqueue an event, never blocking.
    ///
    /// Backpressure drops the event, counts it, and reports `Overloaded`;
    /// it is never retried.
    pub fn record(&self, event: CheckEvent) -> Result<()> {
        match self.sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(FloodgateError::Overloaded)
            }
        }
    }

    /// The most recently published snapshot.
    pub fn realtime_snapshot(&self) -> AnalyticsSnapshot {
        self.published.read().snapshot.clone()
    }

    /// Up to `limit` identifiers ordered by denied count descending.
    pub fn top_identifiers(&self, limit: usize) -> Vec<TopIdentifier> {
        self.published
            .read()
            .offenders
            .iter()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Events dropped under backpressure so far.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop accepting events and wait for the task to drain.
    pub async fn shutdown(self) {
        drop(self.sender);
        let _ = self.task.await;
    }
}
