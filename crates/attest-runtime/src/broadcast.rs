//! Result broadcast.
//!
//! Fans completed audit records out to any number of live subscribers,
//! interleaved with periodic aggregate metric snapshots. Delivery is
//! best-effort and at-most-once per subscriber: a slow or disconnected
//! subscriber misses what was published while it lagged; there is no
//! replay. A bounded FIFO history lets newly-joining subscribers catch
//! up on demand.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use attest_core::{AuditPhase, AuditRecord};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::BroadcastConfig;

/// Aggregate metrics over everything published so far.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    /// Terminal records published (scored and failed)
    pub total_jobs_processed: u64,

    /// Mean faithfulness score across scored records
    pub average_faithfulness: f64,

    /// Fraction of scored records with hallucination detected
    pub hallucination_rate: f64,
}

/// A message delivered to subscribers.
#[derive(Debug, Clone)]
pub enum BroadcastMessage {
    /// A completed audit record
    AuditResult {
        timestamp: DateTime<Utc>,
        record: Arc<AuditRecord>,
    },

    /// A periodic metrics snapshot
    MetricUpdate {
        timestamp: DateTime<Utc>,
        snapshot: MetricSnapshot,
    },
}

impl BroadcastMessage {
    /// Message kind tag as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            BroadcastMessage::AuditResult { .. } => "audit_result",
            BroadcastMessage::MetricUpdate { .. } => "metric_update",
        }
    }

    /// Wire rendering: `{type, timestamp, data}` with an ISO-8601
    /// timestamp.
    pub fn to_wire(&self) -> serde_json::Value {
        match self {
            BroadcastMessage::AuditResult { timestamp, record } => serde_json::json!({
                "type": "audit_result",
                "timestamp": timestamp.to_rfc3339(),
                "data": record.as_ref(),
            }),
            BroadcastMessage::MetricUpdate {
                timestamp,
                snapshot,
            } => serde_json::json!({
                "type": "metric_update",
                "timestamp": timestamp.to_rfc3339(),
                "data": snapshot,
            }),
        }
    }
}

/// A live subscription to published records and metric updates.
pub struct Subscription {
    rx: broadcast::Receiver<BroadcastMessage>,
}

impl Subscription {
    /// Receive the next message. `Lagged` means this subscriber was too
    /// slow and missed the reported number of messages; `Closed` means
    /// the broadcaster is gone.
    pub async fn recv(&mut self) -> Result<BroadcastMessage, broadcast::error::RecvError> {
        self.rx.recv().await
    }
}

#[derive(Debug, Default)]
struct MetricsAccum {
    processed: u64,
    scored: u64,
    faithfulness_sum: f64,
    hallucinations: u64,
}

/// Fan-out hub for completed audits.
pub struct ResultBroadcaster {
    tx: broadcast::Sender<BroadcastMessage>,
    history: RwLock<VecDeque<Arc<AuditRecord>>>,
    metrics: RwLock<MetricsAccum>,
    history_size: usize,
}

impl ResultBroadcaster {
    pub fn new(config: &BroadcastConfig) -> Self {
        let (tx, _) = broadcast::channel(config.channel_capacity);
        Self {
            tx,
            history: RwLock::new(VecDeque::with_capacity(config.history_size)),
            metrics: RwLock::new(MetricsAccum::default()),
            history_size: config.history_size,
        }
    }

    /// Publish a terminal record to history, metrics, and every live
    /// subscriber. Delivery happens outside the history lock so one slow
    /// subscriber cannot hold up another.
    pub fn publish(&self, record: Arc<AuditRecord>) {
        debug_assert!(record.phase.is_terminal());

        {
            let mut metrics = self.metrics.write();
            metrics.processed += 1;
            if record.phase == AuditPhase::Scored {
                metrics.scored += 1;
                metrics.faithfulness_sum += record.faithfulness_score.unwrap_or(0.0);
                if record.hallucination_detected {
                    metrics.hallucinations += 1;
                }
            }
        }

        {
            let mut history = self.history.write();
            if history.len() == self.history_size {
                history.pop_front();
            }
            history.push_back(record.clone());
        }

        let delivered = self
            .tx
            .send(BroadcastMessage::AuditResult {
                timestamp: Utc::now(),
                record,
            })
            .unwrap_or(0);
        tracing::debug!(subscribers = delivered, "published audit record");
    }

    /// Open a live subscription. Only messages published after this call
    /// are delivered; use [`history`](Self::history) to catch up.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Recent terminal records, oldest first.
    pub fn history(&self) -> Vec<Arc<AuditRecord>> {
        self.history.read().iter().cloned().collect()
    }

    /// Current aggregate metrics.
    pub fn snapshot(&self) -> MetricSnapshot {
        let metrics = self.metrics.read();
        let average_faithfulness = if metrics.scored > 0 {
            metrics.faithfulness_sum / metrics.scored as f64
        } else {
            0.0
        };
        let hallucination_rate = if metrics.scored > 0 {
            metrics.hallucinations as f64 / metrics.scored as f64
        } else {
            0.0
        };
        MetricSnapshot {
            total_jobs_processed: metrics.processed,
            average_faithfulness,
            hallucination_rate,
        }
    }

    /// Spawn a task emitting a metric snapshot every `interval`.
    pub fn spawn_metrics_task(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let _ = hub.tx.send(BroadcastMessage::MetricUpdate {
                    timestamp: Utc::now(),
                    snapshot: hub.snapshot(),
                });
            }
        })
    }
}
