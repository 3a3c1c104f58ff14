//! Audit dispatch.
//!
//! A bounded pool of workers pulling jobs FIFO from a bounded queue.
//! `submit` acknowledges immediately; execution happens asynchronously
//! and the finished record flows to the broadcaster. When the queue is
//! full, `submit` blocks up to a configured timeout and then reports
//! `Busy`, the backpressure signal callers must handle instead of
//! unbounded queueing.
//!
//! A panic inside one job's execution marks that job failed and returns
//! the worker to the pool; other workers and in-flight jobs are
//! unaffected.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use attest_core::{AuditJob, AuditPhase, AuditRecord, StageName};
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::broadcast::ResultBroadcaster;
use crate::config::{PoolConfig, RuntimeConfig};
use crate::pipeline::{AuditOrchestrator, CancelFlag};
use crate::providers::LlmProvider;

/// Errors from job submission. Valid input never fails asynchronously:
/// all pipeline failure is reported through the recorded job state.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SubmitError {
    #[error("audit queue at capacity")]
    Busy,

    #[error("job {0} is already in progress")]
    AlreadyInProgress(Uuid),

    #[error("invalid submission: {0}")]
    Invalid(&'static str),
}

/// Where a submitted job currently is.
#[derive(Debug, Clone)]
pub enum JobStatus {
    /// Accepted, waiting for a worker
    Queued,

    /// A worker is executing it
    Running,

    /// Terminal; the full record is available
    Done(Arc<AuditRecord>),
}

impl JobStatus {
    /// The record's lifecycle phase: `Pending` until terminal.
    pub fn phase(&self) -> AuditPhase {
        match self {
            JobStatus::Queued | JobStatus::Running => AuditPhase::Pending,
            JobStatus::Done(record) => record.phase,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done(_))
    }
}

struct JobEntry {
    status: JobStatus,
    cancel: CancelFlag,
}

type Registry = Arc<RwLock<HashMap<Uuid, JobEntry>>>;

/// Bounded worker pool executing audit jobs.
pub struct DispatchPool {
    tx: mpsc::Sender<AuditJob>,
    registry: Registry,
    workers: Vec<JoinHandle<()>>,
    submit_timeout: Duration,
}

impl DispatchPool {
    /// Start the pool: spawns `config.workers` worker tasks sharing one
    /// bounded queue. Must run inside a tokio runtime.
    pub fn start(
        orchestrator: Arc<AuditOrchestrator>,
        broadcaster: Arc<ResultBroadcaster>,
        config: &PoolConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_size.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let registry: Registry = Arc::new(RwLock::new(HashMap::new()));

        let workers = (0..config.workers.max(1))
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    rx.clone(),
                    orchestrator.clone(),
                    broadcaster.clone(),
                    registry.clone(),
                ))
            })
            .collect();

        tracing::info!(workers = config.workers, queue = config.queue_size, "dispatch pool started");

        Self {
            tx,
            registry,
            workers,
            submit_timeout: config.submit_timeout,
        }
    }

    /// Submit a job. Returns the job id immediately on acceptance.
    ///
    /// Rejections are synchronous: malformed input, a duplicate id still
    /// in flight, or a full queue after the submit timeout (`Busy`).
    pub async fn submit(&self, job: AuditJob) -> Result<Uuid, SubmitError> {
        if job.query.trim().is_empty() {
            return Err(SubmitError::Invalid("query must not be empty"));
        }
        if job.response.trim().is_empty() {
            return Err(SubmitError::Invalid("response must not be empty"));
        }

        let job_id = job.job_id;
        {
            let mut registry = self.registry.write();
            if let Some(entry) = registry.get(&job_id) {
                if !entry.status.is_terminal() {
                    return Err(SubmitError::AlreadyInProgress(job_id));
                }
            }
            registry.insert(
                job_id,
                JobEntry {
                    status: JobStatus::Queued,
                    cancel: CancelFlag::new(),
                },
            );
        }

        match self.tx.try_send(job) {
            Ok(()) => {
                tracing::debug!(job_id = %job_id, "job queued");
                Ok(job_id)
            }
            Err(TrySendError::Full(job)) => {
                match tokio::time::timeout(self.submit_timeout, self.tx.send(job)).await {
                    Ok(Ok(())) => Ok(job_id),
                    _ => {
                        self.registry.write().remove(&job_id);
                        tracing::warn!(job_id = %job_id, "queue full, rejecting submission");
                        Err(SubmitError::Busy)
                    }
                }
            }
            Err(TrySendError::Closed(_)) => {
                self.registry.write().remove(&job_id);
                Err(SubmitError::Busy)
            }
        }
    }

    /// Current status of a job, if known.
    pub fn status(&self, job_id: Uuid) -> Option<JobStatus> {
        self.registry.read().get(&job_id).map(|e| e.status.clone())
    }

    /// Request cancellation of a job. A queued job is dropped at pickup;
    /// a running job finishes its current stage, then stops. Returns
    /// false if the job is unknown or already terminal.
    pub fn cancel(&self, job_id: Uuid) -> bool {
        let registry = self.registry.read();
        match registry.get(&job_id) {
            Some(entry) if !entry.status.is_terminal() => {
                entry.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Close the queue and wait for in-flight jobs to finish.
    pub async fn shutdown(self) {
        let Self { tx, workers, .. } = self;
        drop(tx);
        for worker in workers {
            let _ = worker.await;
        }
        tracing::info!("dispatch pool stopped");
    }
}

enum Pickup {
    Cancelled(Arc<AuditRecord>),
    Run(CancelFlag),
}

async fn worker_loop(
    id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<AuditJob>>>,
    orchestrator: Arc<AuditOrchestrator>,
    broadcaster: Arc<ResultBroadcaster>,
    registry: Registry,
) {
    tracing::debug!(worker = id, "worker started");

    loop {
        let job = { rx.lock().await.recv().await };
        let Some(job) = job else {
            break;
        };
        let job_id = job.job_id;

        let pickup = {
            let mut registry = registry.write();
            match registry.get_mut(&job_id) {
                Some(entry) if entry.cancel.is_cancelled() => {
                    let mut record = AuditRecord::start(&job);
                    let _ = record.failed(StageName::Dispatch, "cancelled before execution");
                    let record = Arc::new(record);
                    entry.status = JobStatus::Done(record.clone());
                    Pickup::Cancelled(record)
                }
                Some(entry) => {
                    entry.status = JobStatus::Running;
                    Pickup::Run(entry.cancel.clone())
                }
                // Registry entry lost (should not happen); run anyway.
                None => Pickup::Run(CancelFlag::new()),
            }
        };

        let cancel = match pickup {
            Pickup::Cancelled(record) => {
                tracing::debug!(worker = id, job_id = %job_id, "dropping cancelled job");
                broadcaster.publish(record);
                continue;
            }
            Pickup::Run(cancel) => cancel,
        };

        tracing::debug!(worker = id, job_id = %job_id, "worker processing job");

        // The job runs in its own task so a panic is contained there and
        // this worker survives to take the next job.
        let task = {
            let orchestrator = orchestrator.clone();
            let job = job.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { orchestrator.run(&job, &cancel).await })
        };

        let record = match task.await {
            Ok(record) => record,
            Err(err) => {
                tracing::error!(worker = id, job_id = %job_id, panicked = err.is_panic(), "job task died, marking failed");
                let mut record = AuditRecord::start(&job);
                let _ = record.failed(StageName::Dispatch, "worker panicked during execution");
                record
            }
        };

        let record = Arc::new(record);
        if let Some(entry) = registry.write().get_mut(&job_id) {
            entry.status = JobStatus::Done(record.clone());
        }
        broadcaster.publish(record);
    }

    tracing::debug!(worker = id, "worker stopped");
}

/// Everything wired together: provider, orchestrator, pool, broadcaster,
/// and the periodic metrics task.
pub struct AuditService {
    pool: DispatchPool,
    broadcaster: Arc<ResultBroadcaster>,
    metrics_task: JoinHandle<()>,
}

impl AuditService {
    /// Start the service with the backend selected by `config.provider`.
    /// Must run inside a tokio runtime.
    pub fn start(config: RuntimeConfig) -> Self {
        let provider = config.provider.build();
        Self::with_provider(config, provider)
    }

    /// Start the service with an explicit provider (used by tests and
    /// embedders with their own backend).
    pub fn with_provider(config: RuntimeConfig, provider: Arc<dyn LlmProvider>) -> Self {
        let orchestrator = Arc::new(AuditOrchestrator::new(provider, &config));
        let broadcaster = Arc::new(ResultBroadcaster::new(&config.broadcast));
        let metrics_task = broadcaster.spawn_metrics_task(config.broadcast.metrics_interval);
        let pool = DispatchPool::start(orchestrator, broadcaster.clone(), &config.pool);

        Self {
            pool,
            broadcaster,
            metrics_task,
        }
    }

    /// Submit a job for auditing.
    pub async fn submit(&self, job: AuditJob) -> Result<Uuid, SubmitError> {
        self.pool.submit(job).await
    }

    /// Current status of a job.
    pub fn status(&self, job_id: Uuid) -> Option<JobStatus> {
        self.pool.status(job_id)
    }

    /// Request cooperative cancellation of a job.
    pub fn cancel(&self, job_id: Uuid) -> bool {
        self.pool.cancel(job_id)
    }

    /// The broadcaster, for subscriptions and history.
    pub fn broadcaster(&self) -> &Arc<ResultBroadcaster> {
        &self.broadcaster
    }

    /// Stop accepting jobs, finish in-flight work, stop metrics.
    pub async fn shutdown(self) {
        self.metrics_task.abort();
        self.pool.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::broadcast::BroadcastMessage;
    use crate::providers::{
        ChatMessage, CompletionConfig, CompletionResponse, ProviderError, ProviderSettings,
    };

    /// Returns "[]" (zero claims) for every extraction, but only after a
    /// permit is released, so tests can hold workers busy.
    struct GatedProvider {
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl LlmProvider for GatedProvider {
        async fn complete(
            &self,
            _messages: Vec<ChatMessage>,
            _config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            let permit = self.gate.acquire().await.map_err(|_| {
                ProviderError::Connection("gate closed".into())
            })?;
            permit.forget();
            Ok(CompletionResponse {
                content: "[]".to_string(),
                model: "gated".to_string(),
            })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "gated"
        }
    }

    /// Panics when the response mentions "boom", otherwise extracts zero
    /// claims.
    struct PanickyProvider;

    #[async_trait]
    impl LlmProvider for PanickyProvider {
        async fn complete(
            &self,
            messages: Vec<ChatMessage>,
            _config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            let user = messages
                .iter()
                .find(|m| m.role == "user")
                .map(|m| m.content.clone())
                .unwrap_or_default();
            if user.contains("boom") {
                panic!("injected failure");
            }
            Ok(CompletionResponse {
                content: "[]".to_string(),
                model: "panicky".to_string(),
            })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "panicky"
        }
    }

    fn config(workers: usize, queue: usize) -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        config.pool = PoolConfig {
            workers,
            queue_size: queue,
            submit_timeout: Duration::from_millis(10),
        };
        config.provider = ProviderSettings {
            retry_backoff: Duration::from_millis(1),
            ..ProviderSettings::default()
        };
        config
    }

    fn job(response: &str) -> AuditJob {
        AuditJob::new("a question", response, vec![])
    }

    async fn wait_done(service: &AuditService, job_id: Uuid) -> Arc<AuditRecord> {
        for _ in 0..200 {
            if let Some(JobStatus::Done(record)) = service.status(job_id) {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {job_id} never completed");
    }

    #[tokio::test]
    async fn submit_acknowledges_and_completes() {
        let gate = Arc::new(Semaphore::new(100));
        let service =
            AuditService::with_provider(config(2, 8), Arc::new(GatedProvider { gate }));

        let job_id = service.submit(job("Hello there.")).await.unwrap();
        let record = wait_done(&service, job_id).await;

        assert_eq!(record.phase, AuditPhase::Scored);
        assert_eq!(record.faithfulness_score, Some(1.0));
        service.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_submission_rejected_synchronously() {
        let gate = Arc::new(Semaphore::new(100));
        let service =
            AuditService::with_provider(config(1, 4), Arc::new(GatedProvider { gate }));

        let err = service.submit(job("   ")).await.unwrap_err();
        assert_eq!(err, SubmitError::Invalid("response must not be empty"));

        let no_query = AuditJob::new("", "a response", vec![]);
        let err = service.submit(no_query).await.unwrap_err();
        assert_eq!(err, SubmitError::Invalid("query must not be empty"));
        service.shutdown().await;
    }

    #[tokio::test]
    async fn duplicate_in_flight_submission_rejected() {
        let gate = Arc::new(Semaphore::new(0));
        let service =
            AuditService::with_provider(config(1, 4), Arc::new(GatedProvider { gate: gate.clone() }));

        let first = job("some response one");
        let job_id = first.job_id;
        service.submit(first).await.unwrap();

        let duplicate = AuditJob::with_id(job_id, "q", "some response two", vec![]);
        let err = service.submit(duplicate).await.unwrap_err();
        assert_eq!(err, SubmitError::AlreadyInProgress(job_id));

        gate.add_permits(100);
        wait_done(&service, job_id).await;
        service.shutdown().await;
    }

    #[tokio::test]
    async fn flooding_past_capacity_returns_busy() {
        // One worker stuck on a gated job plus a single queue slot: the
        // third submission has nowhere to go.
        let gate = Arc::new(Semaphore::new(0));
        let service =
            AuditService::with_provider(config(1, 1), Arc::new(GatedProvider { gate: gate.clone() }));

        service.submit(job("response one")).await.unwrap();

        // Give the worker time to pull the first job off the queue.
        tokio::time::sleep(Duration::from_millis(20)).await;

        service.submit(job("response two")).await.unwrap();
        let err = service.submit(job("response three")).await.unwrap_err();
        assert_eq!(err, SubmitError::Busy);

        gate.add_permits(100);
        service.shutdown().await;
    }

    #[tokio::test]
    async fn worker_panic_fails_job_but_pool_survives() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let service = AuditService::with_provider(config(1, 4), Arc::new(PanickyProvider));

        let bad = service.submit(job("this will go boom")).await.unwrap();
        let record = wait_done(&service, bad).await;
        assert_eq!(record.phase, AuditPhase::Failed);
        assert_eq!(record.failure.as_ref().unwrap().stage, StageName::Dispatch);

        // Same (sole) worker must still process the next job.
        let good = service.submit(job("a quiet response")).await.unwrap();
        let record = wait_done(&service, good).await;
        assert_eq!(record.phase, AuditPhase::Scored);
        service.shutdown().await;
    }

    #[tokio::test]
    async fn queued_job_can_be_cancelled_before_pickup() {
        let gate = Arc::new(Semaphore::new(0));
        let service =
            AuditService::with_provider(config(1, 4), Arc::new(GatedProvider { gate: gate.clone() }));

        let blocker = service.submit(job("first response")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let queued = service.submit(job("second response")).await.unwrap();
        assert!(matches!(service.status(queued), Some(JobStatus::Queued)));
        assert!(service.cancel(queued));

        gate.add_permits(100);

        let record = wait_done(&service, queued).await;
        assert_eq!(record.phase, AuditPhase::Failed);
        let failure = record.failure.as_ref().unwrap();
        assert_eq!(failure.stage, StageName::Dispatch);
        assert!(failure.reason.contains("cancelled"));

        let record = wait_done(&service, blocker).await;
        assert_eq!(record.phase, AuditPhase::Scored);
        service.shutdown().await;
    }

    #[tokio::test]
    async fn completed_records_reach_subscribers() {
        let gate = Arc::new(Semaphore::new(100));
        let service =
            AuditService::with_provider(config(2, 8), Arc::new(GatedProvider { gate }));
        let mut sub = service.broadcaster().subscribe();

        let job_id = service.submit(job("Hello.")).await.unwrap();

        loop {
            match sub.recv().await.unwrap() {
                BroadcastMessage::AuditResult { record, .. } => {
                    assert_eq!(record.job_id, job_id);
                    break;
                }
                BroadcastMessage::MetricUpdate { .. } => continue,
            }
        }
        service.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_job_status_is_none() {
        let gate = Arc::new(Semaphore::new(100));
        let service =
            AuditService::with_provider(config(1, 4), Arc::new(GatedProvider { gate }));
        assert!(service.status(Uuid::new_v4()).is_none());
        assert!(!service.cancel(Uuid::new_v4()));
        service.shutdown().await;
    }
}
