//! Background verification queue
//!
//! Jobs go through an unbounded channel to a fixed pool of workers that
//! share one orchestrator. Retryable failures are re-enqueued with
//! exponential backoff until the orchestrator's attempt limit.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fundproof_core::WorkerConfig;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::orchestrator::VerificationOrchestrator;
use crate::{JobError, Result};

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Number of worker tasks
    pub concurrency: usize,
    /// Delay before the first retry
    pub retry_backoff: Duration,
    /// Upper bound for any retry delay
    pub backoff_cap: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::from_config(&WorkerConfig::default())
    }
}

impl QueueConfig {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            backoff_cap: Duration::from_millis(config.backoff_cap_ms),
        }
    }

    /// `retry_backoff * 2^(attempt-1)`, capped
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.retry_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.backoff_cap)
    }
}

/// One processing request; `attempt` starts at 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationJob {
    pub document_id: Uuid,
    pub attempt: u32,
}

impl VerificationJob {
    pub fn new(document_id: Uuid) -> Self {
        Self {
            document_id,
            attempt: 1,
        }
    }

    fn next_attempt(self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self
        }
    }
}

/// Jobs submitted but not yet finished, retries included
#[derive(Debug, Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn add(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn done(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_one();
        }
    }

    fn get(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

pub struct VerificationQueue {
    sender: mpsc::UnboundedSender<VerificationJob>,
    workers: Vec<JoinHandle<()>>,
    in_flight: Arc<InFlight>,
}

impl VerificationQueue {
    /// Spawn the worker pool on the current runtime
    pub fn start(orchestrator: Arc<VerificationOrchestrator>, config: QueueConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(Mutex::new(receiver));
        let in_flight = Arc::new(InFlight::default());

        let workers = (0..config.concurrency.max(1))
            .map(|id| {
                let worker = Worker {
                    id,
                    orchestrator: orchestrator.clone(),
                    receiver: receiver.clone(),
                    retry: sender.downgrade(),
                    in_flight: in_flight.clone(),
                    config: config.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        tracing::info!(workers = config.concurrency, "verification queue started");
        Self {
            sender,
            workers,
            in_flight,
        }
    }

    /// Enqueue a document for verification; never waits
    pub fn submit_verification(&self, document_id: Uuid) -> Result<()> {
        self.in_flight.add();
        self.sender
            .send(VerificationJob::new(document_id))
            .map_err(|_| {
                self.in_flight.done();
                JobError::QueueClosed
            })
    }

    /// Jobs submitted and not yet finished
    pub fn pending(&self) -> usize {
        self.in_flight.get()
    }

    /// Wait until every submitted job, retries included, has finished
    pub async fn drain(&self) {
        while self.in_flight.get() > 0 {
            self.in_flight.idle.notified().await;
        }
    }

    /// Finish outstanding work, then stop the workers
    pub async fn shutdown(self) {
        self.drain().await;
        drop(self.sender);

        for result in futures::future::join_all(self.workers).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "verification worker crashed");
            }
        }
        tracing::info!("verification queue stopped");
    }
}

struct Worker {
    id: usize,
    orchestrator: Arc<VerificationOrchestrator>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<VerificationJob>>>,
    retry: mpsc::WeakUnboundedSender<VerificationJob>,
    in_flight: Arc<InFlight>,
    config: QueueConfig,
}

impl Worker {
    async fn run(self) {
        loop {
            let job = self.receiver.lock().await.recv().await;
            let Some(job) = job else {
                break;
            };
            self.handle(job).await;
        }
        tracing::debug!(worker = self.id, "worker stopped");
    }

    async fn handle(&self, job: VerificationJob) {
        match self.orchestrator.process(job.document_id, job.attempt).await {
            Ok(outcome) => {
                tracing::debug!(worker = self.id, document_id = %job.document_id, %outcome, "job done");
                self.in_flight.done();
            }
            Err(e) if e.is_retryable() && job.attempt < self.orchestrator.max_attempts() => {
                self.schedule_retry(job, &e);
            }
            Err(e) => {
                tracing::error!(
                    worker = self.id,
                    document_id = %job.document_id,
                    attempt = job.attempt,
                    error = %e,
                    "job abandoned"
                );
                self.in_flight.done();
            }
        }
    }

    fn schedule_retry(&self, job: VerificationJob, error: &JobError) {
        let Some(sender) = self.retry.upgrade() else {
            tracing::warn!(document_id = %job.document_id, "queue closed, retry dropped");
            self.in_flight.done();
            return;
        };

        let delay = self.config.retry_delay(job.attempt);
        tracing::warn!(
            document_id = %job.document_id,
            attempt = job.attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "retry scheduled"
        );

        let in_flight = self.in_flight.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if sender.send(job.next_attempt()).is_err() {
                in_flight.done();
            }
        });
    }
}
