use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;

use super::job::Job;
use super::traits::{EpisodeStore, FeedFetcher};
use super::worker::{Dispatch, Worker};

/// Default spacing between two episodes processed by one worker
pub const DEFAULT_EPISODE_INTERVAL: Duration = Duration::from_millis(300);

/// Default deadline for a single refresh job
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors raised when building or feeding an [`UpdateQueue`].
#[derive(Debug, Error)]
pub enum QueueError {
    /// The pool needs at least one worker
    #[error("the update queue needs at least one worker, got {0}")]
    InvalidWorkerCount(usize),
    /// No episode store was configured
    #[error("the update queue has no episode store")]
    MissingStore,
    /// No feed fetcher was configured
    #[error("the update queue has no feed fetcher")]
    MissingFetcher,
    /// The workers are gone; nothing can be dispatched any more
    #[error("the update queue is closed")]
    Closed,
}

impl QueueError {
    /// A constructor argument was out of range
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, QueueError::InvalidWorkerCount(_))
    }

    /// A collaborator the queue cannot run without was missing
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, QueueError::MissingStore | QueueError::MissingFetcher)
    }
}

/// Number of workers used when none is configured: one per available CPU.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// A fixed pool of refresh workers fed through a hand-off channel.
///
/// Every worker owns one slot. [`send`](UpdateQueue::send) waits for a free
/// slot before handing the job over, so producers slow down to the pace of
/// the pool instead of piling jobs up in memory.
#[derive(Debug)]
pub struct UpdateQueue {
    dispatch: mpsc::Sender<Dispatch>,
    slots: Arc<Semaphore>,
    workers: Vec<JoinHandle<()>>,
}

impl UpdateQueue {
    /// Start `workers` refresh workers over `store` and `fetcher` with the
    /// default pacing and deadline. Must be called inside a tokio runtime.
    pub fn new(
        store: Arc<dyn EpisodeStore>,
        fetcher: Arc<dyn FeedFetcher>,
        workers: usize,
    ) -> Result<Self, QueueError> {
        Self::builder()
            .store(store)
            .fetcher(fetcher)
            .workers(workers)
            .build()
    }

    pub fn builder() -> UpdateQueueBuilder {
        UpdateQueueBuilder::default()
    }

    /// Hand `job` to a worker, waiting while every worker is busy.
    pub async fn send(&self, job: Job) -> Result<(), QueueError> {
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| QueueError::Closed)?;
        self.dispatch
            .send(Dispatch { job, slot })
            .await
            .map_err(|_| QueueError::Closed)
    }

    /// Hand `job` to a worker only if one is free right now.
    ///
    /// Gives the job back when every worker is busy or the queue is closed.
    pub fn try_send(&self, job: Job) -> Result<(), Job> {
        let slot = match Arc::clone(&self.slots).try_acquire_owned() {
            Ok(slot) => slot,
            Err(_) => return Err(job),
        };
        self.dispatch
            .try_send(Dispatch { job, slot })
            .map_err(|e| e.into_inner().job)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Workers not currently holding a job
    pub fn idle_workers(&self) -> usize {
        self.slots.available_permits()
    }

    /// Stop accepting jobs and wait for every worker to finish the job it is
    /// running.
    pub async fn shutdown(self) {
        self.slots.close();
        drop(self.dispatch);
        for (id, handle) in self.workers.into_iter().enumerate() {
            if let Err(e) = handle.await {
                tracing::warn!(worker = id, error = %e, "Worker ended abnormally");
            }
        }
        tracing::debug!("Update queue stopped");
    }
}

/// Configures and starts an [`UpdateQueue`].
pub struct UpdateQueueBuilder {
    store: Option<Arc<dyn EpisodeStore>>,
    fetcher: Option<Arc<dyn FeedFetcher>>,
    workers: usize,
    episode_interval: Duration,
    job_timeout: Option<Duration>,
}

impl Default for UpdateQueueBuilder {
    fn default() -> Self {
        Self {
            store: None,
            fetcher: None,
            workers: default_worker_count(),
            episode_interval: DEFAULT_EPISODE_INTERVAL,
            job_timeout: Some(DEFAULT_JOB_TIMEOUT),
        }
    }
}

impl UpdateQueueBuilder {
    pub fn store(mut self, store: Arc<dyn EpisodeStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn FeedFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Minimum time between two episodes of the same worker. Zero disables
    /// pacing.
    pub fn episode_interval(mut self, interval: Duration) -> Self {
        self.episode_interval = interval;
        self
    }

    /// Deadline for a whole job; `None` lets a job run for as long as it takes
    pub fn job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Validate the configuration and spawn the workers.
    ///
    /// Nothing is spawned when validation fails.
    pub fn build(self) -> Result<UpdateQueue, QueueError> {
        if self.workers < 1 {
            return Err(QueueError::InvalidWorkerCount(self.workers));
        }
        let store = self.store.ok_or(QueueError::MissingStore)?;
        let fetcher = self.fetcher.ok_or(QueueError::MissingFetcher)?;

        let (dispatch, receiver) = mpsc::channel(self.workers);
        let receiver = Arc::new(Mutex::new(receiver));
        let slots = Arc::new(Semaphore::new(self.workers));

        let workers = (0..self.workers)
            .map(|id| {
                let worker = Worker {
                    id,
                    store: Arc::clone(&store),
                    fetcher: Arc::clone(&fetcher),
                    episode_interval: self.episode_interval,
                    job_timeout: self.job_timeout,
                };
                tokio::spawn(worker.run(Arc::clone(&receiver)))
            })
            .collect();

        tracing::info!(
            workers = self.workers,
            episode_interval_ms = self.episode_interval.as_millis() as u64,
            "Update queue started"
        );

        Ok(UpdateQueue {
            dispatch,
            slots,
            workers,
        })
    }
}
