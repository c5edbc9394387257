use serde::Serialize;
use tokio::sync::oneshot;

use crate::storage::Podcast;

/// Counters for one refresh pass over a feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    /// Episodes stored by this pass
    pub inserted: usize,
    /// Episodes that were already stored
    pub existing: usize,
    /// Episodes abandoned because the store failed on them
    pub skipped: usize,
    /// Whether the podcast's last-check timestamp was written
    pub checkpointed: bool,
}

impl RefreshSummary {
    pub(crate) fn into_outcome(self) -> JobOutcome {
        if self.skipped == 0 && self.checkpointed {
            JobOutcome::Updated(self)
        } else {
            JobOutcome::Partial(self)
        }
    }
}

/// What happened to a job, delivered through its [`Completion`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    /// Every episode was handled and the checkpoint saved
    Updated(RefreshSummary),
    /// The pass finished but skipped episodes or could not save the checkpoint
    Partial(RefreshSummary),
    /// The feed could not be fetched or parsed; nothing was stored
    FetchFailed { reason: String },
    /// The job deadline expired before the pass finished
    TimedOut,
}

impl JobOutcome {
    /// True for [`JobOutcome::Updated`]
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Updated(_))
    }

    /// Counters of a pass that reached the checkpoint stage
    pub fn summary(&self) -> Option<&RefreshSummary> {
        match self {
            JobOutcome::Updated(summary) | JobOutcome::Partial(summary) => Some(summary),
            JobOutcome::FetchFailed { .. } | JobOutcome::TimedOut => None,
        }
    }
}

/// A request to refresh one podcast.
///
/// Consumed by exactly one worker. The worker reports through the paired
/// [`Completion`] without ever waiting on it.
#[derive(Debug)]
pub struct Job {
    podcast: Podcast,
    done: oneshot::Sender<JobOutcome>,
}

impl Job {
    /// Create a job for `podcast` together with the handle its producer may
    /// await. Dropping the [`Completion`] is fine: the outcome is discarded.
    pub fn new(podcast: Podcast) -> (Job, Completion) {
        let (done, rx) = oneshot::channel();
        (Job { podcast, done }, Completion { rx })
    }

    pub fn podcast(&self) -> &Podcast {
        &self.podcast
    }

    /// Deliver the outcome. Returns false when nobody was listening.
    pub(crate) fn complete(self, outcome: JobOutcome) -> bool {
        self.done.send(outcome).is_ok()
    }
}

/// Producer side of a [`Job`]'s one-shot completion signal.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<JobOutcome>,
}

impl Completion {
    /// Wait for the job to finish.
    ///
    /// Returns `None` if the job was dropped unprocessed, which happens when
    /// the queue shuts down with the job still pending. There is no built-in
    /// timeout; wrap the call in `tokio::time::timeout` when one is needed.
    pub async fn wait(self) -> Option<JobOutcome> {
        self.rx.await.ok()
    }

    /// Non-blocking poll for an outcome that has already been delivered
    pub fn try_outcome(&mut self) -> Option<JobOutcome> {
        self.rx.try_recv().ok()
    }
}
