//! Background feed refresh.
//!
//! Producers wrap a [`Podcast`](crate::storage::Podcast) in a [`Job`] and hand
//! it to the [`UpdateQueue`], a fixed pool of workers. Each worker fetches the
//! podcast's feed, stores the episodes it has not seen yet and records the
//! time of the check. The producer learns how it went through the job's
//! [`Completion`], or simply drops it.
//!
//! The [`Scheduler`] is the usual producer: it refreshes every subscribed
//! podcast periodically and forwards manual refresh requests.
//!
//! Storage and network access are injected through [`EpisodeStore`] and
//! [`FeedFetcher`] so the pipeline can run against fakes.

mod job;
mod queue;
mod scheduler;
mod traits;
mod worker;

pub use job::{Completion, Job, JobOutcome, RefreshSummary};
pub use queue::{
    default_worker_count, QueueError, UpdateQueue, UpdateQueueBuilder, DEFAULT_EPISODE_INTERVAL,
    DEFAULT_JOB_TIMEOUT,
};
pub use scheduler::{Scheduler, DEFAULT_REFRESH_INTERVAL};
pub use traits::{EpisodeStore, FeedFetcher};
