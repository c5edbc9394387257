use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, OwnedSemaphorePermit};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::job::{Job, JobOutcome, RefreshSummary};
use super::traits::{EpisodeStore, FeedFetcher};
use crate::storage::{DatabaseError, Podcast};

/// A job on its way to a worker, holding the slot it was admitted with.
pub(crate) struct Dispatch {
    pub(crate) job: Job,
    pub(crate) slot: OwnedSemaphorePermit,
}

pub(crate) type SharedReceiver = Arc<Mutex<mpsc::Receiver<Dispatch>>>;

/// One slot of the pool: pulls jobs off the shared channel and runs the
/// refresh pipeline for each, strictly one at a time.
pub(crate) struct Worker {
    pub(crate) id: usize,
    pub(crate) store: Arc<dyn EpisodeStore>,
    pub(crate) fetcher: Arc<dyn FeedFetcher>,
    pub(crate) episode_interval: Duration,
    pub(crate) job_timeout: Option<Duration>,
}

impl Worker {
    pub(crate) async fn run(self, receiver: SharedReceiver) {
        tracing::debug!(worker = self.id, "Worker started");

        // Minimum spacing between two episodes, kept across jobs. The first
        // tick completes immediately.
        let mut pacing = if self.episode_interval.is_zero() {
            None
        } else {
            let mut interval = tokio::time::interval(self.episode_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            Some(interval)
        };

        loop {
            // The lock is only held while waiting for the next job
            let next = receiver.lock().await.recv().await;
            let Some(Dispatch { job, slot }) = next else {
                break;
            };

            self.process(job, pacing.as_mut()).await;
            drop(slot);
        }

        tracing::debug!(worker = self.id, "Worker stopped");
    }

    async fn process(&self, job: Job, pacing: Option<&mut Interval>) {
        let received = Instant::now();
        let podcast = job.podcast();

        tracing::info!(
            worker = self.id,
            podcast_id = podcast.id,
            feed = %podcast.feed_url,
            "New job received"
        );

        let outcome = match self.job_timeout {
            Some(limit) => self.refresh_within(podcast, pacing, limit).await,
            None => self.refresh(podcast, pacing, &AtomicU64::new(0)).await,
        };

        match &outcome {
            JobOutcome::Updated(summary) => tracing::info!(
                worker = self.id,
                podcast_id = podcast.id,
                feed = %podcast.feed_url,
                inserted = summary.inserted,
                update_duration_ms = received.elapsed().as_millis() as u64,
                "Podcast updated"
            ),
            JobOutcome::Partial(summary) => tracing::warn!(
                worker = self.id,
                podcast_id = podcast.id,
                feed = %podcast.feed_url,
                inserted = summary.inserted,
                skipped = summary.skipped,
                checkpointed = summary.checkpointed,
                update_duration_ms = received.elapsed().as_millis() as u64,
                "Podcast partially updated"
            ),
            JobOutcome::FetchFailed { .. } | JobOutcome::TimedOut => {}
        }

        if !job.complete(outcome) {
            tracing::debug!(worker = self.id, "Nobody is waiting for the job outcome");
        }
    }

    /// Run a refresh under `limit`.
    ///
    /// Time spent waiting on the pacing interval extends the deadline; the
    /// limit bounds fetching and storage only.
    async fn refresh_within(
        &self,
        podcast: &Podcast,
        pacing: Option<&mut Interval>,
        limit: Duration,
    ) -> JobOutcome {
        let paced_nanos = AtomicU64::new(0);
        let refresh = self.refresh(podcast, pacing, &paced_nanos);
        tokio::pin!(refresh);
        let mut deadline = Instant::now() + limit;

        loop {
            tokio::select! {
                biased;
                outcome = &mut refresh => return outcome,
                _ = tokio::time::sleep_until(deadline) => {
                    let credit = Duration::from_nanos(paced_nanos.swap(0, Ordering::Relaxed));
                    if credit.is_zero() {
                        tracing::warn!(
                            worker = self.id,
                            podcast_id = podcast.id,
                            feed = %podcast.feed_url,
                            timeout_secs = limit.as_secs_f64(),
                            "Job deadline expired, abandoning refresh"
                        );
                        return JobOutcome::TimedOut;
                    }
                    deadline += credit;
                }
            }
        }
    }

    /// Fetch, diff and store, then checkpoint.
    ///
    /// Store failures only cost the episode they happened on; the next
    /// refresh of the podcast picks it up again. Only inserts are paced; time
    /// spent waiting for the pacing interval is added to `paced_nanos`.
    async fn refresh(
        &self,
        podcast: &Podcast,
        mut pacing: Option<&mut Interval>,
        paced_nanos: &AtomicU64,
    ) -> JobOutcome {
        let feed = match self.fetcher.fetch(&podcast.feed_url).await {
            Ok(feed) => feed,
            Err(e) => {
                tracing::error!(
                    worker = self.id,
                    podcast_id = podcast.id,
                    feed = %podcast.feed_url,
                    error = %e,
                    "Could not obtain the feed"
                );
                return JobOutcome::FetchFailed {
                    reason: e.to_string(),
                };
            }
        };

        let mut summary = RefreshSummary::default();

        for episode in &feed.episodes {
            match self.store.episode_exists(podcast.id, &episode.guid).await {
                Ok(true) => {
                    summary.existing += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(
                        worker = self.id,
                        podcast_id = podcast.id,
                        guid = %episode.guid,
                        error = %e,
                        "Could not check whether the episode exists"
                    );
                    summary.skipped += 1;
                    continue;
                }
            }

            tracing::debug!(
                worker = self.id,
                podcast_id = podcast.id,
                guid = %episode.guid,
                "Episode not stored yet, inserting"
            );

            if let Some(interval) = pacing.as_deref_mut() {
                let waiting = Instant::now();
                interval.tick().await;
                let waited = u64::try_from(waiting.elapsed().as_nanos()).unwrap_or(u64::MAX);
                paced_nanos.fetch_add(waited, Ordering::Relaxed);
            }

            match self.store.insert_episode(podcast.id, episode).await {
                Ok(()) => summary.inserted += 1,
                // Stored by a concurrent refresh of the same podcast
                Err(DatabaseError::NotInserted { .. }) => {
                    tracing::debug!(
                        worker = self.id,
                        podcast_id = podcast.id,
                        guid = %episode.guid,
                        "Episode stored concurrently"
                    );
                    summary.existing += 1;
                }
                Err(e) => {
                    tracing::error!(
                        worker = self.id,
                        podcast_id = podcast.id,
                        guid = %episode.guid,
                        error = %e,
                        "Could not store the episode"
                    );
                    summary.skipped += 1;
                }
            }
        }

        match self
            .store
            .update_podcast_last_check(podcast.id, Utc::now())
            .await
        {
            Ok(()) => summary.checkpointed = true,
            Err(e) => tracing::error!(
                worker = self.id,
                podcast_id = podcast.id,
                error = %e,
                "Could not update the last check time"
            ),
        }

        summary.into_outcome()
    }
}
