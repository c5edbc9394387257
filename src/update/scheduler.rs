use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};

use super::job::{Completion, Job};
use super::queue::{QueueError, UpdateQueue};
use crate::storage::{Database, DatabaseError, Podcast};

/// Default time between two refreshes of every subscribed podcast
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Feeds the update queue: all subscribed podcasts on a fixed period, plus
/// single podcasts on request.
#[derive(Debug)]
pub struct Scheduler {
    db: Database,
    queue: UpdateQueue,
    interval: Option<Duration>,
}

impl Scheduler {
    /// `interval` of `None` (or zero) disables periodic refreshes; only the
    /// initial pass and manual requests run.
    pub fn new(db: Database, queue: UpdateQueue, interval: Option<Duration>) -> Self {
        Self {
            db,
            queue,
            interval: interval.filter(|period| !period.is_zero()),
        }
    }

    pub fn queue(&self) -> &UpdateQueue {
        &self.queue
    }

    /// Give the queue back, typically to shut it down.
    pub fn into_queue(self) -> UpdateQueue {
        self.queue
    }

    /// Enqueue one job per subscribed podcast.
    ///
    /// Waits for free workers as needed. A podcast that could not be enqueued
    /// because the queue closed is logged and left out of the result.
    pub async fn refresh_subscribed(&self) -> Result<Vec<Completion>, DatabaseError> {
        let podcasts = self.db.get_subscribed_podcasts().await?;
        tracing::info!(podcasts = podcasts.len(), "Refreshing subscribed podcasts");

        let mut completions = Vec::with_capacity(podcasts.len());
        for podcast in podcasts {
            let podcast_id = podcast.id;
            match self.refresh_podcast(podcast).await {
                Ok(completion) => completions.push(completion),
                Err(e) => {
                    tracing::warn!(podcast_id, error = %e, "Could not enqueue refresh");
                    break;
                }
            }
        }
        Ok(completions)
    }

    /// Enqueue a refresh of a single podcast.
    pub async fn refresh_podcast(&self, podcast: Podcast) -> Result<Completion, QueueError> {
        let (job, completion) = Job::new(podcast);
        self.queue.send(job).await?;
        Ok(completion)
    }

    /// Refresh now, then on every tick, and whenever a podcast arrives on
    /// `manual`. Never returns; stop it by dropping the future.
    pub async fn run(&self, mut manual: Option<mpsc::Receiver<Podcast>>) {
        let mut ticker = self.interval.map(|period| {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });

        // With a ticker the first tick fires immediately and does this
        if ticker.is_none() {
            self.refresh_all().await;
        }

        loop {
            tokio::select! {
                _ = next_tick(&mut ticker) => self.refresh_all().await,
                request = next_request(&mut manual) => match request {
                    Some(podcast) => {
                        let podcast_id = podcast.id;
                        tracing::info!(podcast_id, "Manual refresh requested");
                        if let Err(e) = self.refresh_podcast(podcast).await {
                            tracing::warn!(podcast_id, error = %e, "Could not enqueue refresh");
                        }
                    }
                    None => {
                        tracing::debug!("Manual refresh channel closed");
                        manual = None;
                    }
                },
            }
        }
    }

    async fn refresh_all(&self) {
        match self.refresh_subscribed().await {
            Ok(completions) => {
                tracing::debug!(jobs = completions.len(), "Scheduled refresh enqueued");
            }
            Err(e) => tracing::error!(error = %e, "Could not load subscribed podcasts"),
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn next_request(manual: &mut Option<mpsc::Receiver<Podcast>>) -> Option<Podcast> {
    match manual {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FetchError;
    use crate::storage::{ParsedFeed, ParsedPodcast};
    use crate::update::{EpisodeStore, FeedFetcher};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct EmptyFetcher;

    #[async_trait]
    impl FeedFetcher for EmptyFetcher {
        async fn fetch(&self, _: &str) -> Result<ParsedFeed, FetchError> {
            Ok(ParsedFeed::default())
        }
    }

    async fn scheduler(interval: Option<Duration>) -> Scheduler {
        let db = Database::open(":memory:").await.unwrap();
        let store: Arc<dyn EpisodeStore> = Arc::new(db.clone());
        let queue = UpdateQueue::builder()
            .store(store)
            .fetcher(Arc::new(EmptyFetcher))
            .workers(2)
            .episode_interval(Duration::ZERO)
            .build()
            .unwrap();
        Scheduler::new(db, queue, interval)
    }

    fn podcast(title: &str) -> ParsedPodcast {
        ParsedPodcast {
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_zero_interval_disables_ticks() {
        let s = scheduler(Some(Duration::ZERO)).await;
        assert!(s.interval.is_none());
        s.into_queue().shutdown().await;
    }

    #[tokio::test]
    async fn test_refresh_subscribed_skips_unsubscribed() {
        let s = scheduler(None).await;
        let a = s
            .db
            .insert_podcast("https://a.example.com/rss", &podcast("A"), true)
            .await
            .unwrap();
        s.db
            .insert_podcast("https://b.example.com/rss", &podcast("B"), false)
            .await
            .unwrap();

        let completions = s.refresh_subscribed().await.unwrap();
        assert_eq!(completions.len(), 1);
        for completion in completions {
            assert!(completion.wait().await.unwrap().is_success());
        }

        let checked = s.db.get_podcast(a).await.unwrap();
        assert!(checked.last_check.is_some());

        s.into_queue().shutdown().await;
    }

    #[tokio::test]
    async fn test_run_handles_manual_requests() {
        let s = Arc::new(scheduler(None).await);
        let id = s
            .db
            .insert_podcast("https://manual.example.com/rss", &podcast("M"), false)
            .await
            .unwrap();
        let target = s.db.get_podcast(id).await.unwrap();

        let (tx, rx) = mpsc::channel(1);
        let runner = {
            let s = Arc::clone(&s);
            tokio::spawn(async move { s.run(Some(rx)).await })
        };
        tx.send(target).await.unwrap();

        let mut checked = None;
        for _ in 0..100 {
            checked = s.db.get_podcast(id).await.unwrap().last_check;
            if checked.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(checked.is_some());

        runner.abort();
    }
}
