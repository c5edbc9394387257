use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::feed::FetchError;
use crate::storage::{Database, DatabaseError, ParsedEpisode, ParsedFeed};

/// Persistence the refresh workers depend on.
///
/// Shared by every worker at once; implementations handle their own
/// concurrency.
#[async_trait]
pub trait EpisodeStore: Send + Sync {
    /// Whether `podcast_id` already has an episode with this GUID
    async fn episode_exists(&self, podcast_id: i64, guid: &str) -> Result<bool, DatabaseError>;

    /// Store a previously unseen episode under `podcast_id`
    async fn insert_episode(
        &self,
        podcast_id: i64,
        episode: &ParsedEpisode,
    ) -> Result<(), DatabaseError>;

    /// Record that a refresh pass over `podcast_id` finished at `at`
    async fn update_podcast_last_check(
        &self,
        podcast_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;
}

/// Retrieves and parses a feed: URL in, podcast metadata and episodes out.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, feed_url: &str) -> Result<ParsedFeed, FetchError>;
}

#[async_trait]
impl EpisodeStore for Database {
    async fn episode_exists(&self, podcast_id: i64, guid: &str) -> Result<bool, DatabaseError> {
        Database::episode_exists(self, podcast_id, guid).await
    }

    async fn insert_episode(
        &self,
        podcast_id: i64,
        episode: &ParsedEpisode,
    ) -> Result<(), DatabaseError> {
        Database::insert_episode(self, podcast_id, episode)
            .await
            .map(|_| ())
    }

    async fn update_podcast_last_check(
        &self,
        podcast_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        Database::update_podcast_last_check(self, podcast_id, at).await
    }
}
