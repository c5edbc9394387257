use thiserror::Error;

use crate::feed::FetchError;
use crate::storage::{Database, DatabaseError, Podcast};
use crate::update::FeedFetcher;
use crate::util::{validate_feed_url, UrlValidationError};

/// Errors that can occur while subscribing to a new feed.
#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("invalid feed URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),
    #[error("feed could not be retrieved: {0}")]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Subscribes to the feed at `url`.
///
/// The feed is fetched once to read the podcast metadata; its episodes are
/// left for the update queue. Subscribing to a feed URL that is already
/// stored refreshes its metadata and marks it subscribed again.
pub async fn subscribe(
    db: &Database,
    fetcher: &dyn FeedFetcher,
    url: &str,
    allow_private_hosts: bool,
) -> Result<Podcast, SubscribeError> {
    let url = validate_feed_url(url, allow_private_hosts)?;
    let feed_url = url.as_str();

    let feed = fetcher.fetch(feed_url).await?;
    let id = db.insert_podcast(feed_url, &feed.podcast, true).await?;

    tracing::info!(
        podcast_id = id,
        feed = %feed_url,
        title = %feed.podcast.title,
        "Subscribed to podcast"
    );
    Ok(db.get_podcast(id).await?)
}
