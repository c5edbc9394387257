use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{join_categories, DatabaseError, ParsedPodcast, Podcast};

const PODCAST_COLUMNS: &str = "id, title, description, author_name, author_email, image_url, \
     image_title, link, feed_url, language, categories, subscribed, updated, last_check, added";

impl Database {
    // ========================================================================
    // Podcast Operations
    // ========================================================================

    /// Insert a podcast, or refresh the metadata of the one already stored
    /// under the same feed URL. Returns the podcast id.
    ///
    /// Subscribing an existing podcast keeps its `last_check` and `added`
    /// timestamps.
    pub async fn insert_podcast(
        &self,
        feed_url: &str,
        podcast: &ParsedPodcast,
        subscribed: bool,
    ) -> Result<i64, DatabaseError> {
        let now = Utc::now().timestamp();
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO podcasts (
                title, description, author_name, author_email, image_url, image_title,
                link, feed_url, language, categories, subscribed, updated, added
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(feed_url) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                author_name = excluded.author_name,
                author_email = excluded.author_email,
                image_url = excluded.image_url,
                image_title = excluded.image_title,
                link = excluded.link,
                language = excluded.language,
                categories = excluded.categories,
                subscribed = excluded.subscribed,
                updated = excluded.updated
            RETURNING id
        "#,
        )
        .bind(&podcast.title)
        .bind(&podcast.description)
        .bind(&podcast.author_name)
        .bind(&podcast.author_email)
        .bind(&podcast.image_url)
        .bind(&podcast.image_title)
        .bind(&podcast.link)
        .bind(feed_url)
        .bind(&podcast.language)
        .bind(join_categories(&podcast.categories))
        .bind(subscribed)
        .bind(podcast.updated)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Get a podcast by id
    pub async fn get_podcast(&self, id: i64) -> Result<Podcast, DatabaseError> {
        let query = format!("SELECT {} FROM podcasts WHERE id = ?", PODCAST_COLUMNS);
        sqlx::query_as::<_, Podcast>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("podcast with id {}", id)))
    }

    /// Get a podcast by its feed URL
    pub async fn get_podcast_by_feed(&self, feed_url: &str) -> Result<Podcast, DatabaseError> {
        let query = format!("SELECT {} FROM podcasts WHERE feed_url = ?", PODCAST_COLUMNS);
        sqlx::query_as::<_, Podcast>(&query)
            .bind(feed_url)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("podcast with feed '{}'", feed_url)))
    }

    /// All podcasts ordered by title
    pub async fn get_podcasts(&self) -> Result<Vec<Podcast>, DatabaseError> {
        let query = format!("SELECT {} FROM podcasts ORDER BY title", PODCAST_COLUMNS);
        Ok(sqlx::query_as::<_, Podcast>(&query)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Podcasts the refresh scheduler should visit
    pub async fn get_subscribed_podcasts(&self) -> Result<Vec<Podcast>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM podcasts WHERE subscribed = 1 ORDER BY id",
            PODCAST_COLUMNS
        );
        Ok(sqlx::query_as::<_, Podcast>(&query)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Subscribe to or unsubscribe from a podcast
    pub async fn set_subscribed(&self, id: i64, subscribed: bool) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE podcasts SET subscribed = ? WHERE id = ?")
            .bind(subscribed)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("podcast with id {}", id)));
        }
        Ok(())
    }

    /// Record the end of a refresh pass
    pub async fn update_podcast_last_check(
        &self,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE podcasts SET last_check = ? WHERE id = ?")
            .bind(at.timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("podcast with id {}", id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn test_podcast(title: &str) -> ParsedPodcast {
        ParsedPodcast {
            title: title.to_string(),
            description: Some("About things".to_string()),
            author_name: Some("Host".to_string()),
            categories: vec!["Technology".to_string(), "News".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_podcast() {
        let db = test_db().await;
        let id = db
            .insert_podcast("https://example.com/feed.xml", &test_podcast("Show"), true)
            .await
            .unwrap();

        let podcast = db.get_podcast(id).await.unwrap();
        assert_eq!(podcast.title, "Show");
        assert_eq!(podcast.feed_url, "https://example.com/feed.xml");
        assert_eq!(podcast.categories.as_deref(), Some("Technology,News"));
        assert!(podcast.subscribed);
        assert!(podcast.last_check.is_none());
        assert!(podcast.added > 0);
    }

    #[tokio::test]
    async fn test_insert_same_feed_url_keeps_one_row() {
        let db = test_db().await;
        let url = "https://example.com/feed.xml";
        let first = db.insert_podcast(url, &test_podcast("Old"), false).await.unwrap();
        let second = db.insert_podcast(url, &test_podcast("New"), true).await.unwrap();
        assert_eq!(first, second);

        let podcasts = db.get_podcasts().await.unwrap();
        assert_eq!(podcasts.len(), 1);
        assert_eq!(podcasts[0].title, "New");
        assert!(podcasts[0].subscribed);
    }

    #[tokio::test]
    async fn test_get_missing_podcast() {
        let db = test_db().await;
        assert!(matches!(
            db.get_podcast(42).await,
            Err(DatabaseError::NotFound(_))
        ));
        assert!(matches!(
            db.get_podcast_by_feed("https://nowhere.example.com").await,
            Err(DatabaseError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_subscribed_filter() {
        let db = test_db().await;
        let a = db
            .insert_podcast("https://a.example.com/rss", &test_podcast("A"), true)
            .await
            .unwrap();
        let b = db
            .insert_podcast("https://b.example.com/rss", &test_podcast("B"), true)
            .await
            .unwrap();
        db.set_subscribed(b, false).await.unwrap();

        let subscribed = db.get_subscribed_podcasts().await.unwrap();
        assert_eq!(subscribed.len(), 1);
        assert_eq!(subscribed[0].id, a);
    }

    #[tokio::test]
    async fn test_update_last_check() {
        let db = test_db().await;
        let id = db
            .insert_podcast("https://example.com/feed.xml", &test_podcast("Show"), true)
            .await
            .unwrap();
        let now = Utc::now();
        db.update_podcast_last_check(id, now).await.unwrap();

        let podcast = db.get_podcast(id).await.unwrap();
        assert_eq!(podcast.last_check, Some(now.timestamp()));

        assert!(matches!(
            db.update_podcast_last_check(id + 1, now).await,
            Err(DatabaseError::NotFound(_))
        ));
    }
}
