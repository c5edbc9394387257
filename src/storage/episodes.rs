use super::schema::Database;
use super::types::{join_categories, DatabaseError, Episode, ParsedEpisode};

/// Maximum number of episodes returned by a single listing (OOM protection)
const MAX_EPISODES: i64 = 5000;

const EPISODE_COLUMNS: &str = "id, podcast_id, guid, title, description, link, author_name, \
     image_url, image_title, categories, enclosure_url, enclosure_length, enclosure_type, \
     published, updated, played, current_progress";

impl Database {
    // ========================================================================
    // Episode Operations
    // ========================================================================

    /// Whether the podcast already has an episode with this GUID
    pub async fn episode_exists(&self, podcast_id: i64, guid: &str) -> Result<bool, DatabaseError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM episodes WHERE podcast_id = ? AND guid = ? LIMIT 1")
                .bind(podcast_id)
                .bind(guid)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// Store a new episode for `podcast_id`, returning its id.
    ///
    /// A GUID already present for the podcast is left untouched and reported
    /// as [`DatabaseError::NotInserted`].
    pub async fn insert_episode(
        &self,
        podcast_id: i64,
        episode: &ParsedEpisode,
    ) -> Result<i64, DatabaseError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO episodes (
                podcast_id, guid, title, description, link, author_name, image_url,
                image_title, categories, enclosure_url, enclosure_length, enclosure_type,
                published, updated
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(podcast_id)
        .bind(&episode.guid)
        .bind(&episode.title)
        .bind(&episode.description)
        .bind(&episode.link)
        .bind(&episode.author_name)
        .bind(&episode.image_url)
        .bind(&episode.image_title)
        .bind(join_categories(&episode.categories))
        .bind(&episode.enclosure_url)
        .bind(episode.enclosure_length)
        .bind(&episode.enclosure_type)
        .bind(episode.published)
        .bind(episode.updated)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotInserted {
                guid: episode.guid.clone(),
            });
        }
        Ok(result.last_insert_rowid())
    }

    /// Episodes of a podcast, newest first
    pub async fn get_episodes_for_podcast(
        &self,
        podcast_id: i64,
    ) -> Result<Vec<Episode>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM episodes WHERE podcast_id = ? ORDER BY published DESC, id DESC LIMIT ?",
            EPISODE_COLUMNS
        );
        Ok(sqlx::query_as::<_, Episode>(&query)
            .bind(podcast_id)
            .bind(MAX_EPISODES)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Get an episode by id
    pub async fn get_episode(&self, id: i64) -> Result<Episode, DatabaseError> {
        let query = format!("SELECT {} FROM episodes WHERE id = ?", EPISODE_COLUMNS);
        sqlx::query_as::<_, Episode>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("episode with id {}", id)))
    }

    /// Save playback state: the played flag and the position in seconds
    pub async fn set_episode_progress(
        &self,
        id: i64,
        played: bool,
        progress_secs: i64,
    ) -> Result<(), DatabaseError> {
        let result =
            sqlx::query("UPDATE episodes SET played = ?, current_progress = ? WHERE id = ?")
                .bind(played)
                .bind(progress_secs.max(0))
                .bind(id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("episode with id {}", id)));
        }
        Ok(())
    }
}
