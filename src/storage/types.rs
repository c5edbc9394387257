use serde::Serialize;
use sqlx::FromRow;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another lincast process holds the database lock
    #[error("Another instance of lincast appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A lookup by id or feed URL matched no row
    #[error("Not found: {0}")]
    NotFound(String),

    /// An INSERT completed without affecting any row
    #[error("Episode '{guid}' was not stored")]
    NotInserted { guid: String },

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Map a sqlx error, recognising SQLite lock conditions
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6) surface as one of these messages.
/// SQLITE_CANTOPEN is a path or permission problem and stays `Other`.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
}

// ============================================================================
// Parsed Feed Data
// ============================================================================

/// Podcast-level metadata extracted from a feed document
#[derive(Debug, Clone, Default)]
pub struct ParsedPodcast {
    pub title: String,
    pub description: Option<String>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub image_url: Option<String>,
    pub image_title: Option<String>,
    pub link: Option<String>,
    pub language: Option<String>,
    pub categories: Vec<String>,
    pub updated: Option<i64>,
}

/// One item of a feed, ready to be stored as an episode
#[derive(Debug, Clone, Default)]
pub struct ParsedEpisode {
    pub guid: String,
    pub title: String,
    pub description: Option<String>,
    pub link: Option<String>,
    pub author_name: Option<String>,
    pub image_url: Option<String>,
    pub image_title: Option<String>,
    pub categories: Vec<String>,
    pub enclosure_url: Option<String>,
    pub enclosure_length: Option<i64>,
    pub enclosure_type: Option<String>,
    pub published: Option<i64>,
    pub updated: Option<i64>,
}

/// A fetched and parsed feed: podcast metadata plus episodes in feed order
#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    pub podcast: ParsedPodcast,
    pub episodes: Vec<ParsedEpisode>,
}

// ============================================================================
// Data Structures
// ============================================================================

/// Podcast row. `feed_url` is unique across the table.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Podcast {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub image_url: Option<String>,
    pub image_title: Option<String>,
    pub link: Option<String>,
    pub feed_url: String,
    pub language: Option<String>,
    /// Comma separated
    pub categories: Option<String>,
    pub subscribed: bool,
    pub updated: Option<i64>,
    /// Unix seconds of the last completed refresh pass
    pub last_check: Option<i64>,
    pub added: i64,
}

/// Episode row. `(podcast_id, guid)` is unique.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub id: i64,
    pub podcast_id: i64,
    pub guid: String,
    pub title: String,
    pub description: Option<String>,
    pub link: Option<String>,
    pub author_name: Option<String>,
    pub image_url: Option<String>,
    pub image_title: Option<String>,
    pub categories: Option<String>,
    pub enclosure_url: Option<String>,
    pub enclosure_length: Option<i64>,
    pub enclosure_type: Option<String>,
    pub published: Option<i64>,
    pub updated: Option<i64>,
    pub played: bool,
    /// Playback position in seconds
    pub current_progress: i64,
}

pub(crate) fn join_categories(categories: &[String]) -> Option<String> {
    if categories.is_empty() {
        None
    } else {
        Some(categories.join(","))
    }
}
