use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::{is_lock_message, DatabaseError};

// ============================================================================
// Database
// ============================================================================

/// Shared handle to the podcast database. Cloning is cheap (pool handle).
#[derive(Clone, Debug)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// `":memory:"` opens a private in-memory database, used by tests.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another process has the
    /// database locked, `DatabaseError::Migration` if the schema could not be
    /// created and `DatabaseError::Other` for anything else.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let in_memory = path == ":memory:";
        let url = format!("sqlite:{}?mode=rwc", path);

        // Pre-create the file with user-only permissions so it never exists
        // with the default umask.
        #[cfg(unix)]
        if !in_memory {
            use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
            let db_path = std::path::Path::new(path);
            if db_path.exists() {
                if let Err(e) =
                    std::fs::set_permissions(db_path, std::fs::Permissions::from_mode(0o600))
                {
                    tracing::warn!(path = %path, error = %e, "Failed to set database file permissions");
                }
            } else if db_path.parent().map_or(false, |p| p.exists()) {
                // If creation fails, SQLite reports the error at connect time.
                let _ = std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(0o600)
                    .open(db_path);
            }
        }

        // busy_timeout: wait up to 5s for a lock instead of failing with
        // SQLITE_BUSY while several refresh workers write concurrently.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .foreign_keys(true)
            .pragma("busy_timeout", "5000");

        // An in-memory database lives in a shared cache that does not honour
        // busy_timeout, so it gets exactly one connection.
        let max_connections = if in_memory { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        let db = Self { pool };
        db.migrate().await.map_err(|e| {
            if is_lock_message(&e.to_string()) {
                DatabaseError::InstanceLocked
            } else {
                DatabaseError::Migration(e.to_string())
            }
        })?;
        Ok(db)
    }

    /// Create tables and indexes in a single transaction.
    ///
    /// Every statement uses `IF NOT EXISTS`, so running this against an
    /// existing database is a no-op.
    async fn migrate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS podcasts (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT,
                author_name TEXT,
                author_email TEXT,
                image_url TEXT,
                image_title TEXT,
                link TEXT,
                feed_url TEXT UNIQUE NOT NULL,
                language TEXT,
                categories TEXT,
                subscribed INTEGER NOT NULL DEFAULT 0,
                updated INTEGER,
                last_check INTEGER,
                added INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS episodes (
                id INTEGER PRIMARY KEY,
                podcast_id INTEGER NOT NULL REFERENCES podcasts(id) ON DELETE CASCADE,
                guid TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                link TEXT,
                author_name TEXT,
                image_url TEXT,
                image_title TEXT,
                categories TEXT,
                enclosure_url TEXT,
                enclosure_length INTEGER,
                enclosure_type TEXT,
                published INTEGER,
                updated INTEGER,
                played INTEGER NOT NULL DEFAULT 0,
                current_progress INTEGER NOT NULL DEFAULT 0,
                UNIQUE(podcast_id, guid)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_podcasts_subscribed ON podcasts(subscribed)")
            .execute(&mut *tx)
            .await?;

        // Episode listings filter by podcast and sort newest first
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_episodes_podcast_published ON episodes(podcast_id, published DESC)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let db = Database::open(":memory:").await.unwrap();
        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('podcasts', 'episodes') ORDER BY name",
        )
        .fetch_all(&db.pool)
        .await
        .unwrap();
        assert_eq!(
            tables,
            vec![("episodes".to_string(),), ("podcasts".to_string(),)]
        );
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let db = Database::open(":memory:").await.unwrap();
        db.migrate().await.unwrap();
        db.migrate().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_file_database() {
        let dir = std::env::temp_dir().join("lincast_schema_test_file");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("podcasts.sqlite");
        let _ = std::fs::remove_file(&path);

        {
            let db = Database::open(path.to_str().unwrap()).await.unwrap();
            db.pool.close().await;
        }
        assert!(path.exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_lock_messages_recognised() {
        assert!(is_lock_message("error returned from database: database is locked"));
        assert!(is_lock_message("SQLITE_BUSY"));
        assert!(!is_lock_message("no such table: podcasts"));
        assert!(!is_lock_message(
            "error returned from database: (code: 14) unable to open database file"
        ));
    }

    #[tokio::test]
    async fn test_open_in_missing_directory_is_not_reported_as_locked() {
        let path = std::env::temp_dir()
            .join("lincast_schema_test_missing")
            .join("no_such_dir")
            .join("podcasts.sqlite");
        let _ = std::fs::remove_dir_all(path.parent().unwrap());

        let err = Database::open(path.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Other(_)), "got {:?}", err);
        assert!(!err.to_string().contains("Another instance"));
    }
}
