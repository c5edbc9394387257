use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use lincast::config::Config;
use lincast::feed::{self, HttpFeedFetcher};
use lincast::storage::{Database, DatabaseError};
use lincast::update::{Completion, EpisodeStore, JobOutcome, Scheduler, UpdateQueue};

/// Get the config directory path (~/.config/lincast/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("lincast"))
}

#[derive(Parser, Debug)]
#[command(name = "lincast", about = "Podcast subscriptions refreshed in the background")]
struct Args {
    /// Config file (default: ~/.config/lincast/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Database file, overriding the config file
    #[arg(long, value_name = "FILE")]
    database: Option<PathBuf>,

    /// Number of refresh workers, overriding the config file
    #[arg(long)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Keep subscribed podcasts refreshed until interrupted
    Run,
    /// Subscribe to a feed
    Subscribe {
        url: String,
        /// Only store the podcast; leave episodes for the next refresh
        #[arg(long)]
        no_refresh: bool,
    },
    /// Stop refreshing a podcast
    Unsubscribe { podcast_id: i64 },
    /// Refresh subscribed podcasts once and report the outcome
    Refresh {
        /// Refresh only this podcast
        #[arg(long)]
        id: Option<i64>,
    },
    /// List stored podcasts as JSON
    List,
    /// List a podcast's episodes as JSON
    Episodes { podcast_id: i64 },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshReport {
    podcast_id: i64,
    outcome: Option<JobOutcome>,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

fn build_queue(db: &Database, fetcher: Arc<HttpFeedFetcher>, config: &Config) -> Result<UpdateQueue> {
    let store: Arc<dyn EpisodeStore> = Arc::new(db.clone());
    UpdateQueue::builder()
        .store(store)
        .fetcher(fetcher)
        .workers(config.worker_count())
        .episode_interval(config.episode_interval())
        .job_timeout(config.job_timeout())
        .build()
        .context("Failed to start the update queue")
}

async fn collect_reports(pending: Vec<(i64, Completion)>) -> Vec<RefreshReport> {
    let mut reports = Vec::with_capacity(pending.len());
    for (podcast_id, completion) in pending {
        reports.push(RefreshReport {
            podcast_id,
            outcome: completion.wait().await,
        });
    }
    reports
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lincast=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        tracing::info!(path = %config_dir.display(), "Created config directory");
    }

    // User-only access to the config directory
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) =
            std::fs::set_permissions(&config_dir, std::fs::Permissions::from_mode(0o700))
        {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(database) = &args.database {
        config.database_path = Some(database.clone());
    }

    let db_path = config.database_path(&config_dir);
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: the database is locked by another lincast process.");
            std::process::exit(1);
        }
        Err(e) => return Err(e).context("Failed to open database"),
    };

    let fetcher = Arc::new(
        HttpFeedFetcher::with_user_agent(&config.user_agent, config.fetch_timeout())
            .context("Failed to build HTTP client")?,
    );

    match args.command {
        Command::Run => {
            let queue = build_queue(&db, fetcher, &config)?;
            let scheduler = Scheduler::new(db, queue, config.refresh_interval());

            tokio::select! {
                _ = scheduler.run(None) => {}
                result = tokio::signal::ctrl_c() => {
                    result.context("Failed to listen for Ctrl-C")?;
                    tracing::info!("Interrupted, waiting for running jobs");
                }
            }
            scheduler.into_queue().shutdown().await;
        }
        Command::Subscribe { url, no_refresh } => {
            let podcast = feed::subscribe(&db, fetcher.as_ref(), &url, config.allow_private_hosts)
                .await
                .with_context(|| format!("Failed to subscribe to {}", url))?;
            print_json(&podcast)?;

            if !no_refresh {
                let queue = build_queue(&db, fetcher, &config)?;
                let scheduler = Scheduler::new(db, queue, None);
                let podcast_id = podcast.id;
                let completion = scheduler.refresh_podcast(podcast).await?;
                print_json(&collect_reports(vec![(podcast_id, completion)]).await)?;
                scheduler.into_queue().shutdown().await;
            }
        }
        Command::Unsubscribe { podcast_id } => {
            db.set_subscribed(podcast_id, false)
                .await
                .with_context(|| format!("Failed to unsubscribe podcast {}", podcast_id))?;
            tracing::info!(podcast_id, "Unsubscribed");
        }
        Command::Refresh { id } => {
            let queue = build_queue(&db, fetcher, &config)?;
            let scheduler = Scheduler::new(db.clone(), queue, None);

            let pending = match id {
                Some(id) => {
                    let podcast = db
                        .get_podcast(id)
                        .await
                        .with_context(|| format!("Failed to load podcast {}", id))?;
                    vec![(id, scheduler.refresh_podcast(podcast).await?)]
                }
                None => {
                    let podcasts = db
                        .get_subscribed_podcasts()
                        .await
                        .context("Failed to load subscribed podcasts")?;
                    let mut pending = Vec::with_capacity(podcasts.len());
                    for podcast in podcasts {
                        let podcast_id = podcast.id;
                        pending.push((podcast_id, scheduler.refresh_podcast(podcast).await?));
                    }
                    pending
                }
            };

            print_json(&collect_reports(pending).await)?;
            scheduler.into_queue().shutdown().await;
        }
        Command::List => {
            let podcasts = db.get_podcasts().await.context("Failed to load podcasts")?;
            print_json(&podcasts)?;
        }
        Command::Episodes { podcast_id } => {
            let episodes = db
                .get_episodes_for_podcast(podcast_id)
                .await
                .with_context(|| format!("Failed to load episodes of podcast {}", podcast_id))?;
            print_json(&episodes)?;
        }
    }

    Ok(())
}
