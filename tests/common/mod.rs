//! Fakes shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Semaphore;

use lincast::feed::FetchError;
use lincast::storage::{DatabaseError, ParsedEpisode, ParsedFeed, ParsedPodcast, Podcast};
use lincast::update::{EpisodeStore, FeedFetcher};

pub fn podcast(id: i64, feed_url: &str) -> Podcast {
    Podcast {
        id,
        title: format!("Podcast {}", id),
        description: None,
        author_name: None,
        author_email: None,
        image_url: None,
        image_title: None,
        link: None,
        feed_url: feed_url.to_string(),
        language: None,
        categories: None,
        subscribed: true,
        updated: None,
        last_check: None,
        added: 0,
    }
}

pub fn episode(guid: &str) -> ParsedEpisode {
    ParsedEpisode {
        guid: guid.to_string(),
        title: format!("Episode {}", guid),
        enclosure_url: Some(format!("https://cdn.example.com/{}.mp3", guid)),
        ..Default::default()
    }
}

pub fn feed(guids: &[&str]) -> ParsedFeed {
    ParsedFeed {
        podcast: ParsedPodcast {
            title: "Fake Cast".to_string(),
            ..Default::default()
        },
        episodes: guids.iter().map(|guid| episode(guid)).collect(),
    }
}

/// In-memory episode store with injectable failures.
#[derive(Default)]
pub struct MemoryStore {
    episodes: Mutex<HashMap<i64, Vec<String>>>,
    last_checks: Mutex<HashMap<i64, Vec<DateTime<Utc>>>>,
    failing_exists: Mutex<HashSet<String>>,
    failing_inserts: Mutex<HashSet<String>>,
    failing_checkpoint: Mutex<bool>,
    hidden: Mutex<HashSet<String>>,
    insert_attempts: AtomicUsize,
}

impl MemoryStore {
    pub fn fail_exists(&self, guid: &str) {
        self.failing_exists.lock().unwrap().insert(guid.to_string());
    }

    pub fn fail_insert(&self, guid: &str) {
        self.failing_inserts.lock().unwrap().insert(guid.to_string());
    }

    pub fn fail_checkpoint(&self) {
        *self.failing_checkpoint.lock().unwrap() = true;
    }

    /// Store `guid` up front but report it as missing, the way a lookup
    /// looks when another refresh inserts the episode right after it
    pub fn store_unseen(&self, podcast_id: i64, guid: &str) {
        self.episodes
            .lock()
            .unwrap()
            .entry(podcast_id)
            .or_default()
            .push(guid.to_string());
        self.hidden.lock().unwrap().insert(guid.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing_exists.lock().unwrap().clear();
        self.failing_inserts.lock().unwrap().clear();
        *self.failing_checkpoint.lock().unwrap() = false;
    }

    /// Stored GUIDs of a podcast in insertion order
    pub fn guids(&self, podcast_id: i64) -> Vec<String> {
        self.episodes
            .lock()
            .unwrap()
            .get(&podcast_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn last_checks(&self, podcast_id: i64) -> Vec<DateTime<Utc>> {
        self.last_checks
            .lock()
            .unwrap()
            .get(&podcast_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn insert_attempts(&self) -> usize {
        self.insert_attempts.load(Ordering::SeqCst)
    }
}

fn injected(what: &str) -> DatabaseError {
    DatabaseError::Migration(format!("injected {} failure", what))
}

#[async_trait]
impl EpisodeStore for MemoryStore {
    async fn episode_exists(&self, podcast_id: i64, guid: &str) -> Result<bool, DatabaseError> {
        if self.failing_exists.lock().unwrap().contains(guid) {
            return Err(injected("lookup"));
        }
        if self.hidden.lock().unwrap().contains(guid) {
            return Ok(false);
        }
        Ok(self
            .episodes
            .lock()
            .unwrap()
            .get(&podcast_id)
            .is_some_and(|guids| guids.iter().any(|g| g == guid)))
    }

    async fn insert_episode(
        &self,
        podcast_id: i64,
        episode: &ParsedEpisode,
    ) -> Result<(), DatabaseError> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing_inserts.lock().unwrap().contains(&episode.guid) {
            return Err(injected("insert"));
        }
        let mut episodes = self.episodes.lock().unwrap();
        let guids = episodes.entry(podcast_id).or_default();
        if guids.contains(&episode.guid) {
            return Err(DatabaseError::NotInserted {
                guid: episode.guid.clone(),
            });
        }
        guids.push(episode.guid.clone());
        Ok(())
    }

    async fn update_podcast_last_check(
        &self,
        podcast_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        if *self.failing_checkpoint.lock().unwrap() {
            return Err(injected("checkpoint"));
        }
        self.last_checks
            .lock()
            .unwrap()
            .entry(podcast_id)
            .or_default()
            .push(at);
        Ok(())
    }
}

enum Script {
    Feed(ParsedFeed),
    Fail(u16),
}

/// Serves canned feeds by URL. Fetches can be delayed, or held at a gate
/// until the test opens it.
pub struct StaticFetcher {
    scripts: Mutex<HashMap<String, Script>>,
    delays: Mutex<HashMap<String, Duration>>,
    gate: Option<Semaphore>,
    started: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            gate: None,
            started: AtomicUsize::new(0),
        }
    }

    /// Every fetch waits until [`open_gate`](Self::open_gate) lets it through
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn with_feed(self, url: &str, feed: ParsedFeed) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), Script::Feed(feed));
        self
    }

    pub fn with_status(self, url: &str, status: u16) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), Script::Fail(status));
        self
    }

    pub fn with_delay(self, url: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(url.to_string(), delay);
        self
    }

    /// Let `n` waiting or future fetches through the gate
    pub fn open_gate(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Poll until `n` fetches have started
    pub async fn wait_started(&self, n: usize) {
        while self.started() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl FeedFetcher for StaticFetcher {
    async fn fetch(&self, feed_url: &str) -> Result<ParsedFeed, FetchError> {
        self.started.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let delay = self.delays.lock().unwrap().get(feed_url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match self.scripts.lock().unwrap().get(feed_url) {
            Some(Script::Feed(feed)) => Ok(feed.clone()),
            Some(Script::Fail(status)) => Err(FetchError::HttpStatus(*status)),
            None => Err(FetchError::HttpStatus(404)),
        }
    }
}
