use anyhow::Result;
use feed_rs::model::{Entry, Feed, Text};
use feed_rs::parser;
use sha2::{Digest, Sha256};

use crate::storage::{ParsedEpisode, ParsedFeed, ParsedPodcast};

/// Parse RSS/Atom bytes into podcast metadata and episodes in feed order.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed> {
    let feed = parser::parse(bytes)?;
    let podcast = podcast_from(&feed);
    let episodes = feed.entries.into_iter().map(episode_from).collect();

    Ok(ParsedFeed { podcast, episodes })
}

fn podcast_from(feed: &Feed) -> ParsedPodcast {
    let author = feed.authors.first();
    let image = feed.logo.as_ref().or(feed.icon.as_ref());

    ParsedPodcast {
        title: text(&feed.title).unwrap_or_else(|| "Untitled".to_string()),
        description: text(&feed.description),
        author_name: author.map(|a| a.name.clone()).filter(|n| !n.is_empty()),
        author_email: author.and_then(|a| a.email.clone()),
        image_url: image.map(|i| i.uri.clone()),
        image_title: image.and_then(|i| i.title.clone()),
        link: feed.links.first().map(|l| l.href.clone()),
        language: feed.language.clone(),
        categories: feed.categories.iter().map(|c| c.term.clone()).collect(),
        updated: feed.updated.map(|dt| dt.timestamp()),
    }
}

fn episode_from(entry: Entry) -> ParsedEpisode {
    let link = entry.links.first().map(|l| l.href.clone());
    let published = entry.published.map(|dt| dt.timestamp());
    let updated = entry.updated.map(|dt| dt.timestamp());
    let title = text(&entry.title).unwrap_or_else(|| "Untitled".to_string());
    let description = text(&entry.summary).or_else(|| entry.content.and_then(|c| c.body));

    // RSS <enclosure> elements surface as media content
    let enclosure = entry.media.iter().flat_map(|m| m.content.iter()).next();
    let thumbnail = entry
        .media
        .iter()
        .flat_map(|m| m.thumbnails.iter())
        .next()
        .map(|t| &t.image);

    let existing_id = if entry.id.is_empty() {
        None
    } else {
        Some(entry.id.as_str())
    };
    let guid = generate_guid(existing_id, link.as_deref(), &title, published.or(updated));

    ParsedEpisode {
        guid,
        title,
        description,
        link,
        author_name: entry
            .authors
            .first()
            .map(|a| a.name.clone())
            .filter(|n| !n.is_empty()),
        image_url: thumbnail.map(|i| i.uri.clone()),
        image_title: thumbnail.and_then(|i| i.title.clone()),
        categories: entry.categories.iter().map(|c| c.term.clone()).collect(),
        enclosure_url: enclosure.and_then(|c| c.url.as_ref().map(|u| u.to_string())),
        enclosure_length: enclosure
            .and_then(|c| c.size)
            .and_then(|size| i64::try_from(size).ok()),
        enclosure_type: enclosure.and_then(|c| c.content_type.as_ref().map(|m| m.to_string())),
        published,
        updated,
    }
}

fn text(value: &Option<Text>) -> Option<String> {
    value
        .as_ref()
        .map(|t| t.content.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Use the feed's own identifier when it has one, otherwise a stable hash of
/// the fields that identify an item.
fn generate_guid(
    existing: Option<&str>,
    url: Option<&str>,
    title: &str,
    published: Option<i64>,
) -> String {
    if let Some(guid) = existing {
        let trimmed = guid.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let input = format!(
        "{}|{}|{}",
        url.unwrap_or(""),
        title,
        published.map(|p| p.to_string()).unwrap_or_default()
    );
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)
}
