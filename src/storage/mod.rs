mod episodes;
mod podcasts;
mod schema;
mod types;

pub use schema::Database;
pub use types::{
    DatabaseError, Episode, ParsedEpisode, ParsedFeed, ParsedPodcast, Podcast,
};
