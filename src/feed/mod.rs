//! Feed retrieval and parsing.
//!
//! - [`parser`] turns RSS/Atom bytes into podcast metadata and episodes
//!   using the `feed-rs` crate
//! - [`fetcher`] retrieves feeds over HTTP and is the queue's production
//!   [`FeedFetcher`](crate::update::FeedFetcher)
//! - [`subscribe`] validates a URL, reads the feed once and stores the podcast

mod fetcher;
mod parser;
mod subscribe;

pub use fetcher::{FetchError, HttpFeedFetcher, DEFAULT_FETCH_TIMEOUT, DEFAULT_USER_AGENT};
pub use parser::parse_feed;
pub use subscribe::{subscribe, SubscribeError};
