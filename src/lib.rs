//! lincast: podcast subscriptions kept fresh by a bounded pool of refresh
//! workers over a SQLite store.

pub mod config;
pub mod feed;
pub mod storage;
pub mod update;
pub mod util;
