//! Small helpers shared across modules.
//!
//! - **URL validation**: feed URLs must be absolute http(s) URLs, and by
//!   default may not point at loopback or private networks.

mod url_validator;

pub use url_validator::{validate_feed_url, UrlValidationError};
