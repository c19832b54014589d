//! URL fetching and depth-bounded crawl session management.

pub mod fetch;
pub mod frontier;

pub use fetch::{FetchedPayload, Fetcher, normalize_url};
pub use frontier::{CrawlSession, SessionState};
