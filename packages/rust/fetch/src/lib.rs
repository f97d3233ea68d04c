//! Result fetching for aulabot's REST backend, plus the retry and cache
//! layers that wrap any [`aulabot_shared::Fetcher`].
//!
//! The usual stack, outermost first:
//!
//! ```text
//! CachedFetcher -> RetryingFetcher -> ApiClient | Storage
//! ```
//!
//! Cache hits skip the network entirely; misses go through bounded retries
//! with a per-attempt deadline.

mod cache;
mod rest;
mod retry;

pub use cache::{CacheStats, CachedFetcher, signature};
pub use rest::ApiClient;
pub use retry::{RetryPolicy, RetryingFetcher};
