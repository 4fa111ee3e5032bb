//! Feed polling and deduplicating ingestion.
//!
//! - [`parser`] - Feed parsing using the `feed-rs` crate
//! - [`fetcher`] - Bounded HTTP retrieval of the configured feed
//! - [`ingest`] - Watermark-based dedup into storage
//!
//! # Example
//!
//! ```ignore
//! use feedcast::feed::{fetch_feed, ingest};
//!
//! let entries = fetch_feed(&client, &config.feed_url, config.request_timeout).await?;
//! let report = ingest(&db, entries).await?;
//! ```

mod fetcher;
mod ingest;
mod parser;

pub use fetcher::{fetch_feed, FeedEntries};
pub use ingest::{ingest, IngestReport};
pub use parser::{parse_feed, FeedEntry, ParseResult};
