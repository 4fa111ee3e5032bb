//! Poll a syndication feed, enrich new entries with full article content and a
//! lead image, and repost them to a social-media endpoint with bounded,
//! per-item retries.
//!
//! One invocation runs one [`pipeline::Pipeline`] pass; scheduling is left to
//! cron or a systemd timer.

pub mod config;
pub mod content;
pub mod feed;
pub mod http;
pub mod pipeline;
pub mod publish;
pub mod storage;
