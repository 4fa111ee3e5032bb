use std::time::Duration;

use crate::feed::parser::{parse_feed, FeedEntry, ParseResult};
use crate::http::{get_bytes, FetchError, MAX_BODY_SIZE};

/// Entries of one fetched feed, consumed once in document order.
pub type FeedEntries = std::vec::IntoIter<FeedEntry>;

/// Fetches and parses the feed at `url`.
///
/// The whole request (connect, headers, body) is bounded by `timeout`.
/// There is no retry here; a failed fetch is picked up again by the next
/// scheduled run.
///
/// # Errors
///
/// - [`FetchError::Network`] - Connection or TLS errors
/// - [`FetchError::Timeout`] - Request exceeded `timeout`
/// - [`FetchError::HttpStatus`] - Non-2xx HTTP response
/// - [`FetchError::ResponseTooLarge`] - Response exceeded 10MB
/// - [`FetchError::Parse`] - Invalid RSS/Atom XML
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<FeedEntries, FetchError> {
    let bytes = get_bytes(client, url, timeout, MAX_BODY_SIZE).await?;

    let ParseResult { entries, skipped } =
        parse_feed(&bytes).map_err(|e| FetchError::Parse(e.to_string()))?;

    if skipped > 0 {
        tracing::warn!(
            feed = %url,
            skipped = skipped,
            "Feed entries without title or link skipped"
        );
    }
    tracing::debug!(feed = %url, entries = entries.len(), "Feed fetched");

    Ok(entries.into_iter())
}
