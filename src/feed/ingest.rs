use anyhow::Result;

use crate::feed::parser::FeedEntry;
use crate::storage::{Database, NewItem};

/// Outcome of one ingestion pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// Number of new items stored
    pub inserted: usize,
    /// URL of the first already-known entry, where ingestion stopped
    pub watermark: Option<String>,
}

/// Stores new feed entries, stopping at the first URL already in storage.
///
/// Feeds are assumed newest-first, so the first known URL marks everything
/// after it as already seen. Entries past the watermark are never pulled from
/// the iterator. If a feed is not strictly newest-first, unseen entries below
/// the watermark are skipped.
///
/// All inserts are committed together. A crash before commit leaves nothing
/// behind, and re-running over the same feed window is a no-op by URL.
pub async fn ingest<I>(db: &Database, entries: I) -> Result<IngestReport>
where
    I: IntoIterator<Item = FeedEntry>,
{
    let mut session = db.begin().await?;
    let mut report = IngestReport::default();

    for entry in entries {
        if session.find_by_url(&entry.url).await?.is_some() {
            tracing::debug!(url = %entry.url, "Known entry reached, stopping ingestion");
            report.watermark = Some(entry.url);
            break;
        }

        let id = session
            .insert(&NewItem {
                title: entry.title,
                url: entry.url,
            })
            .await?;
        tracing::debug!(item_id = id, "New feed entry stored");
        report.inserted += 1;
    }

    session.commit().await?;
    Ok(report)
}
