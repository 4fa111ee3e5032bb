//! One ingest → enrich → publish pass.

use anyhow::{Context, Result};

use crate::config::Config;
use crate::content::{enrich_pending, EnrichReport};
use crate::feed::{fetch_feed, ingest, IngestReport};
use crate::http::build_client;
use crate::publish::{publish_pending, PublishReport, PublishTarget};
use crate::storage::{Database, StatusCounts};

/// Summary of one pipeline pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// `None` when the feed could not be fetched or parsed this run
    pub ingest: Option<IngestReport>,
    pub enrich: EnrichReport,
    pub publish: PublishReport,
    /// Item counts per state after the pass
    pub status: StatusCounts,
}

pub struct Pipeline {
    config: Config,
    db: Database,
    client: reqwest::Client,
}

impl Pipeline {
    pub fn new(config: Config, db: Database) -> Result<Self> {
        let client =
            build_client(config.request_timeout).context("Failed to create HTTP client")?;
        Ok(Self { config, db, client })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Run every step once, in order.
    ///
    /// A feed that cannot be fetched or parsed is logged and the remaining
    /// steps still run over what storage already holds. Per-item failures are
    /// recorded on the items. Only storage errors are returned.
    pub async fn run(&self) -> Result<RunReport> {
        let ingest = self.ingest().await?;
        let enrich = self.enrich().await?;
        let publish = self.publish().await?;
        let status = self.db.status_counts().await?;

        tracing::info!(
            pending = status.pending,
            retrying = status.retrying,
            done = status.done,
            abandoned = status.abandoned,
            "Run complete"
        );

        Ok(RunReport {
            ingest,
            enrich,
            publish,
            status,
        })
    }

    /// Fetch the feed and store new entries.
    pub async fn ingest(&self) -> Result<Option<IngestReport>> {
        let feed_url = self.config.feed_url.as_str();
        let entries = match fetch_feed(&self.client, feed_url, self.config.request_timeout).await
        {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(feed = %feed_url, error = %e, "Feed fetch failed, skipping ingestion");
                return Ok(None);
            }
        };

        let report = ingest(&self.db, entries)
            .await
            .context("Failed to store feed entries")?;
        tracing::info!(
            inserted = report.inserted,
            watermark = report.watermark.as_deref().unwrap_or("none"),
            "Ingestion complete"
        );
        Ok(Some(report))
    }

    /// Enrich items still lacking content.
    pub async fn enrich(&self) -> Result<EnrichReport> {
        enrich_pending(
            &self.db,
            &self.client,
            &self.config.article_selector,
            self.config.request_timeout,
        )
        .await
        .context("Failed to record enrichment results")
    }

    /// Publish every eligible item.
    pub async fn publish(&self) -> Result<PublishReport> {
        let target = PublishTarget {
            endpoint: &self.config.publish_url,
            access_token: &self.config.access_token,
            timeout: self.config.request_timeout,
        };
        publish_pending(&self.db, &self.client, &target)
            .await
            .context("Failed to record publish results")
    }
}
