use anyhow::Result;
use std::time::Duration;

use super::decode::decode_page;
use super::extract::{extract_article, image_name, resolve_image_url};
use crate::http::{get_bytes, get_page, FetchError, MAX_BODY_SIZE};
use crate::storage::{Database, Enrichment, PublishState, TrackedItem};

/// Per-run enrichment counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EnrichReport {
    /// Items whose content (and lead image, if any) was stored
    pub enriched: usize,
    /// Items whose process flag was incremented instead
    pub failed: usize,
}

/// What one item's enrichment attempt produced. Staged in memory and applied
/// after all network work is done.
#[derive(Debug)]
enum Staged {
    Enriched(Enrichment),
    Failed(String),
}

/// Fetch full content and lead image for every item still lacking content.
///
/// Each item ends the run with exactly one of: content/image stored (flag
/// untouched) or flag incremented. Missing markup and fetch errors both take
/// the second branch and never stop the batch. All updates are committed once,
/// after the last request.
pub async fn enrich_pending(
    db: &Database,
    client: &reqwest::Client,
    selector: &str,
    timeout: Duration,
) -> Result<EnrichReport> {
    let items = db.needing_enrichment().await?;
    if items.is_empty() {
        return Ok(EnrichReport::default());
    }
    tracing::debug!(count = items.len(), "Enriching items");

    let mut staged = Vec::with_capacity(items.len());
    for item in items {
        let outcome = match enrich_one(client, &item, selector, timeout).await {
            Ok(Some(enrichment)) => Staged::Enriched(enrichment),
            Ok(None) => {
                tracing::warn!(
                    item_id = item.id,
                    url = %item.url,
                    selector = %selector,
                    "Article body not found"
                );
                Staged::Failed(format!("article body '{selector}' not found"))
            }
            Err(e) => {
                tracing::warn!(
                    item_id = item.id,
                    url = %item.url,
                    error = %e,
                    "Failed to fetch article content"
                );
                Staged::Failed(format!("enrichment failed: {e}"))
            }
        };
        staged.push((item, outcome));
    }

    let mut report = EnrichReport::default();
    let mut session = db.begin().await?;
    for (item, outcome) in &staged {
        match outcome {
            Staged::Enriched(enrichment) => {
                if session.apply_enrichment(item, enrichment).await? {
                    report.enriched += 1;
                }
            }
            Staged::Failed(reason) => {
                if let Some(flag) = session.record_failure(item, reason).await? {
                    report.failed += 1;
                    if flag.state() == PublishState::Abandoned {
                        tracing::error!(
                            item_id = item.id,
                            url = %item.url,
                            "Item abandoned after repeated failures"
                        );
                    }
                }
            }
        }
    }
    session.commit().await?;

    tracing::info!(
        enriched = report.enriched,
        failed = report.failed,
        "Enrichment complete"
    );
    Ok(report)
}

/// Fetch one item's page and lead image.
///
/// `Ok(None)` means the page had no article body.
async fn enrich_one(
    client: &reqwest::Client,
    item: &TrackedItem,
    selector: &str,
    timeout: Duration,
) -> Result<Option<Enrichment>, FetchError> {
    let page = get_page(client, &item.url, timeout, MAX_BODY_SIZE).await?;
    let html = decode_page(&page.body, page.content_type.as_deref());

    let Some(article) = extract_article(&html, selector) else {
        return Ok(None);
    };

    let mut enrichment = Enrichment {
        content: article.content,
        ..Enrichment::default()
    };

    if let Some(src) = article.image_src {
        match resolve_image_url(&item.url, &src) {
            Some(image_url) => {
                enrichment.image =
                    get_bytes(client, image_url.as_str(), timeout, MAX_BODY_SIZE).await?;
                enrichment.image_name = image_name(&image_url);
            }
            None => {
                tracing::debug!(item_id = item.id, src = %src, "Unresolvable image src, skipping image");
            }
        }
    }

    Ok(Some(enrichment))
}
