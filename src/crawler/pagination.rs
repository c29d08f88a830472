//! Feed pagination and candidate extraction

use crate::crawler::CrawlContext;
use crate::feed::{filename_from_url, FeedSource, MediaItem, Target};

/// An image URL that passed validation and deduplication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub url: String,
    /// Stable local name derived from the URL
    pub filename: String,
}

/// Fetches the page after `cursor` and turns it into download candidates
///
/// Feed failures are retried after a random `page-retry-delay` sleep, with
/// no bound unless `max-attempts` is set. Every new filename is claimed in
/// the retained set right away, so a duplicate later in the same page (or
/// in a pipelined page) is not offered twice.
///
/// # Returns
///
/// The candidates and the cursor for the next page. The cursor is empty
/// when the feed is exhausted. Both are empty when the run stopped
/// downloading while this page was being handled; any filename claimed by
/// the aborted page is released again.
pub async fn fetch_page(
    ctx: &CrawlContext,
    feed: &dyn FeedSource,
    target: &Target,
    cursor: Option<&str>,
) -> (Vec<Candidate>, String) {
    let mut attempts = 0_u32;
    let page = loop {
        if ctx.should_stop() {
            return (Vec::new(), String::new());
        }

        match feed.fetch_page(target, cursor).await {
            Ok(page) => break page,
            Err(e) => {
                attempts += 1;
                if !ctx.config.crawler.may_retry(attempts) {
                    tracing::warn!(
                        "Giving up on feed page for {} after {} attempts: {}",
                        target,
                        attempts,
                        e
                    );
                    return (Vec::new(), String::new());
                }
                tracing::warn!("Feed request for {} failed, retrying: {}", target, e);
                ctx.pause(ctx.config.crawler.page_retry_delay).await;
            }
        }
    };

    let policy = ctx.config.crawler.dedup;
    let mut candidates = Vec::new();

    for raw in &page.items {
        if ctx.should_stop() {
            release(ctx, target, &candidates);
            return (Vec::new(), String::new());
        }

        for url in MediaItem::classify(raw).image_urls() {
            let Some(filename) = filename_from_url(url) else {
                tracing::debug!("Skipping malformed image URL {}", url);
                continue;
            };

            if ctx.retained.claim(&target.name, &filename, policy) {
                candidates.push(Candidate {
                    url: url.to_string(),
                    filename,
                });
            } else {
                tracing::debug!("Already retained: {}", filename);
            }
        }
    }

    tracing::debug!(
        "{}: page yielded {} new candidates from {} items",
        target,
        candidates.len(),
        page.items.len()
    );

    (candidates, page.continuation())
}

/// Gives claimed filenames back to the retained set
pub(crate) fn release(ctx: &CrawlContext, target: &Target, candidates: &[Candidate]) {
    for candidate in candidates {
        ctx.retained.release(&target.name, &candidate.filename);
    }
}
