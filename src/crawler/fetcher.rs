//! Image downloader
//!
//! This module handles every image request of the crawler, including:
//! - Building the HTTP client with the configured user agent
//! - Streaming the body into a `.part` file, chunk by chunk
//! - Jittered retry of failed requests
//! - Claiming a progress slot before a download becomes visible
//! - Cleaning up after cancellation

use crate::config::FeedConfig;
use crate::crawler::pagination::Candidate;
use crate::crawler::CrawlContext;
use crate::feed::Target;
use crate::state::DownloadClaim;
use crate::storage::TargetLayout;
use crate::HarvestError;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Result of a download attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The image is stored under `full/` and must be appended to the log
    Stored {
        filename: String,
        /// False when the download finished after extraction had started
        counted: bool,
    },

    /// Server answered with something other than 200; nothing was written
    HttpStatus { status: u16 },

    /// The stage left Downloading or the limit was reached; nothing was kept
    Cancelled,

    /// Every allowed attempt failed
    Failed { error: String },
}

/// How a single streamed transfer ended
enum Transfer {
    Complete,
    Status(u16),
    Cancelled,
}

/// Builds the HTTP client shared by the feed and the downloader
///
/// # Arguments
///
/// * `config` - The feed configuration carrying the user agent
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &FeedConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(Duration::from_secs(120))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Downloads one candidate into the target's `full/` directory
///
/// # Flow
///
/// 1. Sleep a random `delay-before` interval
/// 2. GET the URL; on a transport error sleep `delay-error` and retry
/// 3. Non-200 status: give up without retry, no file is created
/// 4. Stream chunks into `<name>.part`, re-checking the stage before each write
/// 5. Drop the body if the run was terminated meanwhile
/// 6. Claim a progress slot, then rename `<name>.part` to `<name>`
///
/// A cancelled candidate, including one that loses the limit claim, is
/// released from the retained set so a later page or run may offer it again.
pub async fn fetch_and_store(
    ctx: &CrawlContext,
    client: &Client,
    layout: &TargetLayout,
    target: &Target,
    candidate: Candidate,
) -> DownloadOutcome {
    let outcome = download(ctx, client, layout, &candidate).await;

    match &outcome {
        DownloadOutcome::Cancelled => {
            tracing::debug!("Cancelled {} for {}", candidate.filename, target);
            ctx.retained.release(&target.name, &candidate.filename);
        }
        DownloadOutcome::HttpStatus { status } => {
            tracing::debug!("HTTP {} for {}", status, candidate.url);
            ctx.retained.settle(&target.name, &candidate.filename);
        }
        DownloadOutcome::Failed { error } => {
            tracing::warn!("Giving up on {}: {}", candidate.url, error);
            ctx.retained.settle(&target.name, &candidate.filename);
        }
        DownloadOutcome::Stored { .. } => {
            ctx.retained.settle(&target.name, &candidate.filename);
        }
    }

    outcome
}

async fn download(
    ctx: &CrawlContext,
    client: &Client,
    layout: &TargetLayout,
    candidate: &Candidate,
) -> DownloadOutcome {
    let partial = layout.partial_path(&candidate.filename);

    if !ctx.pause(ctx.config.crawler.delay_before).await {
        return DownloadOutcome::Cancelled;
    }

    let mut attempts = 0_u32;
    loop {
        if ctx.should_stop() {
            return DownloadOutcome::Cancelled;
        }

        match stream_to_file(ctx, client, &candidate.url, &partial).await {
            Ok(Transfer::Complete) => break,
            Ok(Transfer::Status(status)) => return DownloadOutcome::HttpStatus { status },
            Ok(Transfer::Cancelled) => {
                remove_partial(&partial).await;
                return DownloadOutcome::Cancelled;
            }
            Err(e) => {
                remove_partial(&partial).await;
                attempts += 1;
                if !ctx.config.crawler.may_retry(attempts) {
                    return DownloadOutcome::Failed {
                        error: e.to_string(),
                    };
                }
                tracing::warn!("Download of {} failed, retrying: {}", candidate.url, e);
                if !ctx.pause(ctx.config.crawler.delay_error).await {
                    return DownloadOutcome::Cancelled;
                }
            }
        }
    }

    if ctx.stage.is_terminated() {
        remove_partial(&partial).await;
        return DownloadOutcome::Cancelled;
    }

    let limit = ctx.config.crawler.limit();
    let counted = match ctx.progress.claim_download(limit) {
        DownloadClaim::LimitReached => {
            remove_partial(&partial).await;
            ctx.stage.request_extracting();
            return DownloadOutcome::Cancelled;
        }
        DownloadClaim::Counted(index) => {
            if limit.is_some_and(|limit| index >= limit) {
                ctx.stage.request_extracting();
            }
            true
        }
        DownloadClaim::Uncounted => false,
    };

    if let Err(e) = tokio::fs::rename(&partial, layout.raw_path(&candidate.filename)).await {
        remove_partial(&partial).await;
        return DownloadOutcome::Failed {
            error: e.to_string(),
        };
    }

    DownloadOutcome::Stored {
        filename: candidate.filename.clone(),
        counted,
    }
}

/// Performs one GET and streams a 200 body into `partial`
async fn stream_to_file(
    ctx: &CrawlContext,
    client: &Client,
    url: &str,
    partial: &Path,
) -> Result<Transfer, HarvestError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| HarvestError::Http {
            url: url.to_string(),
            source,
        })?;

    let status = response.status();
    if status != StatusCode::OK {
        return Ok(Transfer::Status(status.as_u16()));
    }

    let mut file = File::create(partial).await?;
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        if ctx.should_stop() {
            return Ok(Transfer::Cancelled);
        }
        let chunk = chunk?;
        if chunk.is_empty() {
            break;
        }
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    Ok(Transfer::Complete)
}

async fn remove_partial(partial: &Path) {
    if let Err(e) = tokio::fs::remove_file(partial).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove {}: {}", partial.display(), e);
        }
    }
}
