//! Crawler coordinator - run orchestration
//!
//! This module wires the crawl together:
//! - One independent task per target
//! - Resume from the per-target log
//! - Page N+1 fetched while page N downloads
//! - Hand-off to the extraction dispatcher once the stage allows it
//! - A run summary collected from every task

use crate::config::{Config, DelayRange};
use crate::crawler::fetcher::{build_http_client, fetch_and_store, DownloadOutcome};
use crate::crawler::keyboard::spawn_listener;
use crate::crawler::pagination::{self, fetch_page, Candidate};
use crate::extract::{ExtractionDispatcher, FeatureExtractor};
use crate::feed::{FeedSource, Target};
use crate::state::{ProgressReporter, RetainedImages, Stage, StageController};
use crate::storage::{PersistenceLog, TargetLayout};
use crate::HarvestError;
use futures::stream::{self, StreamExt};
use rand::Rng;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Longest uninterrupted sleep while waiting out a delay
const STAGE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// State every task of a run shares
pub struct CrawlContext {
    pub config: Arc<Config>,
    pub stage: Arc<StageController>,
    pub progress: Arc<ProgressReporter>,
    pub retained: Arc<RetainedImages>,
}

impl CrawlContext {
    /// Creates a context with an empty retained set and a hidden progress bar
    pub fn new(config: Config, initial: Stage) -> Self {
        let max = config.crawler.image_limit;
        Self {
            config: Arc::new(config),
            stage: Arc::new(StageController::new(initial)),
            progress: Arc::new(ProgressReporter::hidden(max)),
            retained: Arc::new(RetainedImages::new()),
        }
    }

    /// Whether downloading work should stop now
    ///
    /// True once the stage left Downloading. Also true when the image
    /// limit has been reached, in which case the stage is moved to
    /// Extracting.
    pub fn should_stop(&self) -> bool {
        if !self.stage.is_downloading() {
            return true;
        }

        if let Some(limit) = self.config.crawler.limit() {
            if self.progress.downloaded() >= limit {
                self.stage.request_extracting();
                return true;
            }
        }
        false
    }

    /// Sleeps a random duration from `range`, waking early if work must stop
    ///
    /// Returns false when it woke because of `should_stop`.
    pub async fn pause(&self, range: DelayRange) -> bool {
        let mut remaining = jitter(range);
        while !remaining.is_zero() {
            if self.should_stop() {
                return false;
            }
            let step = remaining.min(STAGE_POLL_INTERVAL);
            tokio::time::sleep(step).await;
            remaining -= step;
        }
        !self.should_stop()
    }
}

fn jitter(range: DelayRange) -> Duration {
    let millis = if range.max() > range.min() {
        rand::rng().random_range(range.min()..=range.max())
    } else {
        range.min()
    };
    Duration::from_millis(millis)
}

/// Outcome of a whole run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Images stored during this run, across all targets
    pub downloaded: u64,
    /// Images whose full derived set was written
    pub extracted: u64,
    /// Targets whose task failed, with the reason
    pub failed_targets: Vec<(Target, String)>,
    /// Stage the run ended in
    pub stage: Stage,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    ctx: Arc<CrawlContext>,
    targets: Vec<Target>,
    feed: Arc<dyn FeedSource>,
    client: Client,
    dispatcher: Arc<ExtractionDispatcher>,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The merged configuration
    /// * `targets` - Hashtags or accounts to crawl
    /// * `feed` - Source of feed pages
    /// * `extractor` - Feature extraction run on the worker pool
    /// * `initial` - `Stage::Extracting` to skip downloading entirely
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(HarvestError)` - The HTTP client or worker pool could not be built
    pub fn new(
        config: Config,
        targets: Vec<Target>,
        feed: Arc<dyn FeedSource>,
        extractor: Arc<dyn FeatureExtractor>,
        initial: Stage,
    ) -> Result<Self, HarvestError> {
        let client = build_http_client(&config.feed)?;
        let dispatcher = ExtractionDispatcher::new(config.crawler.processes, extractor)?;
        let progress = ProgressReporter::new(config.crawler.image_limit);

        let ctx = CrawlContext {
            config: Arc::new(config),
            stage: Arc::new(StageController::new(initial)),
            progress: Arc::new(progress),
            retained: Arc::new(RetainedImages::new()),
        };

        Ok(Self {
            ctx: Arc::new(ctx),
            targets,
            feed,
            client,
            dispatcher: Arc::new(dispatcher),
        })
    }

    /// Replaces the terminal progress bar, e.g. with `ProgressReporter::hidden`
    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        let ctx = CrawlContext {
            config: Arc::clone(&self.ctx.config),
            stage: Arc::clone(&self.ctx.stage),
            progress: Arc::new(progress),
            retained: Arc::clone(&self.ctx.retained),
        };
        self.ctx = Arc::new(ctx);
        self
    }

    pub fn context(&self) -> &Arc<CrawlContext> {
        &self.ctx
    }

    pub fn stage(&self) -> &Arc<StageController> {
        &self.ctx.stage
    }

    /// Runs every target to completion
    ///
    /// Targets run concurrently and independently. A failing target is
    /// logged and recorded in the summary; the others carry on.
    pub async fn run(&self) -> RunSummary {
        tracing::info!(
            "Starting run for {} targets in stage {}",
            self.targets.len(),
            self.ctx.stage.current()
        );

        let handles: Vec<(Target, JoinHandle<Result<u64, HarvestError>>)> = self
            .targets
            .iter()
            .map(|target| {
                let task = TargetTask {
                    ctx: Arc::clone(&self.ctx),
                    feed: Arc::clone(&self.feed),
                    client: self.client.clone(),
                    dispatcher: Arc::clone(&self.dispatcher),
                    target: target.clone(),
                };
                (target.clone(), tokio::spawn(task.run()))
            })
            .collect();

        let mut downloaded = 0;
        let mut failed_targets = Vec::new();

        for (target, handle) in handles {
            match handle.await {
                Ok(Ok(count)) => downloaded += count,
                Ok(Err(e)) => {
                    tracing::error!("Target {} failed: {}", target, e);
                    failed_targets.push((target, e.to_string()));
                }
                Err(e) => {
                    let error = HarvestError::Task {
                        target: target.to_string(),
                        message: e.to_string(),
                    };
                    tracing::error!("{}", error);
                    failed_targets.push((target, error.to_string()));
                }
            }
        }

        let summary = RunSummary {
            downloaded,
            extracted: self.dispatcher.succeeded(),
            failed_targets,
            stage: self.ctx.stage.current(),
        };

        tracing::info!(
            "Run finished in stage {}: {} downloaded, {} extracted, {} failed targets",
            summary.stage,
            summary.downloaded,
            summary.extracted,
            summary.failed_targets.len()
        );

        summary
    }
}

/// Everything one target's task owns
struct TargetTask {
    ctx: Arc<CrawlContext>,
    feed: Arc<dyn FeedSource>,
    client: Client,
    dispatcher: Arc<ExtractionDispatcher>,
    target: Target,
}

impl TargetTask {
    /// Downloads (unless the run started past that stage), then extracts
    ///
    /// Returns the number of images stored by this task.
    async fn run(self) -> Result<u64, HarvestError> {
        let layout = TargetLayout::new(&self.ctx.config.output.base_path, &self.target.name);
        layout.ensure()?;

        let downloaded = if self.ctx.stage.is_downloading() {
            self.download(&layout).await?
        } else {
            0
        };

        if self.ctx.stage.is_extracting() {
            let stats = self
                .dispatcher
                .run(&self.ctx.stage, &self.ctx.progress, &layout)
                .await?;
            tracing::info!(
                "{}: extracted {} of {} images",
                self.target,
                stats.succeeded,
                stats.submitted
            );
        }

        Ok(downloaded)
    }

    async fn download(&self, layout: &TargetLayout) -> Result<u64, HarvestError> {
        let ctx = &self.ctx;
        if ctx.stage.claim_download_announcement() {
            ctx.progress.println("Starting download...");
            ctx.progress.println("Press e to run extractor");
            ctx.progress.println("Press q to quit");
            ctx.progress.set_message("downloading");
        }

        let (mut log, existing) = PersistenceLog::open(&layout.log_path())?;
        ctx.retained.seed(&self.target.name, &existing);
        tracing::info!(
            "{}: {} images already retained in {}",
            self.target,
            existing.len(),
            log.path().display()
        );

        let threads = ctx.config.crawler.threads.max(1);
        let mut downloaded = 0_u64;
        let mut next = Some(self.spawn_page(None));

        while let Some(pending) = next.take() {
            let (candidates, cursor) = pending.await.map_err(|e| HarvestError::Task {
                target: self.target.to_string(),
                message: e.to_string(),
            })?;

            if !cursor.is_empty() && ctx.stage.is_downloading() {
                next = Some(self.spawn_page(Some(cursor)));
            }

            let mut outcomes = stream::iter(candidates)
                .map(|candidate| fetch_and_store(ctx, &self.client, layout, &self.target, candidate))
                .buffer_unordered(threads);

            while let Some(outcome) = outcomes.next().await {
                if let DownloadOutcome::Stored { filename, .. } = outcome {
                    log.append(&filename)?;
                    downloaded += 1;
                }
            }

            if !ctx.stage.is_downloading() {
                break;
            }
        }

        if let Some(pending) = next {
            pending.abort();
            // A page that finished before the abort still holds claims
            if let Ok((candidates, _)) = pending.await {
                pagination::release(ctx, &self.target, &candidates);
            }
        }

        tracing::info!(
            "{}: downloaded {} images, {} retained in total",
            self.target,
            downloaded,
            log.len()
        );
        Ok(downloaded)
    }

    fn spawn_page(&self, cursor: Option<String>) -> JoinHandle<(Vec<Candidate>, String)> {
        let ctx = Arc::clone(&self.ctx);
        let feed = Arc::clone(&self.feed);
        let target = self.target.clone();
        tokio::spawn(async move { fetch_page(&ctx, feed.as_ref(), &target, cursor.as_deref()).await })
    }
}

/// Runs a complete crawl with interactive stage control
///
/// Starts the keyboard listener, runs every target, then finishes the
/// progress bar and restores the terminal.
pub async fn run_crawl(coordinator: Coordinator) -> RunSummary {
    let listener = match spawn_listener(Arc::clone(coordinator.stage())) {
        Ok(listener) => Some(listener),
        Err(e) => {
            tracing::warn!("Failed to start keyboard listener: {}", e);
            None
        }
    };

    let summary = coordinator.run().await;
    coordinator.context().progress.finish();

    if let Some(listener) = listener {
        listener.stop();
    }
    summary
}
