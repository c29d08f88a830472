//! Hands raw images to the CPU worker pool and persists what comes back

use crate::extract::{extract_file, Category, ExtractionResult, FeatureExtractor};
use crate::state::{ProgressReporter, StageController};
use crate::storage::TargetLayout;
use crate::HarvestError;
use image::DynamicImage;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Counts from one target's extraction pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    /// Raw images handed to the pool
    pub submitted: u64,
    /// Images whose full derived set was written
    pub succeeded: u64,
    /// Images skipped by the extractor or that failed to save
    pub skipped: u64,
}

/// Runs extraction jobs on a dedicated rayon pool
///
/// One dispatcher serves every target of a run, so `succeeded()` is the
/// run-wide "Good" count.
pub struct ExtractionDispatcher {
    pool: rayon::ThreadPool,
    extractor: Arc<dyn FeatureExtractor>,
    succeeded: AtomicU64,
}

impl ExtractionDispatcher {
    /// Builds a pool of `processes` worker threads
    pub fn new(
        processes: usize,
        extractor: Arc<dyn FeatureExtractor>,
    ) -> Result<Self, HarvestError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(processes.max(1))
            .thread_name(|i| format!("extract-{}", i))
            .build()
            .map_err(|e| HarvestError::WorkerPool(e.to_string()))?;

        Ok(Self {
            pool,
            extractor,
            succeeded: AtomicU64::new(0),
        })
    }

    /// Total images fully extracted so far, across all targets
    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::SeqCst)
    }

    /// Extracts every raw image in the target's `full/` directory
    ///
    /// Results are consumed in completion order. Once the stage becomes
    /// Terminated, queued jobs turn into no-ops and this returns without
    /// waiting for the rest.
    pub async fn run(
        &self,
        stage: &Arc<StageController>,
        progress: &ProgressReporter,
        layout: &TargetLayout,
    ) -> Result<ExtractionStats, HarvestError> {
        let mut stats = ExtractionStats::default();
        if stage.is_terminated() {
            return Ok(stats);
        }

        let images = layout.list_raw_images()?;
        progress.begin_extraction(images.len() as u64);
        if stage.claim_extract_announcement() {
            progress.println("Starting extractor...");
            progress.println("Press q to quit");
            progress.set_message("extracting");
        }
        tracing::info!(
            "Extracting {} images from {}",
            images.len(),
            layout.full_dir().display()
        );

        let (tx, mut rx) = mpsc::unbounded_channel::<ExtractionResult>();
        for path in images {
            let tx = tx.clone();
            let stage = Arc::clone(stage);
            let extractor = Arc::clone(&self.extractor);
            self.pool.spawn(move || {
                if stage.is_terminated() {
                    return;
                }
                let result = extract_file(extractor.as_ref(), &path);
                // Receiver is gone once the run is terminated
                let _ = tx.send(result);
            });
            stats.submitted += 1;
        }
        drop(tx);

        while let Some(result) = rx.recv().await {
            if stage.is_terminated() {
                tracing::info!("Extraction interrupted for {}", layout.root().display());
                break;
            }
            progress.advance();

            let Some(images) = result.images else {
                stats.skipped += 1;
                continue;
            };

            match save_derived(layout, &result.source, images).await {
                Ok(()) => {
                    stats.succeeded += 1;
                    self.succeeded.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) => {
                    tracing::warn!("Failed to save extraction of {}: {}", result.source.display(), e);
                    stats.skipped += 1;
                }
            }
        }

        Ok(stats)
    }
}

/// Writes each derived image under its category directory, keeping the raw basename
async fn save_derived(
    layout: &TargetLayout,
    source: &Path,
    images: Vec<(Category, DynamicImage)>,
) -> Result<(), HarvestError> {
    let Some(basename) = source.file_name().map(|n| n.to_os_string()) else {
        return Ok(());
    };
    let targets: Vec<_> = images
        .into_iter()
        .map(|(category, image)| (layout.category_dir(category).join(&basename), image))
        .collect();

    tokio::task::spawn_blocking(move || -> Result<(), HarvestError> {
        for (path, image) in targets {
            image.save(&path)?;
        }
        Ok(())
    })
    .await
    .map_err(|e| HarvestError::WorkerPool(e.to_string()))?
}
