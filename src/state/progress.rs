//! Shared progress counter and terminal bar
//!
//! One `ProgressReporter` spans the whole run. During downloading it counts
//! retained images against the image limit; at the first entry into the
//! extraction stage it is rescaled (index reset to zero, new bound) and
//! from then on counts extracted images.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Mutex, MutexGuard, PoisonError};

const BAR_TEMPLATE: &str = "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Counter {
    index: u64,
    max: u64,
    extracting: bool,
    /// Downloads retained this run; survives the extraction rescale
    downloaded: u64,
}

/// Outcome of trying to count a finished download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadClaim {
    /// Counted; carries the new index
    Counted(u64),

    /// The image limit was already reached, the download must be discarded
    LimitReached,

    /// Retained, but the counter already belongs to the extraction stage
    Uncounted,
}

/// Counter/bound pair guarded by a single mutex, mirrored onto a progress bar
pub struct ProgressReporter {
    counter: Mutex<Counter>,
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Creates a reporter drawing a bar on stderr
    pub fn new(max: u64) -> Self {
        let bar = ProgressBar::new(max);
        if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
            bar.set_style(style.progress_chars("##-"));
        }
        Self::with_bar(max, bar)
    }

    /// Creates a reporter that never draws
    pub fn hidden(max: u64) -> Self {
        Self::with_bar(max, ProgressBar::hidden())
    }

    fn with_bar(max: u64, bar: ProgressBar) -> Self {
        Self {
            counter: Mutex::new(Counter {
                index: 0,
                max,
                extracting: false,
                downloaded: 0,
            }),
            bar,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Counter> {
        self.counter.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn index(&self) -> u64 {
        self.lock().index
    }

    pub fn max(&self) -> u64 {
        self.lock().max
    }

    /// Downloads retained so far, including those after the rescale
    pub fn downloaded(&self) -> u64 {
        self.lock().downloaded
    }

    /// Counts a finished download unless it would exceed `limit`
    ///
    /// The check and the increment happen under one lock, so concurrent
    /// downloads can never push the total past the limit. The limit holds
    /// after the rescale too; a download finishing once extraction started
    /// is only kept (uncounted) while the total is below it.
    pub fn claim_download(&self, limit: Option<u64>) -> DownloadClaim {
        let mut counter = self.lock();
        if limit.is_some_and(|limit| counter.downloaded >= limit) {
            return DownloadClaim::LimitReached;
        }

        counter.downloaded += 1;
        if counter.extracting {
            return DownloadClaim::Uncounted;
        }

        counter.index += 1;
        if counter.index > counter.max {
            counter.max = counter.index;
            self.bar.set_length(counter.max);
        }
        self.bar.set_position(counter.index);
        DownloadClaim::Counted(counter.index)
    }

    /// Registers `count` images for extraction
    ///
    /// The first caller rescales the counter and gets true; later callers
    /// only grow the bound. Both happen under the counter lock, so a later
    /// target can never be wiped out by an earlier rescale.
    pub fn begin_extraction(&self, count: u64) -> bool {
        let mut counter = self.lock();
        let first = !counter.extracting;
        if first {
            counter.index = 0;
            counter.max = count;
            counter.extracting = true;
            self.bar.reset();
            self.bar.set_position(0);
        } else {
            counter.max += count;
        }
        self.bar.set_length(counter.max);
        first
    }

    /// Counts one completed extraction result
    pub fn advance(&self) -> u64 {
        let mut counter = self.lock();
        counter.index += 1;
        self.bar.set_position(counter.index);
        counter.index
    }

    /// Prints a line above the bar
    pub fn println(&self, message: impl AsRef<str>) {
        if self.bar.is_hidden() {
            tracing::info!("{}", message.as_ref());
        } else {
            self.bar.println(message.as_ref());
        }
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.bar.set_message(message.into());
    }

    pub fn finish(&self) {
        self.bar.finish();
    }
}
