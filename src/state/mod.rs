//! State shared by every task of a crawl run
//!
//! # Components
//!
//! - `StageController`: the run-wide Downloading / Extracting / Terminated switch
//! - `ProgressReporter`: the counter and bound reused by both stages
//! - `RetainedImages`: per-target retained filenames, the deduplication source

mod progress;
mod retained;
mod stage;

// Re-export main types
pub use progress::{DownloadClaim, ProgressReporter};
pub use retained::{RetainedImages, TargetImages};
pub use stage::{Stage, StageController};
