//! Run lifecycle stage shared by every target task
//!
//! The stage only moves forward: Downloading -> Extracting -> Terminated,
//! or straight to Terminated from either earlier stage.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Current phase of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Paging through feeds and downloading images
    Downloading,

    /// Running the feature extractor over downloaded images
    Extracting,

    /// Quit requested; every task unwinds at its next poll point
    Terminated,
}

impl Stage {
    fn as_u8(self) -> u8 {
        match self {
            Self::Downloading => 0,
            Self::Extracting => 1,
            Self::Terminated => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Downloading,
            1 => Self::Extracting,
            _ => Self::Terminated,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Downloading => "downloading",
            Self::Extracting => "extracting",
            Self::Terminated => "terminated",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Thread-safe holder of the run stage and its one-shot banner flags
#[derive(Debug)]
pub struct StageController {
    stage: AtomicU8,
    download_announced: AtomicBool,
    extract_announced: AtomicBool,
}

impl StageController {
    /// Creates a controller starting in `initial`
    pub fn new(initial: Stage) -> Self {
        Self {
            stage: AtomicU8::new(initial.as_u8()),
            download_announced: AtomicBool::new(false),
            extract_announced: AtomicBool::new(false),
        }
    }

    pub fn current(&self) -> Stage {
        Stage::from_u8(self.stage.load(Ordering::SeqCst))
    }

    pub fn is_downloading(&self) -> bool {
        self.current() == Stage::Downloading
    }

    pub fn is_extracting(&self) -> bool {
        self.current() == Stage::Extracting
    }

    pub fn is_terminated(&self) -> bool {
        self.current() == Stage::Terminated
    }

    /// Moves Downloading -> Extracting
    ///
    /// Returns true only for the caller that performed the transition.
    pub fn request_extracting(&self) -> bool {
        let moved = self
            .stage
            .compare_exchange(
                Stage::Downloading.as_u8(),
                Stage::Extracting.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();

        if moved {
            tracing::info!("Stage changed: downloading -> extracting");
        }
        moved
    }

    /// Moves any stage to Terminated
    ///
    /// Returns true only for the caller that performed the transition.
    pub fn terminate(&self) -> bool {
        let previous = Stage::from_u8(
            self.stage
                .swap(Stage::Terminated.as_u8(), Ordering::SeqCst),
        );

        if previous != Stage::Terminated {
            tracing::info!("Stage changed: {} -> terminated", previous);
            true
        } else {
            false
        }
    }

    /// Returns true exactly once per run, for whoever prints the download banner
    pub fn claim_download_announcement(&self) -> bool {
        !self.download_announced.swap(true, Ordering::SeqCst)
    }

    /// Returns true exactly once per run, for whoever prints the extractor banner
    pub fn claim_extract_announcement(&self) -> bool {
        !self.extract_announced.swap(true, Ordering::SeqCst)
    }
}

impl Default for StageController {
    fn default() -> Self {
        Self::new(Stage::Downloading)
    }
}
