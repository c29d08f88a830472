//! On-disk layout and persisted crawl state
//!
//! Every target owns one directory under the configured base path:
//!
//! ```text
//! base_path/{target}/full/                 raw downloaded images
//! base_path/{target}/{category}/           one directory per derived category
//! base_path/{target}/downloaded_images.txt retained filenames, one per line
//! ```

mod log;

pub use log::{read_log, PersistenceLog};

use crate::extract::Category;
use std::path::{Path, PathBuf};

/// Name of the per-target retained-filename log
pub const LOG_FILE_NAME: &str = "downloaded_images.txt";

/// Directory holding the raw downloads
pub const FULL_DIR_NAME: &str = "full";

/// Extension of in-flight downloads
pub const PARTIAL_EXTENSION: &str = "part";

/// Extension every retained raw image carries
pub const RAW_EXTENSION: &str = "png";

/// Paths belonging to one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetLayout {
    root: PathBuf,
}

impl TargetLayout {
    pub fn new(base_path: &Path, target: &str) -> Self {
        Self {
            root: base_path.join(target),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn full_dir(&self) -> PathBuf {
        self.root.join(FULL_DIR_NAME)
    }

    pub fn category_dir(&self, category: Category) -> PathBuf {
        self.root.join(category.dir_name())
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(LOG_FILE_NAME)
    }

    /// Final location of a raw image
    pub fn raw_path(&self, filename: &str) -> PathBuf {
        self.full_dir().join(filename)
    }

    /// Location a raw image is streamed into before it becomes visible
    pub fn partial_path(&self, filename: &str) -> PathBuf {
        self.full_dir()
            .join(format!("{}.{}", filename, PARTIAL_EXTENSION))
    }

    /// Creates the full directory and every category directory
    pub fn ensure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.full_dir())?;
        for category in Category::ALL {
            std::fs::create_dir_all(self.category_dir(category))?;
        }
        Ok(())
    }

    /// Raw images currently in `full/`, sorted by name
    pub fn list_raw_images(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(self.full_dir())? {
            let path = entry?.path();
            let is_raw = path
                .extension()
                .is_some_and(|ext| ext == RAW_EXTENSION);
            if is_raw && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}
