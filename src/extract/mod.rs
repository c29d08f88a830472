//! Feature extraction over downloaded raw images
//!
//! A `FeatureExtractor` turns one raw image into a `DerivedImages` set with
//! one image per `Category`. Only complete sets are persisted; anything
//! else (no face found, a missing category, an error or a panic inside the
//! extractor) skips that image.

mod dispatcher;
mod palette;
mod regions;

pub use dispatcher::{ExtractionDispatcher, ExtractionStats};
pub use palette::{dominant_colors, render_palette, PaletteColor, PALETTE_HEIGHT, PALETTE_WIDTH};
pub use regions::{Landmarks, LandmarkDetector, RegionExtractor, SidecarLandmarks, LANDMARK_COUNT};

use image::DynamicImage;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors an extractor may report for a single image
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("No face detected")]
    NoFace,

    #[error("Region {0} is empty")]
    EmptyRegion(Category),

    #[error("Expected {expected} derived images, got {actual}")]
    Cardinality { expected: usize, actual: usize },

    #[error("Failed to read image: {0}")]
    Image(#[from] image::ImageError),

    #[error("Extractor panicked")]
    Panicked,
}

/// Derived image categories, in their canonical order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    LeftEye,
    RightEye,
    BothEyes,
    LeftEyelid,
    RightEyelid,
    BothEyelids,
    Teeth,
    Mouth,
    Lips,
    EyelidsLips,
    Palette,
}

impl Category {
    /// Number of derived categories
    pub const COUNT: usize = 11;

    pub const ALL: [Category; Self::COUNT] = [
        Self::LeftEye,
        Self::RightEye,
        Self::BothEyes,
        Self::LeftEyelid,
        Self::RightEyelid,
        Self::BothEyelids,
        Self::Teeth,
        Self::Mouth,
        Self::Lips,
        Self::EyelidsLips,
        Self::Palette,
    ];

    /// Output directory under the target root
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::LeftEye => "left_eye",
            Self::RightEye => "right_eye",
            Self::BothEyes => "left_right_eyes",
            Self::LeftEyelid => "left_eyelid",
            Self::RightEyelid => "right_eyelid",
            Self::BothEyelids => "left_right_eyelids",
            Self::Teeth => "teeth",
            Self::Mouth => "mouth",
            Self::Lips => "lips",
            Self::EyelidsLips => "eyelids_lips",
            Self::Palette => "palette",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// One optional derived image per category
#[derive(Debug, Clone, Default)]
pub struct DerivedImages {
    pub left_eye: Option<DynamicImage>,
    pub right_eye: Option<DynamicImage>,
    pub both_eyes: Option<DynamicImage>,
    pub left_eyelid: Option<DynamicImage>,
    pub right_eyelid: Option<DynamicImage>,
    pub both_eyelids: Option<DynamicImage>,
    pub teeth: Option<DynamicImage>,
    pub mouth: Option<DynamicImage>,
    pub lips: Option<DynamicImage>,
    pub eyelids_lips: Option<DynamicImage>,
    pub palette: Option<DynamicImage>,
}

impl DerivedImages {
    fn slot(&self, category: Category) -> &Option<DynamicImage> {
        match category {
            Category::LeftEye => &self.left_eye,
            Category::RightEye => &self.right_eye,
            Category::BothEyes => &self.both_eyes,
            Category::LeftEyelid => &self.left_eyelid,
            Category::RightEyelid => &self.right_eyelid,
            Category::BothEyelids => &self.both_eyelids,
            Category::Teeth => &self.teeth,
            Category::Mouth => &self.mouth,
            Category::Lips => &self.lips,
            Category::EyelidsLips => &self.eyelids_lips,
            Category::Palette => &self.palette,
        }
    }

    fn slot_mut(&mut self, category: Category) -> &mut Option<DynamicImage> {
        match category {
            Category::LeftEye => &mut self.left_eye,
            Category::RightEye => &mut self.right_eye,
            Category::BothEyes => &mut self.both_eyes,
            Category::LeftEyelid => &mut self.left_eyelid,
            Category::RightEyelid => &mut self.right_eyelid,
            Category::BothEyelids => &mut self.both_eyelids,
            Category::Teeth => &mut self.teeth,
            Category::Mouth => &mut self.mouth,
            Category::Lips => &mut self.lips,
            Category::EyelidsLips => &mut self.eyelids_lips,
            Category::Palette => &mut self.palette,
        }
    }

    pub fn get(&self, category: Category) -> Option<&DynamicImage> {
        self.slot(category).as_ref()
    }

    pub fn set(&mut self, category: Category, image: DynamicImage) {
        *self.slot_mut(category) = Some(image);
    }

    /// Builds a set from images listed in `Category::ALL` order
    ///
    /// Any list whose length is not `Category::COUNT` is rejected.
    pub fn from_ordered(images: Vec<DynamicImage>) -> Result<Self, ExtractError> {
        if images.len() != Category::COUNT {
            return Err(ExtractError::Cardinality {
                expected: Category::COUNT,
                actual: images.len(),
            });
        }

        let mut derived = Self::default();
        for (category, image) in Category::ALL.into_iter().zip(images) {
            derived.set(category, image);
        }
        Ok(derived)
    }

    /// Number of categories holding an image
    pub fn len(&self) -> usize {
        Category::ALL
            .iter()
            .filter(|category| self.slot(**category).is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_complete(&self) -> bool {
        self.len() == Category::COUNT
    }

    /// Every (category, image) pair, or None unless all categories are filled
    pub fn into_complete(mut self) -> Option<Vec<(Category, DynamicImage)>> {
        if !self.is_complete() {
            return None;
        }
        Category::ALL
            .into_iter()
            .map(|category| self.slot_mut(category).take().map(|image| (category, image)))
            .collect()
    }
}

/// Opaque per-image feature extraction capability
///
/// Called from worker-pool threads, so implementations must be thread-safe.
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, source: &Path, image: &DynamicImage) -> Result<DerivedImages, ExtractError>;
}

/// Outcome of extracting one raw image
#[derive(Debug)]
pub struct ExtractionResult {
    pub source: PathBuf,
    /// Complete derived set, or None when the image is skipped
    pub images: Option<Vec<(Category, DynamicImage)>>,
}

impl ExtractionResult {
    pub fn is_valid(&self) -> bool {
        self.images.is_some()
    }
}

/// Opens `source` and runs the extractor, turning every failure into a skip
pub fn extract_file(extractor: &dyn FeatureExtractor, source: &Path) -> ExtractionResult {
    let outcome = image::open(source)
        .map_err(ExtractError::from)
        .and_then(|image| {
            catch_unwind(AssertUnwindSafe(|| extractor.extract(source, &image)))
                .unwrap_or(Err(ExtractError::Panicked))
        });

    let images = match outcome {
        Ok(derived) => {
            let complete = derived.into_complete();
            if complete.is_none() {
                tracing::debug!("Incomplete extraction for {}", source.display());
            }
            complete
        }
        Err(e) => {
            tracing::debug!("Skipping {}: {}", source.display(), e);
            None
        }
    };

    ExtractionResult {
        source: source.to_path_buf(),
        images,
    }
}
