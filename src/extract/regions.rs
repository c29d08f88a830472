//! Facial region crops driven by 68-point landmarks
//!
//! Landmark detection itself is an external capability behind
//! `LandmarkDetector`. Given the points, every category is a polygon mask
//! cropped to the bounding box of its landmarks, with everything outside
//! the mask made transparent.

use crate::extract::palette::render_palette;
use crate::extract::{Category, DerivedImages, ExtractError, FeatureExtractor};
use image::{DynamicImage, Rgba, RgbaImage, RgbImage};
use std::path::{Path, PathBuf};

/// Points in the standard 68-landmark face model
pub const LANDMARK_COUNT: usize = 68;

const LEFT_EYELID: &[usize] = &[0, 17, 18, 19, 20, 21, 27, 28];
const RIGHT_EYELID: &[usize] = &[28, 27, 22, 23, 24, 25, 26, 16];
const LEFT_EYE: &[usize] = &[36, 37, 38, 39, 40, 41];
const RIGHT_EYE: &[usize] = &[42, 43, 44, 45, 46, 47];
const MOUTH: &[usize] = &[48, 49, 50, 51, 52, 53, 54, 55, 56, 57, 58, 59];
const TEETH: &[usize] = &[60, 61, 62, 63, 64, 65, 66, 67];

type Point = (i32, i32);

/// Exactly `LANDMARK_COUNT` face landmarks in image coordinates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Landmarks(Vec<Point>);

impl Landmarks {
    pub fn new(points: Vec<Point>) -> Option<Self> {
        (points.len() == LANDMARK_COUNT).then_some(Self(points))
    }

    fn polygon(&self, indices: &[usize]) -> Vec<Point> {
        indices.iter().map(|&i| self.0[i]).collect()
    }
}

/// Opaque face landmark detection
pub trait LandmarkDetector: Send + Sync {
    /// Landmarks of the first face in `image`, or None when there is no face
    fn detect(&self, source: &Path, image: &DynamicImage) -> Option<Landmarks>;
}

/// Reads landmarks precomputed by an external detector
///
/// For `full/abc.png` the points are read from `full/abc.landmarks.json`,
/// a JSON array of 68 `[x, y]` pairs. A missing or malformed sidecar means
/// no face.
#[derive(Debug, Clone, Copy, Default)]
pub struct SidecarLandmarks;

impl SidecarLandmarks {
    pub fn sidecar_path(source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        source.with_file_name(format!("{}.landmarks.json", stem))
    }
}

impl LandmarkDetector for SidecarLandmarks {
    fn detect(&self, source: &Path, _image: &DynamicImage) -> Option<Landmarks> {
        let content = std::fs::read_to_string(Self::sidecar_path(source)).ok()?;
        let raw: Vec<[f64; 2]> = serde_json::from_str(&content).ok()?;
        let points = raw
            .into_iter()
            .map(|[x, y]| (x.round() as i32, y.round() as i32))
            .collect();
        Landmarks::new(points)
    }
}

/// Binary mask the size of the source image
#[derive(Debug, Clone, PartialEq, Eq)]
struct Mask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl Mask {
    fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![false; (width as usize) * (height as usize)],
        }
    }

    /// Union of the filled polygons
    fn from_polygons(width: u32, height: u32, polygons: &[Vec<Point>]) -> Self {
        let mut mask = Self::empty(width, height);
        for polygon in polygons {
            let Some((left, top, right, bottom)) = bounds(std::slice::from_ref(polygon), width, height)
            else {
                continue;
            };
            for y in top..bottom {
                for x in left..right {
                    if contains(polygon, x as f64 + 0.5, y as f64 + 0.5) {
                        mask.set(x, y);
                    }
                }
            }
        }
        mask
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + x as usize
    }

    fn set(&mut self, x: u32, y: u32) {
        let i = self.index(x, y);
        self.bits[i] = true;
    }

    fn get(&self, x: u32, y: u32) -> bool {
        self.bits[self.index(x, y)]
    }

    fn minus(&self, other: &Mask) -> Mask {
        self.combine(other, |a, b| a && !b)
    }

    fn union(&self, other: &Mask) -> Mask {
        self.combine(other, |a, b| a || b)
    }

    fn combine(&self, other: &Mask, op: impl Fn(bool, bool) -> bool) -> Mask {
        Mask {
            width: self.width,
            height: self.height,
            bits: self
                .bits
                .iter()
                .zip(&other.bits)
                .map(|(a, b)| op(*a, *b))
                .collect(),
        }
    }
}

/// Even-odd ray casting test
fn contains(polygon: &[Point], x: f64, y: f64) -> bool {
    let mut inside = false;
    let mut j = polygon.len().wrapping_sub(1);
    for i in 0..polygon.len() {
        let (xi, yi) = (polygon[i].0 as f64, polygon[i].1 as f64);
        let (xj, yj) = (polygon[j].0 as f64, polygon[j].1 as f64);
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Landmark bounding box `(left, top, right, bottom)`, clipped to the image
///
/// Right and bottom are exclusive. None if the clipped box is empty.
fn bounds(polygons: &[Vec<Point>], width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let points = polygons.iter().flatten();
    let left = points.clone().map(|p| p.0).min()?;
    let right = points.clone().map(|p| p.0).max()?;
    let top = points.clone().map(|p| p.1).min()?;
    let bottom = points.map(|p| p.1).max()?;

    let clip = |v: i32, limit: u32| v.clamp(0, limit as i32) as u32;
    let (left, right) = (clip(left, width), clip(right, width));
    let (top, bottom) = (clip(top, height), clip(bottom, height));

    (left < right && top < bottom).then_some((left, top, right, bottom))
}

/// Crops `image` to the landmark box, keeping only masked pixels opaque
fn crop_masked(
    image: &RgbImage,
    mask: &Mask,
    polygons: &[Vec<Point>],
    category: Category,
) -> Result<DynamicImage, ExtractError> {
    let (left, top, right, bottom) = bounds(polygons, image.width(), image.height())
        .ok_or(ExtractError::EmptyRegion(category))?;

    let crop = RgbaImage::from_fn(right - left, bottom - top, |x, y| {
        let (sx, sy) = (left + x, top + y);
        if mask.get(sx, sy) {
            let [r, g, b] = image.get_pixel(sx, sy).0;
            Rgba([r, g, b, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    });

    Ok(DynamicImage::ImageRgba8(crop))
}

/// Builds every category from detected landmarks plus a colour palette
pub struct RegionExtractor<D> {
    detector: D,
}

impl<D: LandmarkDetector> RegionExtractor<D> {
    pub fn new(detector: D) -> Self {
        Self { detector }
    }
}

impl<D: LandmarkDetector> FeatureExtractor for RegionExtractor<D> {
    fn extract(&self, source: &Path, image: &DynamicImage) -> Result<DerivedImages, ExtractError> {
        let landmarks = self
            .detector
            .detect(source, image)
            .ok_or(ExtractError::NoFace)?;

        let rgb = image.to_rgb8();
        let (w, h) = rgb.dimensions();

        let left_eye = vec![landmarks.polygon(LEFT_EYE)];
        let right_eye = vec![landmarks.polygon(RIGHT_EYE)];
        let both_eyes = [left_eye.clone(), right_eye.clone()].concat();
        let left_eyelid = vec![landmarks.polygon(LEFT_EYELID)];
        let right_eyelid = vec![landmarks.polygon(RIGHT_EYELID)];
        let both_eyelids = [left_eyelid.clone(), right_eyelid.clone()].concat();
        let mouth = vec![landmarks.polygon(MOUTH)];
        let teeth = vec![landmarks.polygon(TEETH)];
        let eyelids_lips = [both_eyelids.clone(), mouth.clone()].concat();

        let left_eye_mask = Mask::from_polygons(w, h, &left_eye);
        let right_eye_mask = Mask::from_polygons(w, h, &right_eye);
        let both_eyes_mask = Mask::from_polygons(w, h, &both_eyes);
        let left_eyelid_mask = Mask::from_polygons(w, h, &left_eyelid).minus(&left_eye_mask);
        let right_eyelid_mask = Mask::from_polygons(w, h, &right_eyelid).minus(&right_eye_mask);
        let both_eyelids_mask = Mask::from_polygons(w, h, &both_eyelids).minus(&both_eyes_mask);
        let mouth_mask = Mask::from_polygons(w, h, &mouth);
        let teeth_mask = Mask::from_polygons(w, h, &teeth);
        let lips_mask = mouth_mask.minus(&teeth_mask);
        let eyelids_lips_mask = both_eyelids_mask.union(&lips_mask);

        let regions = [
            (Category::LeftEye, &left_eye_mask, &left_eye),
            (Category::RightEye, &right_eye_mask, &right_eye),
            (Category::BothEyes, &both_eyes_mask, &both_eyes),
            (Category::LeftEyelid, &left_eyelid_mask, &left_eyelid),
            (Category::RightEyelid, &right_eyelid_mask, &right_eyelid),
            (Category::BothEyelids, &both_eyelids_mask, &both_eyelids),
            (Category::Teeth, &teeth_mask, &teeth),
            (Category::Mouth, &mouth_mask, &mouth),
            (Category::Lips, &lips_mask, &mouth),
            (Category::EyelidsLips, &eyelids_lips_mask, &eyelids_lips),
        ];

        let mut derived = DerivedImages::default();
        for (category, mask, polygons) in regions {
            derived.set(category, crop_masked(&rgb, mask, polygons, category)?);
        }

        let palette = render_palette(image, false)
            .ok_or(ExtractError::EmptyRegion(Category::Palette))?;
        derived.set(Category::Palette, palette);

        Ok(derived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Synthetic frontal face on a 100x100 canvas
    fn face_points() -> Vec<Point> {
        let mut points = vec![(50, 90); LANDMARK_COUNT];
        points[0] = (15, 35);
        points[16] = (85, 35);
        for (i, x) in (17..=21).zip([20, 25, 30, 35, 40]) {
            points[i] = (x, 20);
        }
        for (i, x) in (22..=26).zip([60, 65, 70, 75, 80]) {
            points[i] = (x, 20);
        }
        points[27] = (50, 25);
        points[28] = (50, 32);

        let eye = |cx: i32| [(cx - 8, 35), (cx - 4, 31), (cx + 4, 31), (cx + 8, 35), (cx + 4, 39), (cx - 4, 39)];
        for (i, p) in (36..42).zip(eye(30)) {
            points[i] = p;
        }
        for (i, p) in (42..48).zip(eye(70)) {
            points[i] = p;
        }

        let ellipse = |n: usize, rx: f64, ry: f64| {
            (0..n)
                .map(move |k| {
                    let t = std::f64::consts::TAU * k as f64 / n as f64;
                    ((50.0 + rx * t.cos()).round() as i32, (75.0 + ry * t.sin()).round() as i32)
                })
                .collect::<Vec<_>>()
        };
        for (i, p) in (48..60).zip(ellipse(12, 15.0, 8.0)) {
            points[i] = p;
        }
        for (i, p) in (60..68).zip(ellipse(8, 8.0, 3.0)) {
            points[i] = p;
        }
        points
    }

    struct Fixed(Option<Landmarks>);

    impl LandmarkDetector for Fixed {
        fn detect(&self, _: &Path, _: &DynamicImage) -> Option<Landmarks> {
            self.0.clone()
        }
    }

    fn canvas() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(100, 100, |x, y| {
            image::Rgb([(x * 2) as u8, (y * 2) as u8, 120])
        }))
    }

    #[test]
    fn test_landmarks_require_full_set() {
        assert!(Landmarks::new(vec![(0, 0); 67]).is_none());
        assert!(Landmarks::new(vec![(0, 0); LANDMARK_COUNT]).is_some());
    }

    #[test]
    fn test_contains() {
        let square = vec![(0, 0), (10, 0), (10, 10), (0, 10)];
        assert!(contains(&square, 5.0, 5.0));
        assert!(!contains(&square, 15.0, 5.0));
    }

    #[test]
    fn test_extract_produces_every_category() {
        let extractor = RegionExtractor::new(Fixed(Landmarks::new(face_points())));
        let derived = extractor.extract(Path::new("face.png"), &canvas()).unwrap();

        assert!(derived.is_complete());

        let left_eye = derived.get(Category::LeftEye).unwrap();
        assert_eq!((left_eye.width(), left_eye.height()), (16, 8));
        // Centre of the eye is opaque
        assert_eq!(left_eye.to_rgba8().get_pixel(8, 4).0[3], 255);

        let palette = derived.get(Category::Palette).unwrap();
        assert_eq!(palette.width(), crate::extract::PALETTE_WIDTH);
    }

    #[test]
    fn test_lips_exclude_teeth() {
        let points = face_points();
        let extractor = RegionExtractor::new(Fixed(Landmarks::new(points.clone())));
        let derived = extractor.extract(Path::new("face.png"), &canvas()).unwrap();

        let mouth_points = &points[48..60];
        let left = mouth_points.iter().map(|p| p.0).min().unwrap() as u32;
        let top = mouth_points.iter().map(|p| p.1).min().unwrap() as u32;
        let (cx, cy) = (50 - left, 75 - top);

        let mouth = derived.get(Category::Mouth).unwrap().to_rgba8();
        let lips = derived.get(Category::Lips).unwrap().to_rgba8();
        assert_eq!(mouth.get_pixel(cx, cy).0[3], 255);
        assert_eq!(lips.get_pixel(cx, cy).0[3], 0);
    }

    #[test]
    fn test_no_face_is_error() {
        let extractor = RegionExtractor::new(Fixed(None));
        let err = extractor.extract(Path::new("face.png"), &canvas()).unwrap_err();
        assert!(matches!(err, ExtractError::NoFace));
    }

    #[test]
    fn test_sidecar_landmarks() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("abc.png");
        let points: Vec<[f64; 2]> = face_points()
            .into_iter()
            .map(|(x, y)| [x as f64, y as f64])
            .collect();
        std::fs::write(
            dir.path().join("abc.landmarks.json"),
            serde_json::to_string(&points).unwrap(),
        )
        .unwrap();

        let detected = SidecarLandmarks.detect(&source, &canvas());
        assert_eq!(detected, Landmarks::new(face_points()));

        let missing = SidecarLandmarks.detect(&dir.path().join("zzz.png"), &canvas());
        assert!(missing.is_none());
    }
}
