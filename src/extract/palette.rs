//! Dominant-colour palette rendering

use image::{DynamicImage, Rgb, RgbImage};
use std::collections::HashMap;

pub const PALETTE_WIDTH: u32 = 50;
pub const PALETTE_HEIGHT: u32 = 300;

/// Bits dropped from each channel when bucketing colours
const QUANTIZE_SHIFT: u8 = 5;
const MAX_COLORS: usize = 12;
/// Minimum share of pixels, in percent, for a colour to be kept
const MIN_SHARE_PERCENT: u64 = 1;

/// A dominant colour and how many pixels fell into its bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaletteColor {
    pub rgb: [u8; 3],
    pub pixels: u64,
}

#[derive(Default)]
struct Bucket {
    sum: [u64; 3],
    pixels: u64,
}

/// Dominant colours of `image`, most frequent first
///
/// Each colour is the mean of the pixels in its quantization bucket.
pub fn dominant_colors(image: &DynamicImage) -> Vec<PaletteColor> {
    let rgb = image.to_rgb8();
    let mut buckets: HashMap<[u8; 3], Bucket> = HashMap::new();

    for pixel in rgb.pixels() {
        let key = pixel.0.map(|c| c >> QUANTIZE_SHIFT);
        let bucket = buckets.entry(key).or_default();
        for (sum, channel) in bucket.sum.iter_mut().zip(pixel.0) {
            *sum += u64::from(channel);
        }
        bucket.pixels += 1;
    }

    let total: u64 = buckets.values().map(|b| b.pixels).sum();
    let mut colors: Vec<PaletteColor> = buckets
        .into_values()
        .filter(|b| b.pixels * 100 >= total * MIN_SHARE_PERCENT)
        .map(|b| PaletteColor {
            rgb: b.sum.map(|sum| (sum / b.pixels) as u8),
            pixels: b.pixels,
        })
        .collect();

    colors.sort_by(|a, b| b.pixels.cmp(&a.pixels).then(a.rgb.cmp(&b.rgb)));
    colors.truncate(MAX_COLORS);
    colors
}

/// Draws the dominant colours of `image` as horizontal bands
///
/// Bands are equally tall unless `proportional` is set, in which case each
/// band's height follows its pixel share.
pub fn render_palette(image: &DynamicImage, proportional: bool) -> Option<DynamicImage> {
    let colors = dominant_colors(image);
    if colors.is_empty() {
        return None;
    }

    let total: u64 = colors.iter().map(|c| c.pixels).sum();
    let count = colors.len() as u64;
    let height = u64::from(PALETTE_HEIGHT);
    let mut bar = RgbImage::new(PALETTE_WIDTH, PALETTE_HEIGHT);
    let mut covered = 0_u64;
    let mut start = 0_u32;

    for (i, color) in colors.iter().enumerate() {
        covered += color.pixels;
        let end = (if proportional {
            covered * height / total
        } else {
            (i as u64 + 1) * height / count
        }) as u32;

        for y in start..end {
            for x in 0..PALETTE_WIDTH {
                bar.put_pixel(x, y, Rgb(color.rgb));
            }
        }
        start = end;
    }

    Some(DynamicImage::ImageRgb8(bar))
}
