//! Near-monochrome detection.
//!
//! Disabled icons are usually rendered desaturated, so a region in which most
//! pixels have nearly equal channels is treated as "disabled". This is a
//! heuristic, not colorimetry.

use image::{Rgb, RgbImage};

#[derive(Debug, Clone, Copy)]
pub struct GreyscaleOptions {
    /// Max pairwise difference between the channels of a near-grey pixel
    pub tolerance: u8,
    /// Min fraction of near-grey pixels for the region to count as greyscale
    pub min_fraction: f32,
}

impl Default for GreyscaleOptions {
    fn default() -> Self {
        Self {
            tolerance: 20,
            min_fraction: 0.8,
        }
    }
}

fn is_near_grey(Rgb([r, g, b]): &Rgb<u8>, tolerance: u8) -> bool {
    r.abs_diff(*g) <= tolerance && g.abs_diff(*b) <= tolerance && r.abs_diff(*b) <= tolerance
}

/// Fraction of near-grey pixels. An empty region counts as fully grey.
pub fn grey_fraction(region: &RgbImage, tolerance: u8) -> f32 {
    let total = region.width() as u64 * region.height() as u64;
    if total == 0 {
        return 1.0;
    }
    let grey = region
        .pixels()
        .filter(|px| is_near_grey(px, tolerance))
        .count();
    (grey as f64 / total as f64) as f32
}

pub fn is_greyscale(region: &RgbImage, options: &GreyscaleOptions) -> bool {
    grey_fraction(region, options.tolerance) >= options.min_fraction
}
