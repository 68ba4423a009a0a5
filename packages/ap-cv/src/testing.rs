//! Synthetic images for tests and benchmarks.

use image::{ImageBuffer, Rgb, RgbImage};

/// Deterministic colour noise, different for every seed.
pub fn noise(width: u32, height: u32, seed: u32) -> RgbImage {
    let mut state = seed.wrapping_mul(2654435761).wrapping_add(1);
    ImageBuffer::from_fn(width, height, |_, _| {
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 8) as u8
        };
        Rgb([next(), next(), next()])
    })
}
