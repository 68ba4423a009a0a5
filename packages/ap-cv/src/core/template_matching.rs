//! Template matching implementation on the CPU.
//!
//! Only the normalized correlation coefficient is supported. Colour images are
//! scored over all three channels together: the template mean is removed per
//! channel, and the numerator and both energy terms are summed across
//! channels before normalizing.
//!
//! The numerator is a cross-correlation computed in the frequency domain. The
//! window energies come from summed-area tables.
use std::sync::Arc;

use image::{ImageBuffer, Luma, RgbImage};
use rayon::prelude::*;
use rustfft::{Fft, FftPlanner, num_complex::Complex};

use crate::error::MatchError;

pub use imageproc::template_matching::{Extremes, find_extremes};

/// The correlation surface, one score per valid offset
pub type ScoreMap = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Summed-area tables of an RGB image, padded with a leading zero row and column.
struct Integral {
    stride: usize,
    sum: Vec<[f64; 3]>,
    sq_sum: Vec<f64>,
}

impl Integral {
    fn new(image: &RgbImage) -> Self {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let stride = width + 1;
        let mut sum = vec![[0.0; 3]; stride * (height + 1)];
        let mut sq_sum = vec![0.0; stride * (height + 1)];

        if width == 0 {
            return Self {
                stride,
                sum,
                sq_sum,
            };
        }

        for (y, row) in image.as_raw().chunks_exact(width * 3).enumerate() {
            let mut row_sum = [0.0f64; 3];
            let mut row_sq_sum = 0.0f64;
            for (x, px) in row.chunks_exact(3).enumerate() {
                for c in 0..3 {
                    let v = px[c] as f64;
                    row_sum[c] += v;
                    row_sq_sum += v * v;
                }
                let above = y * stride + x + 1;
                let here = above + stride;
                for c in 0..3 {
                    sum[here][c] = sum[above][c] + row_sum[c];
                }
                sq_sum[here] = sq_sum[above] + row_sq_sum;
            }
        }

        Self {
            stride,
            sum,
            sq_sum,
        }
    }

    /// Per-channel sums and the squared sum over all channels of a window.
    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> ([f64; 3], f64) {
        let tl = y * self.stride + x;
        let tr = tl + w;
        let bl = tl + h * self.stride;
        let br = bl + w;

        let mut sum = [0.0; 3];
        for c in 0..3 {
            sum[c] = self.sum[br][c] - self.sum[tr][c] - self.sum[bl][c] + self.sum[tl][c];
        }
        let sq_sum = self.sq_sum[br] - self.sq_sum[tr] - self.sq_sum[bl] + self.sq_sum[tl];
        (sum, sq_sum)
    }
}

/// Row-then-column 2D FFT over a fixed `width x height` plane.
///
/// Spectra are kept column-major, which is the layout the column pass leaves
/// them in. Only the elementwise product of two spectra is ever taken, so the
/// layout never has to be undone.
struct Fft2d {
    width: usize,
    height: usize,
    rows: Arc<dyn Fft<f64>>,
    cols: Arc<dyn Fft<f64>>,
    rows_inv: Arc<dyn Fft<f64>>,
    cols_inv: Arc<dyn Fft<f64>>,
}

impl Fft2d {
    fn new(width: usize, height: usize) -> Self {
        let mut planner = FftPlanner::<f64>::new();
        Self {
            width,
            height,
            rows: planner.plan_fft_forward(width),
            cols: planner.plan_fft_forward(height),
            rows_inv: planner.plan_fft_inverse(width),
            cols_inv: planner.plan_fft_inverse(height),
        }
    }

    fn zeros(&self) -> Vec<Complex<f64>> {
        vec![Complex::new(0.0, 0.0); self.width * self.height]
    }

    /// Row-major plane in, column-major spectrum out.
    fn forward(&self, mut plane: Vec<Complex<f64>>) -> Vec<Complex<f64>> {
        plane
            .par_chunks_mut(self.width)
            .for_each(|row| self.rows.process(row));
        let mut spectrum = transpose(&plane, self.width, self.height);
        spectrum
            .par_chunks_mut(self.height)
            .for_each(|col| self.cols.process(col));
        spectrum
    }

    /// Column-major spectrum in, row-major plane out. Not scaled.
    fn inverse(&self, mut spectrum: Vec<Complex<f64>>) -> Vec<Complex<f64>> {
        spectrum
            .par_chunks_mut(self.height)
            .for_each(|col| self.cols_inv.process(col));
        let mut plane = transpose(&spectrum, self.height, self.width);
        plane
            .par_chunks_mut(self.width)
            .for_each(|row| self.rows_inv.process(row));
        plane
    }
}

fn transpose(src: &[Complex<f64>], row_len: usize, rows: usize) -> Vec<Complex<f64>> {
    let mut dst = vec![Complex::new(0.0, 0.0); src.len()];
    dst.par_chunks_mut(rows).enumerate().for_each(|(c, out)| {
        for (r, v) in out.iter_mut().enumerate() {
            *v = src[r * row_len + c];
        }
    });
    dst
}

/// A raster prepared for matching: its summed-area tables and the spectrum
/// of each colour channel.
///
/// Preparing costs about as much as matching one template, so a raster that
/// several templates are matched against should be prepared once.
pub struct PreparedImage<'a> {
    image: &'a RgbImage,
    integral: Integral,
    /// `None` for an empty image, nothing fits in it anyway
    fft: Option<Fft2d>,
    spectra: [Vec<Complex<f64>>; 3],
}

impl<'a> PreparedImage<'a> {
    pub fn new(image: &'a RgbImage) -> Self {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let integral = Integral::new(image);
        if width == 0 || height == 0 {
            return Self {
                image,
                integral,
                fft: None,
                spectra: Default::default(),
            };
        }

        let fft = Fft2d::new(width, height);
        let spectra = [0, 1, 2].map(|c| {
            let plane = image
                .as_raw()
                .chunks_exact(3)
                .map(|px| Complex::new(px[c] as f64, 0.0))
                .collect();
            fft.forward(plane)
        });

        Self {
            image,
            integral,
            fft: Some(fft),
            spectra,
        }
    }

    pub fn image(&self) -> &'a RgbImage {
        self.image
    }

    /// Computes the normalized correlation coefficient of `template` at every
    /// offset where it fits entirely inside the image.
    ///
    /// The result is `(iw - tw + 1) x (ih - th + 1)`, scores lie in `[-1, 1]`.
    /// A constant template scores `1.0` everywhere, a constant window scores
    /// `0.0` against any non-constant template.
    pub fn match_template(&self, template: &RgbImage) -> Result<ScoreMap, MatchError> {
        let (iw, ih) = self.image.dimensions();
        let (tw, th) = template.dimensions();
        if tw == 0 || th == 0 {
            return Err(MatchError::EmptyTemplate);
        }
        let size_mismatch = MatchError::SizeMismatch {
            template: (tw, th),
            image: (iw, ih),
        };
        if tw > iw || th > ih {
            return Err(size_mismatch);
        }
        let Some(fft) = &self.fft else {
            return Err(size_mismatch);
        };

        let (rw, rh) = (iw - tw + 1, ih - th + 1);
        let mut result = ScoreMap::new(rw, rh);

        let n = (tw * th) as f64;
        let mut mean = [0.0f64; 3];
        for px in template.pixels() {
            for c in 0..3 {
                mean[c] += px.0[c] as f64;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let centered: Vec<f64> = template
            .as_raw()
            .chunks_exact(3)
            .flat_map(|px| (0..3).map(move |c| px[c] as f64 - mean[c]))
            .collect();
        let template_norm: f64 = centered.iter().map(|v| v * v).sum();

        if template_norm < f64::EPSILON {
            result.iter_mut().for_each(|v| *v = 1.0);
            return Ok(result);
        }

        // The template is zero-mean, so the window mean cancels out of the
        // numerator and the raw image spectra can be used as they are.
        let (iw, tw, th) = (iw as usize, tw as usize, th as usize);
        let mut cross = fft.zeros();
        for (c, image_spectrum) in self.spectra.iter().enumerate() {
            let mut plane = fft.zeros();
            for (ty, row) in centered.chunks_exact(tw * 3).enumerate() {
                for (tx, px) in row.chunks_exact(3).enumerate() {
                    plane[ty * iw + tx].re = px[c];
                }
            }
            let template_spectrum = fft.forward(plane);
            cross
                .par_iter_mut()
                .zip(image_spectrum)
                .zip(&template_spectrum)
                .for_each(|((acc, i), t)| *acc += i * t.conj());
        }
        let cross = fft.inverse(cross);
        let scale = 1.0 / (fft.width * fft.height) as f64;

        result
            .par_chunks_mut(rw as usize)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, out) in row.iter_mut().enumerate() {
                    let num = cross[y * iw + x].re * scale;

                    let (sum, sq_sum) = self.integral.window(x, y, tw, th);
                    let window_norm =
                        (sq_sum - sum.iter().map(|s| s * s).sum::<f64>() / n).max(0.0);
                    let denom = (window_norm * template_norm).sqrt();

                    *out = normalize(num, denom) as f32;
                }
            });

        Ok(result)
    }
}

/// Prepares `image` and matches a single `template` on it, see
/// [`PreparedImage::match_template`].
pub fn match_template(image: &RgbImage, template: &RgbImage) -> Result<ScoreMap, MatchError> {
    PreparedImage::new(image).match_template(template)
}

fn normalize(num: f64, denom: f64) -> f64 {
    if num.abs() < denom {
        num / denom
    } else if num.abs() < denom * 1.125 {
        num.signum()
    } else {
        0.0
    }
}
