//! Image matching based on template matching
//!
//! [`SingleMatcher`]: Match one template on an image to get one result.
//! [`match_reference`]: Load a reference image from disk and match it on a raster.

use std::path::Path;

use image::{RgbImage, imageops, math::Rect};
use tracing::trace;

use crate::{
    core::template_matching::{PreparedImage, find_extremes},
    error::MatchError,
};

/// The default confidence a match must exceed.
pub const DEFAULT_THRESHOLD: f32 = 0.6;

#[derive(Debug, Clone, Copy)]
pub struct MatcherOptions {
    pub threshold: f32,
}

impl Default for MatcherOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl MatcherOptions {
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Match {
    pub rect: Rect,
    pub value: f32,
}

/// Match one template on an image to get one result.
pub struct SingleMatcher;

impl SingleMatcher {
    /// Only the global maximum of the score map is considered, and it must be
    /// strictly greater than [`MatcherOptions::threshold`].
    pub fn match_template(
        image: &PreparedImage,
        template: &RgbImage,
        options: &MatcherOptions,
    ) -> Result<Option<Match>, MatchError> {
        let scores = image.match_template(template)?;
        let extremes = find_extremes(&scores);

        Ok((extremes.max_value > options.threshold).then(|| Match {
            rect: Rect {
                x: extremes.max_value_location.0,
                y: extremes.max_value_location.1,
                width: template.width(),
                height: template.height(),
            },
            value: extremes.max_value,
        }))
    }
}

/// A confident match of a reference image inside a raster
#[derive(Debug, Clone)]
pub struct RegionMatch {
    /// Top-left corner in raster coordinates
    pub location: (u32, u32),
    /// The part of the raster covered by the template
    pub region: RgbImage,
    pub score: f32,
}

/// Decodes the reference image at `path` (no caching) and matches it on `raster`.
///
/// Returns `Ok(None)` when the best score does not exceed the threshold.
pub fn match_reference(
    path: impl AsRef<Path>,
    raster: &PreparedImage,
    options: &MatcherOptions,
) -> Result<Option<RegionMatch>, MatchError> {
    let path = path.as_ref();
    let template = image::open(path)
        .map_err(|source| MatchError::Load {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgb8();

    let res = SingleMatcher::match_template(raster, &template, options)?;
    trace!("{}: {:?}", path.display(), res.map(|m| m.value));

    Ok(res.map(|m| RegionMatch {
        location: (m.rect.x, m.rect.y),
        region: imageops::crop_imm(
            raster.image(),
            m.rect.x,
            m.rect.y,
            m.rect.width,
            m.rect.height,
        )
        .to_image(),
        score: m.value,
    }))
}
