use std::path::PathBuf;

use thiserror::Error;

/// Errors of a single template matching attempt
#[derive(Error, Debug)]
pub enum MatchError {
    /// The reference image could not be read or decoded
    #[error("failed to load reference image {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The template does not fit inside the image
    #[error("template {template:?} is larger than image {image:?}")]
    SizeMismatch {
        template: (u32, u32),
        image: (u32, u32),
    },

    /// The template has no pixels
    #[error("template is empty")]
    EmptyTemplate,
}
