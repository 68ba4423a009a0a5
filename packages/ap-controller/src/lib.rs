use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod desktop;

pub use desktop::DesktopController;

/// A rectangle of the screen, in physical pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenRegion {
    pub top: u32,
    pub left: u32,
    pub width: u32,
    pub height: u32,
}

impl ScreenRegion {
    pub fn new(top: u32, left: u32, width: u32, height: u32) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    /// Whether the region lies entirely inside a `width`x`height` display.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.left.checked_add(self.width).is_some_and(|r| r <= width)
            && self.top.checked_add(self.height).is_some_and(|b| b <= height)
    }

    /// Translates a point of the region into absolute screen coordinates.
    pub fn to_screen(&self, x: u32, y: u32) -> (i32, i32) {
        ((self.left + x) as i32, (self.top + y) as i32)
    }
}

#[derive(Error, Debug)]
pub enum CaptureError {
    /// The region is not inside the display
    #[error("region {region:?} is outside the {width}x{height} display")]
    OutOfBounds {
        region: ScreenRegion,
        width: u32,
        height: u32,
    },

    /// No display was reported by the backend
    #[error("no display found")]
    NoDisplay,

    /// The capture backend failed
    #[error("capture backend error: {0}")]
    Backend(String),

    /// Built without a capture backend
    #[error("screen capture is unavailable, build with `--features desktop`")]
    Unavailable,
}

/// Grabs a region of the screen.
///
/// Implementations must not keep OS capture handles between calls.
pub trait Capturer {
    fn capture(&self, region: ScreenRegion) -> Result<image::RgbImage, CaptureError>;
}

/// Injects pointer input.
pub trait Clicker {
    /// Moves to the absolute screen coordinate and double clicks the left button.
    fn click(&self, x: i32, y: i32);
}

impl<T: Capturer + ?Sized> Capturer for &T {
    fn capture(&self, region: ScreenRegion) -> Result<image::RgbImage, CaptureError> {
        (**self).capture(region)
    }
}

impl<T: Clicker + ?Sized> Clicker for &T {
    fn click(&self, x: i32, y: i32) {
        (**self).click(x, y)
    }
}
