use std::{sync::Arc, thread, time::Duration};

use enigo::{Button, Coordinate, Direction, Enigo, Mouse, Settings};
use image::RgbImage;
use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::{CaptureError, Capturer, Clicker, ScreenRegion};

/// Delay between moving the pointer and pressing the button
const SETTLE_DELAY: Duration = Duration::from_millis(10);

/// A controller for the primary display: screen capture through `xcap` and
/// input simulation through `enigo`.
pub struct DesktopController {
    enigo: Arc<Mutex<Enigo>>,
}

impl DesktopController {
    pub fn new() -> Result<Self, enigo::NewConError> {
        let enigo = Enigo::new(&Settings::default())?;
        Ok(Self {
            enigo: Arc::new(Mutex::new(enigo)),
        })
    }

    fn double_click(&self, x: i32, y: i32) -> enigo::InputResult<()> {
        let mut enigo = self.enigo.lock();
        enigo.move_mouse(x, y, Coordinate::Abs)?;

        thread::sleep(SETTLE_DELAY);

        for _ in 0..2 {
            enigo.button(Button::Left, Direction::Press)?;
            enigo.button(Button::Left, Direction::Release)?;
        }
        Ok(())
    }
}

/// The monitor flagged as primary, or the first one when none is.
#[cfg(any(feature = "desktop", test))]
fn primary<M>(monitors: Vec<M>, is_primary: impl Fn(&M) -> bool) -> Option<M> {
    let index = monitors.iter().position(is_primary).unwrap_or(0);
    monitors.into_iter().nth(index)
}

#[cfg(feature = "desktop")]
fn grab(region: ScreenRegion) -> Result<RgbImage, CaptureError> {
    // Monitors are enumerated on every call, nothing is kept between captures.
    let monitors = xcap::Monitor::all().map_err(|e| CaptureError::Backend(e.to_string()))?;
    let monitor = primary(monitors, |m| m.is_primary().unwrap_or(false))
        .ok_or(CaptureError::NoDisplay)?;
    let frame = monitor
        .capture_image()
        .map_err(|e| CaptureError::Backend(e.to_string()))?;

    let (width, height) = frame.dimensions();
    if !region.fits_within(width, height) {
        return Err(CaptureError::OutOfBounds {
            region,
            width,
            height,
        });
    }

    let cropped = image::imageops::crop_imm(
        &frame,
        region.left,
        region.top,
        region.width,
        region.height,
    )
    .to_image();
    Ok(image::DynamicImage::ImageRgba8(cropped).to_rgb8())
}

#[cfg(not(feature = "desktop"))]
fn grab(_region: ScreenRegion) -> Result<RgbImage, CaptureError> {
    Err(CaptureError::Unavailable)
}

impl Capturer for DesktopController {
    fn capture(&self, region: ScreenRegion) -> Result<RgbImage, CaptureError> {
        let image = grab(region)?;
        trace!("captured {}x{}", image.width(), image.height());
        Ok(image)
    }
}

impl Clicker for DesktopController {
    fn click(&self, x: i32, y: i32) {
        if let Err(e) = self.double_click(x, y) {
            warn!("failed to click at ({x}, {y}): {e}");
        }
    }
}
