//! The capture -> match -> filter -> click loop.
//!
//! One cycle captures the region, matches every active template against the
//! raster in parallel, picks one match according to the [`PickStrategy`],
//! drops it if it looks disabled (greyscale) and otherwise clicks it.

use std::{sync::Arc, thread, time::Duration};

use ap_controller::{Capturer, Clicker, ScreenRegion};
use ap_cv::{
    core::template_matching::PreparedImage,
    greyscale::{GreyscaleOptions, is_greyscale},
    matcher::{MatcherOptions, match_reference},
};
use image::RgbImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    stop::StopToken,
    template_set::{TemplateSet, TemplateStore},
};

/// How one match is chosen when several labels match in the same cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickStrategy {
    /// The first matching label in template set order, regardless of score
    #[default]
    FirstFound,
    /// The highest score, ties go to the earlier label
    BestScore,
}

impl PickStrategy {
    pub fn pick(self, matches: Vec<MatchResult>) -> Option<MatchResult> {
        match self {
            PickStrategy::FirstFound => matches.into_iter().next(),
            PickStrategy::BestScore => matches
                .into_iter()
                .reduce(|best, m| if m.score > best.score { m } else { best }),
        }
    }
}

/// A confident match of one label in the current raster
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub label: String,
    /// Top-left corner in raster coordinates
    pub location: (u32, u32),
    pub region: RgbImage,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The capture failed, nothing else was attempted
    CaptureFailed,
    /// Nothing matched, or no templates are active
    Idle,
    /// The chosen match looked disabled and was not clicked
    Disabled { label: String },
    Clicked { label: String, x: i32, y: i32 },
}

#[derive(Debug, Clone, Copy)]
pub struct CycleOptions {
    pub region: ScreenRegion,
    pub matcher: MatcherOptions,
    pub greyscale: GreyscaleOptions,
    /// Added to the match's top-left corner to click inside the icon
    pub click_inset: (u32, u32),
    /// Pause after every click
    pub click_delay: Duration,
    pub strategy: PickStrategy,
}

impl Default for CycleOptions {
    fn default() -> Self {
        Self {
            region: ScreenRegion::new(900, 0, 2560, 550),
            matcher: MatcherOptions::default(),
            greyscale: GreyscaleOptions::default(),
            click_inset: (100, 100),
            click_delay: Duration::from_millis(100),
            strategy: PickStrategy::FirstFound,
        }
    }
}

/// Matches every template of `set` on `raster` in parallel.
///
/// The result keeps `set`'s order. A label whose image fails to load or does
/// not fit is logged and counted as not matching.
pub fn match_all(
    set: &TemplateSet,
    raster: &RgbImage,
    options: &MatcherOptions,
) -> Vec<MatchResult> {
    let raster = PreparedImage::new(raster);
    set.entries()
        .par_iter()
        .map(|(label, path)| match match_reference(path, &raster, options) {
            Ok(m) => {
                debug!("[{label}] score: {:?}", m.as_ref().map(|m| m.score));
                m.map(|m| MatchResult {
                    label: label.clone(),
                    location: m.location,
                    region: m.region,
                    score: m.score,
                })
            }
            Err(err) => {
                warn!("[{label}] {err}");
                None
            }
        })
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect()
}

pub struct MatchCycle<C, K> {
    capturer: C,
    clicker: K,
    store: Arc<TemplateStore>,
    options: CycleOptions,
}

impl<C: Capturer, K: Clicker> MatchCycle<C, K> {
    pub fn new(capturer: C, clicker: K, store: Arc<TemplateStore>, options: CycleOptions) -> Self {
        Self {
            capturer,
            clicker,
            store,
            options,
        }
    }

    /// Runs cycles until `stop` is cancelled. The token is checked before
    /// every cycle, a running cycle is always finished.
    pub fn run(&self, stop: &StopToken) {
        info!("match loop started");
        while !stop.is_cancelled() {
            self.run_once();
        }
        info!("match loop stopped");
    }

    pub fn run_once(&self) -> CycleOutcome {
        // The set is read once, publishes during this cycle apply to the next one.
        let set = self.store.read();
        if self.store.take_changed() {
            debug!("templates changed, {} active", set.len());
        }

        let raster = match self.capturer.capture(self.options.region) {
            Ok(raster) => raster,
            Err(err) => {
                warn!("capture failed: {err}");
                return CycleOutcome::CaptureFailed;
            }
        };

        if set.is_empty() {
            return CycleOutcome::Idle;
        }

        let matches = match_all(&set, &raster, &self.options.matcher);
        let Some(chosen) = self.options.strategy.pick(matches) else {
            return CycleOutcome::Idle;
        };

        if is_greyscale(&chosen.region, &self.options.greyscale) {
            debug!("[{}] looks disabled, skipping", chosen.label);
            return CycleOutcome::Disabled {
                label: chosen.label,
            };
        }

        let (x, y) = self.options.region.to_screen(
            chosen.location.0 + self.options.click_inset.0,
            chosen.location.1 + self.options.click_inset.1,
        );
        info!(
            "[{}] clicking at ({x}, {y}), score {:.3}",
            chosen.label, chosen.score
        );
        self.clicker.click(x, y);
        thread::sleep(self.options.click_delay);

        CycleOutcome::Clicked {
            label: chosen.label,
            x,
            y,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        path::PathBuf,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use ap_controller::CaptureError;
    use ap_cv::testing::noise;
    use image::{ImageBuffer, Rgb, imageops};
    use parking_lot::Mutex;
    use tempfile::TempDir;

    use super::*;

    struct FakeCapturer {
        raster: Option<RgbImage>,
        calls: AtomicUsize,
        stop_after: Option<(usize, StopToken)>,
    }

    impl FakeCapturer {
        fn new(raster: RgbImage) -> Self {
            Self {
                raster: Some(raster),
                calls: AtomicUsize::new(0),
                stop_after: None,
            }
        }

        fn failing() -> Self {
            Self {
                raster: None,
                calls: AtomicUsize::new(0),
                stop_after: None,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Capturer for FakeCapturer {
        fn capture(&self, region: ScreenRegion) -> Result<RgbImage, CaptureError> {
            let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((n, stop)) = &self.stop_after {
                if calls >= *n {
                    stop.cancel();
                }
            }
            self.raster.clone().ok_or(CaptureError::OutOfBounds {
                region,
                width: 0,
                height: 0,
            })
        }
    }

    #[derive(Default)]
    struct RecordingClicker {
        clicks: Mutex<Vec<(i32, i32)>>,
    }

    impl Clicker for RecordingClicker {
        fn click(&self, x: i32, y: i32) {
            self.clicks.lock().push((x, y));
        }
    }

    const REGION: ScreenRegion = ScreenRegion {
        top: 900,
        left: 0,
        width: 400,
        height: 300,
    };

    fn options() -> CycleOptions {
        CycleOptions {
            region: REGION,
            click_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    fn save(dir: &TempDir, name: &str, image: &RgbImage) -> PathBuf {
        let path = dir.path().join(format!("{name}.png"));
        image.save(&path).unwrap();
        path
    }

    fn crop(raster: &RgbImage, x: u32, y: u32) -> RgbImage {
        imageops::crop_imm(raster, x, y, 40, 40).to_image()
    }

    /// Flips a bit in every fourth pixel, still a match but not a perfect one.
    fn degrade(image: &RgbImage) -> RgbImage {
        let mut image = image.clone();
        for (i, px) in image.pixels_mut().enumerate() {
            if i % 4 == 0 {
                px.0.iter_mut().for_each(|c| *c ^= 0x40);
            }
        }
        image
    }

    fn cycle<'a>(
        capturer: &'a FakeCapturer,
        clicker: &'a RecordingClicker,
        entries: Vec<(&str, PathBuf)>,
        options: CycleOptions,
    ) -> MatchCycle<&'a FakeCapturer, &'a RecordingClicker> {
        let store = Arc::new(TemplateStore::new());
        store.publish(TemplateSet::from_entries(entries));
        MatchCycle::new(capturer, clicker, store, options)
    }

    #[test]
    fn test_first_found_clicks_first_label_only() {
        let dir = tempfile::tempdir().unwrap();
        let raster = noise(400, 300, 1);
        let a = save(&dir, "a", &degrade(&crop(&raster, 50, 50)));
        let b = save(&dir, "b", &crop(&raster, 200, 200));

        let capturer = FakeCapturer::new(raster);
        let clicker = RecordingClicker::default();
        let cycle = cycle(&capturer, &clicker, vec![("A", a), ("B", b)], options());

        let outcome = cycle.run_once();
        assert_eq!(
            outcome,
            CycleOutcome::Clicked {
                label: "A".to_string(),
                x: 50 + 100,
                y: 50 + 900 + 100
            }
        );
        assert_eq!(*clicker.clicks.lock(), [(150, 1050)]);
    }

    #[test]
    fn test_best_score_prefers_higher_score() {
        let dir = tempfile::tempdir().unwrap();
        let raster = noise(400, 300, 1);
        let a = save(&dir, "a", &degrade(&crop(&raster, 50, 50)));
        let b = save(&dir, "b", &crop(&raster, 200, 200));

        let capturer = FakeCapturer::new(raster);
        let clicker = RecordingClicker::default();
        let options = CycleOptions {
            strategy: PickStrategy::BestScore,
            ..options()
        };
        let cycle = cycle(&capturer, &clicker, vec![("A", a), ("B", b)], options);

        assert!(matches!(cycle.run_once(), CycleOutcome::Clicked { label, .. } if label == "B"));
        assert_eq!(*clicker.clicks.lock(), [(300, 1200)]);
    }

    #[test]
    fn test_match_all_keeps_set_order_and_scores() {
        let dir = tempfile::tempdir().unwrap();
        let raster = noise(400, 300, 1);
        let a = save(&dir, "a", &degrade(&crop(&raster, 50, 50)));
        let b = save(&dir, "b", &crop(&raster, 200, 200));
        let absent = save(&dir, "absent", &noise(40, 40, 99));

        let set = TemplateSet::from_entries([("B", b), ("X", absent), ("A", a)]);
        let matches = match_all(&set, &raster, &MatcherOptions::default());

        let labels: Vec<_> = matches.iter().map(|m| m.label.as_str()).collect();
        assert_eq!(labels, ["B", "A"]);
        assert_eq!(matches[0].location, (200, 200));
        assert_eq!(matches[1].location, (50, 50));
        assert!(matches[0].score > 0.99);
        assert!(matches[1].score > 0.6 && matches[1].score < matches[0].score);
    }

    #[test]
    fn test_greyscale_match_is_not_clicked() {
        let dir = tempfile::tempdir().unwrap();
        let mut raster = noise(400, 300, 2);
        let grey = ImageBuffer::from_fn(40, 40, |x, y| {
            let v = ((x * 37 + y * 91) % 251) as u8;
            Rgb([v, v, v])
        });
        imageops::replace(&mut raster, &grey, 60, 40);
        let path = save(&dir, "grey", &grey);

        let capturer = FakeCapturer::new(raster);
        let clicker = RecordingClicker::default();
        let cycle = cycle(&capturer, &clicker, vec![("G", path)], options());

        assert_eq!(
            cycle.run_once(),
            CycleOutcome::Disabled {
                label: "G".to_string()
            }
        );
        assert!(clicker.clicks.lock().is_empty());
    }

    #[test]
    fn test_greyscale_first_match_ends_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut raster = noise(400, 300, 2);
        let grey = ImageBuffer::from_fn(40, 40, |x, y| {
            let v = ((x * 37 + y * 91) % 251) as u8;
            Rgb([v, v, v])
        });
        imageops::replace(&mut raster, &grey, 60, 40);
        let g = save(&dir, "grey", &grey);
        let c = save(&dir, "colour", &crop(&raster, 250, 150));

        let capturer = FakeCapturer::new(raster);
        let clicker = RecordingClicker::default();
        let cycle = cycle(&capturer, &clicker, vec![("G", g), ("C", c)], options());

        assert!(matches!(cycle.run_once(), CycleOutcome::Disabled { .. }));
        assert!(clicker.clicks.lock().is_empty());
    }

    #[test]
    fn test_empty_set_only_captures() {
        let capturer = FakeCapturer::new(noise(400, 300, 3));
        let clicker = RecordingClicker::default();
        let cycle = cycle(&capturer, &clicker, vec![], options());

        assert_eq!(cycle.run_once(), CycleOutcome::Idle);
        assert_eq!(capturer.calls(), 1);
        assert!(clicker.clicks.lock().is_empty());
    }

    #[test]
    fn test_no_match_is_idle() {
        let dir = tempfile::tempdir().unwrap();
        let path = save(&dir, "absent", &noise(40, 40, 77));

        let capturer = FakeCapturer::new(noise(400, 300, 3));
        let clicker = RecordingClicker::default();
        let cycle = cycle(&capturer, &clicker, vec![("X", path)], options());

        assert_eq!(cycle.run_once(), CycleOutcome::Idle);
        assert!(clicker.clicks.lock().is_empty());
    }

    #[test]
    fn test_broken_labels_do_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        let raster = noise(400, 300, 4);
        let missing = dir.path().join("missing.png");
        let corrupt = dir.path().join("corrupt.png");
        fs::write(&corrupt, b"garbage").unwrap();
        let too_big = save(&dir, "big", &noise(500, 20, 5));
        let good = save(&dir, "good", &crop(&raster, 120, 80));

        let capturer = FakeCapturer::new(raster);
        let clicker = RecordingClicker::default();
        let cycle = cycle(
            &capturer,
            &clicker,
            vec![
                ("missing", missing),
                ("corrupt", corrupt),
                ("big", too_big),
                ("good", good),
            ],
            options(),
        );

        assert!(
            matches!(cycle.run_once(), CycleOutcome::Clicked { label, x: 220, y: 1080 } if label == "good")
        );
    }

    #[test]
    fn test_capture_failure_skips_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = save(&dir, "a", &noise(40, 40, 1));

        let capturer = FakeCapturer::failing();
        let clicker = RecordingClicker::default();
        let cycle = cycle(&capturer, &clicker, vec![("A", path)], options());

        assert_eq!(cycle.run_once(), CycleOutcome::CaptureFailed);
        assert_eq!(cycle.run_once(), CycleOutcome::CaptureFailed);
        assert_eq!(capturer.calls(), 2);
        assert!(clicker.clicks.lock().is_empty());
    }

    #[test]
    fn test_publish_applies_on_next_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let raster = noise(400, 300, 6);
        let a = save(&dir, "a", &crop(&raster, 10, 20));

        let capturer = FakeCapturer::new(raster);
        let clicker = RecordingClicker::default();
        let store = Arc::new(TemplateStore::new());
        let cycle = MatchCycle::new(&capturer, &clicker, store.clone(), options());

        assert_eq!(cycle.run_once(), CycleOutcome::Idle);
        store.publish(TemplateSet::from_entries([("A", a.as_path())]));
        assert!(matches!(cycle.run_once(), CycleOutcome::Clicked { .. }));
        store.publish(TemplateSet::new());
        assert_eq!(cycle.run_once(), CycleOutcome::Idle);
        assert_eq!(*clicker.clicks.lock(), [(110, 1020)]);
    }

    #[test]
    fn test_run_stops_on_token() {
        let stop = StopToken::new();
        let mut capturer = FakeCapturer::new(noise(400, 300, 7));
        capturer.stop_after = Some((3, stop.clone()));
        let clicker = RecordingClicker::default();
        let cycle = cycle(&capturer, &clicker, vec![], options());

        cycle.run(&stop);
        assert_eq!(capturer.calls(), 3);
    }

    #[test]
    fn test_run_does_nothing_when_already_stopped() {
        let stop = StopToken::new();
        stop.cancel();
        let capturer = FakeCapturer::new(noise(400, 300, 7));
        let clicker = RecordingClicker::default();
        cycle(&capturer, &clicker, vec![], options()).run(&stop);
        assert_eq!(capturer.calls(), 0);
    }

    #[test]
    fn test_pick_strategies() {
        let m = |label: &str, score: f32| MatchResult {
            label: label.to_string(),
            location: (0, 0),
            region: RgbImage::new(1, 1),
            score,
        };
        let matches = || vec![m("a", 0.7), m("b", 0.9), m("c", 0.9)];

        assert_eq!(PickStrategy::FirstFound.pick(matches()).unwrap().label, "a");
        assert_eq!(PickStrategy::BestScore.pick(matches()).unwrap().label, "b");
        assert!(PickStrategy::FirstFound.pick(vec![]).is_none());
        assert!(PickStrategy::BestScore.pick(vec![]).is_none());
    }
}
