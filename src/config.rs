use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, TryFromFloatSecsError},
};

use ap_controller::ScreenRegion;
use ap_cv::{
    greyscale::GreyscaleOptions,
    matcher::{DEFAULT_THRESHOLD, MatcherOptions},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cycle::{CycleOptions, PickStrategy};

/// Looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "auto-pick.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid click_delay_sec {value}: {source}")]
    ClickDelay {
        value: f32,
        #[source]
        source: TryFromFloatSecsError,
    },
}

/// 对应 `auto-pick.toml`，所有字段均可省略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The template catalog, `{category: {label: path}}`
    pub catalog: PathBuf,
    /// Relative reference image paths are resolved against this directory
    pub resource_root: PathBuf,
    /// The captured region of the screen
    pub roi: ScreenRegion,
    /// Minimum confidence of a match
    pub threshold: f32,
    pub grey_tolerance: u8,
    pub grey_min_fraction: f32,
    /// Offset from the match's top-left corner to the click point
    pub click_inset: (u32, u32),
    /// Pause after a click
    pub click_delay_sec: f32,
    pub strategy: PickStrategy,
}

impl Default for Config {
    fn default() -> Self {
        let greyscale = GreyscaleOptions::default();
        Self {
            catalog: PathBuf::from("templates.json"),
            resource_root: PathBuf::from("."),
            roi: ScreenRegion::new(900, 0, 2560, 550),
            threshold: DEFAULT_THRESHOLD,
            grey_tolerance: greyscale.tolerance,
            grey_min_fraction: greyscale.min_fraction,
            click_inset: (100, 100),
            click_delay_sec: 0.1,
            strategy: PickStrategy::FirstFound,
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.click_delay()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Loads `path` if given, else [`DEFAULT_CONFIG_FILE`] if it exists, else
    /// the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::load(DEFAULT_CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    fn click_delay(&self) -> Result<Duration, ConfigError> {
        Duration::try_from_secs_f32(self.click_delay_sec).map_err(|source| {
            ConfigError::ClickDelay {
                value: self.click_delay_sec,
                source,
            }
        })
    }

    pub fn cycle_options(&self) -> Result<CycleOptions, ConfigError> {
        Ok(CycleOptions {
            region: self.roi,
            matcher: MatcherOptions::default().with_threshold(self.threshold),
            greyscale: GreyscaleOptions {
                tolerance: self.grey_tolerance,
                min_fraction: self.grey_min_fraction,
            },
            click_inset: self.click_inset,
            click_delay: self.click_delay()?,
            strategy: self.strategy,
        })
    }
}
