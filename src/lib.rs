//! Clicks on-screen icons as soon as they show up.
//!
//! A [`MatchCycle`] repeatedly captures a fixed region of the screen, looks for
//! every reference image of the active [`TemplateSet`] in it and double clicks
//! the first confident match that does not look disabled. The active set is
//! changed from another thread through a [`Selection`], which publishes a new
//! set to the shared [`TemplateStore`] on every toggle.

pub use ap_controller as controller;
pub use ap_cv as cv;

pub mod catalog;
pub mod config;
pub mod console;
pub mod cycle;
pub mod selection;
pub mod stop;
pub mod template_set;

pub use catalog::Catalog;
pub use config::Config;
pub use controller::{Capturer, Clicker, ScreenRegion};
pub use cycle::{CycleOptions, CycleOutcome, MatchCycle, MatchResult, PickStrategy};
pub use selection::Selection;
pub use stop::StopToken;
pub use template_set::{TemplateSet, TemplateStore};
