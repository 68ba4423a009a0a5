//! Computer vision helpers: template matching and the greyscale heuristic.

pub mod core;
pub mod error;
pub mod greyscale;
pub mod matcher;
#[doc(hidden)]
pub mod testing;

pub use error::MatchError;
