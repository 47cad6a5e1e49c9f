//! # Fable Common Library
//!
//! Shared code for the fable audiobook client:
//! - Chapter value object and playback status/view types
//! - Error taxonomy
//! - Configuration loading

pub mod config;
pub mod error;
pub mod types;

pub use config::PlayerConfig;
pub use error::{Error, Result};
pub use types::{Chapter, PlaybackStatus, PlaybackView};
