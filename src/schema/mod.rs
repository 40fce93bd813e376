//! Schema module - Frame data model and capture configuration.

mod config;
mod frame;

pub use config::*;
pub use frame::*;
