//! Capture module - Depth projection and the recording session.

mod projector;
mod session;

pub use projector::*;
pub use session::*;
