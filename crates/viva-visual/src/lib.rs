//! VIVA Visual - The character side of speech
//!
//! The render target (a Live2D style model) is only reached through the
//! `RenderTarget` capabilities. Which capabilities exist depends on the
//! loaded model, so a missing one is never an error worth stopping for.
//!
//! # Pieces
//!
//! - `RenderTarget`: parameters, motions, expressions, internal lip sync
//! - `MotionSelector`: random talking motion from a fallback chain of groups
//! - `LipSyncDriver`: per-frame mouth writes while speech is audible

pub mod driver;
pub mod motion;
pub mod target;

pub use driver::*;
pub use motion::*;
pub use target::*;
