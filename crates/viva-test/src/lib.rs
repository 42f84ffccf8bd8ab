//! VIVA Test Harness - Deterministic end-to-end speech sessions
//!
//! This crate provides:
//! - A simulated speech producer (sine synthesis, credits, fault injection)
//! - A simulated audio device driven by a virtual clock
//! - A render target that records every capability call
//! - A scenario runner stepping the whole pipeline in virtual time
//! - End-to-end integration tests

pub mod device;
pub mod producer;
pub mod scenario;
pub mod target;

#[cfg(test)]
mod integration;

pub use device::*;
pub use producer::*;
pub use scenario::*;
pub use target::*;
