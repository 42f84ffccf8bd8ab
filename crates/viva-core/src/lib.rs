//! VIVA Core - Fundamental types and primitives
//!
//! This crate defines the types shared by every stage of the speech pipeline:
//! - Identifiers (SessionId, SourceId)
//! - Media time (MediaTime)
//! - Audio chunks and mouth signals
//! - Session states and the error taxonomy

pub mod chunk;
pub mod error;
pub mod id;
pub mod signal;
pub mod state;
pub mod time;

pub use chunk::*;
pub use error::*;
pub use id::*;
pub use signal::*;
pub use state::*;
pub use time::*;
