//! VIVA Runtime - Session coordination and the host loop
//!
//! `StreamCoordinator` is a synchronous state machine: producer events,
//! device completions and display frames go in, producer requests come out.
//! It never blocks and never reads a clock; `now` is always passed in.
//!
//! `Stage` is the async host. It owns a coordinator and turns channels and
//! timers into coordinator calls:
//! 1. Receive UI commands (start, stop, manual expression/motion)
//! 2. Receive producer events
//! 3. Receive device completions
//! 4. Fire the one-shot frame timer
//! 5. Forward outgoing requests to the producer

pub mod config;
pub mod coordinator;
pub mod logging;
pub mod output;
pub mod stage;

pub use config::*;
pub use coordinator::*;
pub use logging::*;
pub use output::*;
pub use stage::*;
