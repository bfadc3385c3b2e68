//! Logwheel command-line binary internals.
//!
//! Split out of `main.rs` so argument handling and logging setup can be
//! unit tested.

pub mod cli;
pub mod logging;
