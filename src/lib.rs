//! Peloton - Multi-rider bicycle race simulator
//!
//! Riders race along a one-dimensional course of constant-gradient
//! segments. Each timestep the engine orders the field, works out who is
//! sheltering behind whom, lets every rider's policy pick a power, and
//! integrates speed, position and W′ balance. `Simulator` repeats this over
//! many randomized fields and summarizes who wins and how.

pub mod engine;
pub mod error;

pub use engine::*;
pub use error::ConfigError;
