//! Simulation driver: the `Simulator` facade and the memory dump format.

/// Textual memory dump format.
pub mod memfile;
/// The simulator driver surface.
pub mod simulator;

pub use simulator::{ResetScope, Simulator, UnitSel};
