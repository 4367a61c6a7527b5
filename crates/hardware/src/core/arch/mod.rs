//! Architectural state: register banks and the status word layout.

/// Program status word bit assignments.
pub mod psw;
/// General, segment, and control register banks.
pub mod regfile;

pub use regfile::{RegClass, RegisterFile};
