//! Cycle-accurate simulator core for a 32-bit segmented-address CPU.
//!
//! This crate implements the whole machine behind a driver-style API:
//! 1. **Core:** a three-stage in-order pipeline (fetch-decode,
//!    memory-access, execute) with forwarding, hazard stalls, flushes, and
//!    a vectored trap model.
//! 2. **Memory:** split L1 caches, an optional unified L2, physical memory,
//!    PDC ROM, and memory-mapped I/O, each a latency-accurate state machine
//!    under priority arbitration.
//! 3. **Translation:** split or dual-ported TLBs over `(segment, offset)`
//!    virtual addresses with access-rights and protection checks.
//! 4. **ISA:** a one-line assembler and its bit-exact inverse, the
//!    disassembler.
//! 5. **Simulation:** the `Simulator` facade with stepping, breakpoints,
//!    register and memory access, and textual memory dumps.

/// Common types: addresses, bit fields, errors, latched registers.
pub mod common;
/// Simulator configuration (defaults and hierarchical config structures).
pub mod config;
/// The CPU core: architectural state, pipeline, TLBs, memory hierarchy.
pub mod core;
/// Instruction set: templates, fields, assembler, disassembler.
pub mod isa;
/// Simulation driver: `Simulator` and the memory dump format.
pub mod sim;
/// Statistics counters.
pub mod stats;

/// Root configuration type; use `Config::default()` or deserialize JSON.
pub use crate::config::Config;
/// The CPU core type.
pub use crate::core::Cpu;
/// The top-level simulator facade.
pub use crate::sim::Simulator;
