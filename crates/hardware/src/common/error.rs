//! Trap identifiers and host errors.
//!
//! This module defines the two failure domains of the simulator:
//! 1. **CPU Traps:** architectural events handled by simulated software; a
//!    plain enum, not a Rust error.
//! 2. **Host Errors:** file and argument problems surfaced to the driver.

use std::fmt;

/// Architectural trap identifiers.
///
/// The numeric value selects the handler vector: the trap controller
/// redirects fetch to `CR_TRAP_VECTOR_BASE + id * 32`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum TrapId {
    /// Instruction fetch missed the instruction TLB.
    InstrTlbMiss = 1,
    /// Data access missed the data TLB.
    DataTlbMiss = 2,
    /// Instruction fetch failed the protection-id check.
    InstrProtection = 3,
    /// Data access failed the protection-id or access-rights check.
    DataProtection = 4,
    /// A privileged operation was attempted in user mode.
    PrivilegeViolation = 5,
    /// Signed arithmetic overflow with the trap option enabled.
    Overflow = 6,
    /// Operand address not aligned to the operand width.
    UnalignedAccess = 7,
    /// Page type does not permit the attempted access.
    PageType = 8,
    /// BRK instruction with a non-zero code.
    Break = 9,
    /// External interrupt request.
    ExternalInterrupt = 10,
    /// Internal consistency failure detected by the hardware.
    MachineCheck = 11,
}

impl TrapId {
    /// Byte offset of this trap's handler from the vector base.
    #[inline]
    pub fn vector_offset(self) -> u32 {
        (self as u32) * 32
    }
}

impl fmt::Display for TrapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InstrTlbMiss => "instr-TLB-miss",
            Self::DataTlbMiss => "data-TLB-miss",
            Self::InstrProtection => "instr-protection",
            Self::DataProtection => "data-protection",
            Self::PrivilegeViolation => "privilege-violation",
            Self::Overflow => "overflow",
            Self::UnalignedAccess => "unaligned-access",
            Self::PageType => "page-type",
            Self::Break => "break",
            Self::ExternalInterrupt => "external-interrupt",
            Self::MachineCheck => "machine-check",
        };
        f.write_str(name)
    }
}

/// Host-level errors surfaced to the driver.
///
/// These are never visible to simulated code; they report file problems and
/// out-of-range driver arguments.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// Reading or writing a memory dump file failed.
    #[error("memory dump I/O failed: {0}")]
    DumpIo(#[from] std::io::Error),

    /// A dump file line did not match the expected `MA` format.
    #[error("malformed dump line {line}: {reason}")]
    DumpFormat {
        /// One-based line number in the dump file.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// A driver argument addressed memory outside the configured range.
    #[error("address range {ofs:#x}+{len:#x} outside physical memory")]
    AddressRange {
        /// Requested start offset.
        ofs: u32,
        /// Requested length in bytes.
        len: u32,
    },
}
