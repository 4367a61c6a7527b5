//! Program status word bit assignments.
//!
//! The status word travels with the program state pair (IA segment, IA
//! offset). Bit positions are MSB-0, matching the hardware bit-field
//! helpers.

/// Machine-check enable.
pub const ST_MACHINE_CHECK: u32 = 0;
/// External-interrupt enable.
pub const ST_INT_ENABLE: u32 = 1;
/// Instruction address translation enable.
pub const ST_CODE_XLATE: u32 = 2;
/// Data address translation enable.
pub const ST_DATA_XLATE: u32 = 3;
/// Protection-id checking enable.
pub const ST_PROT_CHECK: u32 = 4;
/// Carry/borrow bit of the last arithmetic operation.
pub const ST_CARRY: u32 = 28;
/// Execution level: clear = privileged, set = user.
pub const ST_USER_MODE: u32 = 31;

/// Number of low status bits reachable by the MST immediate forms.
pub const MST_BIT_LEN: u32 = 6;
