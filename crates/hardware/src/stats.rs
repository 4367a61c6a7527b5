//! Simulation statistics collection.
//!
//! This module tracks the observable counters of a run. It provides:
//! 1. **Clocking:** total clocks and retired instructions.
//! 2. **Pipeline:** per-stage fetch/load/store/branch/trap counts.
//! 3. **Memory:** per-layer access, miss, dirty-miss, and wait-cycle counts
//!    (held by the layers themselves; summarized here).

/// Counters maintained by the fetch-decode stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FetchDecodeStats {
    /// Instructions fetched (including those later squashed).
    pub instr_fetched: u64,
    /// Load-class instructions decoded.
    pub instr_load: u64,
    /// Loads issued through an operand-mode memory operand.
    pub instr_load_via_op_mode: u64,
    /// Store-class instructions decoded.
    pub instr_stor: u64,
    /// Branches redirected from this stage.
    pub branches_taken: u64,
    /// Traps raised by this stage.
    pub traps_raised: u64,
}

/// Counters maintained by the memory-access stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryAccessStats {
    /// Branches resolved taken in this stage.
    pub branches_taken: u64,
    /// Traps raised by this stage.
    pub traps_raised: u64,
}

/// Counters maintained by the execute stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecuteStats {
    /// Instructions retired.
    pub instr_executed: u64,
    /// Conditional branches taken.
    pub branches_taken: u64,
    /// Conditional branches not taken.
    pub branches_not_taken: u64,
    /// Traps raised by this stage.
    pub traps_raised: u64,
}

/// Counters maintained by one memory layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemStats {
    /// Requests accepted.
    pub access: u64,
    /// Requests that missed the tag array.
    pub miss: u64,
    /// Misses whose victim was dirty.
    pub dirty_miss: u64,
    /// Cycles spent waiting on the lower layer.
    pub wait_cycles: u64,
}

/// Counters maintained by one TLB.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TlbStats {
    /// Entries inserted.
    pub inserts: u64,
    /// Entries purged.
    pub deletes: u64,
    /// Lookups performed.
    pub access: u64,
    /// Lookups that found no valid entry.
    pub miss: u64,
    /// Cycles an insert spent in the WORKING state.
    pub wait_cycles: u64,
}

/// Whole-core statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CoreStats {
    /// Clock cycles stepped since the last stats reset.
    pub clock_cntr: u64,
    /// Instructions retired since the last stats reset.
    pub instr_cntr: u64,
}
