//! The layered memory model.
//!
//! Caches, physical memory, the PDC ROM, and the I/O range are all instances
//! of one [`MemLayer`] type distinguished by their [`MemKind`]. This module
//! provides:
//! 1. **Request Plumbing:** the claim/poll protocol, priority arbitration,
//!    and the latency countdown shared by every layer kind.
//! 2. **Tag And Data Arrays:** per-set tag entries and byte-addressed block
//!    storage, with `match_tag` over the sets.
//! 3. **Dispatch:** `process` routes to the kind-specific state machine in
//!    the sibling modules.
//!
//! A layer is claimed only while its latched state reads IDLE. Within one
//! cycle, a later claimant with a strictly higher priority value overwrites
//! the pending claim; the convention throughout the core is that the
//! numerically higher priority wins. Once the state machine has left IDLE
//! the layer refuses all comers until the request commits.
//!
//! Completion protocol: the requester calls the same operation every cycle.
//! While the request is in flight the call returns a pending result. On the
//! cycle after the state machine commits, the poll picks up the completed
//! result and frees the slot. L1 word operations are the exception: their
//! completion is the hit path itself, because the miss service ends with the
//! block resident.

/// L1 cache hit path and miss-service state machine.
mod l1;
/// Unified L2 cache block server.
mod l2;
/// Physical memory word/block server.
mod phys;
/// Read-only PDC ROM.
mod pdc;
/// Memory-mapped I/O dispatch.
mod io;

pub use io::IoDevice;

use tracing::trace;

use crate::common::reg::Latch;
use crate::config::{MemAccess, MemKind, MemLayerConfig};
use crate::core::units::rng::VictimRng;
use crate::stats::MemStats;

/// Upper bound on associativity; also the no-match sentinel of `match_tag`.
pub const MAX_BLOCK_SETS: u32 = 8;

/// Memory-layer state machine states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum MemOpState {
    /// Ready for a new request.
    Idle = 0,
    /// Word read in flight (leaf layers).
    ReadWord = 1,
    /// Word write in flight (leaf layers).
    WriteWord = 2,
    /// Selecting a victim block for a miss.
    AllocateBlock = 3,
    /// Filling a block from the lower layer.
    ReadBlock = 4,
    /// Block write in flight.
    WriteBlock = 5,
    /// Writing a dirty victim back before reuse.
    WriteBackBlock = 6,
    /// Explicit flush of a dirty block.
    FlushBlock = 7,
    /// Explicit invalidation of a block.
    PurgeBlock = 8,
}

impl MemOpState {
    fn from_u32(v: u32) -> Self {
        match v {
            1 => Self::ReadWord,
            2 => Self::WriteWord,
            3 => Self::AllocateBlock,
            4 => Self::ReadBlock,
            5 => Self::WriteBlock,
            6 => Self::WriteBackBlock,
            7 => Self::FlushBlock,
            8 => Self::PurgeBlock,
            _ => Self::Idle,
        }
    }

    /// Display name used by the driver when showing layer state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::ReadWord => "READ WORD",
            Self::WriteWord => "WRITE WORD",
            Self::AllocateBlock => "ALLOCATE BLOCK",
            Self::ReadBlock => "READ BLOCK",
            Self::WriteBlock => "WRITE BLOCK",
            Self::WriteBackBlock => "WRITE BACK BLOCK",
            Self::FlushBlock => "FLUSH BLOCK",
            Self::PurgeBlock => "PURGE BLOCK",
        }
    }
}

/// One tag-array entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemTagEntry {
    /// Entry holds live data.
    pub valid: bool,
    /// Block differs from the lower layer.
    pub dirty: bool,
    /// Block-aligned physical address of the cached block.
    pub tag: u32,
}

/// The request descriptor of a layer's single in-flight operation.
#[derive(Clone, Debug, Default)]
pub(crate) struct Request {
    pub op: u32,
    pub seg: u32,
    pub ofs: u32,
    pub tag: u32,
    pub len: u32,
    pub pri: u32,
    pub latency: u32,
    pub word: u32,
    pub buf: Vec<u8>,
    pub target_set: u32,
    pub target_block_index: u32,
    /// Set by the state machine when the operation has committed; consumed
    /// by the owner's next poll.
    pub completed: bool,
}

/// One layer of the memory hierarchy.
pub struct MemLayer {
    kind: MemKind,
    access: MemAccess,
    block_entries: u32,
    block_size: u32,
    block_sets: u32,
    start_adr: u32,
    end_adr: u32,
    latency: u32,
    priority: u32,
    block_bits: u32,
    block_mask: u32,

    op_state: Latch,
    pub(crate) req: Request,
    claimed_this_cycle: bool,

    pub(crate) tag_array: Vec<Vec<MemTagEntry>>,
    pub(crate) data_array: Vec<Vec<u8>>,
    pub(crate) victim_rng: VictimRng,
    pub(crate) stats: MemStats,
    pub(crate) io_device: Option<Box<dyn IoDevice>>,
}

impl std::fmt::Debug for MemLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemLayer")
            .field("kind", &self.kind)
            .field("state", &self.op_state_name())
            .field("start_adr", &self.start_adr)
            .field("end_adr", &self.end_adr)
            .finish_non_exhaustive()
    }
}

fn round_up_pow2(v: u32, limit: u32) -> u32 {
    let mut p = 1;
    while p < v && p < limit {
        p *= 2;
    }
    p
}

impl MemLayer {
    /// Builds a layer from its configuration. Block size and set count are
    /// rounded up to powers of two; the end address follows from the
    /// geometry. Layers with a tag discipline allocate the tag arrays.
    pub fn new(cfg: &MemLayerConfig, victim_seed: u32) -> Self {
        let block_size = round_up_pow2(cfg.block_size.max(16), 64);
        let block_sets = round_up_pow2(cfg.block_sets.max(1), MAX_BLOCK_SETS);
        let block_entries = cfg.block_entries.max(1).next_power_of_two();
        let block_bits = block_size.trailing_zeros();
        let has_tags = matches!(cfg.access, MemAccess::DirectMapped);

        let tag_array = if has_tags {
            (0..block_sets)
                .map(|_| vec![MemTagEntry::default(); block_entries as usize])
                .collect()
        } else {
            Vec::new()
        };
        let data_array = if matches!(cfg.kind, MemKind::IoMem) {
            Vec::new()
        } else {
            (0..block_sets)
                .map(|_| vec![0u8; (block_entries * block_size) as usize])
                .collect()
        };

        Self {
            kind: cfg.kind,
            access: cfg.access,
            block_entries,
            block_size,
            block_sets,
            start_adr: cfg.start_adr,
            end_adr: cfg.start_adr + block_entries * block_size - 1,
            latency: cfg.latency,
            priority: cfg.priority,
            block_bits,
            block_mask: block_size - 1,
            op_state: Latch::default(),
            req: Request::default(),
            claimed_this_cycle: false,
            tag_array,
            data_array,
            victim_rng: VictimRng::new(victim_seed),
            stats: MemStats::default(),
            io_device: None,
        }
    }

    /// Clears tag and data arrays, the request slot, and the statistics.
    /// The victim generator is reseeded by the caller as part of reset.
    pub fn reset(&mut self) {
        for set in &mut self.tag_array {
            for e in set {
                *e = MemTagEntry::default();
            }
        }
        for set in &mut self.data_array {
            set.fill(0);
        }
        self.op_state.reset();
        self.req = Request::default();
        self.claimed_this_cycle = false;
        self.clear_stats();
    }

    /// Zeroes the statistics counters.
    pub fn clear_stats(&mut self) {
        self.stats = MemStats::default();
    }

    /// Advances the latched state register and reopens same-cycle arbitration.
    pub fn tick(&mut self) {
        self.op_state.tick();
        self.claimed_this_cycle = false;
    }

    /// Forces the layer back to IDLE, dropping the request. Used when a
    /// pipeline flush discards an in-flight fetch; no partial data is
    /// delivered.
    pub fn abort_op(&mut self) {
        if self.op_state() != MemOpState::Idle || self.req.completed {
            self.op_state.set(MemOpState::Idle as u32);
            self.req = Request::default();
            self.claimed_this_cycle = false;
        }
    }

    /// Runs one cycle of the layer's state machine. `lower` is the next
    /// layer down for the cache kinds and unused for the leaf kinds.
    pub fn process(&mut self, lower: Option<&mut MemLayer>) {
        match self.kind {
            MemKind::L1Instr | MemKind::L1Data => {
                if let Some(lower) = lower {
                    l1::process(self, lower);
                }
            }
            MemKind::L2Unified => {
                if let Some(lower) = lower {
                    l2::process(self, lower);
                }
            }
            MemKind::PhysMem => phys::process(self),
            MemKind::PdcMem => pdc::process(self),
            MemKind::IoMem => io::process(self),
        }
    }

    // ── Request entry points ──────────────────────────────────

    /// Reads `len` bytes (1, 2, or 4) at `ofs`. Returns the value once the
    /// request completes; the caller retries every cycle until then.
    pub fn read_word(&mut self, seg: u32, ofs: u32, tag: u32, len: u32, pri: u32) -> Option<u32> {
        match self.kind {
            MemKind::L1Instr | MemKind::L1Data => l1::read_word(self, seg, ofs, tag, len, pri),
            _ => {
                if self.take_completed(MemOpState::ReadWord, ofs) {
                    return Some(self.req.word);
                }
                self.try_claim(MemOpState::ReadWord, seg, ofs, tag, len, pri);
                None
            }
        }
    }

    /// Writes `len` bytes (1, 2, or 4) of `word` at `ofs`. Returns `true`
    /// once the request completes.
    pub fn write_word(
        &mut self,
        seg: u32,
        ofs: u32,
        tag: u32,
        len: u32,
        word: u32,
        pri: u32,
    ) -> bool {
        match self.kind {
            MemKind::L1Instr | MemKind::L1Data => {
                l1::write_word(self, seg, ofs, tag, len, word, pri)
            }
            _ => {
                if self.take_completed(MemOpState::WriteWord, ofs) {
                    return true;
                }
                if self.try_claim(MemOpState::WriteWord, seg, ofs, tag, len, pri) {
                    self.req.word = word;
                }
                false
            }
        }
    }

    /// Reads a block of `len` bytes at the block-aligned `ofs`. When the
    /// call returns `true` the data is available through
    /// [`MemLayer::block_buf`] until the next claim.
    pub fn read_block(&mut self, seg: u32, ofs: u32, tag: u32, len: u32, pri: u32) -> bool {
        if self.take_completed(MemOpState::ReadBlock, ofs) {
            return true;
        }
        let _ = self.try_claim(MemOpState::ReadBlock, seg, ofs, tag, len, pri);
        false
    }

    /// Writes a block of `data` at the block-aligned `ofs`. Returns `true`
    /// once the request completes.
    pub fn write_block(&mut self, seg: u32, ofs: u32, tag: u32, data: &[u8], pri: u32) -> bool {
        if self.take_completed(MemOpState::WriteBlock, ofs) {
            return true;
        }
        if self.try_claim(MemOpState::WriteBlock, seg, ofs, tag, data.len() as u32, pri) {
            self.req.buf = data.to_vec();
        }
        false
    }

    /// Writes a dirty block back to the lower layer and marks it clean.
    /// A miss or a clean hit completes immediately as a no-op.
    pub fn flush_block(&mut self, seg: u32, ofs: u32, tag: u32, pri: u32) -> bool {
        match self.kind {
            MemKind::L1Instr | MemKind::L1Data | MemKind::L2Unified => {
                l1::flush_block(self, seg, ofs, tag, pri)
            }
            // Leaf layers have nothing to flush.
            _ => true,
        }
    }

    /// Invalidates a block. A miss completes immediately as a no-op.
    pub fn purge_block(&mut self, seg: u32, ofs: u32, tag: u32, pri: u32) -> bool {
        match self.kind {
            MemKind::L1Instr | MemKind::L1Data | MemKind::L2Unified => {
                l1::purge_block(self, seg, ofs, tag, pri)
            }
            _ => true,
        }
    }

    // ── Claim / completion plumbing ───────────────────────────

    /// Attempts to claim the layer for `op`. Returns `true` when this call
    /// won the slot (the request fields are then filled in).
    pub(crate) fn try_claim(
        &mut self,
        op: MemOpState,
        seg: u32,
        ofs: u32,
        tag: u32,
        len: u32,
        pri: u32,
    ) -> bool {
        if self.op_state() != MemOpState::Idle {
            return false;
        }
        // A lingering completed result belongs to a requester that was
        // aborted or beaten to the slot; the new claim overwrites it and
        // the old requester simply re-issues.
        let pri = if pri == 0 { self.priority } else { pri };
        if self.claimed_this_cycle && pri <= self.req.pri {
            return false;
        }
        trace!(kind = ?self.kind, op = op.as_str(), ofs, pri, "claim");
        self.op_state.load(op as u32);
        self.req = Request {
            op: op as u32,
            seg,
            ofs,
            tag,
            len,
            pri,
            latency: self.latency,
            word: 0,
            buf: Vec::new(),
            target_set: MAX_BLOCK_SETS,
            target_block_index: 0,
            completed: false,
        };
        self.claimed_this_cycle = true;
        true
    }

    /// Consumes a completed request of kind `op` at `ofs`, freeing the slot.
    fn take_completed(&mut self, op: MemOpState, ofs: u32) -> bool {
        if self.req.completed && self.req.op == op as u32 && self.req.ofs == ofs {
            self.req.completed = false;
            true
        } else {
            false
        }
    }

    /// Commits the current request: the state returns to IDLE on the next
    /// tick and the owner's next poll picks up the result.
    pub(crate) fn commit(&mut self) {
        self.req.completed = true;
        self.op_state.load(MemOpState::Idle as u32);
    }

    /// One latency step; returns `true` when the countdown reached zero.
    pub(crate) fn latency_elapsed(&mut self) -> bool {
        if self.req.latency == 0 {
            true
        } else {
            self.req.latency -= 1;
            false
        }
    }

    // ── Geometry and inspection ───────────────────────────────

    /// The layer kind.
    pub fn kind(&self) -> MemKind {
        self.kind
    }

    /// Current state machine state (latched, as visible this cycle).
    pub fn op_state(&self) -> MemOpState {
        MemOpState::from_u32(self.op_state.get())
    }

    /// Display name of the current state.
    pub fn op_state_name(&self) -> &'static str {
        self.op_state().as_str()
    }

    /// Total byte capacity.
    pub fn mem_size(&self) -> u32 {
        self.block_entries * self.block_size
    }

    /// First byte address covered.
    pub fn start_adr(&self) -> u32 {
        self.start_adr
    }

    /// Last byte address covered.
    pub fn end_adr(&self) -> u32 {
        self.end_adr
    }

    /// Number of blocks per set.
    pub fn block_entries(&self) -> u32 {
        self.block_entries
    }

    /// Block size in bytes.
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Associativity.
    pub fn block_sets(&self) -> u32 {
        self.block_sets
    }

    /// Block-offset mask (`block_size - 1`).
    pub fn block_mask(&self) -> u32 {
        self.block_mask
    }

    /// Number of address bits covered by the block offset.
    pub fn block_bits(&self) -> u32 {
        self.block_bits
    }

    /// Arbitration priority of requests issued by this layer.
    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// Statistics counters.
    pub fn stats(&self) -> MemStats {
        self.stats
    }

    /// True when `ofs` falls inside this layer's address range.
    pub fn valid_adr(&self, ofs: u32) -> bool {
        ofs >= self.start_adr && ofs <= self.end_adr
    }

    /// Scans the sets at `index` for a valid entry whose block-aligned tag
    /// matches; returns the set number or [`MAX_BLOCK_SETS`].
    pub fn match_tag(&self, index: u32, tag: u32) -> u32 {
        for (set, tags) in self.tag_array.iter().enumerate() {
            let e = &tags[index as usize];
            if e.valid && (tag & !self.block_mask) == (e.tag & !self.block_mask) {
                return set as u32;
            }
        }
        MAX_BLOCK_SETS
    }

    /// The tag entry at `(index, set)`, if in range.
    pub fn mem_tag_entry(&self, index: u32, set: u32) -> Option<MemTagEntry> {
        self.tag_array
            .get(set as usize)
            .and_then(|s| s.get(index as usize))
            .copied()
    }

    /// Transfer buffer of the last completed block read.
    pub fn block_buf(&self) -> &[u8] {
        &self.req.buf
    }

    /// Reads the word containing `ofs` from a set's data array, for display
    /// and the driver's absolute-memory access. The offset is rounded down
    /// to a word boundary.
    pub fn mem_data_word(&self, ofs: u32, set: u32) -> u32 {
        let ofs = ofs & !3;
        if !self.valid_adr(ofs) || set >= self.block_sets {
            return 0;
        }
        let base = (ofs - self.start_adr) as usize;
        self.data_array
            .get(set as usize)
            .map_or(0, |d| u32::from_le_bytes([d[base], d[base + 1], d[base + 2], d[base + 3]]))
    }

    /// Writes the word containing `ofs` in a set's data array.
    pub fn put_mem_data_word(&mut self, ofs: u32, val: u32, set: u32) {
        let ofs = ofs & !3;
        if !self.valid_adr(ofs) || set >= self.block_sets {
            return;
        }
        let base = (ofs - self.start_adr) as usize;
        if let Some(d) = self.data_array.get_mut(set as usize) {
            d[base..base + 4].copy_from_slice(&val.to_le_bytes());
        }
    }

    /// Raw byte access for the driver's bulk memory operations.
    pub(crate) fn data_bytes(&self, set: u32) -> &[u8] {
        &self.data_array[set as usize]
    }

    /// Raw mutable byte access for the driver's bulk memory operations.
    pub(crate) fn data_bytes_mut(&mut self, set: u32) -> &mut [u8] {
        &mut self.data_array[set as usize]
    }

    /// Installs the I/O handler; only meaningful for the I/O layer.
    pub fn set_io_device(&mut self, dev: Box<dyn IoDevice>) {
        self.io_device = Some(dev);
    }

    /// Reseeds the victim generator (reset path).
    pub(crate) fn reseed(&mut self, seed: u32) {
        self.victim_rng = VictimRng::new(seed);
    }
}
