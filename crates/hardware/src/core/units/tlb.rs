//! Translation lookaside buffers.
//!
//! This module implements the address translation unit. It provides:
//! 1. **Entries:** four packed words of translation, rights, and protection data.
//! 2. **Indexing:** direct-mapped via an XOR-rotate hash, or fully associative.
//! 3. **Insert State Machine:** inserts take the configured latency; lookups
//!    and purges complete in one cycle.
//!
//! An entry is filled in two phases, address data first, then protection
//! data; only the second phase sets the valid bit, so a partially inserted
//! entry can never match.

use crate::common::addr::VirtAddr;
use crate::common::bits;
use crate::common::reg::Latch;
use crate::config::{TlbAccess, TlbConfig};
use crate::stats::TlbStats;

/// `p_info` bit positions (MSB-0).
mod p_info {
    pub const VALID: u32 = 0;
    pub const TRAP_PAGE: u32 = 1;
    pub const DIRTY: u32 = 2;
    pub const TRAP_DATA_PAGE: u32 = 3;
    pub const UNCACHEABLE: u32 = 4;
    pub const PAGE_TYPE_POS: u32 = 7;
    pub const PAGE_TYPE_LEN: u32 = 2;
    pub const PHYS_PAGE_POS: u32 = 31;
    pub const PHYS_PAGE_LEN: u32 = 20;
}

/// `a_info` bit positions (MSB-0).
mod a_info {
    pub const PRIV_L1_POS: u32 = 1;
    pub const PRIV_L1_LEN: u32 = 2;
    pub const PRIV_L2_POS: u32 = 3;
    pub const PRIV_L2_LEN: u32 = 2;
    pub const PROTECT_ID_POS: u32 = 31;
    pub const PROTECT_ID_LEN: u32 = 16;
}

/// Page access types stored in the page-type field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum PageType {
    /// Data page, read/write per privilege fields.
    ReadWrite = 0,
    /// Read-only data page.
    ReadOnly = 1,
    /// Executable page.
    Execute = 2,
    /// Gateway page for privilege promotion.
    Gateway = 3,
}

/// One TLB entry: translation plus rights as four packed words.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TlbEntry {
    /// Segment id of the virtual page.
    pub vpn_high: u32,
    /// Page-within-segment number.
    pub vpn_low: u32,
    /// Physical page and state bits.
    pub p_info: u32,
    /// Protection id and privilege levels.
    pub a_info: u32,
}

impl TlbEntry {
    /// True when the entry can match a lookup.
    #[inline]
    pub fn valid(&self) -> bool {
        bits::get_bit(self.p_info, p_info::VALID)
    }

    /// Sets or clears the valid bit.
    pub fn set_valid(&mut self, arg: bool) {
        bits::set_bit(&mut self.p_info, p_info::VALID, arg);
    }

    /// True when a reference should raise the page-trap.
    pub fn trap_page(&self) -> bool {
        bits::get_bit(self.p_info, p_info::TRAP_PAGE)
    }

    /// True when the page has been written through this entry.
    pub fn dirty(&self) -> bool {
        bits::get_bit(self.p_info, p_info::DIRTY)
    }

    /// True when a data reference should raise the data-page trap.
    pub fn trap_data_page(&self) -> bool {
        bits::get_bit(self.p_info, p_info::TRAP_DATA_PAGE)
    }

    /// True when the page bypasses the caches.
    pub fn uncacheable(&self) -> bool {
        bits::get_bit(self.p_info, p_info::UNCACHEABLE)
    }

    /// The page-type field.
    pub fn page_type(&self) -> u32 {
        bits::get_bit_field(self.p_info, p_info::PAGE_TYPE_POS, p_info::PAGE_TYPE_LEN)
    }

    /// Privilege level 1 field.
    pub fn priv_l1(&self) -> u32 {
        bits::get_bit_field(self.a_info, a_info::PRIV_L1_POS, a_info::PRIV_L1_LEN)
    }

    /// Privilege level 2 field.
    pub fn priv_l2(&self) -> u32 {
        bits::get_bit_field(self.a_info, a_info::PRIV_L2_POS, a_info::PRIV_L2_LEN)
    }

    /// Protection/segment id field.
    pub fn protect_id(&self) -> u32 {
        bits::get_bit_field(self.a_info, a_info::PROTECT_ID_POS, a_info::PROTECT_ID_LEN)
    }

    /// Physical page number.
    pub fn phys_page(&self) -> u32 {
        bits::get_bit_field(self.p_info, p_info::PHYS_PAGE_POS, p_info::PHYS_PAGE_LEN)
    }
}

/// Insert state machine states.
const TLB_IDLE: u32 = 0;
const TLB_WORKING: u32 = 1;

/// A TLB instance, direct-mapped or fully associative.
#[derive(Debug)]
pub struct Tlb {
    access: TlbAccess,
    entries: Vec<TlbEntry>,
    index_mask: u32,
    latency: u32,

    op_state: Latch,
    req_delay: u32,
    completed: bool,

    stats: TlbStats,
}

impl Tlb {
    /// Creates a TLB from its configuration; the entry count is rounded up
    /// to a power of two.
    pub fn new(cfg: &TlbConfig) -> Self {
        let entries = cfg.entries.max(1).next_power_of_two();
        Self {
            access: cfg.access,
            entries: vec![TlbEntry::default(); entries as usize],
            index_mask: entries - 1,
            latency: cfg.latency,
            op_state: Latch::default(),
            req_delay: 0,
            completed: false,
            stats: TlbStats::default(),
        }
    }

    /// Invalidates all entries and returns the state machine to IDLE.
    pub fn reset(&mut self) {
        for e in &mut self.entries {
            *e = TlbEntry::default();
        }
        self.op_state.reset();
        self.req_delay = 0;
        self.completed = false;
        self.clear_stats();
    }

    /// Advances the latched state machine register.
    pub fn tick(&mut self) {
        self.op_state.tick();
    }

    /// Runs one cycle of the insert state machine.
    pub fn process(&mut self) {
        if self.op_state.get() == TLB_WORKING {
            if self.req_delay > 0 {
                self.req_delay -= 1;
                self.stats.wait_cycles += 1;
            }
            if self.req_delay == 0 {
                self.completed = true;
                self.op_state.load(TLB_IDLE);
            }
        }
    }

    /// Zeroes the statistics counters.
    pub fn clear_stats(&mut self) {
        self.stats = TlbStats::default();
    }

    /// Aborts an in-flight insert, leaving the entry array unchanged.
    pub fn abort_op(&mut self) {
        self.op_state.set(TLB_IDLE);
        self.req_delay = 0;
        self.completed = false;
    }

    /// True when the state machine can accept a new insert this cycle.
    fn busy(&self) -> bool {
        self.op_state.get() == TLB_WORKING || self.op_state.get_latched() == TLB_WORKING
    }

    /// Consumes a completed insert, freeing the state machine.
    fn take_completed(&mut self) -> bool {
        if self.completed {
            self.completed = false;
            true
        } else {
            false
        }
    }

    /// Number of entries.
    pub fn size(&self) -> u32 {
        self.entries.len() as u32
    }

    /// Statistics counters.
    pub fn stats(&self) -> TlbStats {
        self.stats
    }

    /// Hashes a virtual address to an entry index.
    ///
    /// XOR-rotate over the segment id and the page-within-segment number;
    /// exposed so tests can predict which entry a mapping lands in.
    pub fn hash_adr(&self, seg: u32, ofs: u32) -> u16 {
        let page = VirtAddr::new(seg, ofs).page();
        let h = seg.rotate_left(5) ^ page ^ page.rotate_right(7);
        (h & self.index_mask) as u16
    }

    fn slot_for(&self, seg: u32, ofs: u32) -> usize {
        usize::from(self.hash_adr(seg, ofs))
    }

    fn find(&self, seg: u32, ofs: u32) -> Option<usize> {
        let page = VirtAddr::new(seg, ofs).page();
        match self.access {
            TlbAccess::DirectMapped => {
                let idx = self.slot_for(seg, ofs);
                let e = &self.entries[idx];
                (e.valid() && e.vpn_high == seg && e.vpn_low == page).then_some(idx)
            }
            TlbAccess::FullyAssociative => self
                .entries
                .iter()
                .position(|e| e.valid() && e.vpn_high == seg && e.vpn_low == page),
        }
    }

    /// Looks up the entry for `(seg, ofs)`; one-cycle operation.
    pub fn lookup(&mut self, seg: u32, ofs: u32) -> Option<TlbEntry> {
        self.stats.access += 1;
        match self.find(seg, ofs) {
            Some(idx) => Some(self.entries[idx]),
            None => {
                self.stats.miss += 1;
                None
            }
        }
    }

    /// Read-only lookup that leaves the counters alone (driver inspection).
    pub fn peek(&self, seg: u32, ofs: u32) -> Option<TlbEntry> {
        self.find(seg, ofs).map(|idx| self.entries[idx])
    }

    /// Returns the entry at a raw index, if in range.
    pub fn entry(&self, index: u32) -> Option<TlbEntry> {
        self.entries.get(index as usize).copied()
    }

    fn claim_slot(&mut self, seg: u32, ofs: u32) -> usize {
        match self.access {
            TlbAccess::DirectMapped => self.slot_for(seg, ofs),
            TlbAccess::FullyAssociative => {
                // Reuse a matching or invalid entry before falling back to
                // the hash slot, which keeps the uniqueness invariant.
                let page = VirtAddr::new(seg, ofs).page();
                self.entries
                    .iter()
                    .position(|e| e.valid() && e.vpn_high == seg && e.vpn_low == page)
                    .or_else(|| self.entries.iter().position(|e| !e.valid()))
                    .unwrap_or_else(|| self.slot_for(seg, ofs))
            }
        }
    }

    /// First insert phase: stores the translation data, invalidating the
    /// entry until the protection phase completes.
    ///
    /// Returns `true` once the operation has been accepted and the insert
    /// latency has elapsed; callers retry every cycle until then.
    pub fn insert_adr(&mut self, seg: u32, ofs: u32, data: u32) -> bool {
        if self.take_completed() {
            return true;
        }
        if self.busy() {
            return false;
        }
        let idx = self.claim_slot(seg, ofs);
        let e = &mut self.entries[idx];
        e.vpn_high = seg;
        e.vpn_low = VirtAddr::new(seg, ofs).page();
        e.p_info = data;
        e.set_valid(false);
        self.op_state.load(TLB_WORKING);
        self.req_delay = self.latency;
        false
    }

    /// Second insert phase: stores the protection data and validates the
    /// entry. Same completion contract as [`Tlb::insert_adr`].
    pub fn insert_prot(&mut self, seg: u32, ofs: u32, data: u32) -> bool {
        if self.take_completed() {
            return true;
        }
        if self.busy() {
            return false;
        }
        let idx = self.claim_slot(seg, ofs);
        let e = &mut self.entries[idx];
        e.a_info = data;
        e.set_valid(true);
        self.stats.inserts += 1;
        self.op_state.load(TLB_WORKING);
        self.req_delay = self.latency;
        false
    }

    /// Combined insert of both words; completes immediately. Driver and test
    /// entry point.
    pub fn insert_data(&mut self, seg: u32, ofs: u32, arg_acc: u32, arg_adr: u32) {
        let idx = self.claim_slot(seg, ofs);
        let e = &mut self.entries[idx];
        e.vpn_high = seg;
        e.vpn_low = VirtAddr::new(seg, ofs).page();
        e.p_info = arg_adr;
        e.a_info = arg_acc;
        e.set_valid(true);
        self.stats.inserts += 1;
    }

    /// Invalidates the entry for `(seg, ofs)`; one-cycle operation.
    ///
    /// Returns `true` when an entry was removed.
    pub fn purge(&mut self, seg: u32, ofs: u32) -> bool {
        if let Some(idx) = self.find(seg, ofs) {
            self.entries[idx].set_valid(false);
            self.stats.deletes += 1;
            true
        } else {
            false
        }
    }
}

/// Builds the `p_info` word for an entry.
pub fn make_p_info(phys_page: u32, page_type: PageType, uncacheable: bool) -> u32 {
    let mut w = 0;
    bits::set_bit_field(
        &mut w,
        p_info::PHYS_PAGE_POS,
        p_info::PHYS_PAGE_LEN,
        phys_page,
    );
    bits::set_bit_field(
        &mut w,
        p_info::PAGE_TYPE_POS,
        p_info::PAGE_TYPE_LEN,
        page_type as u32,
    );
    bits::set_bit(&mut w, p_info::UNCACHEABLE, uncacheable);
    w
}

/// Builds the `a_info` word for an entry.
pub fn make_a_info(protect_id: u32, priv_l1: u32, priv_l2: u32) -> u32 {
    let mut w = 0;
    bits::set_bit_field(
        &mut w,
        a_info::PROTECT_ID_POS,
        a_info::PROTECT_ID_LEN,
        protect_id,
    );
    bits::set_bit_field(&mut w, a_info::PRIV_L1_POS, a_info::PRIV_L1_LEN, priv_l1);
    bits::set_bit_field(&mut w, a_info::PRIV_L2_POS, a_info::PRIV_L2_LEN, priv_l2);
    w
}
