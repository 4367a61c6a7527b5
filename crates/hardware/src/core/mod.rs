//! The CPU core.
//!
//! This module owns the whole machine: the register banks, the three
//! pipeline stages, the TLBs, and the memory hierarchy. It implements:
//! 1. **Clocking:** the two-phase tick/process discipline, `clock_step` and
//!    `instr_step`.
//! 2. **Trap Control:** collecting stage traps, arbitrating by stage
//!    priority, and redirecting fetch to the handler vector.
//! 3. **Translation And Routing:** the TLB front door used by the fetch and
//!    data paths, and the dispatch of a physical address to the right
//!    memory layer.

/// Architectural state: register banks and the status word layout.
pub mod arch;
/// The three pipeline stages and their latch bundles.
pub mod pipeline;
/// Hardware units: TLBs, memory layers, victim selection.
pub mod units;

use tracing::{debug, warn};

use crate::common::bits;
use crate::common::error::TrapId;
use crate::common::reg::Latch;
use crate::config::{Config, TlbKind};
use crate::core::arch::psw;
use crate::core::arch::regfile::{RegClass, RegisterFile, cr, stage_reg};
use crate::core::pipeline::latches::{FdBundle, StageBundle};
use crate::core::units::mem::MemLayer;
use crate::core::units::tlb::Tlb;
use crate::stats::{CoreStats, ExecuteStats, FetchDecodeStats, MemoryAccessStats};

/// Access intent of a translation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Access {
    /// Instruction fetch.
    Fetch,
    /// Data read.
    Read,
    /// Data write.
    Write,
}

/// A successful translation.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Xlate {
    /// Physical byte address.
    pub paddr: u32,
    /// Access must bypass the caches.
    pub uncached: bool,
}

/// A trap recorded by a stage, waiting for the end-of-cycle controller.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PendingTrap {
    /// Stage rank: execute 3, memory-access 2, fetch-decode 1.
    pub rank: u8,
    /// Which trap.
    pub id: TrapId,
    /// IA segment of the faulting instruction.
    pub psw0: u32,
    /// IA offset of the faulting instruction.
    pub psw1: u32,
    /// Trap parameters for the handler.
    pub parms: [u32; 3],
}

/// The CPU core: registers, pipeline, TLBs, and memory hierarchy.
pub struct Cpu {
    /// Architectural register banks.
    pub regs: RegisterFile,
    /// The program status word.
    pub st: Latch,

    /// Fetch-decode stage register (the instruction address).
    pub fd: FdBundle,
    /// Memory-access stage input bundle.
    pub ma: StageBundle,
    /// Execute stage input bundle.
    pub ex: StageBundle,

    /// Instruction TLB (the shared TLB in dual-ported configurations).
    pub itlb: Tlb,
    /// Data TLB (unused in dual-ported configurations).
    pub dtlb: Tlb,
    tlb_kind: TlbKind,

    /// L1 instruction cache.
    pub icache: MemLayer,
    /// L1 data cache.
    pub dcache: MemLayer,
    /// Optional unified L2 cache.
    pub l2: Option<MemLayer>,
    /// Physical memory.
    pub mem: MemLayer,
    /// PDC ROM.
    pub pdc: MemLayer,
    /// Memory-mapped I/O range.
    pub io: MemLayer,

    /// Fetch-decode stage counters.
    pub fd_stats: FetchDecodeStats,
    /// Memory-access stage counters.
    pub ma_stats: MemoryAccessStats,
    /// Execute stage counters.
    pub ex_stats: ExecuteStats,
    /// Whole-core counters.
    pub stats: CoreStats,

    pub(crate) pending_trap: Option<PendingTrap>,
    pub(crate) forward: Option<(usize, u32)>,
    pub(crate) fetch_redirect: Option<(u32, u32)>,
    pub(crate) squash_younger: bool,
    pub(crate) ma_stalled_now: bool,
    pub(crate) reservation: Option<u32>,
    pub(crate) ma_tlb_phase: u32,
    pub(crate) retired_this_cycle: bool,
    pub(crate) commit_ia: (u32, u32),
    trap_taken_this_cycle: bool,
    external_interrupt: bool,

    victim_seed: u32,
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("ia_seg", &self.fd.psw0.get())
            .field("ia_ofs", &self.fd.psw1.get())
            .field("clock", &self.stats.clock_cntr)
            .finish_non_exhaustive()
    }
}

impl Cpu {
    /// Builds a CPU from a configuration and resets it.
    pub fn new(cfg: &Config) -> Self {
        let mut cpu = Self {
            regs: RegisterFile::new(),
            st: Latch::default(),
            fd: FdBundle::default(),
            ma: StageBundle::default(),
            ex: StageBundle::default(),
            itlb: Tlb::new(&cfg.itlb),
            dtlb: Tlb::new(&cfg.dtlb),
            tlb_kind: cfg.tlb_kind,
            icache: MemLayer::new(&cfg.icache, cfg.victim_seed),
            dcache: MemLayer::new(&cfg.dcache, cfg.victim_seed ^ 0x9E37_79B9),
            l2: cfg
                .l2
                .as_ref()
                .map(|c| MemLayer::new(c, cfg.victim_seed ^ 0x5555_5555)),
            mem: MemLayer::new(&cfg.mem, cfg.victim_seed),
            pdc: MemLayer::new(&cfg.pdc, cfg.victim_seed),
            io: MemLayer::new(&cfg.io, cfg.victim_seed),
            fd_stats: FetchDecodeStats::default(),
            ma_stats: MemoryAccessStats::default(),
            ex_stats: ExecuteStats::default(),
            stats: CoreStats::default(),
            pending_trap: None,
            forward: None,
            fetch_redirect: None,
            squash_younger: false,
            ma_stalled_now: false,
            reservation: None,
            ma_tlb_phase: 0,
            retired_this_cycle: false,
            commit_ia: (0, 0),
            trap_taken_this_cycle: false,
            external_interrupt: false,
            victim_seed: cfg.victim_seed,
        };
        cpu.reset();
        cpu
    }

    /// Full reset: registers, pipeline, TLBs, memory state, and statistics.
    /// The victim seed is re-applied so a reset run replays exactly.
    pub fn reset(&mut self) {
        self.reset_cpu();
        self.reset_memory();
        self.clear_stats();
    }

    /// Resets the CPU state without touching memory contents.
    pub fn reset_cpu(&mut self) {
        self.regs.reset();
        self.st.reset();
        self.fd.reset();
        self.ma.reset();
        self.ex.reset();
        self.itlb.reset();
        self.dtlb.reset();
        self.pending_trap = None;
        self.forward = None;
        self.fetch_redirect = None;
        self.squash_younger = false;
        self.ma_stalled_now = false;
        self.reservation = None;
        self.ma_tlb_phase = 0;
        self.retired_this_cycle = false;
        self.commit_ia = (0, 0);
        self.external_interrupt = false;
        debug!("cpu reset");
    }

    /// Resets the memory hierarchy, reseeding the victim selectors.
    pub fn reset_memory(&mut self) {
        self.icache.reset();
        self.icache.reseed(self.victim_seed);
        self.dcache.reset();
        self.dcache.reseed(self.victim_seed ^ 0x9E37_79B9);
        if let Some(l2) = self.l2.as_mut() {
            l2.reset();
            l2.reseed(self.victim_seed ^ 0x5555_5555);
        }
        self.mem.reset();
        self.pdc.reset();
        self.io.reset();
    }

    /// Zeroes every statistics counter in the core.
    pub fn clear_stats(&mut self) {
        self.fd_stats = FetchDecodeStats::default();
        self.ma_stats = MemoryAccessStats::default();
        self.ex_stats = ExecuteStats::default();
        self.stats = CoreStats::default();
        self.itlb.clear_stats();
        self.dtlb.clear_stats();
        self.icache.clear_stats();
        self.dcache.clear_stats();
        if let Some(l2) = self.l2.as_mut() {
            l2.clear_stats();
        }
        self.mem.clear_stats();
        self.pdc.clear_stats();
        self.io.clear_stats();
    }

    /// Posts an external interrupt; taken at the next cycle boundary when
    /// the status word has interrupts enabled.
    pub fn post_external_interrupt(&mut self) {
        self.external_interrupt = true;
    }

    // ── Clocking ──────────────────────────────────────────────

    fn tick_all(&mut self) {
        self.regs.tick();
        self.st.tick();
        self.fd.tick();
        self.ma.tick();
        self.ex.tick();
        self.itlb.tick();
        self.dtlb.tick();
        self.icache.tick();
        self.dcache.tick();
        if let Some(l2) = self.l2.as_mut() {
            l2.tick();
        }
        self.mem.tick();
        self.pdc.tick();
        self.io.tick();
    }

    fn process_all(&mut self) {
        self.forward = None;
        self.fetch_redirect = None;
        self.squash_younger = false;
        self.ma_stalled_now = false;
        self.retired_this_cycle = false;
        self.trap_taken_this_cycle = false;

        // Stage order: writes target input sides, so EX before MA before FD
        // still has every stage observing last cycle's outputs.
        pipeline::execute::process(self);
        pipeline::memory_access::process(self);
        pipeline::fetch_decode::process(self);

        // L1s talk to the L2 when present, else straight to memory.
        match self.l2.as_mut() {
            Some(l2) => {
                self.icache.process(Some(l2));
                self.dcache.process(Some(l2));
                l2.process(Some(&mut self.mem));
            }
            None => {
                self.icache.process(Some(&mut self.mem));
                self.dcache.process(Some(&mut self.mem));
            }
        }
        self.mem.process(None);
        self.pdc.process(None);
        self.io.process(None);

        self.itlb.process();
        self.dtlb.process();

        self.take_external_interrupt();
        self.handle_traps();

        self.stats.clock_cntr += 1;
    }

    /// Steps the machine by `n` clocks; `clock_step(0)` is a no-op.
    pub fn clock_step(&mut self, n: u32) {
        for _ in 0..n {
            self.tick_all();
            self.process_all();
        }
    }

    /// Steps until `n` instructions have retired; `instr_step(0)` is a
    /// no-op. Bails out if the pipeline wedges.
    ///
    /// Single-step semantics: speculatively fetched younger instructions
    /// are squashed after the final retirement and fetch is repointed just
    /// past the retired instruction, so stepping one instruction at a time
    /// matches stepping them all at once architecturally.
    pub fn instr_step(&mut self, n: u32) {
        const MAX_CLOCKS_PER_INSTR: u64 = 100_000;
        if n == 0 {
            return;
        }
        let mut retired = 0u32;
        let mut clocks = 0u64;
        while retired < n {
            self.clock_step(1);
            clocks += 1;
            if self.retired_this_cycle {
                retired += 1;
            }
            if clocks > u64::from(n) * MAX_CLOCKS_PER_INSTR {
                warn!(retired, wanted = n, "instruction step gave up on a wedged pipeline");
                return;
            }
        }
        // Settle the final clock edge so the last writebacks are visible
        // to the driver, then discard the speculative front of the pipe.
        self.tick_all();
        self.squash_unretired();
    }

    /// Discards everything fetched after the last retired instruction and
    /// repoints fetch at the architectural successor.
    fn squash_unretired(&mut self) {
        // A trap in the final cycle comes from a younger instruction that
        // is about to be re-fetched at the handler; its redirect stands.
        if self.trap_taken_this_cycle {
            return;
        }
        let (seg, ofs) = self.commit_ia;
        self.fd.psw0.set(seg);
        self.fd.psw1.set(ofs);
        self.fd.stalled = false;
        self.ma.reset();
        self.ex.reset();
        self.ma_tlb_phase = 0;
        self.icache.abort_op();
        self.dcache.abort_op();
        self.itlb.abort_op();
        self.dtlb.abort_op();
    }

    // ── Status helpers ────────────────────────────────────────

    /// True when executing at user level.
    #[inline]
    pub fn user_mode(&self) -> bool {
        self.st.bit(psw::ST_USER_MODE)
    }

    pub(crate) fn code_xlate(&self) -> bool {
        self.st.bit(psw::ST_CODE_XLATE)
    }

    pub(crate) fn data_xlate(&self) -> bool {
        self.st.bit(psw::ST_DATA_XLATE)
    }

    fn prot_check(&self) -> bool {
        self.st.bit(psw::ST_PROT_CHECK)
    }

    /// True when `pid` matches one of the protection-id control registers.
    fn protect_id_ok(&self, pid: u32) -> bool {
        if pid == 0 {
            return true;
        }
        (0..4).any(|i| self.regs.cr(cr::PROTECT_ID_1 + i) & 0xFFFF == pid)
    }

    // ── Translation and memory routing ────────────────────────

    /// Translates a virtual address on the instruction or data path.
    pub(crate) fn translate(
        &mut self,
        instr_side: bool,
        seg: u32,
        ofs: u32,
        acc: Access,
    ) -> Result<Xlate, TrapId> {
        let enabled = if instr_side {
            self.code_xlate()
        } else {
            self.data_xlate()
        };
        if !enabled {
            return Ok(Xlate {
                paddr: ofs,
                uncached: false,
            });
        }

        let dual = self.tlb_kind == TlbKind::DualPorted;
        let tlb = if instr_side || dual {
            &mut self.itlb
        } else {
            &mut self.dtlb
        };
        let Some(entry) = tlb.lookup(seg, ofs) else {
            return Err(if instr_side {
                TrapId::InstrTlbMiss
            } else {
                TrapId::DataTlbMiss
            });
        };

        let prot_trap = if instr_side {
            TrapId::InstrProtection
        } else {
            TrapId::DataProtection
        };

        if self.user_mode() && entry.priv_l1() == 0 {
            return Err(prot_trap);
        }
        if self.prot_check() && !self.protect_id_ok(entry.protect_id()) {
            return Err(prot_trap);
        }
        match acc {
            Access::Fetch => {
                // Only executable and gateway pages may supply instructions.
                if entry.page_type() < 2 {
                    return Err(TrapId::InstrProtection);
                }
            }
            Access::Write => {
                if entry.page_type() != 0 {
                    return Err(TrapId::DataProtection);
                }
            }
            Access::Read => {}
        }
        if entry.trap_page() || (!instr_side && entry.trap_data_page()) {
            return Err(TrapId::PageType);
        }

        Ok(Xlate {
            paddr: (entry.phys_page() << 12) | (ofs & 0xFFF),
            uncached: entry.uncacheable(),
        })
    }

    /// Reads `len` bytes at a translated address, routing to the layer that
    /// covers it. Returns the value once the access completes.
    pub(crate) fn mem_read(
        &mut self,
        instr_side: bool,
        seg: u32,
        ofs: u32,
        paddr: u32,
        len: u32,
        uncached: bool,
    ) -> Option<u32> {
        let pri = if instr_side {
            self.icache.priority()
        } else {
            self.dcache.priority()
        };
        if self.pdc.valid_adr(paddr) {
            self.pdc.read_word(0, paddr, paddr, len, pri)
        } else if self.io.valid_adr(paddr) {
            self.io.read_word(0, paddr, paddr, len, pri)
        } else if uncached {
            self.mem.read_word(0, paddr, paddr, len, pri)
        } else if instr_side {
            self.icache.read_word(seg, ofs, paddr, len, 0)
        } else {
            self.dcache.read_word(seg, ofs, paddr, len, 0)
        }
    }

    /// Writes `len` bytes at a translated address; `true` once committed.
    pub(crate) fn mem_write(
        &mut self,
        seg: u32,
        ofs: u32,
        paddr: u32,
        len: u32,
        val: u32,
        uncached: bool,
    ) -> bool {
        let pri = self.dcache.priority();
        if self.pdc.valid_adr(paddr) {
            self.pdc.write_word(0, paddr, paddr, len, val, pri)
        } else if self.io.valid_adr(paddr) {
            self.io.write_word(0, paddr, paddr, len, val, pri)
        } else if uncached {
            self.mem.write_word(0, paddr, paddr, len, val, pri)
        } else {
            self.dcache.write_word(seg, ofs, paddr, len, val, 0)
        }
    }

    /// The TLB targeted by management instructions for the given side; the
    /// dual-ported configuration has only the one.
    pub(crate) fn mgmt_tlb(&mut self, data_side: bool) -> &mut Tlb {
        if data_side && self.tlb_kind != TlbKind::DualPorted {
            &mut self.dtlb
        } else {
            &mut self.itlb
        }
    }

    /// Resolves the segment of a memory operand: explicit SR1..SR3, or the
    /// upper two offset bits selecting S4..S7.
    pub(crate) fn resolve_segment(&self, seg_sel: u32, base_val: u32) -> u32 {
        if (1..=3).contains(&seg_sel) {
            self.regs.sr(seg_sel as usize)
        } else {
            self.regs.sr(4 + (base_val >> 30) as usize)
        }
    }

    // ── Trap controller ───────────────────────────────────────

    /// Records a trap from a stage. The highest-ranked stage wins the cycle;
    /// since execute processes first, the first recording of a rank keeps
    /// priority over lower ranks.
    pub(crate) fn raise_trap(
        &mut self,
        rank: u8,
        id: TrapId,
        psw0: u32,
        psw1: u32,
        parms: [u32; 3],
    ) {
        match &self.pending_trap {
            Some(t) if t.rank >= rank => {}
            _ => {
                self.pending_trap = Some(PendingTrap {
                    rank,
                    id,
                    psw0,
                    psw1,
                    parms,
                });
            }
        }
    }

    fn take_external_interrupt(&mut self) {
        if self.external_interrupt && self.st.bit(psw::ST_INT_ENABLE) {
            self.external_interrupt = false;
            let (s, o) = (self.fd.psw0.get(), self.fd.psw1.get());
            self.raise_trap(3, TrapId::ExternalInterrupt, s, o, [0; 3]);
        }
    }

    /// End-of-cycle trap dispatch: save state, flush, redirect.
    fn handle_traps(&mut self) {
        let Some(t) = self.pending_trap.take() else {
            return;
        };
        self.trap_taken_this_cycle = true;
        debug!(trap = %t.id, psw0 = t.psw0, psw1 = t.psw1, "taking trap");

        self.regs.set(RegClass::Ctrl, cr::TRAP_PSW_0 as u8, t.psw0);
        self.regs.set(RegClass::Ctrl, cr::TRAP_PSW_1 as u8, t.psw1);
        self.regs
            .set(RegClass::Ctrl, cr::TRAP_STAT as u8, self.st.get());
        for (i, p) in t.parms.iter().enumerate() {
            self.regs
                .set(RegClass::Ctrl, (cr::TRAP_PARM_1 + i) as u8, *p);
        }

        // Privileged, translation off, interrupts off until the handler
        // turns them back on.
        self.st.load(0);

        // Younger work is squashed: the memory-access input always, the
        // execute input when the trap came from memory-access or execute.
        self.ma.load_bubble();
        if t.rank >= 2 {
            self.ex.load_bubble();
            self.dcache.abort_op();
            self.itlb.abort_op();
            self.dtlb.abort_op();
            self.ma_tlb_phase = 0;
        }
        self.icache.abort_op();

        // The redirect is the architecturally visible state after this
        // cycle, so it bypasses the latch.
        let vector = self
            .regs
            .cr(cr::TRAP_VECTOR_BASE)
            .wrapping_add(t.id.vector_offset());
        self.fd.psw0.set(0);
        self.fd.psw1.set(vector);
        self.fd.stalled = false;

        match t.rank {
            3 => self.ex_stats.traps_raised += 1,
            2 => self.ma_stats.traps_raised += 1,
            _ => self.fd_stats.traps_raised += 1,
        }
    }

    // ── Driver register access ────────────────────────────────

    /// Reads a register by class and index; stage classes expose the
    /// pipeline registers of the named stage.
    pub fn get_reg(&self, class: RegClass, idx: u8) -> u32 {
        match class {
            RegClass::Gen | RegClass::Seg | RegClass::Ctrl => self.regs.get(class, idx),
            RegClass::FdStage => match idx {
                stage_reg::STALLED => u32::from(self.fd.stalled),
                stage_reg::PSW_0 => self.fd.psw0.get(),
                stage_reg::PSW_1 => self.fd.psw1.get(),
                _ => 0,
            },
            RegClass::MaStage => Self::bundle_reg(&self.ma, idx),
            RegClass::ExStage => Self::bundle_reg(&self.ex, idx),
        }
    }

    /// Writes a register by class and index, bypassing the latch.
    pub fn set_reg(&mut self, class: RegClass, idx: u8, val: u32) {
        match class {
            RegClass::Gen | RegClass::Seg | RegClass::Ctrl => self.regs.set(class, idx, val),
            RegClass::FdStage => match idx {
                stage_reg::PSW_0 => self.fd.psw0.set(val),
                stage_reg::PSW_1 => self.fd.psw1.set(val),
                _ => {}
            },
            RegClass::MaStage => Self::set_bundle_reg(&mut self.ma, idx, val),
            RegClass::ExStage => Self::set_bundle_reg(&mut self.ex, idx, val),
        }
    }

    /// Reads the program status word.
    pub fn status(&self) -> u32 {
        self.st.get()
    }

    /// Writes the program status word, bypassing the latch.
    pub fn set_status(&mut self, val: u32) {
        self.st.set(val);
    }

    /// Sets or clears a status bit, bypassing the latch.
    pub fn set_status_bit(&mut self, pos: u32, val: bool) {
        let mut w = self.st.get();
        bits::set_bit(&mut w, pos, val);
        self.st.set(w);
    }

    fn bundle_reg(b: &StageBundle, idx: u8) -> u32 {
        match idx {
            stage_reg::STALLED => u32::from(b.stalled),
            stage_reg::PSW_0 => b.psw0.get(),
            stage_reg::PSW_1 => b.psw1.get(),
            stage_reg::INSTR => b.instr.get(),
            stage_reg::VAL_A => b.val_a.get(),
            stage_reg::VAL_B => b.val_b.get(),
            stage_reg::VAL_X => b.val_x.get(),
            stage_reg::VAL_S => b.val_s.get(),
            _ => 0,
        }
    }

    fn set_bundle_reg(b: &mut StageBundle, idx: u8, val: u32) {
        match idx {
            stage_reg::PSW_0 => b.psw0.set(val),
            stage_reg::PSW_1 => b.psw1.set(val),
            stage_reg::INSTR => {
                b.instr.set(val);
                b.valid.set(1);
            }
            stage_reg::VAL_A => b.val_a.set(val),
            stage_reg::VAL_B => b.val_b.set(val),
            stage_reg::VAL_X => b.val_x.set(val),
            stage_reg::VAL_S => b.val_s.set(val),
            _ => {}
        }
    }
}
