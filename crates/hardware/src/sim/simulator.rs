//! The simulator driver surface.
//!
//! [`Simulator`] owns the CPU core and exposes the operations an embedding
//! front end needs: scoped resets, stepping by clock or by retired
//! instruction, register and absolute-memory access, the assembler and
//! disassembler, TLB and cache maintenance, breakpoints, and memory dump
//! files. Driver operations are host-side: they act immediately and do not
//! consume simulated cycles.

use std::path::Path;

use tracing::debug;

use crate::common::error::SimError;
use crate::config::Config;
use crate::core::Cpu;
use crate::core::arch::RegClass;
use crate::core::units::mem::IoDevice;
use crate::core::units::tlb::TlbEntry;
use crate::isa::asm::{AsmError, OneLineAsm};
use crate::isa::disasm::{Radix, disassemble_word};

use super::memfile;

/// What a reset touches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetScope {
    /// CPU state only: registers, pipeline, TLBs.
    Cpu,
    /// Memory hierarchy contents and state machines.
    Memory,
    /// Statistics counters only.
    Stats,
    /// Everything.
    All,
}

/// Selects one of the two L1 structures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitSel {
    /// The instruction-side structure.
    Instr,
    /// The data-side structure.
    Data,
}

/// The top-level simulator.
#[derive(Debug)]
pub struct Simulator {
    /// The CPU core.
    pub cpu: Cpu,
    asm: OneLineAsm,
    breakpoints: Vec<(u32, u32)>,
}

impl Simulator {
    /// Builds a simulator from a configuration.
    pub fn new(cfg: &Config) -> Self {
        Self {
            cpu: Cpu::new(cfg),
            asm: OneLineAsm::new(),
            breakpoints: Vec::new(),
        }
    }

    /// A simulator over the default small machine.
    pub fn with_defaults() -> Self {
        Self::new(&Config::default())
    }

    // ── Stepping and reset ────────────────────────────────────

    /// Resets the selected scope.
    pub fn reset(&mut self, scope: ResetScope) {
        match scope {
            ResetScope::Cpu => self.cpu.reset_cpu(),
            ResetScope::Memory => self.cpu.reset_memory(),
            ResetScope::Stats => self.cpu.clear_stats(),
            ResetScope::All => self.cpu.reset(),
        }
    }

    /// Steps `n` clocks.
    pub fn clock_step(&mut self, n: u32) {
        self.cpu.clock_step(n);
    }

    /// Steps until `n` instructions retire, stopping early when the next
    /// instruction address hits a breakpoint.
    pub fn instr_step(&mut self, n: u32) {
        for _ in 0..n {
            self.cpu.instr_step(1);
            let ia = (self.cpu.fd.psw0.get(), self.cpu.fd.psw1.get());
            if self.breakpoints.contains(&ia) {
                debug!(seg = ia.0, ofs = ia.1, "breakpoint hit");
                break;
            }
        }
    }

    // ── Registers ─────────────────────────────────────────────

    /// Reads a register.
    pub fn get_reg(&self, class: RegClass, idx: u8) -> u32 {
        self.cpu.get_reg(class, idx)
    }

    /// Writes a register.
    pub fn set_reg(&mut self, class: RegClass, idx: u8, val: u32) {
        self.cpu.set_reg(class, idx, val);
    }

    // ── Absolute memory access ────────────────────────────────

    /// Reads `len` bytes of physical memory at `ofs`.
    ///
    /// # Errors
    ///
    /// `AddressRange` when the range leaves the configured memory.
    pub fn read_abs_mem(&self, ofs: u32, len: u32) -> Result<Vec<u8>, SimError> {
        let mem = &self.cpu.mem;
        if !mem.valid_adr(ofs) || !mem.valid_adr(ofs + len.saturating_sub(1)) {
            return Err(SimError::AddressRange { ofs, len });
        }
        let base = (ofs - mem.start_adr()) as usize;
        Ok(mem.data_bytes(0)[base..base + len as usize].to_vec())
    }

    /// Writes bytes into physical memory at `ofs`.
    ///
    /// # Errors
    ///
    /// `AddressRange` when the range leaves the configured memory.
    pub fn write_abs_mem(&mut self, ofs: u32, data: &[u8]) -> Result<(), SimError> {
        let mem = &mut self.cpu.mem;
        let len = data.len() as u32;
        if !mem.valid_adr(ofs) || !mem.valid_adr(ofs + len.saturating_sub(1)) {
            return Err(SimError::AddressRange { ofs, len });
        }
        let base = (ofs - mem.start_adr()) as usize;
        mem.data_bytes_mut(0)[base..base + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Loads a PDC ROM image at the start of the PDC range.
    pub fn load_pdc_image(&mut self, image: &[u8]) {
        let pdc = &mut self.cpu.pdc;
        let len = image.len().min(pdc.mem_size() as usize);
        pdc.data_bytes_mut(0)[..len].copy_from_slice(&image[..len]);
    }

    /// Installs the I/O handler behind the I/O address range.
    pub fn set_io_device(&mut self, dev: Box<dyn IoDevice>) {
        self.cpu.io.set_io_device(dev);
    }

    // ── Assembler / disassembler ──────────────────────────────

    /// Assembles one line into an instruction word.
    ///
    /// # Errors
    ///
    /// The symbolic assembler error with its caret position.
    pub fn assemble_line(&self, line: &str) -> Result<u32, AsmError> {
        self.asm.assemble(line)
    }

    /// Disassembles an instruction word at the given radix.
    pub fn disassemble_word(&self, instr: u32, radix: Radix) -> String {
        disassemble_word(instr, radix)
    }

    // ── TLB maintenance ───────────────────────────────────────

    /// Inserts a TLB entry (both words at once).
    pub fn insert_tlb(&mut self, which: UnitSel, seg: u32, ofs: u32, acc: u32, adr: u32) {
        self.tlb_mut(which).insert_data(seg, ofs, acc, adr);
    }

    /// Purges a TLB entry; `true` when one was removed.
    pub fn purge_tlb(&mut self, which: UnitSel, seg: u32, ofs: u32) -> bool {
        self.tlb_mut(which).purge(seg, ofs)
    }

    /// Looks up a TLB entry without touching the statistics.
    pub fn lookup_tlb(&self, which: UnitSel, seg: u32, ofs: u32) -> Option<TlbEntry> {
        match which {
            UnitSel::Instr => self.cpu.itlb.peek(seg, ofs),
            UnitSel::Data => self.cpu.dtlb.peek(seg, ofs),
        }
    }

    /// The hash-index of a virtual address in the instruction TLB.
    pub fn hash_adr(&self, seg: u32, ofs: u32) -> u16 {
        self.cpu.itlb.hash_adr(seg, ofs)
    }

    fn tlb_mut(&mut self, which: UnitSel) -> &mut crate::core::units::tlb::Tlb {
        match which {
            UnitSel::Instr => &mut self.cpu.itlb,
            UnitSel::Data => &mut self.cpu.dtlb,
        }
    }

    fn cache_mut(&mut self, which: UnitSel) -> &mut crate::core::units::mem::MemLayer {
        match which {
            UnitSel::Instr => &mut self.cpu.icache,
            UnitSel::Data => &mut self.cpu.dcache,
        }
    }

    // ── Cache maintenance ─────────────────────────────────────

    /// Writes back the dirty block covering `ofs` (if any) and marks it
    /// clean. Immediate: no simulated cycles pass. Flushing an already
    /// clean block is a no-op.
    pub fn flush_cache(&mut self, which: UnitSel, _seg: u32, ofs: u32) {
        let (index, size, sets, mask) = {
            let c = self.cache_mut(which);
            (
                (ofs / c.block_size()) % c.block_entries(),
                c.block_size(),
                c.block_sets(),
                c.block_mask(),
            )
        };
        for set in 0..sets {
            let Some(entry) = self.cache_mut(which).mem_tag_entry(index, set) else {
                continue;
            };
            if !entry.valid || !entry.dirty {
                continue;
            }
            let base = (index * size) as usize;
            let data = {
                let c = self.cache_mut(which);
                c.data_bytes(set)[base..base + size as usize].to_vec()
            };
            let adr = entry.tag & !mask;
            let mem = &mut self.cpu.mem;
            if mem.valid_adr(adr) {
                let mbase = (adr - mem.start_adr()) as usize;
                mem.data_bytes_mut(0)[mbase..mbase + size as usize].copy_from_slice(&data);
            }
            self.cache_mut(which).tag_array[set as usize][index as usize].dirty = false;
        }
    }

    /// Invalidates the block at `(index, set)`. Immediate.
    pub fn purge_cache(&mut self, which: UnitSel, index: u32, set: u32) {
        let c = self.cache_mut(which);
        if (set as usize) < c.tag_array.len() && (index as usize) < c.block_entries() as usize {
            let e = &mut c.tag_array[set as usize][index as usize];
            e.valid = false;
            e.dirty = false;
        }
    }

    // ── Breakpoints ───────────────────────────────────────────

    /// Arms a breakpoint at a virtual instruction address.
    pub fn set_breakpoint(&mut self, seg: u32, ofs: u32) {
        if !self.breakpoints.contains(&(seg, ofs)) {
            self.breakpoints.push((seg, ofs));
        }
    }

    /// Removes a breakpoint; `true` when one was armed there.
    pub fn clear_breakpoint(&mut self, seg: u32, ofs: u32) -> bool {
        let before = self.breakpoints.len();
        self.breakpoints.retain(|bp| *bp != (seg, ofs));
        self.breakpoints.len() != before
    }

    /// The armed breakpoints, in arming order.
    pub fn list_breakpoints(&self) -> &[(u32, u32)] {
        &self.breakpoints
    }

    // ── Memory dump files ─────────────────────────────────────

    /// Saves `len` bytes of physical memory starting at `ofs` in the `MA`
    /// dump format; all-zero lines are omitted.
    ///
    /// # Errors
    ///
    /// Address-range or file errors.
    pub fn save_mem_to_file(&self, path: &Path, ofs: u32, len: u32) -> Result<(), SimError> {
        let ofs = ofs & !3;
        let len = (len + 3) & !3;
        let bytes = self.read_abs_mem(ofs, len)?;
        let words: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        memfile::save(path, &memfile::to_dump_string(ofs, &words))
    }

    /// Replays an `MA` dump file into physical memory.
    ///
    /// # Errors
    ///
    /// Malformed lines, address-range, or file errors.
    pub fn load_mem_from_file(&mut self, path: &Path) -> Result<(), SimError> {
        let text = memfile::load(path)?;
        for (ofs, word) in memfile::parse_dump(&text)? {
            self.write_abs_mem(ofs, &word.to_le_bytes())?;
        }
        Ok(())
    }
}
