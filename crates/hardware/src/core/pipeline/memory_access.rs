//! The memory-access stage.
//!
//! Computes effective addresses, translates them through the data TLB, and
//! moves data between the register operands and the data cache. Branch
//! targets are resolved here and injected into the fetch stage's next
//! instruction address. The TLB and cache management instructions start
//! their unit operations here, stalling until the unit is done.

use tracing::trace;

use crate::common::error::TrapId;
use crate::core::{Access, Cpu};
use crate::isa::fields::{InstrFields, opt};
use crate::isa::opcodes::op;

/// Holds the stage and feeds a bubble forward; the front of the pipe sees
/// `ma_stalled_now` and freezes too.
fn stall(cpu: &mut Cpu) {
    cpu.ma.hold();
    cpu.ma.stalled = true;
    cpu.ma_stalled_now = true;
    cpu.ex.load_bubble();
}

fn raise(cpu: &mut Cpu, id: TrapId, parms: [u32; 3]) {
    let (s, o) = (cpu.ma.psw0.get(), cpu.ma.psw1.get());
    cpu.raise_trap(2, id, s, o, parms);
    cpu.ex.load_bubble();
    cpu.ma.stalled = false;
}

/// Copies the bundle to the execute input with the given operand values.
fn pass_through(cpu: &mut Cpu, a: u32, b: u32, x: u32, s: u32) {
    cpu.ex.valid.load(1);
    cpu.ex.psw0.load(cpu.ma.psw0.get());
    cpu.ex.psw1.load(cpu.ma.psw1.get());
    cpu.ex.instr.load(cpu.ma.instr.get());
    cpu.ex.val_a.load(a);
    cpu.ex.val_b.load(b);
    cpu.ex.val_x.load(x);
    cpu.ex.val_s.load(s);
    cpu.ma.stalled = false;
}

fn redirect(cpu: &mut Cpu, seg: u32, ofs: u32) {
    trace!(seg, ofs, "ma branch redirect");
    cpu.fetch_redirect = Some((seg, ofs));
    cpu.ma_stats.branches_taken += 1;
}

/// Runs the memory-access stage for one cycle.
pub(crate) fn process(cpu: &mut Cpu) {
    if cpu.squash_younger {
        cpu.ex.load_bubble();
        cpu.ma.stalled = false;
        cpu.ma_tlb_phase = 0;
        cpu.dcache.abort_op();
        return;
    }
    if !cpu.ma.is_valid() {
        cpu.ex.load_bubble();
        cpu.ma.stalled = false;
        return;
    }

    let instr = cpu.ma.instr.get();
    let a = cpu.ma.val_a.get();
    let b = cpu.ma.val_b.get();
    let x = cpu.ma.val_x.get();
    let s = cpu.ma.val_s.get();
    let link = cpu.ma.psw1.get().wrapping_add(4);

    match instr.opcode() {
        // ── Loads ─────────────────────────────────────────────
        op::LD | op::LDR | op::LDA => {
            let ea = b.wrapping_add(x);
            let len = instr.width_bytes();
            if ea % len != 0 {
                return raise(cpu, TrapId::UnalignedAccess, [s, ea, 0]);
            }
            let (paddr, uncached) = if instr.opcode() == op::LDA {
                (ea, true)
            } else {
                match cpu.translate(false, s, ea, Access::Read) {
                    Ok(xl) => (xl.paddr, xl.uncached),
                    Err(t) => return raise(cpu, t, [s, ea, 0]),
                }
            };
            match cpu.mem_read(false, s, ea, paddr, len, uncached) {
                Some(val) => {
                    if instr.opcode() == op::LDR {
                        cpu.reservation = Some(paddr);
                    }
                    pass_through(cpu, a, val, ea, s);
                }
                None => stall(cpu),
            }
        }

        // ── ALU memory operands (modes 2 and 3) ───────────────
        op::ADD..=op::CMPU if instr.mode() >= 2 => {
            let ea = b.wrapping_add(x);
            let len = instr.width_bytes();
            if ea % len != 0 {
                return raise(cpu, TrapId::UnalignedAccess, [s, ea, 0]);
            }
            match cpu.translate(false, s, ea, Access::Read) {
                Ok(xl) => match cpu.mem_read(false, s, ea, xl.paddr, len, xl.uncached) {
                    Some(val) => pass_through(cpu, a, val, ea, s),
                    None => stall(cpu),
                },
                Err(t) => raise(cpu, t, [s, ea, 0]),
            }
        }

        // ── Stores ────────────────────────────────────────────
        op::ST | op::STA | op::STC => {
            let ea = b.wrapping_add(x);
            let len = instr.width_bytes();
            if ea % len != 0 {
                return raise(cpu, TrapId::UnalignedAccess, [s, ea, 0]);
            }
            let (paddr, uncached) = if instr.opcode() == op::STA {
                (ea, true)
            } else {
                match cpu.translate(false, s, ea, Access::Write) {
                    Ok(xl) => (xl.paddr, xl.uncached),
                    Err(t) => return raise(cpu, t, [s, ea, 0]),
                }
            };
            if instr.opcode() == op::STC && cpu.reservation.take() != Some(paddr) {
                // Lost reservation: the store does not happen.
                return pass_through(cpu, a, b, ea, s);
            }
            if cpu.mem_write(s, ea, paddr, len, a, uncached) {
                pass_through(cpu, a, b, ea, s);
            } else {
                stall(cpu);
            }
        }

        // ── Branches resolved here ────────────────────────────
        op::B | op::GATE => {
            let target = cpu.ma.psw1.get().wrapping_add(x);
            redirect(cpu, cpu.ma.psw0.get(), target);
            pass_through(cpu, a, b, link, s);
        }
        op::BR => {
            let target = cpu.ma.psw1.get().wrapping_add(b << 2);
            redirect(cpu, cpu.ma.psw0.get(), target);
            pass_through(cpu, a, b, link, s);
        }
        op::BV => {
            redirect(cpu, cpu.ma.psw0.get(), b);
            pass_through(cpu, a, b, link, s);
        }
        op::BE => {
            redirect(cpu, s, b.wrapping_add(x));
            pass_through(cpu, a, b, link, s);
        }
        op::BVE => {
            redirect(cpu, s, a.wrapping_add(b));
            pass_through(cpu, a, b, link, s);
        }

        // ── TLB management ────────────────────────────────────
        op::ITLB => {
            let data_side = instr.opt(opt::ITLB_T);
            let done = if cpu.ma_tlb_phase == 0 {
                cpu.mgmt_tlb(data_side).insert_adr(s, b, x)
            } else {
                cpu.mgmt_tlb(data_side).insert_prot(s, b, a)
            };
            if done {
                if cpu.ma_tlb_phase == 0 {
                    cpu.ma_tlb_phase = 1;
                    stall(cpu);
                } else {
                    cpu.ma_tlb_phase = 0;
                    pass_through(cpu, a, b, x, s);
                }
            } else {
                stall(cpu);
            }
        }
        op::PTLB => {
            let ea = b.wrapping_add(x);
            let instr_side = instr.opt(opt::TLB_T);
            let _ = cpu.mgmt_tlb(!instr_side).purge(s, ea);
            pass_through(cpu, a, b, ea, s);
        }

        // ── Cache management ──────────────────────────────────
        op::PCA => {
            let ea = b.wrapping_add(x);
            let tag = if instr.opt(opt::TLB_M) {
                ea
            } else {
                match cpu.translate(false, s, ea, Access::Read) {
                    Ok(xl) => xl.paddr,
                    Err(t) => return raise(cpu, t, [s, ea, 0]),
                }
            };
            let pri = cpu.dcache.priority();
            let cache = if instr.opt(opt::TLB_T) {
                &mut cpu.icache
            } else {
                &mut cpu.dcache
            };
            let done = if instr.opt(opt::PCA_F) {
                cache.flush_block(s, ea, tag, pri)
            } else {
                cache.purge_block(s, ea, tag, pri)
            };
            if done {
                pass_through(cpu, a, b, ea, s);
            } else {
                stall(cpu);
            }
        }

        // ── Probes ────────────────────────────────────────────
        op::LDPA => {
            let ea = b.wrapping_add(x);
            let result = match cpu.translate(false, s, ea, Access::Read) {
                Ok(xl) => xl.paddr,
                Err(_) => 0,
            };
            pass_through(cpu, a, result, ea, s);
        }
        op::PRB => {
            let want_write = instr.opt(opt::PRB_W);
            let acc = if want_write {
                Access::Write
            } else {
                Access::Read
            };
            let result = u32::from(cpu.translate(false, s, b, acc).is_ok());
            pass_through(cpu, a, result, x, s);
        }

        // Everything else just moves on to execute.
        _ => pass_through(cpu, a, b, x, s),
    }
}
