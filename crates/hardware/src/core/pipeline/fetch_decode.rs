//! The fetch-decode stage.
//!
//! Reads the instruction address, translates it through the instruction
//! TLB, fetches the word through the instruction cache, decodes the operand
//! registers, and primes A/B/X/S values into the memory-access input
//! bundle. Hazards against the instruction in memory-access stall the
//! stage; results coming out of execute this cycle arrive through the
//! forwarding slot instead.

use tracing::trace;

use crate::common::bits;
use crate::core::pipeline::{is_privileged, is_system_writer, source_regs, writeback_targets};
use crate::core::{Access, Cpu};
use crate::isa::fields::{InstrFields, opt, pos};
use crate::isa::opcodes::op;

/// Reads a general register, taking this cycle's execute result when the
/// forwarding slot matches.
fn read_gr(cpu: &Cpu, idx: usize) -> u32 {
    match cpu.forward {
        Some((r, v)) if r == idx => v,
        _ => cpu.regs.gr(idx),
    }
}

/// Primed operand values for the memory-access stage.
struct Operands {
    a: u32,
    b: u32,
    x: u32,
    s: u32,
}

fn prime_operands(cpu: &Cpu, instr: u32) -> Operands {
    let r = instr.reg_r();
    let ra = instr.reg_a();
    let rb = instr.reg_b();
    let mut v = Operands {
        a: 0,
        b: 0,
        x: 0,
        s: 0,
    };

    match instr.opcode() {
        op::ADD..=op::CMPU => match instr.mode() {
            0 => {
                v.a = read_gr(cpu, r);
                v.b = instr.imm(31, 18) as u32;
            }
            1 => {
                v.a = read_gr(cpu, ra);
                v.b = read_gr(cpu, rb);
            }
            2 => {
                v.a = read_gr(cpu, r);
                v.x = read_gr(cpu, ra);
                v.b = read_gr(cpu, rb);
                v.s = cpu.resolve_segment(0, v.b);
            }
            _ => {
                v.a = read_gr(cpu, r);
                v.x = instr.imm(27, 12) as u32;
                v.b = read_gr(cpu, rb);
                v.s = cpu.resolve_segment(0, v.b);
            }
        },

        op::LD | op::LDR | op::LDA | op::ST | op::STA | op::STC => {
            v.a = read_gr(cpu, r);
            v.b = read_gr(cpu, rb);
            v.x = if instr.opt(opt::LS_REG_INDEXED) {
                read_gr(cpu, ra)
            } else {
                instr.imm(27, 12) as u32
            };
            if !matches!(instr.opcode(), op::LDA | op::STA) {
                v.s = cpu.resolve_segment(instr.seg_sel(), v.b);
            }
        }

        op::LDIL => v.b = instr.field(31, 22) << 10,
        op::ADDIL => {
            v.a = read_gr(cpu, r);
            v.b = instr.field(31, 22) << 10;
        }
        op::LDO => {
            v.x = instr.imm(27, 18) as u32;
            v.b = read_gr(cpu, rb);
        }

        op::LSID | op::EXTR => v.b = read_gr(cpu, rb),
        op::DEP => {
            v.a = read_gr(cpu, r);
            v.b = if instr.opt(opt::DEP_I) {
                bits::get_bit_field_signed(instr, 31, 4) as u32
            } else {
                read_gr(cpu, rb)
            };
        }
        op::DSR | op::CMR | op::DS | op::DIAG => {
            v.a = read_gr(cpu, ra);
            v.b = read_gr(cpu, rb);
        }
        op::SHLA => {
            v.a = read_gr(cpu, ra);
            v.b = if instr.opt(opt::SHLA_I) {
                bits::get_bit_field_signed(instr, 31, 4) as u32
            } else {
                read_gr(cpu, rb)
            };
        }

        op::MR => {
            if instr.opt(opt::MR_D) {
                v.a = read_gr(cpu, r);
            } else if instr.opt(opt::MR_M) {
                v.b = cpu.regs.cr(instr.field(31, 5) as usize);
            } else {
                v.b = cpu.regs.sr(instr.field(31, 3) as usize);
            }
        }
        op::MST => {
            v.b = if instr.field(pos::MST_MODE.0, pos::MST_MODE.1) == 0 {
                read_gr(cpu, rb)
            } else {
                instr.field(31, 6)
            };
        }

        op::B | op::GATE => v.x = (instr.imm(31, 22) << 2) as u32,
        op::BR | op::BV => v.b = read_gr(cpu, rb),
        op::BE => {
            v.b = read_gr(cpu, rb);
            v.x = (instr.imm(23, 14) << 2) as u32;
            v.s = cpu.regs.sr(instr.field(27, 4) as usize & 0x7);
        }
        op::BVE => {
            v.a = read_gr(cpu, ra);
            v.b = read_gr(cpu, rb);
            v.s = cpu.resolve_segment(0, v.b);
        }
        op::CBR | op::CBRU => {
            v.a = read_gr(cpu, ra);
            v.b = read_gr(cpu, rb);
            v.x = (instr.imm(23, 16) << 2) as u32;
        }

        op::LDPA | op::PTLB | op::PCA => {
            v.x = read_gr(cpu, ra);
            v.b = read_gr(cpu, rb);
            v.s = cpu.resolve_segment(instr.seg_sel(), v.b);
        }
        op::PRB => {
            v.b = read_gr(cpu, rb);
            v.s = cpu.resolve_segment(instr.seg_sel(), v.b);
            v.x = if instr.opt(opt::PRB_I) {
                u32::from(instr.opt(27))
            } else {
                read_gr(cpu, ra)
            };
        }
        op::ITLB => {
            v.a = read_gr(cpu, r);
            v.x = read_gr(cpu, (r + 1) & 0xF);
            v.b = read_gr(cpu, rb);
            v.s = cpu.regs.sr(instr.field(27, 4) as usize & 0x7);
        }

        _ => {}
    }
    v
}

/// Runs the fetch-decode stage for one cycle.
pub(crate) fn process(cpu: &mut Cpu) {
    // A redirect from a later stage squashes whatever this cycle would
    // have fetched.
    if let Some((seg, ofs)) = cpu.fetch_redirect.take() {
        cpu.fd.psw0.load(seg);
        cpu.fd.psw1.load(ofs);
        cpu.ma.load_bubble();
        cpu.fd.stalled = false;
        cpu.icache.abort_op();
        return;
    }

    // A stalled memory-access stage freezes the whole front of the pipe;
    // its own bundle holds, so nothing may be written into it.
    if cpu.ma_stalled_now {
        cpu.fd.hold();
        cpu.fd.stalled = true;
        return;
    }

    let seg = cpu.fd.psw0.get();
    let ofs = cpu.fd.psw1.get();

    let xl = match cpu.translate(true, seg, ofs, Access::Fetch) {
        Ok(x) => x,
        Err(trap) => {
            cpu.raise_trap(1, trap, seg, ofs, [seg, ofs, 0]);
            cpu.ma.load_bubble();
            cpu.fd.hold();
            cpu.fd.stalled = false;
            return;
        }
    };

    let Some(instr) = cpu.mem_read(true, seg, ofs, xl.paddr, 4, xl.uncached) else {
        cpu.fd.hold();
        cpu.fd.stalled = true;
        cpu.ma.load_bubble();
        return;
    };

    if is_privileged(instr) && cpu.user_mode() {
        cpu.raise_trap(1, crate::common::error::TrapId::PrivilegeViolation, seg, ofs, [
            instr, 0, 0,
        ]);
        cpu.ma.load_bubble();
        cpu.fd.hold();
        cpu.fd.stalled = false;
        return;
    }

    // Hazards: sources against the writebacks of the instruction in
    // memory-access, against the secondary (base-modify) writeback of the
    // instruction in execute, and against system-state writers anywhere
    // downwind. The primary execute result arrives through the forwarding
    // slot and needs no stall.
    let (ma_t1, ma_t2) = if cpu.ma.is_valid() {
        writeback_targets(cpu.ma.instr.get())
    } else {
        (None, None)
    };
    let ex_t2 = if cpu.ex.is_valid() {
        writeback_targets(cpu.ex.instr.get()).1
    } else {
        None
    };
    let sys_hazard = (cpu.ma.is_valid() && is_system_writer(cpu.ma.instr.get()))
        || (cpu.ex.is_valid() && is_system_writer(cpu.ex.instr.get()));
    let raw_hazard = source_regs(instr)
        .iter()
        .flatten()
        .any(|s| Some(*s) == ma_t1 || Some(*s) == ma_t2 || Some(*s) == ex_t2);

    if sys_hazard || raw_hazard {
        trace!(seg, ofs, instr, "fd hazard stall");
        cpu.fd.hold();
        cpu.fd.stalled = true;
        cpu.ma.load_bubble();
        return;
    }

    cpu.fd.stalled = false;
    cpu.fd_stats.instr_fetched += 1;
    match instr.opcode() {
        op::LD | op::LDR | op::LDA => cpu.fd_stats.instr_load += 1,
        op::ADD..=op::CMPU if instr.mode() >= 2 => {
            cpu.fd_stats.instr_load += 1;
            cpu.fd_stats.instr_load_via_op_mode += 1;
        }
        op::ST | op::STA | op::STC => cpu.fd_stats.instr_stor += 1,
        _ => {}
    }

    let v = prime_operands(cpu, instr);
    trace!(seg, ofs, instr, a = v.a, b = v.b, x = v.x, "fd issue");

    cpu.ma.valid.load(1);
    cpu.ma.psw0.load(seg);
    cpu.ma.psw1.load(ofs);
    cpu.ma.instr.load(instr);
    cpu.ma.val_a.load(v.a);
    cpu.ma.val_b.load(v.b);
    cpu.ma.val_x.load(v.x);
    cpu.ma.val_s.load(v.s);

    cpu.fd.psw0.load(seg);
    cpu.fd.psw1.load(ofs.wrapping_add(4));
}
