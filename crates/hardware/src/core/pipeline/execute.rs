//! The execute stage.
//!
//! The back of the pipe: arithmetic, logic, bit-field surgery, condition
//! evaluation, and every writeback to the register file. Results also feed
//! the forwarding slot that the fetch-decode stage consults in the same
//! cycle. Conditional branches resolve here; traps raised here outrank
//! those of the earlier stages.

use tracing::trace;

use crate::common::bits;
use crate::common::error::TrapId;
use crate::core::Cpu;
use crate::core::arch::psw;
use crate::core::arch::regfile::cr;
use crate::isa::fields::{InstrFields, opt, pos};
use crate::isa::opcodes::op;

/// Writes a general register and arms the forwarding slot.
fn write_gr(cpu: &mut Cpu, idx: usize, val: u32) {
    cpu.regs.load_gr(idx, val);
    cpu.forward = Some((idx, val));
}

fn set_carry(cpu: &mut Cpu, carry: bool) {
    let mut st = cpu.st.get();
    bits::set_bit(&mut st, psw::ST_CARRY, carry);
    cpu.st.load(st);
}

/// Two-bit compare conditions of CMP/CMPU and CBR/CBRU.
fn cond2(cond: u32, a: u32, b: u32, signed: bool) -> bool {
    let (sa, sb) = (a as i32, b as i32);
    match cond {
        0 => a == b,
        1 => {
            if signed {
                sa < sb
            } else {
                a < b
            }
        }
        2 => a != b,
        _ => {
            if signed {
                sa <= sb
            } else {
                a <= b
            }
        }
    }
}

/// Four-bit CMR conditions, tested on operand B.
fn cond4(cond: u32, b: u32) -> bool {
    let sb = b as i32;
    match cond {
        0 => b == 0,
        1 => sb < 0,
        2 => sb > 0,
        3 => b & 1 == 0,
        4 => b != 0,
        5 => sb <= 0,
        6 => sb >= 0,
        _ => b & 1 != 0,
    }
}

/// Add/subtract with carry handling; returns `(result, carry, overflow)`.
fn add_sub(a: u32, b: u32, carry_in: u32, subtract: bool) -> (u32, bool, bool) {
    let b_eff = if subtract { !b } else { b };
    let wide = u64::from(a) + u64::from(b_eff) + u64::from(carry_in);
    let res = wide as u32;
    let carry = wide > u64::from(u32::MAX);
    let overflow = ((a ^ res) & (b_eff ^ res)) >> 31 != 0;
    (res, carry, overflow)
}

/// Runs the execute stage for one cycle.
pub(crate) fn process(cpu: &mut Cpu) {
    if !cpu.ex.is_valid() {
        return;
    }

    let instr = cpu.ex.instr.get();
    let a = cpu.ex.val_a.get();
    let b = cpu.ex.val_b.get();
    let x = cpu.ex.val_x.get();
    let psw0 = cpu.ex.psw0.get();
    let psw1 = cpu.ex.psw1.get();
    let r = instr.reg_r();
    let sar = cpu.regs.cr(cr::SHIFT_AMOUNT) & 0x1F;

    let mut retire = true;

    match instr.opcode() {
        // ── Arithmetic ────────────────────────────────────────
        op::ADD | op::ADC | op::SUB | op::SBC => {
            let carry_bit = u32::from(cpu.st.bit(psw::ST_CARRY));
            let (cin, sub) = match instr.opcode() {
                op::ADD => (0, false),
                op::ADC => (carry_bit, false),
                op::SUB => (1, true),
                _ => (carry_bit, true),
            };
            let (res, carry, overflow) = add_sub(a, b, cin, sub);
            if overflow && !instr.opt(opt::ALU_L) && instr.opt(opt::ALU_O) {
                cpu.raise_trap(3, TrapId::Overflow, psw0, psw1, [instr, 0, 0]);
                retire = false;
            } else {
                set_carry(cpu, carry);
                write_gr(cpu, r, res);
            }
        }

        op::AND | op::OR => {
            let operand = if instr.opt(opt::LOG_N) { !b } else { b };
            let mut res = if instr.opcode() == op::AND {
                a & operand
            } else {
                a | operand
            };
            if instr.opt(opt::LOG_C) {
                res = !res;
            }
            write_gr(cpu, r, res);
        }
        op::XOR => {
            let operand = if instr.opt(opt::LOG_N) { !b } else { b };
            write_gr(cpu, r, a ^ operand);
        }

        op::CMP | op::CMPU => {
            let cond = instr.field(pos::CMP_COND.0, pos::CMP_COND.1);
            let signed = instr.opcode() == op::CMP;
            write_gr(cpu, r, u32::from(cond2(cond, a, b, signed)));
        }
        op::CMR => {
            let cond = instr.field(pos::CMR_COND.0, pos::CMR_COND.1);
            if cond4(cond, b) {
                write_gr(cpu, r, a);
            }
        }

        // ── Bit-field operations ──────────────────────────────
        op::EXTR => {
            let p = if instr.opt(opt::USE_SAR) {
                sar
            } else {
                instr.field(pos::FIELD_POS.0, pos::FIELD_POS.1)
            };
            let len = instr.field(pos::FIELD_LEN.0, pos::FIELD_LEN.1);
            let res = if instr.opt(opt::EXTR_S) {
                bits::get_bit_field_signed(b, p, len) as u32
            } else {
                bits::get_bit_field(b, p, len)
            };
            write_gr(cpu, r, res);
        }
        op::DEP => {
            let p = if instr.opt(opt::USE_SAR) {
                sar
            } else {
                instr.field(pos::FIELD_POS.0, pos::FIELD_POS.1)
            };
            let len = instr.field(pos::FIELD_LEN.0, pos::FIELD_LEN.1);
            let mut res = if instr.opt(opt::DEP_Z) { 0 } else { a };
            bits::set_bit_field(&mut res, p, len, b);
            write_gr(cpu, r, res);
        }
        op::DSR => {
            let amt = if instr.opt(opt::USE_SAR) {
                sar
            } else {
                instr.field(pos::FIELD_LEN.0, pos::FIELD_LEN.1)
            };
            let pair = (u64::from(a) << 32) | u64::from(b);
            write_gr(cpu, r, (pair >> amt) as u32);
        }
        op::SHLA => {
            let amt = instr.field(pos::SHIFT_AMT.0, pos::SHIFT_AMT.1);
            let shifted = u64::from(b) << amt;
            let wide = shifted + u64::from(a);
            let res = wide as u32;
            let overflow = wide > u64::from(u32::MAX);
            if overflow && !instr.opt(opt::SHLA_L) && instr.opt(opt::SHLA_O) {
                cpu.raise_trap(3, TrapId::Overflow, psw0, psw1, [instr, 0, 0]);
                retire = false;
            } else {
                write_gr(cpu, r, res);
            }
        }
        op::DS => {
            // One step of a shift-and-subtract divide.
            let carry = u32::from(cpu.st.bit(psw::ST_CARRY));
            let tmp = (a << 1) | carry;
            if tmp >= b {
                set_carry(cpu, true);
                write_gr(cpu, r, tmp.wrapping_sub(b));
            } else {
                set_carry(cpu, false);
                write_gr(cpu, r, tmp);
            }
        }

        // ── Immediates and address formation ──────────────────
        op::LDIL => write_gr(cpu, r, b),
        op::ADDIL => write_gr(cpu, 1, a.wrapping_add(b)),
        op::LDO => write_gr(cpu, r, b.wrapping_add(x)),
        op::LSID => write_gr(cpu, r, cpu.regs.sr(4 + (b >> 30) as usize)),

        // ── Loads and ALU memory operands ─────────────────────
        op::LD | op::LDR | op::LDA => {
            write_gr(cpu, r, b);
            if instr.opt(opt::LS_MODIFY) {
                cpu.regs.load_gr(instr.reg_b(), x);
            }
        }
        op::ST | op::STA | op::STC => {
            if instr.opt(opt::LS_MODIFY) {
                write_gr(cpu, instr.reg_b(), x);
            }
        }

        // ── System ────────────────────────────────────────────
        op::MR => {
            if instr.opt(opt::MR_D) {
                if instr.opt(opt::MR_M) {
                    let idx = instr.field(31, 5) as usize;
                    if !cpu.regs.load_cr(idx, a, cpu.user_mode()) {
                        cpu.raise_trap(3, TrapId::PrivilegeViolation, psw0, psw1, [instr, 0, 0]);
                        retire = false;
                    }
                } else {
                    cpu.regs.load_sr(instr.field(31, 3) as usize, a);
                }
            } else {
                write_gr(cpu, r, b);
            }
        }
        op::MST => {
            let old = cpu.st.get();
            let mode = instr.field(pos::MST_MODE.0, pos::MST_MODE.1);
            let field = bits::get_bit_field(old, 31, psw::MST_BIT_LEN);
            let new_field = match mode {
                1 => field | (b & 0x3F),
                2 => field & !(b & 0x3F),
                _ => b & 0x3F,
            };
            let mut st = old;
            bits::set_bit_field(&mut st, 31, psw::MST_BIT_LEN, new_field);
            cpu.st.load(st);
            write_gr(cpu, r, old);
        }
        op::LDPA | op::PRB => write_gr(cpu, r, b),

        // ── Branches ──────────────────────────────────────────
        op::B | op::BR | op::BV | op::BE | op::BVE => {
            if r != 0 {
                write_gr(cpu, r, x);
            }
        }
        op::GATE => {
            let mut st = cpu.st.get();
            bits::set_bit(&mut st, psw::ST_USER_MODE, false);
            cpu.st.load(st);
            if r != 0 {
                write_gr(cpu, r, x);
            }
        }
        op::CBR | op::CBRU => {
            let cond = instr.field(pos::CBR_COND.0, pos::CBR_COND.1);
            let signed = instr.opcode() == op::CBR;
            if cond2(cond, a, b, signed) {
                let target = psw1.wrapping_add(x);
                cpu.fetch_redirect = Some((psw0, target));
                cpu.squash_younger = true;
                cpu.ex_stats.branches_taken += 1;
                trace!(target, "cbr taken");
            } else {
                cpu.ex_stats.branches_not_taken += 1;
            }
        }

        op::RFI => {
            cpu.st.load(cpu.regs.cr(cr::TRAP_STAT));
            let seg = cpu.regs.cr(cr::TRAP_PSW_0);
            let ofs = cpu.regs.cr(cr::TRAP_PSW_1);
            cpu.fetch_redirect = Some((seg, ofs));
            cpu.squash_younger = true;
            trace!(seg, ofs, "rfi");
        }

        op::DIAG => write_gr(cpu, r, a ^ b),

        op::BRK => {
            let code1 = bits::get_imm_val_u(instr, 9, 4);
            let code2 = bits::get_imm_val_u(instr, 31, 16);
            if code1 != 0 || code2 != 0 {
                cpu.raise_trap(3, TrapId::Break, psw0, psw1, [code1, code2, 0]);
                retire = false;
            }
        }

        _ => {}
    }

    if retire {
        cpu.ex_stats.instr_executed += 1;
        cpu.stats.instr_cntr += 1;
        cpu.retired_this_cycle = true;
        cpu.commit_ia = next_ia(cpu, instr, a, b, x, psw0, psw1);
    }
}

/// The architectural instruction address following a retired instruction;
/// the refetch point for single-step squashes.
fn next_ia(cpu: &Cpu, instr: u32, a: u32, b: u32, x: u32, psw0: u32, psw1: u32) -> (u32, u32) {
    let s = cpu.ex.val_s.get();
    match instr.opcode() {
        op::B | op::GATE => (psw0, psw1.wrapping_add((instr.imm(31, 22) << 2) as u32)),
        op::BR => (psw0, psw1.wrapping_add(b << 2)),
        op::BV => (psw0, b),
        op::BE => (s, b.wrapping_add((instr.imm(23, 14) << 2) as u32)),
        op::BVE => (s, a.wrapping_add(b)),
        op::CBR | op::CBRU => {
            let cond = instr.field(pos::CBR_COND.0, pos::CBR_COND.1);
            if cond2(cond, a, b, instr.opcode() == op::CBR) {
                (psw0, psw1.wrapping_add(x))
            } else {
                (psw0, psw1.wrapping_add(4))
            }
        }
        op::RFI => (cpu.regs.cr(cr::TRAP_PSW_0), cpu.regs.cr(cr::TRAP_PSW_1)),
        _ => (psw0, psw1.wrapping_add(4)),
    }
}
