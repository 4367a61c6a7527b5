//! The three-stage in-order pipeline.
//!
//! Stage order within one process phase is execute, memory-access,
//! fetch-decode; every stage reads latch outputs and writes latch inputs,
//! so the ordering only matters for the combinational signals (forwarding
//! slot, redirects, stall propagation) that deliberately flow backwards
//! through the pipe in the same cycle.
//!
//! This module also holds the decode predicates shared by the stages:
//! which general registers an instruction reads in fetch-decode, which it
//! writes back in execute, and whether it touches system state.

/// The execute stage.
pub mod execute;
/// The fetch-decode stage.
pub mod fetch_decode;
/// Pipeline latch bundles.
pub mod latches;
/// The memory-access stage.
pub mod memory_access;

use crate::isa::fields::{InstrFields, opt};
use crate::isa::opcodes::op;

/// General registers written back at execute: the primary result register
/// and, for base-modify loads and stores, the updated base register.
pub(crate) fn writeback_targets(instr: u32) -> (Option<usize>, Option<usize>) {
    let r = instr.reg_r();
    let primary = match instr.opcode() {
        op::ADD..=op::CMPU => Some(r),
        op::LD | op::LDR | op::LDA => Some(r),
        op::LDIL | op::LDO => Some(r),
        op::ADDIL => Some(1),
        op::LSID | op::EXTR | op::DEP | op::DSR | op::SHLA | op::CMR | op::DS => Some(r),
        op::MR if !instr.opt(opt::MR_D) => Some(r),
        op::MST | op::LDPA | op::PRB | op::DIAG => Some(r),
        op::B | op::GATE | op::BR | op::BV | op::BE | op::BVE if r != 0 => Some(r),
        _ => None,
    };
    let secondary = match instr.opcode() {
        op::LD | op::ST | op::LDA | op::STA if instr.opt(opt::LS_MODIFY) => Some(instr.reg_b()),
        _ => None,
    };
    (primary, secondary)
}

/// General registers read during fetch-decode operand priming.
pub(crate) fn source_regs(instr: u32) -> [Option<usize>; 3] {
    let r = instr.reg_r();
    let a = instr.reg_a();
    let b = instr.reg_b();
    match instr.opcode() {
        op::ADD..=op::CMPU => match instr.mode() {
            0 => [Some(r), None, None],
            1 => [Some(a), Some(b), None],
            2 => [Some(r), Some(a), Some(b)],
            _ => [Some(r), Some(b), None],
        },
        op::LD | op::LDR | op::LDA => {
            if instr.opt(opt::LS_REG_INDEXED) {
                [Some(a), Some(b), None]
            } else {
                [Some(b), None, None]
            }
        }
        op::ST | op::STA | op::STC => {
            if instr.opt(opt::LS_REG_INDEXED) {
                [Some(r), Some(a), Some(b)]
            } else {
                [Some(r), Some(b), None]
            }
        }
        op::ADDIL => [Some(r), None, None],
        op::LDO | op::LSID | op::EXTR | op::BR | op::BV | op::BE => [Some(b), None, None],
        op::DEP => {
            if instr.opt(opt::DEP_I) {
                [Some(r), None, None]
            } else {
                [Some(r), Some(b), None]
            }
        }
        op::SHLA => {
            if instr.opt(opt::SHLA_I) {
                [Some(a), None, None]
            } else {
                [Some(a), Some(b), None]
            }
        }
        op::DSR | op::CMR | op::DS | op::CBR | op::CBRU | op::BVE | op::DIAG => {
            [Some(a), Some(b), None]
        }
        op::MR if instr.opt(opt::MR_D) => [Some(r), None, None],
        op::MST if instr.field(11, 2) == 0 => [Some(b), None, None],
        op::LDPA | op::PTLB | op::PCA => [Some(a), Some(b), None],
        op::PRB => {
            if instr.opt(opt::PRB_I) {
                [Some(b), None, None]
            } else {
                [Some(a), Some(b), None]
            }
        }
        op::ITLB => [Some(r), Some((r + 1) & 0xF), Some(b)],
        _ => [None, None, None],
    }
}

/// True for instructions that may only execute in privileged mode.
pub(crate) fn is_privileged(instr: u32) -> bool {
    matches!(
        instr.opcode(),
        op::RFI | op::ITLB | op::PTLB | op::LDPA | op::MST | op::LDA | op::STA
    )
}

/// True for instructions that alter system state a following instruction
/// could observe through a segment register, a control register, the status
/// word, or a TLB entry. Fetch-decode stalls behind these.
pub(crate) fn is_system_writer(instr: u32) -> bool {
    match instr.opcode() {
        op::MR => instr.opt(opt::MR_D),
        op::MST | op::RFI | op::ITLB | op::PTLB | op::GATE => true,
        _ => false,
    }
}
