//! Trap controller tests.
//!
//! TLB miss redirection, privilege enforcement, overflow, break codes,
//! unaligned operands, and the saved-state registers.

use pretty_assertions::assert_eq;
use segsim_core::common::TrapId;
use segsim_core::core::arch::RegClass;
use segsim_core::core::arch::psw;
use segsim_core::core::arch::regfile::cr;

use crate::common::{load_program, sim};

#[test]
fn instruction_tlb_miss_redirects_fetch() {
    let mut s = sim();
    s.cpu.set_status_bit(psw::ST_CODE_XLATE, true);

    s.clock_step(1);

    assert_eq!(s.cpu.fd_stats.traps_raised, 1);
    assert_eq!(
        s.get_reg(RegClass::FdStage, 2),
        TrapId::InstrTlbMiss.vector_offset(),
        "fetch redirected to the miss vector"
    );
    assert_eq!(s.get_reg(RegClass::Ctrl, cr::TRAP_PSW_1 as u8), 0);

    // The handler entry disabled translation, so fetch proceeds without
    // raising a second miss.
    s.clock_step(5);
    assert_eq!(s.cpu.fd_stats.traps_raised, 1);
}

#[test]
fn privileged_register_write_in_user_mode() {
    let mut s = sim();
    load_program(&mut s, &["MR C5,R1"]);
    s.set_reg(RegClass::Gen, 1, 0x77);
    s.cpu.set_status_bit(psw::ST_USER_MODE, true);

    s.clock_step(60);

    assert_eq!(s.cpu.ex_stats.traps_raised, 1, "exactly one violation");
    assert_eq!(s.get_reg(RegClass::Ctrl, 5), 0, "register unchanged");
    assert!(!s.cpu.user_mode(), "handler entered privileged");
}

#[test]
fn privileged_opcode_in_user_mode_traps_at_fetch() {
    let mut s = sim();
    load_program(&mut s, &["RFI"]);
    s.cpu.set_status_bit(psw::ST_USER_MODE, true);

    s.clock_step(60);
    assert_eq!(s.cpu.fd_stats.traps_raised, 1);
    assert_eq!(
        s.get_reg(RegClass::Ctrl, cr::TRAP_PSW_1 as u8),
        0,
        "faulting IA saved"
    );
}

#[test]
fn overflow_trap_suppresses_the_writeback() {
    let mut s = sim();
    load_program(&mut s, &["ADD.O R1,R2,R3"]);
    s.set_reg(RegClass::Gen, 2, 0x7FFF_FFFF);
    s.set_reg(RegClass::Gen, 3, 0x7FFF_FFFF);

    s.clock_step(60);

    assert_eq!(s.cpu.ex_stats.traps_raised, 1);
    assert_eq!(s.get_reg(RegClass::Gen, 1), 0, "no result written");
}

#[test]
fn logical_option_masks_the_overflow() {
    let mut s = sim();
    load_program(&mut s, &["ADD.LO R1,R2,R3"]);
    s.set_reg(RegClass::Gen, 2, 0x7FFF_FFFF);
    s.set_reg(RegClass::Gen, 3, 1);
    s.instr_step(1);
    assert_eq!(s.cpu.ex_stats.traps_raised, 0);
    assert_eq!(s.get_reg(RegClass::Gen, 1), 0x8000_0000);
}

#[test]
fn break_passes_its_codes_to_the_handler() {
    let mut s = sim();
    load_program(&mut s, &["BRK 1,2"]);

    s.clock_step(60);

    assert_eq!(s.cpu.ex_stats.traps_raised, 1);
    assert_eq!(s.get_reg(RegClass::Ctrl, cr::TRAP_PARM_1 as u8), 1);
    assert_eq!(s.get_reg(RegClass::Ctrl, (cr::TRAP_PARM_1 + 1) as u8), 2);
}

#[test]
fn brk_zero_is_a_no_op() {
    let mut s = sim();
    load_program(&mut s, &["NOP"]);
    s.instr_step(1);
    assert_eq!(s.cpu.ex_stats.traps_raised, 0);
    assert_eq!(s.cpu.ex_stats.instr_executed, 1);
}

#[test]
fn unaligned_word_access_traps() {
    let mut s = sim();
    load_program(&mut s, &["LDW R1,0(R2)"]);
    s.set_reg(RegClass::Gen, 2, 0x1002);

    s.clock_step(60);

    assert_eq!(s.cpu.ma_stats.traps_raised, 1);
    assert_eq!(s.get_reg(RegClass::Gen, 1), 0);
}

#[test]
fn trap_saves_the_status_word() {
    let mut s = sim();
    load_program(&mut s, &["BRK 3,9"]);
    s.cpu.set_status_bit(psw::ST_INT_ENABLE, true);

    s.clock_step(60);

    let saved = s.get_reg(RegClass::Ctrl, cr::TRAP_STAT as u8);
    assert_ne!(saved & (1 << 30), 0, "interrupt-enable bit was captured");
    assert_eq!(s.cpu.status(), 0, "handler runs with a clean status");
}

#[test]
fn external_interrupt_respects_the_enable_bit() {
    let mut s = sim();
    load_program(&mut s, &["NOP", "NOP", "NOP"]);
    s.cpu.post_external_interrupt();
    s.clock_step(10);
    assert_eq!(s.cpu.ex_stats.traps_raised, 0, "masked while disabled");

    s.cpu.set_status_bit(psw::ST_INT_ENABLE, true);
    s.cpu.post_external_interrupt();
    s.clock_step(10);
    assert_eq!(s.cpu.ex_stats.traps_raised, 1);
}
