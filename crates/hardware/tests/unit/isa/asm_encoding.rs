//! Assembler encoding tests.
//!
//! Exact words for a few anchor cases, field-level checks for the rest,
//! and the number grammar (hex, octal, qualified constants, expressions).

use pretty_assertions::assert_eq;
use rstest::rstest;
use segsim_core::isa::fields::InstrFields;
use segsim_core::isa::assemble_line;

fn asm(line: &str) -> u32 {
    assemble_line(line).unwrap_or_else(|e| panic!("{}", e.render(line)))
}

// ══════════════════════════════════════════════════════════
// 1. Anchor words
// ══════════════════════════════════════════════════════════

#[rstest]
#[case("NOP", 0x0000_0000)]
#[case("BRK 0,0", 0x0000_0000)]
#[case("ADD R1,R2,R3", 0x4046_0023)]
#[case("LDW R5,0(R0)", 0xC142_0000)]
#[case("LDIL R7,0x3FFFFF", 0x05FF_FFFF)]
#[case("B -1", 0x803F_FFFF)]
#[case("RFI", 0xFC00_0000)]
fn anchor_encodings(#[case] line: &str, #[case] expected: u32) {
    assert_eq!(asm(line), expected, "{line}");
}

// ══════════════════════════════════════════════════════════
// 2. Field placement
// ══════════════════════════════════════════════════════════

#[test]
fn mode_type_register_form() {
    let w = asm("SUB R4,R5,R6");
    assert_eq!(w.opcode(), 0x12);
    assert_eq!(w.reg_r(), 4);
    assert_eq!(w.reg_a(), 5);
    assert_eq!(w.reg_b(), 6);
    assert_eq!(w.mode(), 1);
}

#[test]
fn two_operand_form_duplicates_the_target() {
    // "ADD R1,R2" is R1 = R1 + R2.
    let w = asm("ADD R1,R2");
    assert_eq!(w.reg_r(), 1);
    assert_eq!(w.reg_a(), 1);
    assert_eq!(w.reg_b(), 2);
    assert_eq!(w.mode(), 1);
}

#[test]
fn mode_three_keeps_the_width_field() {
    let w = asm("ADDH R1,8(R2)");
    assert_eq!(w.mode(), 3);
    assert_eq!(w.data_width(), 1);
    assert_eq!(w.imm(27, 12), 8);
    assert_eq!(w.reg_b(), 2);
}

#[test]
fn load_store_operand_fields() {
    let w = asm("LDW R3,-8(R10)");
    assert_eq!(w.reg_r(), 3);
    assert_eq!(w.reg_b(), 10);
    assert_eq!(w.imm(27, 12), -8);
    assert!(!w.opt(10), "immediate mode clears the index flag");

    let w = asm("STW R4(S2,R11),R9");
    assert_eq!(w.reg_r(), 9);
    assert_eq!(w.reg_a(), 4);
    assert_eq!(w.reg_b(), 11);
    assert_eq!(w.seg_sel(), 2);
    assert!(w.opt(10), "register-indexed mode sets the flag");
}

#[test]
fn option_bits_land_where_the_executor_reads_them() {
    assert!(asm("ADD.L R1,R2,R3").opt(10));
    assert!(asm("ADD.O R1,R2,R3").opt(11));
    assert!(asm("AND.N R1,R2,R3").opt(10));
    assert!(asm("AND.C R1,R2,R3").opt(11));
    assert!(asm("XOR.N R1,R2,R3").opt(10));
    assert!(asm("EXTR.S R1,R2,3,4").opt(10));
    assert!(asm("EXTR.A R1,R2,4").opt(11));
    assert!(asm("DEP.Z R1,R2,3,4").opt(10));
    assert!(asm("DEP.I R1,3,3,4").opt(12));
    assert!(asm("SHLA.I R1,R2,3,1").opt(10));
    assert!(asm("LDW.M R1,4(R2)").opt(11));
    assert!(asm("PRB.W R1,(R2),R3").opt(10));
    assert!(asm("PCA.F R1(R2)").opt(14));
}

#[rstest]
#[case("CMP.EQ R1,R2,R3", 0)]
#[case("CMP.LT R1,R2,R3", 1)]
#[case("CMP.NE R1,R2,R3", 2)]
#[case("CMP.LE R1,R2,R3", 3)]
fn cmp_condition_field(#[case] line: &str, #[case] code: u32) {
    assert_eq!(asm(line).field(11, 2), code);
}

#[rstest]
#[case("CMR.EQ R1,R2,R3", 0)]
#[case("CMR.GT R1,R2,R3", 2)]
#[case("CMR.EV R1,R2,R3", 3)]
#[case("CMR.OD R1,R2,R3", 7)]
fn cmr_condition_field(#[case] line: &str, #[case] code: u32) {
    assert_eq!(asm(line).field(13, 4), code);
}

#[test]
fn cbr_condition_sits_apart_from_the_target_field() {
    let w = asm("CBR.LE R1,R2,-4");
    assert_eq!(w.field(7, 2), 3);
    assert_eq!(w.reg_a(), 1);
    assert_eq!(w.reg_b(), 2);
    assert_eq!(w.imm(23, 16), -4);
}

#[test]
fn mr_register_combinations() {
    let w = asm("MR R3,S2");
    assert!(!w.opt(10));
    assert!(!w.opt(11));
    assert_eq!(w.field(31, 3), 2);

    let w = asm("MR C9,R3");
    assert!(w.opt(10));
    assert!(w.opt(11));
    assert_eq!(w.field(31, 5), 9);

    // General-to-general moves assemble as OR.
    let w = asm("MR R1,R2");
    assert_eq!(w.opcode(), 0x15);
    assert_eq!(w.reg_r(), 1);
    assert_eq!(w.reg_b(), 2);
}

#[test]
fn mst_modes() {
    assert_eq!(asm("MST R1,R2").field(11, 2), 0);
    assert_eq!(asm("MST.S R1,5").field(11, 2), 1);
    assert_eq!(asm("MST.C R1,5").field(11, 2), 2);
    assert_eq!(asm("MST.S R1,5").field(31, 6), 5);
}

#[test]
fn brk_code_fields() {
    let w = asm("BRK 3,0x1234");
    assert_eq!(w.field(9, 4), 3);
    assert_eq!(w.field(31, 16), 0x1234);
}

// ══════════════════════════════════════════════════════════
// 3. Number grammar
// ══════════════════════════════════════════════════════════

#[test]
fn radix_prefixes() {
    assert_eq!(asm("LDIL R1,0x20").field(31, 22), 0x20);
    assert_eq!(asm("LDIL R1,0o20").field(31, 22), 16);
    assert_eq!(asm("LDIL R1,32").field(31, 22), 32);
}

#[test]
fn qualified_constants_mask() {
    assert_eq!(asm("LDIL R1,L%0x12345").field(31, 22), 0x12000);
    assert_eq!(asm("LDIL R1,R%0x12345").field(31, 22), 0x345);
}

#[test]
fn expressions_fold_with_precedence() {
    assert_eq!(asm("LDIL R1,2+3*4").field(31, 22), 14);
    assert_eq!(asm("LDIL R1,(2+3)*4").field(31, 22), 20);
    assert_eq!(asm("LDIL R1,0xF0|0x0F").field(31, 22), 0xFF);
    assert_eq!(asm("LDO R1,10-14(R2)").imm(27, 18), -4);
}

#[test]
fn case_is_insensitive() {
    assert_eq!(asm("add r1,r2,r3"), asm("ADD R1,R2,R3"));
    assert_eq!(asm("ldw r5,0(r0)"), asm("LDW R5,0(R0)"));
}

#[test]
fn ld_and_ldw_are_the_same_instruction() {
    assert_eq!(asm("LD R1,0(R2)"), asm("LDW R1,0(R2)"));
    assert_eq!(asm("ST 0(R2),R1"), asm("STW 0(R2),R1"));
    assert_eq!(asm("ADDW R1,R2,R3"), asm("ADD R1,R2,R3"));
}
