//! Disassembler round-trip tests.
//!
//! For every word the assembler can produce, reassembling the disassembly
//! must reproduce the word bit for bit. The template table anchors the
//! sweep; property tests cover the immediate ranges.

use proptest::prelude::*;
use segsim_core::isa::disasm::{Radix, disassemble_word};
use segsim_core::isa::opcodes::TEMPLATE_TABLE;
use segsim_core::isa::assemble_line;

fn round_trip(word: u32) {
    for radix in [Radix::Hex, Radix::Dec] {
        let text = disassemble_word(word, radix);
        let back = assemble_line(&text)
            .unwrap_or_else(|e| panic!("0x{word:08X} -> {text:?}: {}", e.render(&text)));
        assert_eq!(back, word, "0x{word:08X} -> {text:?} -> 0x{back:08X}");
    }
}

fn asm(line: &str) -> u32 {
    assemble_line(line).unwrap_or_else(|e| panic!("{}", e.render(line)))
}

// ══════════════════════════════════════════════════════════
// 1. The frozen template table
// ══════════════════════════════════════════════════════════

#[test]
fn every_template_round_trips() {
    for (mn, word) in TEMPLATE_TABLE {
        let text = disassemble_word(*word, Radix::Hex);
        let back = assemble_line(&text)
            .unwrap_or_else(|e| panic!("{mn}: {text:?}: {}", e.render(&text)));
        assert_eq!(back, *word, "{mn}: {text:?}");
    }
}

// ══════════════════════════════════════════════════════════
// 2. Assembled forms
// ══════════════════════════════════════════════════════════

#[test]
fn representative_lines_round_trip() {
    for line in [
        "ADD R1,R2,R3",
        "ADD.LO R1,R2,R3",
        "ADD R1,-37",
        "ADDB R1,R2(R3)",
        "SUBH R7,100(R8)",
        "AND.NC R1,R2,R3",
        "CMP.LE R3,R4,R5",
        "CMPU.NE R3,R4,R5",
        "LDW R5,0(R0)",
        "LDW.M R5,-4(R9)",
        "LDB R1,R2(S3,R4)",
        "LDR R1,8(R2)",
        "LDA R1,0x40(R2)",
        "STW 12(R2),R1",
        "STB R3(R4),R5",
        "STA 0(R2),R1",
        "STC 4(R2),R1",
        "EXTR.S R1,R2,5,8",
        "EXTR.A R1,R2,8",
        "DEP.Z R1,R2,5,8",
        "DEP.ZI R1,-1,31,4",
        "DSR R1,R2,R3,12",
        "DSR.A R1,R2,R3",
        "SHLA R1,R2,R3,3",
        "SHLA.I R1,R2,-2,1",
        "CMR.OD R1,R2,R3",
        "DS R1,R2,R3",
        "LSID R1,R2",
        "LDIL R1,0x1000",
        "ADDIL R1,0x1000",
        "LDO R1,-100(R2)",
        "B 100",
        "B -100,R5",
        "GATE 8",
        "BR (R5)",
        "BV (R5),R2",
        "BE 16(S3,R4)",
        "BE -16(S3,R4),R2",
        "BVE R1(R2)",
        "CBR.LT R1,R2,-8",
        "CBRU.LE R1,R2,8",
        "MR R1,S3",
        "MR R1,C20",
        "MR S3,R1",
        "MR C20,R1",
        "MST R1,R2",
        "MST.S R1,5",
        "MST.C R1,9",
        "LDPA R1,R2(S1,R3)",
        "PRB.W R1,(R2),R3",
        "PRB.I R1,(S2,R3),1",
        "ITLB R4,(S1,R2)",
        "ITLB.T R4,(S1,R2)",
        "PTLB R1(S2,R3)",
        "PCA.TF R1(R2)",
        "DIAG R1,R2,R3,7",
        "BRK 3,0x1234",
    ] {
        round_trip(asm(line));
    }
}

#[test]
fn unknown_opcodes_are_marked() {
    // Opcode 0x0D is unassigned.
    let text = disassemble_word(0x3400_0000, Radix::Hex);
    assert!(text.contains("unknown"), "{text}");
}

#[test]
fn radix_changes_the_number_format_only() {
    let w = asm("LDW R5,100(R2)");
    let hex = disassemble_word(w, Radix::Hex);
    let dec = disassemble_word(w, Radix::Dec);
    assert!(hex.contains("0x64"), "{hex}");
    assert!(dec.contains("100"), "{dec}");
    assert_eq!(asm(&hex), asm(&dec));
}

// ══════════════════════════════════════════════════════════
// 3. Immediate sweeps
// ══════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn load_offsets_round_trip(imm in -2048i32..=2047, r in 0usize..16, b in 0usize..16) {
        round_trip(asm(&format!("LDW R{r},{imm}(R{b})")));
    }

    #[test]
    fn mode_type_immediates_round_trip(imm in -131072i32..=131071) {
        round_trip(asm(&format!("ADD R3,{imm}")));
    }

    #[test]
    fn branch_offsets_round_trip(imm in -2097152i32..=2097151) {
        round_trip(asm(&format!("B {imm}")));
    }

    #[test]
    fn ldil_values_round_trip(v in 0u32..(1 << 22)) {
        round_trip(asm(&format!("LDIL R1,0x{v:X}")));
    }

    #[test]
    fn extract_fields_round_trip(p in 0u32..32, len in 0u32..32) {
        round_trip(asm(&format!("EXTR R1,R2,{p},{len}")));
    }

    #[test]
    fn brk_codes_round_trip(c1 in 0u32..16, c2 in 0u32..65536) {
        round_trip(asm(&format!("BRK {c1},{c2}")));
    }
}
