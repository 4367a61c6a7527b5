//! Instruction disassembler.
//!
//! Formats a 32-bit instruction word into the canonical text the one-line
//! assembler accepts, such that reassembling the output reproduces the word
//! bit for bit. Unknown opcodes format as the raw word plus a marker.

use crate::common::bits;
use crate::isa::fields::{InstrFields, opt, pos};
use crate::isa::opcodes::{op, width};

/// Numeric formatting radix for immediate values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Radix {
    /// Hexadecimal with a `0x` prefix.
    #[default]
    Hex,
    /// Plain decimal.
    Dec,
}

fn fmt_u(v: u32, radix: Radix) -> String {
    match radix {
        Radix::Hex => format!("0x{v:X}"),
        Radix::Dec => v.to_string(),
    }
}

fn fmt_i(v: i32, radix: Radix) -> String {
    match radix {
        Radix::Hex if v < 0 => format!("-0x{:X}", v.unsigned_abs()),
        Radix::Hex => format!("0x{v:X}"),
        Radix::Dec => v.to_string(),
    }
}

/// The two-bit CMP/CBR condition names, indexed by field value.
const COND2: [&str; 4] = ["EQ", "LT", "NE", "LE"];
/// The four-bit CMR condition names, indexed by field value.
const COND4: [&str; 8] = ["EQ", "LT", "GT", "EV", "NE", "LE", "GE", "OD"];

/// Width suffix of the load/store and mode-type mnemonics.
fn width_suffix(w: u32) -> &'static str {
    match w {
        width::BYTE => "B",
        width::HALF => "H",
        _ => "W",
    }
}

/// The memory operand of the load/store family:
/// `ofs(base)`, `Rx(base)`, with an optional `Sn,` segment prefix.
fn ls_operand(instr: u32, radix: Radix) -> String {
    let base = instr.reg_b();
    let seg = instr.seg_sel();
    let inner = if (1..=3).contains(&seg) {
        format!("S{seg},R{base}")
    } else {
        format!("R{base}")
    };
    if instr.opt(opt::LS_REG_INDEXED) {
        format!("R{}({inner})", instr.reg_a())
    } else {
        format!("{}({inner})", fmt_i(instr.imm(27, 12), radix))
    }
}

fn opt_str(chars: &[(bool, char)]) -> String {
    let set: String = chars.iter().filter(|(on, _)| *on).map(|(_, c)| c).collect();
    if set.is_empty() {
        String::new()
    } else {
        format!(".{set}")
    }
}

fn disasm_mode_type(mn: &str, instr: u32, opts: &str, radix: Radix) -> String {
    let r = instr.reg_r();
    match instr.mode() {
        0 => format!("{mn}{opts} R{r},{}", fmt_i(instr.imm(31, 18), radix)),
        1 => format!("{mn}{opts} R{r},R{},R{}", instr.reg_a(), instr.reg_b()),
        2 => format!(
            "{mn}{}{opts} R{r},R{}(R{})",
            width_suffix(instr.data_width()),
            instr.reg_a(),
            instr.reg_b()
        ),
        _ => format!(
            "{mn}{}{opts} R{r},{}(R{})",
            width_suffix(instr.data_width()),
            fmt_i(instr.imm(27, 12), radix),
            instr.reg_b()
        ),
    }
}

/// Disassembles one instruction word into canonical text.
pub fn disassemble_word(instr: u32, radix: Radix) -> String {
    let r = instr.reg_r();
    let a = instr.reg_a();
    let b = instr.reg_b();

    match instr.opcode() {
        op::BRK => {
            let c1 = bits::get_imm_val_u(instr, 9, 4);
            let c2 = bits::get_imm_val_u(instr, 31, 16);
            format!("BRK {},{}", fmt_u(c1, radix), fmt_u(c2, radix))
        }

        op::LDIL | op::ADDIL => {
            let mn = if instr.opcode() == op::LDIL {
                "LDIL"
            } else {
                "ADDIL"
            };
            format!("{mn} R{r},{}", fmt_u(instr.field(31, 22), radix))
        }
        op::LDO => format!("LDO R{r},{}(R{b})", fmt_i(instr.imm(27, 18), radix)),

        op::LSID => format!("LSID R{r},R{b}"),

        op::EXTR => {
            let opts = opt_str(&[(instr.opt(opt::EXTR_S), 'S'), (instr.opt(opt::USE_SAR), 'A')]);
            let len = fmt_u(instr.field(pos::FIELD_LEN.0, pos::FIELD_LEN.1), radix);
            if instr.opt(opt::USE_SAR) {
                format!("EXTR{opts} R{r},R{b},{len}")
            } else {
                let p = fmt_u(instr.field(pos::FIELD_POS.0, pos::FIELD_POS.1), radix);
                format!("EXTR{opts} R{r},R{b},{p},{len}")
            }
        }
        op::DEP => {
            let opts = opt_str(&[
                (instr.opt(opt::DEP_Z), 'Z'),
                (instr.opt(opt::USE_SAR), 'A'),
                (instr.opt(opt::DEP_I), 'I'),
            ]);
            let src = if instr.opt(opt::DEP_I) {
                fmt_i(bits::get_bit_field_signed(instr, 31, 4), radix)
            } else {
                format!("R{b}")
            };
            let len = fmt_u(instr.field(pos::FIELD_LEN.0, pos::FIELD_LEN.1), radix);
            if instr.opt(opt::USE_SAR) {
                format!("DEP{opts} R{r},{src},{len}")
            } else {
                let p = fmt_u(instr.field(pos::FIELD_POS.0, pos::FIELD_POS.1), radix);
                format!("DEP{opts} R{r},{src},{p},{len}")
            }
        }
        op::DSR => {
            if instr.opt(opt::USE_SAR) {
                format!("DSR.A R{r},R{a},R{b}")
            } else {
                let amt = fmt_u(instr.field(pos::FIELD_LEN.0, pos::FIELD_LEN.1), radix);
                format!("DSR R{r},R{a},R{b},{amt}")
            }
        }
        op::SHLA => {
            let opts = opt_str(&[
                (instr.opt(opt::SHLA_I), 'I'),
                (instr.opt(opt::SHLA_L), 'L'),
                (instr.opt(opt::SHLA_O), 'O'),
            ]);
            let src = if instr.opt(opt::SHLA_I) {
                fmt_i(bits::get_bit_field_signed(instr, 31, 4), radix)
            } else {
                format!("R{b}")
            };
            let amt = fmt_u(instr.field(pos::SHIFT_AMT.0, pos::SHIFT_AMT.1), radix);
            format!("SHLA{opts} R{r},R{a},{src},{amt}")
        }
        op::CMR => {
            let cond = COND4[instr.field(pos::CMR_COND.0, pos::CMR_COND.1) as usize];
            format!("CMR.{cond} R{r},R{a},R{b}")
        }
        op::DS => format!("DS R{r},R{a},R{b}"),

        op::MR => {
            let to_sys = instr.opt(opt::MR_D);
            let is_ctrl = instr.opt(opt::MR_M);
            match (to_sys, is_ctrl) {
                (false, false) => format!("MR R{r},S{}", instr.field(31, 3)),
                (false, true) => format!("MR R{r},C{}", instr.field(31, 5)),
                (true, false) => format!("MR S{},R{r}", instr.field(31, 3)),
                (true, true) => format!("MR C{},R{r}", instr.field(31, 5)),
            }
        }
        op::MST => match instr.field(pos::MST_MODE.0, pos::MST_MODE.1) {
            1 => format!("MST.S R{r},{}", fmt_u(instr.field(31, 6), radix)),
            2 => format!("MST.C R{r},{}", fmt_u(instr.field(31, 6), radix)),
            _ => format!("MST R{r},R{b}"),
        },

        // ── Mode-type ALU family ──────────────────────────────
        op::ADD | op::ADC | op::SUB | op::SBC => {
            let mn = match instr.opcode() {
                op::ADD => "ADD",
                op::ADC => "ADC",
                op::SUB => "SUB",
                _ => "SBC",
            };
            let opts = opt_str(&[(instr.opt(opt::ALU_L), 'L'), (instr.opt(opt::ALU_O), 'O')]);
            disasm_mode_type(mn, instr, &opts, radix)
        }
        op::AND | op::OR => {
            let mn = if instr.opcode() == op::AND { "AND" } else { "OR" };
            let opts = opt_str(&[(instr.opt(opt::LOG_N), 'N'), (instr.opt(opt::LOG_C), 'C')]);
            disasm_mode_type(mn, instr, &opts, radix)
        }
        op::XOR => {
            let opts = opt_str(&[(instr.opt(opt::LOG_N), 'N')]);
            disasm_mode_type("XOR", instr, &opts, radix)
        }
        op::CMP | op::CMPU => {
            let mn = if instr.opcode() == op::CMP {
                "CMP"
            } else {
                "CMPU"
            };
            let cond = COND2[instr.field(pos::CMP_COND.0, pos::CMP_COND.1) as usize];
            disasm_mode_type(mn, instr, &format!(".{cond}"), radix)
        }

        // ── Branches ──────────────────────────────────────────
        op::B | op::GATE => {
            let mn = if instr.opcode() == op::B { "B" } else { "GATE" };
            let ofs = fmt_i(instr.imm(31, 22), radix);
            if r != 0 {
                format!("{mn} {ofs},R{r}")
            } else {
                format!("{mn} {ofs}")
            }
        }
        op::BR | op::BV => {
            let mn = if instr.opcode() == op::BR { "BR" } else { "BV" };
            if r != 0 {
                format!("{mn} (R{b}),R{r}")
            } else {
                format!("{mn} (R{b})")
            }
        }
        op::BE => {
            let ofs = fmt_i(instr.imm(23, 14), radix);
            let seg = instr.field(27, 4);
            if r != 0 {
                format!("BE {ofs}(S{seg},R{b}),R{r}")
            } else {
                format!("BE {ofs}(S{seg},R{b})")
            }
        }
        op::BVE => {
            if r != 0 {
                format!("BVE R{a}(R{b}),R{r}")
            } else {
                format!("BVE R{a}(R{b})")
            }
        }
        op::CBR | op::CBRU => {
            let mn = if instr.opcode() == op::CBR {
                "CBR"
            } else {
                "CBRU"
            };
            let cond = COND2[instr.field(pos::CBR_COND.0, pos::CBR_COND.1) as usize];
            let ofs = fmt_i(instr.imm(23, 16), radix);
            format!("{mn}.{cond} R{a},R{b},{ofs}")
        }

        // ── Loads and stores ──────────────────────────────────
        op::LD | op::LDR | op::LDA => {
            let mn = match instr.opcode() {
                op::LD => format!("LD{}", width_suffix(instr.data_width())),
                op::LDR => "LDR".to_string(),
                _ => "LDA".to_string(),
            };
            let m = opt_str(&[(instr.opt(opt::LS_MODIFY), 'M')]);
            format!("{mn}{m} R{r},{}", ls_operand(instr, radix))
        }
        op::ST | op::STC | op::STA => {
            let mn = match instr.opcode() {
                op::ST => format!("ST{}", width_suffix(instr.data_width())),
                op::STC => "STC".to_string(),
                _ => "STA".to_string(),
            };
            let m = opt_str(&[(instr.opt(opt::LS_MODIFY), 'M')]);
            format!("{mn}{m} {},R{r}", ls_operand(instr, radix))
        }

        // ── System ────────────────────────────────────────────
        op::LDPA => {
            let seg = instr.seg_sel();
            let inner = if (1..=3).contains(&seg) {
                format!("S{seg},R{b}")
            } else {
                format!("R{b}")
            };
            format!("LDPA R{r},R{a}({inner})")
        }
        op::PRB => {
            let opts = opt_str(&[(instr.opt(opt::PRB_W), 'W'), (instr.opt(opt::PRB_I), 'I')]);
            let seg = instr.seg_sel();
            let inner = if (1..=3).contains(&seg) {
                format!("S{seg},R{b}")
            } else {
                format!("R{b}")
            };
            let arg = if instr.opt(opt::PRB_I) {
                fmt_u(u32::from(instr.opt(27)), radix)
            } else {
                format!("R{a}")
            };
            format!("PRB{opts} R{r},({inner}),{arg}")
        }
        op::ITLB => {
            let opts = opt_str(&[(instr.opt(opt::ITLB_T), 'T')]);
            format!("ITLB{opts} R{r},(S{},R{b})", instr.field(27, 4))
        }
        op::PTLB | op::PCA => {
            let mn = if instr.opcode() == op::PTLB {
                "PTLB"
            } else {
                "PCA"
            };
            let mut flags = vec![
                (instr.opt(opt::TLB_T), 'T'),
                (instr.opt(opt::TLB_M), 'M'),
            ];
            if instr.opcode() == op::PCA {
                flags.push((instr.opt(opt::PCA_F), 'F'));
            }
            let opts = opt_str(&flags);
            let seg = instr.seg_sel();
            let inner = if (1..=3).contains(&seg) {
                format!("S{seg},R{b}")
            } else {
                format!("R{b}")
            };
            format!("{mn}{opts} R{a}({inner})")
        }
        op::DIAG => {
            let info = fmt_u(instr.field(pos::DIAG_INFO.0, pos::DIAG_INFO.1), radix);
            format!("DIAG R{r},R{a},R{b},{info}")
        }
        op::RFI => "RFI".to_string(),

        _ => format!("0x{instr:08X} <unknown>"),
    }
}
