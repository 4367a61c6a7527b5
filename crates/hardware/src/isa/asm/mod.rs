//! The one-line assembler.
//!
//! Assembles a single line (mnemonic, optional `.`-options, operands)
//! into a 32-bit instruction word. The parser is a straightforward
//! recursive descent over an LL(1) grammar; there is no symbol table and no
//! multi-line context. Errors never abort: they come back as an
//! [`AsmError`] carrying a symbolic id and the character index of the
//! offending token, which [`AsmError::render`] turns into the line plus a
//! caret marker.

/// Typed expression parser.
mod expr;
/// The per-line tokenizer.
mod token;

use std::fmt;

use crate::common::bits::{
    fits_signed, fits_unsigned, set_bit, set_bit_field, set_imm_val, set_imm_val_u,
};
use crate::isa::fields::InstrFields;
use crate::isa::opcodes::{op, template, width};

use self::expr::{ExprVal, parse_expr};
use self::token::{Token, Tokenizer};

/// Symbolic assembler error identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AsmErrId {
    /// A comma was required.
    ExpectedComma,
    /// A left parenthesis was required.
    ExpectedLparen,
    /// A right parenthesis was required.
    ExpectedRparen,
    /// A general register was required.
    ExpectedGeneralReg,
    /// A segment register was required.
    ExpectedSegmentReg,
    /// A numeric value was required.
    ExpectedNumeric,
    /// A logical address operand was required.
    ExpectedLogicalAdr,
    /// An extended address operand was required.
    ExpectedExtAdr,
    /// An offset value was required.
    ExpectedAnOffsetVal,
    /// Unknown option character for this instruction.
    InvalidInstrOpt,
    /// Operand form not valid for this instruction.
    InvalidInstrMode,
    /// Operand form conflicts with the instruction options or width.
    InstrModeOptCombo,
    /// Immediate value outside the field range.
    ImmValRange,
    /// Branch offset outside the field range.
    OffsetValRange,
    /// Bit position outside the field range.
    PosValRange,
    /// Bit length outside the field range.
    LenValRange,
    /// This instruction takes no options.
    InstrHasNoOpt,
    /// Unknown opcode mnemonic.
    InvalidOpCode,
    /// Unknown or unassigned synthetic mnemonic.
    InvalidSOpCode,
    /// Trailing tokens after a complete instruction.
    ExtraTokenInStr,
    /// A segment register in the range SR1..SR3 was required.
    ExpectedSr1Sr3,
    /// Operator applied to mismatched expression types.
    ExprTypeMatch,
    /// Malformed expression factor.
    ExprFactor,
    /// The line ended in the middle of an operand.
    UnexpectedEos,
    /// An instruction value was required.
    ExpectedInstrVal,
    /// A string literal was required.
    ExpectedStr,
}

impl fmt::Display for AsmErrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ExpectedComma => "expected-comma",
            Self::ExpectedLparen => "expected-lparen",
            Self::ExpectedRparen => "expected-rparen",
            Self::ExpectedGeneralReg => "expected-general-reg",
            Self::ExpectedSegmentReg => "expected-segment-reg",
            Self::ExpectedNumeric => "expected-numeric",
            Self::ExpectedLogicalAdr => "expected-logical-adr",
            Self::ExpectedExtAdr => "expected-ext-adr",
            Self::ExpectedAnOffsetVal => "expected-an-offset-val",
            Self::InvalidInstrOpt => "invalid-instr-opt",
            Self::InvalidInstrMode => "invalid-instr-mode",
            Self::InstrModeOptCombo => "instr-mode-opt-combo",
            Self::ImmValRange => "imm-val-range",
            Self::OffsetValRange => "offset-val-range",
            Self::PosValRange => "pos-val-range",
            Self::LenValRange => "len-val-range",
            Self::InstrHasNoOpt => "instr-has-no-opt",
            Self::InvalidOpCode => "invalid-op-code",
            Self::InvalidSOpCode => "invalid-s-op-code",
            Self::ExtraTokenInStr => "extra-token-in-str",
            Self::ExpectedSr1Sr3 => "expected-sr1-sr3",
            Self::ExprTypeMatch => "expr-type-match",
            Self::ExprFactor => "expr-factor",
            Self::UnexpectedEos => "unexpected-eos",
            Self::ExpectedInstrVal => "expected-instr-val",
            Self::ExpectedStr => "expected-str",
        };
        f.write_str(name)
    }
}

/// An assembly failure: what went wrong and where.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AsmError {
    /// Symbolic error id.
    pub id: AsmErrId,
    /// Character index of the offending token in the input line.
    pub pos: usize,
}

impl AsmError {
    /// Renders the input line, a caret under the offending token, and the
    /// symbolic id.
    pub fn render(&self, line: &str) -> String {
        format!("{line}\n{:width$}^ {}", "", self.id, width = self.pos)
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at column {}", self.id, self.pos)
    }
}

impl std::error::Error for AsmError {}

/// Instruction families sharing an operand grammar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Family {
    ModeType,
    Load,
    Store,
    Lsid,
    Extr,
    Dep,
    Ds,
    Dsr,
    Shla,
    Cmr,
    LdilAddil,
    Ldo,
    BGate,
    BrBv,
    Be,
    Bve,
    Cbr,
    Mr,
    Mst,
    Ldpa,
    Prb,
    Itlb,
    PtlbPca,
    Diag,
    Rfi,
    Brk,
}

/// Mnemonic table: name, template constant, operand family.
const MNEMONICS: &[(&str, u32, Family)] = &[
    ("LD", template::LD, Family::Load),
    ("LDW", template::LD, Family::Load),
    ("LDB", template::LDB, Family::Load),
    ("LDH", template::LDH, Family::Load),
    ("LDR", template::LDR, Family::Load),
    ("LDA", template::LDA, Family::Load),
    ("ST", template::ST, Family::Store),
    ("STW", template::ST, Family::Store),
    ("STB", template::STB, Family::Store),
    ("STH", template::STH, Family::Store),
    ("STC", template::STC, Family::Store),
    ("STA", template::STA, Family::Store),
    ("ADD", template::ADD, Family::ModeType),
    ("ADDW", template::ADD, Family::ModeType),
    ("ADDB", template::ADDB, Family::ModeType),
    ("ADDH", template::ADDH, Family::ModeType),
    ("ADC", template::ADC, Family::ModeType),
    ("ADCW", template::ADC, Family::ModeType),
    ("ADCB", template::ADCB, Family::ModeType),
    ("ADCH", template::ADCH, Family::ModeType),
    ("SUB", template::SUB, Family::ModeType),
    ("SUBW", template::SUB, Family::ModeType),
    ("SUBB", template::SUBB, Family::ModeType),
    ("SUBH", template::SUBH, Family::ModeType),
    ("SBC", template::SBC, Family::ModeType),
    ("SBCW", template::SBC, Family::ModeType),
    ("SBCB", template::SBCB, Family::ModeType),
    ("SBCH", template::SBCH, Family::ModeType),
    ("AND", template::AND, Family::ModeType),
    ("ANDW", template::AND, Family::ModeType),
    ("ANDB", template::ANDB, Family::ModeType),
    ("ANDH", template::ANDH, Family::ModeType),
    ("OR", template::OR, Family::ModeType),
    ("ORW", template::OR, Family::ModeType),
    ("ORB", template::ORB, Family::ModeType),
    ("ORH", template::ORH, Family::ModeType),
    ("XOR", template::XOR, Family::ModeType),
    ("XORW", template::XOR, Family::ModeType),
    ("XORB", template::XORB, Family::ModeType),
    ("XORH", template::XORH, Family::ModeType),
    ("CMP", template::CMP, Family::ModeType),
    ("CMPW", template::CMP, Family::ModeType),
    ("CMPB", template::CMPB, Family::ModeType),
    ("CMPH", template::CMPH, Family::ModeType),
    ("CMPU", template::CMPU, Family::ModeType),
    ("CMPUW", template::CMPU, Family::ModeType),
    ("CMPUB", template::CMPUB, Family::ModeType),
    ("CMPUH", template::CMPUH, Family::ModeType),
    ("LSID", template::LSID, Family::Lsid),
    ("EXTR", template::EXTR, Family::Extr),
    ("DEP", template::DEP, Family::Dep),
    ("DSR", template::DSR, Family::Dsr),
    ("SHLA", template::SHLA, Family::Shla),
    ("CMR", template::CMR, Family::Cmr),
    ("LDIL", template::LDIL, Family::LdilAddil),
    ("ADDIL", template::ADDIL, Family::LdilAddil),
    ("LDO", template::LDO, Family::Ldo),
    ("B", template::B, Family::BGate),
    ("GATE", template::GATE, Family::BGate),
    ("BR", template::BR, Family::BrBv),
    ("BV", template::BV, Family::BrBv),
    ("BE", template::BE, Family::Be),
    ("BVE", template::BVE, Family::Bve),
    ("CBR", template::CBR, Family::Cbr),
    ("CBRU", template::CBRU, Family::Cbr),
    ("MR", template::MR, Family::Mr),
    ("MST", template::MST, Family::Mst),
    ("DS", template::DS, Family::Ds),
    ("LDPA", template::LDPA, Family::Ldpa),
    ("PRB", template::PRB, Family::Prb),
    ("ITLB", template::ITLB, Family::Itlb),
    ("PTLB", template::PTLB, Family::PtlbPca),
    ("PCA", template::PCA, Family::PtlbPca),
    ("DIAG", template::DIAG, Family::Diag),
    ("RFI", template::RFI, Family::Rfi),
    ("BRK", template::BRK, Family::Brk),
];

/// Synthetic mnemonics; only NOP is assigned.
const SYNTHETICS: &[&str] = &["NOP", "SHL", "SHR", "ASL", "ASR", "ROR", "ROL"];

/// The one-line assembler. A fresh tokenizer is built per call, so the
/// value itself is stateless and freely shareable.
#[derive(Clone, Copy, Debug, Default)]
pub struct OneLineAsm;

impl OneLineAsm {
    /// Creates an assembler.
    pub fn new() -> Self {
        Self
    }

    /// Assembles one line into an instruction word.
    ///
    /// # Errors
    ///
    /// Returns the symbolic error id and the character position of the
    /// offending token.
    pub fn assemble(&self, line: &str) -> Result<u32, AsmError> {
        let mut t = Tokenizer::new(line)?;
        parse_line(&mut t)
    }
}

/// Convenience free function over [`OneLineAsm`].
pub fn assemble_line(line: &str) -> Result<u32, AsmError> {
    OneLineAsm::new().assemble(line)
}

// ── Field helpers with range errors ───────────────────────────

fn check_signed(t: &Tokenizer, v: i64, len: u32, id: AsmErrId) -> Result<i32, AsmError> {
    match i32::try_from(v) {
        Ok(v) if fits_signed(v, len) => Ok(v),
        _ => Err(t.error(id)),
    }
}

fn check_unsigned(t: &Tokenizer, v: i64, len: u32, id: AsmErrId) -> Result<u32, AsmError> {
    match u32::try_from(v) {
        Ok(v) if fits_unsigned(v, len) => Ok(v),
        _ => Err(t.error(id)),
    }
}

fn accept_greg(t: &mut Tokenizer, instr: &mut u32, pos: u32) -> Result<u8, AsmError> {
    let Token::Greg(r) = *t.tok() else {
        return Err(t.error(AsmErrId::ExpectedGeneralReg));
    };
    set_bit_field(instr, pos, 4, u32::from(r));
    t.next_token()?;
    Ok(r)
}

// ── Option parsing ────────────────────────────────────────────

fn cond2_code(opts: &str) -> Option<u32> {
    match opts {
        "EQ" => Some(0),
        "LT" => Some(1),
        "NE" => Some(2),
        "LE" => Some(3),
        _ => None,
    }
}

fn cond4_code(opts: &str) -> Option<u32> {
    match opts {
        "EQ" => Some(0),
        "LT" => Some(1),
        "GT" => Some(2),
        "EV" => Some(3),
        "NE" => Some(4),
        "LE" => Some(5),
        "GE" => Some(6),
        "OD" => Some(7),
        _ => None,
    }
}

fn apply_option_chars(
    t: &Tokenizer,
    instr: &mut u32,
    opts: &str,
    table: &[(char, u32)],
) -> Result<(), AsmError> {
    for c in opts.chars() {
        match table.iter().find(|(ch, _)| *ch == c) {
            Some((_, bit)) => set_bit(instr, *bit, true),
            None => return Err(t.error(AsmErrId::InvalidInstrOpt)),
        }
    }
    Ok(())
}

fn parse_instr_options(t: &mut Tokenizer, instr: &mut u32) -> Result<(), AsmError> {
    let Token::Ident(opts) = t.tok().clone() else {
        return Err(t.error(AsmErrId::InvalidInstrOpt));
    };

    match instr.opcode() {
        op::LD | op::ST | op::LDA | op::STA => {
            apply_option_chars(t, instr, &opts, &[('M', 11)])?;
        }
        op::ADD | op::ADC | op::SUB | op::SBC => {
            apply_option_chars(t, instr, &opts, &[('L', 10), ('O', 11)])?;
        }
        op::AND | op::OR => {
            apply_option_chars(t, instr, &opts, &[('N', 10), ('C', 11)])?;
        }
        op::XOR => apply_option_chars(t, instr, &opts, &[('N', 10)])?,
        op::CMP | op::CMPU => match cond2_code(&opts) {
            Some(c) => set_bit_field(instr, 11, 2, c),
            None => return Err(t.error(AsmErrId::InvalidInstrOpt)),
        },
        op::CBR | op::CBRU => match cond2_code(&opts) {
            Some(c) => set_bit_field(instr, 7, 2, c),
            None => return Err(t.error(AsmErrId::InvalidInstrOpt)),
        },
        op::CMR => match cond4_code(&opts) {
            Some(c) => set_bit_field(instr, 13, 4, c),
            None => return Err(t.error(AsmErrId::InvalidInstrOpt)),
        },
        op::EXTR => apply_option_chars(t, instr, &opts, &[('S', 10), ('A', 11)])?,
        op::DEP => apply_option_chars(t, instr, &opts, &[('Z', 10), ('A', 11), ('I', 12)])?,
        op::DSR => apply_option_chars(t, instr, &opts, &[('A', 11)])?,
        op::SHLA => apply_option_chars(t, instr, &opts, &[('I', 10), ('L', 11), ('O', 12)])?,
        op::MR => apply_option_chars(t, instr, &opts, &[('D', 10), ('M', 11)])?,
        op::MST => {
            for c in opts.chars() {
                match c {
                    'S' => set_imm_val_u(instr, 11, 2, 1),
                    'C' => set_imm_val_u(instr, 11, 2, 2),
                    _ => return Err(t.error(AsmErrId::InvalidInstrOpt)),
                }
            }
        }
        op::PRB => apply_option_chars(t, instr, &opts, &[('W', 10), ('I', 11)])?,
        op::ITLB => apply_option_chars(t, instr, &opts, &[('T', 11)])?,
        op::PTLB => apply_option_chars(t, instr, &opts, &[('T', 10), ('M', 11)])?,
        op::PCA => apply_option_chars(t, instr, &opts, &[('T', 10), ('M', 11), ('F', 14)])?,
        _ => return Err(t.error(AsmErrId::InstrHasNoOpt)),
    }

    t.next_token()
}

// ── Shared operand pieces ─────────────────────────────────────

/// `"(" [ SR "," ] GR ")"` into the base and segment-select fields.
fn parse_logical_adr(t: &mut Tokenizer, instr: &mut u32) -> Result<(), AsmError> {
    match parse_expr(t)? {
        ExprVal::ExtAdr { sreg, greg } => {
            set_bit_field(instr, 31, 4, u32::from(greg));
            if (1..=3).contains(&sreg) {
                set_bit_field(instr, 13, 2, u32::from(sreg));
                Ok(())
            } else {
                Err(t.error(AsmErrId::ExpectedSr1Sr3))
            }
        }
        ExprVal::Adr(base) => {
            set_bit_field(instr, 31, 4, u32::from(base));
            Ok(())
        }
        _ => Err(t.error(AsmErrId::ExpectedLogicalAdr)),
    }
}

/// The load/store operand: `<ofs|idxReg> "(" [SR ","] GR ")"`.
fn parse_load_store_operand(t: &mut Tokenizer, instr: &mut u32) -> Result<(), AsmError> {
    match parse_expr(t)? {
        ExprVal::Num(v) => {
            let v = check_signed(t, v, 12, AsmErrId::ImmValRange)?;
            set_imm_val(instr, 27, 12, v);
            set_bit(instr, 10, false);
        }
        ExprVal::Greg(x) => {
            if matches!(instr.opcode(), op::LDR | op::STC) {
                return Err(t.error(AsmErrId::InvalidInstrMode));
            }
            set_bit(instr, 10, true);
            set_bit_field(instr, 27, 4, u32::from(x));
        }
        _ => return Err(t.error(AsmErrId::ExpectedAnOffsetVal)),
    }

    match parse_expr(t)? {
        ExprVal::Adr(base) => {
            set_bit_field(instr, 13, 2, 0);
            set_bit_field(instr, 31, 4, u32::from(base));
            Ok(())
        }
        ExprVal::ExtAdr { sreg, greg } => {
            if matches!(instr.opcode(), op::LDA | op::STA) {
                return Err(t.error(AsmErrId::InvalidInstrMode));
            }
            if !(1..=3).contains(&sreg) {
                return Err(t.error(AsmErrId::ExpectedSr1Sr3));
            }
            set_bit_field(instr, 13, 2, u32::from(sreg));
            set_bit_field(instr, 31, 4, u32::from(greg));
            Ok(())
        }
        _ => Err(t.error(AsmErrId::ExpectedLogicalAdr)),
    }
}

// ── Per-family encoders ───────────────────────────────────────

fn parse_mode_type(t: &mut Tokenizer, instr: &mut u32) -> Result<(), AsmError> {
    let w = instr.data_width();
    let target = accept_greg(t, instr, 9)?;
    t.accept_comma()?;

    match parse_expr(t)? {
        ExprVal::Num(v) => {
            if *t.tok() == Token::Eos {
                let v = check_signed(t, v, 18, AsmErrId::ImmValRange)?;
                set_imm_val(instr, 31, 18, v);
            } else {
                let v = check_signed(t, v, 12, AsmErrId::ImmValRange)?;
                set_imm_val(instr, 27, 12, v);
                match parse_expr(t)? {
                    ExprVal::Adr(base) => {
                        set_bit_field(instr, 13, 2, 3);
                        set_bit_field(instr, 31, 4, u32::from(base));
                    }
                    _ => return Err(t.error(AsmErrId::ExpectedLogicalAdr)),
                }
                set_bit_field(instr, 15, 2, w);
            }
        }
        ExprVal::Greg(src) => match t.tok().clone() {
            Token::Eos => {
                set_bit_field(instr, 13, 2, 1);
                set_bit_field(instr, 27, 4, u32::from(target));
                set_bit_field(instr, 31, 4, u32::from(src));
            }
            Token::Comma => {
                t.next_token()?;
                // A numeric third operand would be a memory operand after a
                // register source; only the word forms could even try that,
                // and no mode encodes it.
                if matches!(t.tok(), Token::Num(_)) && w != width::WORD {
                    return Err(t.error(AsmErrId::InstrModeOptCombo));
                }
                set_bit_field(instr, 13, 2, 1);
                set_bit_field(instr, 27, 4, u32::from(src));
                let _ = accept_greg(t, instr, 31)?;
            }
            Token::Lparen => {
                set_bit_field(instr, 27, 4, u32::from(src));
                match parse_expr(t)? {
                    ExprVal::Adr(base) => {
                        set_bit_field(instr, 13, 2, 2);
                        set_bit_field(instr, 31, 4, u32::from(base));
                    }
                    _ => return Err(t.error(AsmErrId::ExpectedLogicalAdr)),
                }
                set_bit_field(instr, 15, 2, w);
            }
            _ => return Err(t.error(AsmErrId::InvalidInstrMode)),
        },
        _ => return Err(t.error(AsmErrId::InvalidInstrMode)),
    }

    // Byte and half-word forms exist only for the memory-operand modes;
    // the immediate and register modes spend those bits on the immediate.
    if instr.mode() < 2 && w != width::WORD {
        return Err(t.error(AsmErrId::InstrModeOptCombo));
    }

    t.check_eos()
}

fn parse_load(t: &mut Tokenizer, instr: &mut u32) -> Result<(), AsmError> {
    let _ = accept_greg(t, instr, 9)?;
    t.accept_comma()?;
    parse_load_store_operand(t, instr)?;
    t.check_eos()
}

fn parse_store(t: &mut Tokenizer, instr: &mut u32) -> Result<(), AsmError> {
    parse_load_store_operand(t, instr)?;
    t.accept_comma()?;
    let _ = accept_greg(t, instr, 9)?;
    t.check_eos()
}

fn parse_lsid(t: &mut Tokenizer, instr: &mut u32) -> Result<(), AsmError> {
    let _ = accept_greg(t, instr, 9)?;
    t.accept_comma()?;
    let _ = accept_greg(t, instr, 31)?;
    t.check_eos()
}

fn parse_extr(t: &mut Tokenizer, instr: &mut u32) -> Result<(), AsmError> {
    let _ = accept_greg(t, instr, 9)?;
    t.accept_comma()?;
    let _ = accept_greg(t, instr, 31)?;
    t.accept_comma()?;

    let use_sar = instr.opt(11);
    match parse_expr(t)? {
        ExprVal::Num(v) => {
            if use_sar {
                let v = check_unsigned(t, v, 5, AsmErrId::LenValRange)?;
                set_bit_field(instr, 21, 5, v);
            } else {
                let v = check_unsigned(t, v, 5, AsmErrId::PosValRange)?;
                set_bit_field(instr, 27, 5, v);
            }
        }
        _ => return Err(t.error(AsmErrId::ExpectedNumeric)),
    }

    if !use_sar {
        t.accept_comma()?;
        match parse_expr(t)? {
            ExprVal::Num(v) => {
                let v = check_unsigned(t, v, 5, AsmErrId::LenValRange)?;
                set_bit_field(instr, 21, 5, v);
            }
            _ => return Err(t.error(AsmErrId::ExpectedNumeric)),
        }
    }
    t.check_eos()
}

fn parse_dep(t: &mut Tokenizer, instr: &mut u32) -> Result<(), AsmError> {
    let _ = accept_greg(t, instr, 9)?;
    t.accept_comma()?;

    let use_sar = instr.opt(11);
    let immediate = instr.opt(12);

    match parse_expr(t)? {
        ExprVal::Greg(src) => {
            if immediate {
                return Err(t.error(AsmErrId::InstrModeOptCombo));
            }
            set_bit_field(instr, 31, 4, u32::from(src));
        }
        ExprVal::Num(v) => {
            if !immediate {
                return Err(t.error(AsmErrId::InstrModeOptCombo));
            }
            let v = check_signed(t, v, 4, AsmErrId::ImmValRange)?;
            set_bit_field(instr, 31, 4, v as u32);
        }
        _ => return Err(t.error(AsmErrId::ExpectedNumeric)),
    }

    if !use_sar {
        t.accept_comma()?;
        match parse_expr(t)? {
            ExprVal::Num(v) => {
                let v = check_unsigned(t, v, 5, AsmErrId::PosValRange)?;
                set_bit_field(instr, 27, 5, v);
            }
            _ => return Err(t.error(AsmErrId::ExpectedNumeric)),
        }
    }

    t.accept_comma()?;
    match parse_expr(t)? {
        ExprVal::Num(v) => {
            let v = check_unsigned(t, v, 5, AsmErrId::LenValRange)?;
            set_bit_field(instr, 21, 5, v);
        }
        _ => return Err(t.error(AsmErrId::ExpectedNumeric)),
    }
    t.check_eos()
}

fn parse_ds(t: &mut Tokenizer, instr: &mut u32) -> Result<(), AsmError> {
    let _ = accept_greg(t, instr, 9)?;
    t.accept_comma()?;
    let _ = accept_greg(t, instr, 27)?;
    t.accept_comma()?;
    let _ = accept_greg(t, instr, 31)?;
    t.check_eos()
}

fn parse_dsr(t: &mut Tokenizer, instr: &mut u32) -> Result<(), AsmError> {
    let _ = accept_greg(t, instr, 9)?;
    t.accept_comma()?;
    let _ = accept_greg(t, instr, 27)?;
    t.accept_comma()?;
    let _ = accept_greg(t, instr, 31)?;

    if !instr.opt(11) {
        t.accept_comma()?;
        match parse_expr(t)? {
            ExprVal::Num(v) => {
                let v = check_unsigned(t, v, 5, AsmErrId::ImmValRange)?;
                set_bit_field(instr, 21, 5, v);
            }
            _ => return Err(t.error(AsmErrId::ExpectedNumeric)),
        }
    }
    t.check_eos()
}

fn parse_shla(t: &mut Tokenizer, instr: &mut u32) -> Result<(), AsmError> {
    let _ = accept_greg(t, instr, 9)?;
    t.accept_comma()?;
    let _ = accept_greg(t, instr, 27)?;
    t.accept_comma()?;

    match parse_expr(t)? {
        ExprVal::Greg(src) => {
            if instr.opt(10) {
                return Err(t.error(AsmErrId::InstrModeOptCombo));
            }
            set_bit_field(instr, 31, 4, u32::from(src));
        }
        ExprVal::Num(v) => {
            if !instr.opt(10) {
                return Err(t.error(AsmErrId::InstrModeOptCombo));
            }
            let v = check_signed(t, v, 4, AsmErrId::ImmValRange)?;
            set_bit_field(instr, 31, 4, v as u32);
        }
        _ => return Err(t.error(AsmErrId::ExpectedNumeric)),
    }

    t.accept_comma()?;
    match parse_expr(t)? {
        ExprVal::Num(v) => {
            let v = check_unsigned(t, v, 2, AsmErrId::ImmValRange)?;
            set_bit_field(instr, 21, 2, v);
        }
        _ => return Err(t.error(AsmErrId::ExpectedNumeric)),
    }
    t.check_eos()
}

fn parse_cmr(t: &mut Tokenizer, instr: &mut u32) -> Result<(), AsmError> {
    let _ = accept_greg(t, instr, 9)?;
    t.accept_comma()?;
    let _ = accept_greg(t, instr, 27)?;
    t.accept_comma()?;
    let _ = accept_greg(t, instr, 31)?;
    t.check_eos()
}

fn parse_ldil_addil(t: &mut Tokenizer, instr: &mut u32) -> Result<(), AsmError> {
    let _ = accept_greg(t, instr, 9)?;
    t.accept_comma()?;
    match parse_expr(t)? {
        ExprVal::Num(v) => {
            let v = check_unsigned(t, v, 22, AsmErrId::ImmValRange)?;
            set_imm_val_u(instr, 31, 22, v);
        }
        _ => return Err(t.error(AsmErrId::ExpectedNumeric)),
    }
    t.check_eos()
}

fn parse_ldo(t: &mut Tokenizer, instr: &mut u32) -> Result<(), AsmError> {
    let _ = accept_greg(t, instr, 9)?;
    t.accept_comma()?;
    match parse_expr(t)? {
        ExprVal::Num(v) => {
            let v = check_signed(t, v, 18, AsmErrId::ImmValRange)?;
            set_imm_val(instr, 27, 18, v);
            match parse_expr(t)? {
                ExprVal::Adr(base) => set_bit_field(instr, 31, 4, u32::from(base)),
                _ => return Err(t.error(AsmErrId::ExpectedLogicalAdr)),
            }
        }
        ExprVal::Adr(base) => {
            set_imm_val(instr, 27, 18, 0);
            set_bit_field(instr, 31, 4, u32::from(base));
        }
        _ => return Err(t.error(AsmErrId::ExpectedNumeric)),
    }
    t.check_eos()
}

fn parse_b_gate(t: &mut Tokenizer, instr: &mut u32) -> Result<(), AsmError> {
    match parse_expr(t)? {
        ExprVal::Num(v) => {
            let v = check_signed(t, v, 22, AsmErrId::OffsetValRange)?;
            set_imm_val(instr, 31, 22, v);
        }
        _ => return Err(t.error(AsmErrId::ExpectedAnOffsetVal)),
    }
    if *t.tok() == Token::Comma {
        t.next_token()?;
        let _ = accept_greg(t, instr, 9)?;
    }
    t.check_eos()
}

fn parse_br_bv(t: &mut Tokenizer, instr: &mut u32) -> Result<(), AsmError> {
    t.accept_lparen()?;
    let _ = accept_greg(t, instr, 31)?;
    t.accept_rparen()?;
    if *t.tok() == Token::Comma {
        t.next_token()?;
        let _ = accept_greg(t, instr, 9)?;
    }
    t.check_eos()
}

fn parse_be(t: &mut Tokenizer, instr: &mut u32) -> Result<(), AsmError> {
    let mut operand = parse_expr(t)?;
    if let ExprVal::Num(v) = operand {
        let v = check_signed(t, v, 14, AsmErrId::ImmValRange)?;
        set_imm_val(instr, 23, 14, v);
        operand = parse_expr(t)?;
    }
    match operand {
        ExprVal::ExtAdr { sreg, greg } => {
            set_bit_field(instr, 27, 4, u32::from(sreg));
            set_bit_field(instr, 31, 4, u32::from(greg));
        }
        _ => return Err(t.error(AsmErrId::ExpectedExtAdr)),
    }
    if *t.tok() == Token::Comma {
        t.next_token()?;
        let _ = accept_greg(t, instr, 9)?;
    }
    t.check_eos()
}

fn parse_bve(t: &mut Tokenizer, instr: &mut u32) -> Result<(), AsmError> {
    if let Token::Greg(x) = *t.tok() {
        set_bit_field(instr, 27, 4, u32::from(x));
        t.next_token()?;
    }
    match parse_expr(t)? {
        ExprVal::Adr(base) => set_bit_field(instr, 31, 4, u32::from(base)),
        _ => return Err(t.error(AsmErrId::ExpectedLogicalAdr)),
    }
    if *t.tok() == Token::Comma {
        t.next_token()?;
        let _ = accept_greg(t, instr, 9)?;
    }
    t.check_eos()
}

fn parse_cbr(t: &mut Tokenizer, instr: &mut u32) -> Result<(), AsmError> {
    let _ = accept_greg(t, instr, 27)?;
    t.accept_comma()?;
    let _ = accept_greg(t, instr, 31)?;
    t.accept_comma()?;
    match parse_expr(t)? {
        ExprVal::Num(v) => {
            let v = check_signed(t, v, 16, AsmErrId::OffsetValRange)?;
            set_imm_val(instr, 23, 16, v);
        }
        _ => return Err(t.error(AsmErrId::ExpectedAnOffsetVal)),
    }
    t.check_eos()
}

fn parse_mr(t: &mut Tokenizer, instr: &mut u32) -> Result<(), AsmError> {
    match t.tok().clone() {
        Token::Greg(target) => {
            t.next_token()?;
            t.accept_comma()?;
            match t.tok().clone() {
                Token::Greg(src) => {
                    // A general-to-general move assembles as OR with R0.
                    *instr = 0;
                    set_bit_field(instr, 5, 6, op::OR);
                    set_bit_field(instr, 9, 4, u32::from(target));
                    set_bit_field(instr, 13, 2, 1);
                    set_bit_field(instr, 27, 4, 0);
                    set_bit_field(instr, 31, 4, u32::from(src));
                    t.next_token()?;
                }
                Token::Sreg(src) => {
                    set_bit_field(instr, 31, 3, u32::from(src));
                    set_bit_field(instr, 9, 4, u32::from(target));
                    t.next_token()?;
                }
                Token::Creg(src) => {
                    set_bit(instr, 11, true);
                    set_bit_field(instr, 31, 5, u32::from(src));
                    set_bit_field(instr, 9, 4, u32::from(target));
                    t.next_token()?;
                }
                _ => return Err(t.error(AsmErrId::InvalidInstrMode)),
            }
        }
        Token::Sreg(target) => {
            t.next_token()?;
            t.accept_comma()?;
            let Token::Greg(src) = *t.tok() else {
                return Err(t.error(AsmErrId::InvalidInstrMode));
            };
            set_bit(instr, 10, true);
            set_bit_field(instr, 31, 3, u32::from(target));
            set_bit_field(instr, 9, 4, u32::from(src));
            t.next_token()?;
        }
        Token::Creg(target) => {
            t.next_token()?;
            t.accept_comma()?;
            let Token::Greg(src) = *t.tok() else {
                return Err(t.error(AsmErrId::InvalidInstrMode));
            };
            set_bit(instr, 10, true);
            set_bit(instr, 11, true);
            set_bit_field(instr, 31, 5, u32::from(target));
            set_bit_field(instr, 9, 4, u32::from(src));
            t.next_token()?;
        }
        _ => return Err(t.error(AsmErrId::ExpectedGeneralReg)),
    }
    t.check_eos()
}

fn parse_mst(t: &mut Tokenizer, instr: &mut u32) -> Result<(), AsmError> {
    let _ = accept_greg(t, instr, 9)?;
    t.accept_comma()?;
    let mode = instr.field(11, 2);
    match parse_expr(t)? {
        ExprVal::Greg(src) => {
            if mode != 0 {
                return Err(t.error(AsmErrId::InvalidInstrOpt));
            }
            set_bit_field(instr, 31, 4, u32::from(src));
        }
        ExprVal::Num(v) => {
            if mode != 1 && mode != 2 {
                return Err(t.error(AsmErrId::InvalidInstrOpt));
            }
            let v = check_unsigned(t, v, 6, AsmErrId::ImmValRange)?;
            set_bit_field(instr, 31, 6, v);
        }
        _ => return Err(t.error(AsmErrId::ExpectedNumeric)),
    }
    t.check_eos()
}

fn parse_ldpa(t: &mut Tokenizer, instr: &mut u32) -> Result<(), AsmError> {
    let _ = accept_greg(t, instr, 9)?;
    t.accept_comma()?;
    if let Token::Greg(x) = *t.tok() {
        set_bit_field(instr, 27, 4, u32::from(x));
        t.next_token()?;
    }
    parse_logical_adr(t, instr)?;
    t.check_eos()
}

fn parse_prb(t: &mut Tokenizer, instr: &mut u32) -> Result<(), AsmError> {
    let _ = accept_greg(t, instr, 9)?;
    t.accept_comma()?;
    parse_logical_adr(t, instr)?;
    t.accept_comma()?;

    if instr.opt(11) {
        match parse_expr(t)? {
            ExprVal::Num(v) => {
                let v = check_unsigned(t, v, 1, AsmErrId::ImmValRange)?;
                set_bit(instr, 27, v != 0);
            }
            _ => return Err(t.error(AsmErrId::ImmValRange)),
        }
    } else {
        match parse_expr(t)? {
            ExprVal::Greg(arg) => set_bit_field(instr, 27, 4, u32::from(arg)),
            _ => return Err(t.error(AsmErrId::ExpectedGeneralReg)),
        }
    }
    t.check_eos()
}

fn parse_itlb(t: &mut Tokenizer, instr: &mut u32) -> Result<(), AsmError> {
    let _ = accept_greg(t, instr, 9)?;
    t.accept_comma()?;
    t.accept_lparen()?;
    let Token::Sreg(sreg) = *t.tok() else {
        return Err(t.error(AsmErrId::ExpectedSegmentReg));
    };
    set_bit_field(instr, 27, 4, u32::from(sreg));
    t.next_token()?;
    t.accept_comma()?;
    let _ = accept_greg(t, instr, 31)?;
    t.accept_rparen()?;
    t.check_eos()
}

fn parse_ptlb_pca(t: &mut Tokenizer, instr: &mut u32) -> Result<(), AsmError> {
    if let Token::Greg(x) = *t.tok() {
        set_bit_field(instr, 27, 4, u32::from(x));
        t.next_token()?;
    }
    if *t.tok() != Token::Lparen {
        return Err(t.error(AsmErrId::ExpectedLogicalAdr));
    }
    parse_logical_adr(t, instr)?;
    t.check_eos()
}

fn parse_diag(t: &mut Tokenizer, instr: &mut u32) -> Result<(), AsmError> {
    let _ = accept_greg(t, instr, 9)?;
    t.accept_comma()?;
    let _ = accept_greg(t, instr, 27)?;
    t.accept_comma()?;
    let _ = accept_greg(t, instr, 31)?;
    t.accept_comma()?;
    match parse_expr(t)? {
        ExprVal::Num(v) => {
            let v = check_unsigned(t, v, 4, AsmErrId::ImmValRange)?;
            set_bit_field(instr, 13, 4, v);
        }
        _ => return Err(t.error(AsmErrId::ExpectedNumeric)),
    }
    t.check_eos()
}

fn parse_brk(t: &mut Tokenizer, instr: &mut u32) -> Result<(), AsmError> {
    match parse_expr(t)? {
        ExprVal::Num(v) => {
            let v = check_unsigned(t, v, 4, AsmErrId::ImmValRange)?;
            set_imm_val_u(instr, 9, 4, v);
        }
        _ => return Err(t.error(AsmErrId::ExpectedNumeric)),
    }
    t.accept_comma()?;
    match parse_expr(t)? {
        ExprVal::Num(v) => {
            let v = check_unsigned(t, v, 16, AsmErrId::ImmValRange)?;
            set_imm_val_u(instr, 31, 16, v);
        }
        _ => return Err(t.error(AsmErrId::ExpectedNumeric)),
    }
    t.check_eos()
}

// ── Line entry point ──────────────────────────────────────────

fn parse_line(t: &mut Tokenizer) -> Result<u32, AsmError> {
    let Token::Ident(name) = t.tok().clone() else {
        return Err(t.error(AsmErrId::InvalidOpCode));
    };

    if let Some((_, tmpl, family)) = MNEMONICS.iter().find(|(n, _, _)| *n == name) {
        let mut instr = *tmpl;
        t.next_token()?;
        while *t.tok() == Token::Period {
            t.next_token()?;
            parse_instr_options(t, &mut instr)?;
        }
        match family {
            Family::ModeType => parse_mode_type(t, &mut instr)?,
            Family::Load => parse_load(t, &mut instr)?,
            Family::Store => parse_store(t, &mut instr)?,
            Family::Lsid => parse_lsid(t, &mut instr)?,
            Family::Extr => parse_extr(t, &mut instr)?,
            Family::Dep => parse_dep(t, &mut instr)?,
            Family::Ds => parse_ds(t, &mut instr)?,
            Family::Dsr => parse_dsr(t, &mut instr)?,
            Family::Shla => parse_shla(t, &mut instr)?,
            Family::Cmr => parse_cmr(t, &mut instr)?,
            Family::LdilAddil => parse_ldil_addil(t, &mut instr)?,
            Family::Ldo => parse_ldo(t, &mut instr)?,
            Family::BGate => parse_b_gate(t, &mut instr)?,
            Family::BrBv => parse_br_bv(t, &mut instr)?,
            Family::Be => parse_be(t, &mut instr)?,
            Family::Bve => parse_bve(t, &mut instr)?,
            Family::Cbr => parse_cbr(t, &mut instr)?,
            Family::Mr => parse_mr(t, &mut instr)?,
            Family::Mst => parse_mst(t, &mut instr)?,
            Family::Ldpa => parse_ldpa(t, &mut instr)?,
            Family::Prb => parse_prb(t, &mut instr)?,
            Family::Itlb => parse_itlb(t, &mut instr)?,
            Family::PtlbPca => parse_ptlb_pca(t, &mut instr)?,
            Family::Diag => parse_diag(t, &mut instr)?,
            Family::Rfi => t.check_eos()?,
            Family::Brk => parse_brk(t, &mut instr)?,
        }
        return Ok(instr);
    }

    if SYNTHETICS.contains(&name.as_str()) {
        if name == "NOP" {
            t.next_token()?;
            t.check_eos()?;
            return Ok(0);
        }
        return Err(t.error(AsmErrId::InvalidSOpCode));
    }

    Err(t.error(AsmErrId::InvalidOpCode))
}
